//! In-memory firewall that records every operation, for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use super::{ChainHook, Direction, DropRule, Family, Firewall, SetType};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateTable(Family),
    CreateSet(Family, String),
    AddElement(Family, String, String),
    DeleteElement(Family, String, String),
    DescribeSet(Family, String),
    CreateChain(Family),
    FlushChain(Family),
    AddRule(Family, Direction),
}

#[derive(Default)]
struct State {
    tables: BTreeSet<Family>,
    sets: BTreeMap<(Family, String), BTreeSet<String>>,
    chains: BTreeMap<Family, Vec<DropRule>>,
    ops: Vec<Op>,
}

#[derive(Default)]
pub struct FakeFirewall {
    state: RefCell<State>,
    fail_describe: bool,
    fail_add_element: Option<String>,
    fail_delete: bool,
    fail_add_rule: bool,
}

fn failure(what: &str) -> AppError {
    AppError::Command {
        command: format!("fake {what}"),
        status: Some(1),
        stderr: "Error: simulated failure".into(),
    }
}

impl FakeFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_describe(mut self) -> Self {
        self.fail_describe = true;
        self
    }

    pub fn failing_add_element(mut self, element: &str) -> Self {
        self.fail_add_element = Some(element.to_string());
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn failing_add_rule(mut self) -> Self {
        self.fail_add_rule = true;
        self
    }

    /// Pre-populate a set without recording an operation.
    pub fn with_elements(self, family: Family, set: &str, elements: &[&str]) -> Self {
        self.state
            .borrow_mut()
            .sets
            .entry((family, set.to_string()))
            .or_default()
            .extend(elements.iter().map(|e| e.to_string()));
        self
    }

    /// Pre-populate a chain with the rule pair without recording an operation.
    pub fn with_rules(self, family: Family, rules: [DropRule; 2]) -> Self {
        self.state
            .borrow_mut()
            .chains
            .insert(family, rules.to_vec());
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn elements(&self, family: Family, set: &str) -> BTreeSet<String> {
        self.state
            .borrow()
            .sets
            .get(&(family, set.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn rules(&self, family: Family) -> Vec<DropRule> {
        self.state
            .borrow()
            .chains
            .get(&family)
            .cloned()
            .unwrap_or_default()
    }
}

impl Firewall for FakeFirewall {
    fn create_table(&self, family: Family, _table: &str) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::CreateTable(family));
        if !state.tables.insert(family) {
            return Err(failure("create table: File exists"));
        }
        Ok(())
    }

    fn create_set(
        &self,
        family: Family,
        _table: &str,
        set: &str,
        _set_type: SetType,
    ) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::CreateSet(family, set.to_string()));
        let key = (family, set.to_string());
        if state.sets.contains_key(&key) {
            return Err(failure("create set: File exists"));
        }
        state.sets.insert(key, BTreeSet::new());
        Ok(())
    }

    fn add_elements(
        &self,
        family: Family,
        _table: &str,
        set: &str,
        elements: &[String],
    ) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        for element in elements {
            state
                .ops
                .push(Op::AddElement(family, set.to_string(), element.clone()));
            if self.fail_add_element.as_deref() == Some(element.as_str()) {
                return Err(failure("add element"));
            }
            state
                .sets
                .entry((family, set.to_string()))
                .or_default()
                .insert(element.clone());
        }
        Ok(())
    }

    fn delete_element(
        &self,
        family: Family,
        _table: &str,
        set: &str,
        element: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state
            .ops
            .push(Op::DeleteElement(family, set.to_string(), element.to_string()));
        if self.fail_delete {
            return Err(failure("delete element"));
        }
        let removed = state
            .sets
            .get_mut(&(family, set.to_string()))
            .is_some_and(|elements| elements.remove(element));
        if !removed {
            return Err(failure("delete element: No such file or directory"));
        }
        Ok(())
    }

    fn describe_set(&self, family: Family, table: &str, set: &str) -> Result<String, AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::DescribeSet(family, set.to_string()));
        if self.fail_describe {
            return Err(failure("list set"));
        }
        let Some(elements) = state.sets.get(&(family, set.to_string())) else {
            return Err(failure("list set: No such file or directory"));
        };

        let mut out = format!(
            "table {} {table} {{\n\tset {set} {{\n\t\ttype {}\n",
            family.nft_name(),
            family.addr_type()
        );
        if !elements.is_empty() {
            let list: Vec<&str> = elements.iter().map(String::as_str).collect();
            out.push_str(&format!("\t\telements = {{ {} }}\n", list.join(", ")));
        }
        out.push_str("\t}\n}");
        Ok(out)
    }

    fn create_chain(
        &self,
        family: Family,
        _table: &str,
        _chain: &str,
        _hook: ChainHook,
    ) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::CreateChain(family));
        if state.chains.contains_key(&family) {
            return Err(failure("create chain: File exists"));
        }
        state.chains.insert(family, Vec::new());
        Ok(())
    }

    fn flush_chain(&self, family: Family, _table: &str, _chain: &str) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::FlushChain(family));
        state.chains.entry(family).or_default().clear();
        Ok(())
    }

    fn add_rule(
        &self,
        family: Family,
        _table: &str,
        _chain: &str,
        rule: &DropRule,
    ) -> Result<(), AppError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::AddRule(family, rule.direction));
        if self.fail_add_rule {
            return Err(failure("add rule"));
        }
        state.chains.entry(family).or_default().push(rule.clone());
        Ok(())
    }
}
