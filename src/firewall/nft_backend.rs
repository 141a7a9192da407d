//! nftables backend driven through the `nft` command-line tool.
//!
//! Each [`Firewall`] operation maps to one `nft` invocation. Element lists are
//! passed as a single `{ a, b }` argument, as nft expects.

use super::{ChainHook, DropRule, Family, Firewall, SetType};
use crate::error::AppError;
use crate::exec;

/// Issues `nft` commands.
pub struct NftFirewall {
    program: String,
}

impl NftFirewall {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn nft(&self, args: Vec<String>) -> Result<String, AppError> {
        exec::run_checked(&self.program, &args)
    }
}

/// `{ a, b, c }` element list argument.
pub fn element_list(elements: &[String]) -> String {
    format!("{{ {} }}", elements.join(", "))
}

fn object_args(verb: &str, object: &str, family: Family, table: &str) -> Vec<String> {
    vec![
        verb.to_string(),
        object.to_string(),
        family.nft_name().to_string(),
        table.to_string(),
    ]
}

/// Arguments of each nft call, kept separate from execution so they can be tested.
pub mod args {
    use super::*;

    pub fn create_table(family: Family, table: &str) -> Vec<String> {
        object_args("create", "table", family, table)
    }

    pub fn create_set(family: Family, table: &str, set: &str, set_type: SetType) -> Vec<String> {
        let element_type = match set_type {
            SetType::Address => family.addr_type(),
            SetType::Service => "inet_service",
        };
        let mut args = object_args("create", "set", family, table);
        args.push(set.to_string());
        args.push(format!("{{ type {element_type}; }}"));
        args
    }

    pub fn add_elements(
        family: Family,
        table: &str,
        set: &str,
        elements: &[String],
    ) -> Vec<String> {
        let mut args = object_args("add", "element", family, table);
        args.push(set.to_string());
        args.push(element_list(elements));
        args
    }

    pub fn delete_element(family: Family, table: &str, set: &str, element: &str) -> Vec<String> {
        let mut args = object_args("delete", "element", family, table);
        args.push(set.to_string());
        args.push(element_list(&[element.to_string()]));
        args
    }

    pub fn list_set(family: Family, table: &str, set: &str) -> Vec<String> {
        let mut args = object_args("list", "set", family, table);
        args.push(set.to_string());
        args
    }

    pub fn create_chain(family: Family, table: &str, chain: &str, hook: ChainHook) -> Vec<String> {
        let mut args = object_args("create", "chain", family, table);
        args.push(chain.to_string());
        args.push(hook.definition());
        args
    }

    pub fn flush_chain(family: Family, table: &str, chain: &str) -> Vec<String> {
        let mut args = object_args("flush", "chain", family, table);
        args.push(chain.to_string());
        args
    }

    pub fn add_rule(family: Family, table: &str, chain: &str, rule: &DropRule) -> Vec<String> {
        let mut args = object_args("add", "rule", family, table);
        args.push(chain.to_string());
        args.extend(rule.expression());
        args
    }
}

impl Firewall for NftFirewall {
    fn create_table(&self, family: Family, table: &str) -> Result<(), AppError> {
        self.nft(args::create_table(family, table)).map(drop)
    }

    fn create_set(
        &self,
        family: Family,
        table: &str,
        set: &str,
        set_type: SetType,
    ) -> Result<(), AppError> {
        self.nft(args::create_set(family, table, set, set_type)).map(drop)
    }

    fn add_elements(
        &self,
        family: Family,
        table: &str,
        set: &str,
        elements: &[String],
    ) -> Result<(), AppError> {
        if elements.is_empty() {
            return Ok(());
        }
        self.nft(args::add_elements(family, table, set, elements)).map(drop)
    }

    fn delete_element(
        &self,
        family: Family,
        table: &str,
        set: &str,
        element: &str,
    ) -> Result<(), AppError> {
        self.nft(args::delete_element(family, table, set, element)).map(drop)
    }

    fn describe_set(&self, family: Family, table: &str, set: &str) -> Result<String, AppError> {
        self.nft(args::list_set(family, table, set))
    }

    fn create_chain(
        &self,
        family: Family,
        table: &str,
        chain: &str,
        hook: ChainHook,
    ) -> Result<(), AppError> {
        self.nft(args::create_chain(family, table, chain, hook)).map(drop)
    }

    fn flush_chain(&self, family: Family, table: &str, chain: &str) -> Result<(), AppError> {
        self.nft(args::flush_chain(family, table, chain)).map(drop)
    }

    fn add_rule(
        &self,
        family: Family,
        table: &str,
        chain: &str,
        rule: &DropRule,
    ) -> Result<(), AppError> {
        self.nft(args::add_rule(family, table, chain, rule)).map(drop)
    }
}
