//! JSON persistence for the virtual → physical address mapping.
//!
//! The mapping document is the only durable state. The nftables deny sets are
//! rebuilt from its values, so a lost or corrupt document must never abort a
//! run (it loads as empty), while a failed write always does.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Virtual address → physical address, both as IP literals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressMap(BTreeMap<String, String>);

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, virtual_addr: &str) -> Option<&str> {
        self.0.get(virtual_addr).map(String::as_str)
    }

    /// Record a mapping, returning the previous physical address if any.
    pub fn insert(&mut self, virtual_addr: String, physical_addr: String) -> Option<String> {
        self.0.insert(virtual_addr, physical_addr)
    }

    pub fn remove(&mut self, virtual_addr: &str) -> Option<String> {
        self.0.remove(virtual_addr)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Physical addresses currently recorded.
    pub fn physical_addrs(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    /// Pretty JSON with a four-space indent.
    pub fn to_pretty_json(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        // A map of strings always serializes.
        if self.serialize(&mut ser).is_err() {
            return "{}".to_string();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl FromIterator<(String, String)> for AddressMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Reads and writes the mapping document at a fixed path.
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing, unreadable, malformed, or wrongly shaped
    /// file yields an empty mapping.
    pub fn load(&self) -> AddressMap {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "No mapping file at {}, starting empty",
                    self.path.display()
                );
                return AddressMap::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read {} ({e}), using an empty mapping",
                    self.path.display()
                );
                return AddressMap::new();
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} ({e}), using an empty mapping",
                    self.path.display()
                );
                return AddressMap::new();
            }
        };

        match parse_flat_mapping(value) {
            Some(map) => map,
            None => {
                tracing::warn!(
                    "{} is not a flat string-to-string mapping, using an empty mapping",
                    self.path.display()
                );
                AddressMap::new()
            }
        }
    }

    /// Persist the document by writing a sibling temp file and renaming it
    /// over the target.
    pub fn save(&self, map: &AddressMap) -> Result<(), AppError> {
        let store_err = |source: std::io::Error| AppError::Store {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(store_err)?;

        let mut json = map.to_pretty_json();
        json.push('\n');
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(store_err)?;
        tmp.write_all(json.as_bytes()).map_err(store_err)?;
        tmp.as_file().sync_all().map_err(store_err)?;
        tmp.persist(&self.path).map_err(|e| store_err(e.error))?;

        tracing::info!("Saved {} mapping(s) to {}", map.len(), self.path.display());
        Ok(())
    }
}

fn parse_flat_mapping(value: serde_json::Value) -> Option<AddressMap> {
    let serde_json::Value::Object(object) = value else {
        return None;
    };
    object
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(physical) => Some((key, physical)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AddressMap {
        [
            ("100.64.0.2", "203.0.113.5"),
            ("fd7a:115c:a1e0::2", "2001:db8::5"),
        ]
        .into_iter()
        .map(|(v, p)| (v.to_string(), p.to_string()))
        .collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MappingStore::new(tmp.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_pairs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MappingStore::new(tmp.path().join("mapping.json"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), sample());

        // Saving what was loaded changes nothing.
        store.save(&store.load()).unwrap();
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn test_save_writes_four_space_indent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MappingStore::new(tmp.path().join("mapping.json"));
        store.save(&sample()).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"100.64.0.2\": \"203.0.113.5\""));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MappingStore::new(tmp.path().join("nested/dir/mapping.json"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn test_load_malformed_json_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mapping.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(MappingStore::new(&path).load().is_empty());
    }

    #[test]
    fn test_load_wrong_shape_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mapping.json");
        let store = MappingStore::new(&path);

        fs::write(&path, r#"["100.64.0.2"]"#).unwrap();
        assert!(store.load().is_empty());

        fs::write(&path, r#"{"100.64.0.2": {"ip": "203.0.113.5"}}"#).unwrap();
        assert!(store.load().is_empty());

        fs::write(&path, r#"{"100.64.0.2": 42}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_accepts_existing_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mapping.json");
        fs::write(&path, "{\n    \"100.64.0.2\": \"49.93.66.191\"\n}").unwrap();
        let map = MappingStore::new(&path).load();
        assert_eq!(map.get("100.64.0.2"), Some("49.93.66.191"));
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // Parent "directory" is a regular file.
        let store = MappingStore::new(blocker.join("mapping.json"));
        let err = store.save(&sample()).unwrap_err();
        assert_eq!(err.kind(), "Store");
    }

    #[test]
    fn test_insert_returns_previous_address() {
        let mut map = AddressMap::new();
        assert_eq!(map.insert("v".into(), "p1".into()), None);
        assert_eq!(map.insert("v".into(), "p2".into()), Some("p1".into()));
        assert_eq!(map.physical_addrs().collect::<Vec<_>>(), vec!["p2"]);
    }

    #[test]
    fn test_empty_map_serializes_as_braces() {
        assert_eq!(AddressMap::new().to_pretty_json(), "{}");
    }
}
