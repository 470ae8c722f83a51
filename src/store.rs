//! Local key-value persistence for the UI: one JSON object on disk mapping
//! keys to arbitrary JSON values.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FireError;

#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl LocalStore {
    /// Missing or unreadable files open as an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("discarding corrupt store {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!("cannot read store {}: {err}", path.display());
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, FireError> {
        self.entries
            .get(key)
            .map(|value| serde_json::from_value(value.clone()).map_err(FireError::from))
            .transpose()
    }

    /// Absent keys and values that no longer decode both yield `T::default()`.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.load(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(err) => {
                warn!("ignoring stored `{key}`: {err}");
                T::default()
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), FireError> {
        self.entries
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn save(&self) -> Result<(), FireError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        debug!("saved {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LifestyleTier, PortfolioInputs};
    use tempfile::TempDir;

    #[test]
    fn values_survive_save_and_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let inputs = PortfolioInputs {
            years_to_retirement: 12,
            ..PortfolioInputs::default()
        };
        let mut store = LocalStore::open(&path);
        store.set("inputs", &inputs).expect("set inputs");
        store.set("tier", &LifestyleTier::Frugal).expect("set tier");
        store.save().expect("save");

        let reopened = LocalStore::open(&path);
        assert_eq!(reopened.load::<PortfolioInputs>("inputs").expect("load"), Some(inputs));
        assert_eq!(reopened.load_or_default::<LifestyleTier>("tier"), LifestyleTier::Frugal);
        assert_eq!(reopened.load::<PortfolioInputs>("missing").expect("load"), None);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").expect("write");

        let store = LocalStore::open(&path);
        assert!(!store.contains("inputs"));
        assert_eq!(
            store.load_or_default::<PortfolioInputs>("inputs"),
            PortfolioInputs::default()
        );
    }

    #[test]
    fn undecodable_value_falls_back_to_default() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = LocalStore::open(dir.path().join("store.json"));
        store.set("tier", &"luxurious").expect("set");

        assert!(store.load::<LifestyleTier>("tier").is_err());
        assert_eq!(store.load_or_default::<LifestyleTier>("tier"), LifestyleTier::Moderate);
        assert!(store.remove("tier"));
        assert!(!store.remove("tier"));
    }
}
