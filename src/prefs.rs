//! UI preference persistence with JSON file backing
//!
//! The store is the local-storage analog for the console: small named
//! settings (tab selection, thresholds, auto-refresh flags) keyed by a
//! version-suffixed name such as `feature_drift_prefs_v2`. An incompatible
//! stored shape is retired by bumping the key suffix, never by migration
//! code: the old value simply fails to deserialize and the caller's default
//! wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Key-value preference store.
///
/// Storage failures never surface to callers: a missing or corrupt backing
/// file degrades to an empty in-memory store, and a failed write leaves the
/// in-memory map as the source of truth for the rest of the session.
pub struct PrefStore {
    path: Option<PathBuf>,
    values: Mutex<HashMap<String, Value>>,
}

impl PrefStore {
    /// Open the store backed by the given JSON file.
    ///
    /// A missing file is a normal first run. A file that exists but does not
    /// parse is ignored with a warning.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<HashMap<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring corrupt preference file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(HashMap::new()),
        }
    }

    /// Read a preference, falling back to `default` when the key is absent
    /// or the stored value does not deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        match values.get(key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or(default),
            None => default,
        }
    }

    /// Write a preference. Last write wins; persistence is best-effort.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                debug!("Preference '{}' not serializable: {}", key, e);
                return;
            }
        };

        let snapshot = {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            values.insert(key.to_string(), json);
            values.clone()
        };

        self.flush(&snapshot);
    }

    fn flush(&self, snapshot: &HashMap<String, Value>) {
        let Some(path) = &self.path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let text = match serde_json::to_string_pretty(snapshot) {
            Ok(text) => text,
            Err(e) => {
                debug!("Preference snapshot not serializable: {}", e);
                return;
            }
        };

        if let Err(e) = std::fs::write(path, text) {
            debug!("Preference write to {} failed: {}", path.display(), e);
        }
    }
}
