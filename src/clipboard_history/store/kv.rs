//! Flat key-value store backing the fallback path
//!
//! `JsonFileKv` keeps a JSON object of base64 values on disk. Every write
//! rewrites the file through a temp file + rename.

use base64::Engine;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::StoreError;

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Missing or unreadable flags read as false.
    fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(value)) if value == b"true")
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError> {
        self.set(key, if value { b"true" } else { b"false" })
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        let bytes = self.get(key).ok().flatten()?;
        std::str::from_utf8(&bytes).ok()?.trim().parse().ok()
    }

    fn set_i64(&mut self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set(key, value.to_string().as_bytes())
    }
}

#[derive(Debug)]
pub struct JsonFileKv {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileKv {
    /// Open the file, starting empty if it does not exist.
    ///
    /// A file that is not a JSON object is logged and replaced on the next write.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let values = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(values) => values,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Fallback store is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Fallback store not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec(&self.values).map_err(StoreError::Encode)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("value for '{}': {}", key, e))),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        let previous = self.values.insert(key.to_string(), encoded);
        if let Err(e) = self.flush() {
            // keep memory consistent with disk
            match previous {
                Some(previous) => self.values.insert(key.to_string(), previous),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(previous) = self.values.remove(key) {
            if let Err(e) = self.flush() {
                self.values.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}
