use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::naming::{validate_key, KeyNaming};
use crate::traits::RecordStore;

/// Permissions for a newly created store directory (unix only).
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// File-per-record JSON store.
///
/// Each record lives at `<path>/<prefix><key>.json`. Writes go to a
/// temporary file in the same directory which is then renamed over the
/// target, so a concurrent reader sees either the old or the new record and
/// never a torn one. Temporary files are created with mode `0600` on unix
/// and carry no `.json` suffix, so they never show up in a listing.
///
/// Writes are flushed to the OS but not `fsync`ed.
pub struct JsonFileStore {
    dir: PathBuf,
    naming: KeyNaming,
}

impl JsonFileStore {
    /// Open a store, creating its directory if needed.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        create_dir(&config.path).map_err(|e| StoreError::Config {
            path: config.path.clone(),
            reason: e.to_string(),
        })?;
        if !config.path.is_dir() {
            return Err(StoreError::Config {
                path: config.path.clone(),
                reason: "not a directory".into(),
            });
        }

        info!(path = %config.path.display(), prefix = %config.prefix, "record store opened");

        Ok(Self {
            dir: config.path.clone(),
            naming: KeyNaming::new(config.prefix.clone()),
        })
    }

    /// Directory holding the records.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        self.naming.prefix()
    }

    fn record_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(self.naming.file_name(key)))
    }
}

#[cfg(unix)]
fn create_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

impl RecordStore for JsonFileStore {
    fn save(&self, key: &str, payload: &Value) -> StoreResult<()> {
        let path = self.record_path(key)?;
        let bytes =
            serde_json::to_vec(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(key, len = bytes.len(), "record saved");
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Value> {
        let path = self.record_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                trace!(name = ?entry.file_name(), "skipping non-UTF-8 entry");
                continue;
            };
            match self.naming.key_from_file_name(name) {
                Some(key) => {
                    keys.insert(key.to_string());
                }
                None => trace!(
                    name,
                    prefix = self.naming.prefix(),
                    "skipping entry outside namespace"
                ),
            }
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.dir)
            .field("prefix", &self.naming.prefix())
            .finish()
    }
}
