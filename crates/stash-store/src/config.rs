use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one file per record.
    pub path: PathBuf,
    /// Namespace prefix prepended to every key when naming files.
    ///
    /// Stores sharing a directory must use prefixes where neither is a
    /// prefix of the other. With overlapping prefixes (or an empty prefix
    /// next to a non-empty one) a listing may pick up records that belong
    /// to the other store. This is not detected.
    pub prefix: String,
    /// Route writes through a write queue instead of saving synchronously.
    pub deferred: bool,
}

impl StoreConfig {
    /// Synchronous, unprefixed store rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            prefix: String::new(),
            deferred: false,
        }
    }
}
