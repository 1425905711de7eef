//! Mapping between record keys and storage names.
//!
//! A record with key `k` in a store with prefix `p` is stored under the name
//! `p + k + ".json"`. Recovering the key strips exactly one suffix and one
//! prefix, so `key_from_file_name(file_name(k)) == Some(k)` for every valid
//! key, including keys that themselves contain the prefix or end in `.json`.
//!
//! Keys must be non-empty and must not contain path separators or NUL, so a
//! storage name always stays inside the store directory.

use crate::error::{StoreError, StoreResult};

/// Suffix appended to every storage name.
pub const RECORD_SUFFIX: &str = ".json";

/// Characters that are forbidden anywhere in a key.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Validate a record key, returning `Ok(())` if it can be stored.
///
/// ```
/// use stash_store::validate_key;
///
/// assert!(validate_key("user-42").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("../escape").is_err());
/// ```
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".into(),
        });
    }

    for ch in FORBIDDEN_CHARS {
        if key.contains(*ch) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("contains forbidden character: {ch:?}"),
            });
        }
    }

    Ok(())
}

/// Key <-> storage name rule for one namespace prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyNaming {
    prefix: String,
}

impl KeyNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage name for `key`. The key is not validated here.
    pub fn file_name(&self, key: &str) -> String {
        format!("{}{}{}", self.prefix, key, RECORD_SUFFIX)
    }

    /// Recover the key from a storage name.
    ///
    /// Returns `None` when the name lacks the suffix, does not start with
    /// this store's prefix, or would yield an empty key.
    pub fn key_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let key = name
            .strip_suffix(RECORD_SUFFIX)?
            .strip_prefix(self.prefix.as_str())?;
        if key.is_empty() {
            return None;
        }
        Some(key)
    }
}
