//! Keyed record storage for Stash.
//!
//! A record store maps a string key to a structured JSON payload. The
//! durable backend keeps every record as one file inside a single directory,
//! named `<prefix><key>.json`. No index or manifest is maintained: the
//! directory listing is the source of truth for [`RecordStore::list_keys`].
//!
//! # Storage Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`JsonFileStore`] -- one JSON file per record on the local filesystem
//! - [`InMemoryRecordStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Saving a key twice leaves only the latest payload retrievable.
//! 2. Several stores may share one directory if their prefixes do not
//!    overlap (neither prefix is a prefix of the other).
//! 3. Listing never fails because of foreign files in the directory; names
//!    that do not map back to a key under the store's prefix are skipped.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod naming;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::InMemoryRecordStore;
pub use naming::{validate_key, KeyNaming, RECORD_SUFFIX};
pub use traits::RecordStore;
