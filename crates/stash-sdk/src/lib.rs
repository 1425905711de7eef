//! High-level SDK for Stash.
//!
//! [`Persister`] is the entry point: it saves any `Serialize` value under a
//! string key, reads it back as any `DeserializeOwned` type, and lists the
//! keys of its namespace. A persister opened with `deferred: true` hands
//! writes to a shared [`WriteQueue`] and drains that queue before every read.
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use stash_sdk::{DrainController, Persister, QueueConfig, StoreConfig};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Obj {
//!     string_val: String,
//! }
//!
//! # fn main() -> stash_sdk::SdkResult<()> {
//! let drain = DrainController::start(QueueConfig::default())?;
//! let config = StoreConfig::new("/var/lib/app")
//!     .with_prefix("obj_")
//!     .with_deferred(true);
//! let persister = Persister::open_with_queue(config, drain.queue())?;
//!
//! persister.save_item("first", &Obj { string_val: "a string".into() })?;
//! let back: Obj = persister.get_item("first")?;
//! assert_eq!(back.string_val, "a string");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod persister;

pub use error::{SdkError, SdkResult};
pub use persister::Persister;

// Re-export key types
pub use stash_queue::{DrainController, FailureObserver, QueueConfig, QueueError, WriteQueue};
pub use stash_store::{InMemoryRecordStore, JsonFileStore, RecordStore, StoreConfig, StoreError};
