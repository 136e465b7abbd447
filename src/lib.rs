//! # filekv
//!
//! A key-value storage backend that keeps one file per key:
//! - Arbitrary keys mapped to filesystem-safe names
//! - ETag-based optimistic concurrency (`"*"` forces a write)
//! - Pluggable record codecs (type-tagged JSON, CRC-checked bincode)
//! - One lock per store; operations offloaded to a worker pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Host (session state manager)                 │
//! │           read / write / delete + CancellationToken         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Pending<T>
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Worker Pool                           │
//! │              (crossbeam channel, N threads)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        FileStore                            │
//! │       (single Mutex: ETag counter + directory access)       │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!     ┌─────────────┐                    ┌─────────────┐
//!     │    Codec    │                    │  data_dir/  │
//!     │ (JSON/bin)  │                    │ one file/key│
//!     └─────────────┘                    └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use filekv::{CancellationToken, Document, FileStore, JsonCodec, Storage};
//!
//! let store: FileStore<JsonCodec<Document>> = FileStore::open_path("./state")?;
//! let cancel = CancellationToken::new();
//!
//! let mut changes = BTreeMap::new();
//! changes.insert("user/1".to_string(), Document::new().with("turns", 3));
//! store.write(changes, &cancel).wait()?;
//!
//! let found = store.read(vec!["user/1".to_string()], &cancel).wait()?;
//! assert_eq!(found["user/1"].e_tag.as_deref(), Some("0"));
//! # Ok::<(), filekv::FileKvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod item;
pub mod codec;
pub mod cancel;
pub mod worker;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FileKvError, Result};
pub use config::{Config, SyncPolicy};
pub use cancel::CancellationToken;
pub use codec::{BincodeCodec, Codec, CodecError, JsonCodec};
pub use item::{Document, StoreItem, ETAG_FIELD, WILDCARD_ETAG};
pub use store::{FileStore, Storage};
pub use worker::Pending;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of filekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
