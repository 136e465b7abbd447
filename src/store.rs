//! Store Module
//!
//! The file-per-key storage engine.
//!
//! ## Responsibilities
//! - Map keys to files in the data directory
//! - Batch read / write / delete
//! - ETag assignment and optimistic-concurrency checks
//! - Offload each operation to the worker pool
//!
//! ## Write protocol (per entry, lock held for the whole batch)
//! ```text
//! value.e_tag() ──None──────────────────────────────┐
//!      │                                            │
//!      ├──"*"───────────────────────────────────────┤
//!      │                                            ▼
//!      └──Some(t)── stored tag s? ──none / s == t──► encode with tag = counter++
//!                          │                        │
//!                       s != t                      ▼
//!                          ▼                  create / truncate file
//!                 Conflict (batch stops)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::codec::{Codec, CodecError, JsonCodec};
use crate::config::{Config, SyncPolicy};
use crate::error::{FileKvError, Result};
use crate::item::{is_wildcard, StoreItem};
use crate::key;
use crate::worker::{Pending, WorkerPool};

/// Storage contract consumed by the host
///
/// Each call returns at once; the work runs on a worker and its outcome is
/// delivered through the returned [`Pending`]. A cancelled token observed
/// before the work starts yields `Cancelled` without touching any file.
pub trait Storage {
    type Value;

    /// Read `keys`; missing keys are absent from the result
    fn read(
        &self,
        keys: Vec<String>,
        cancel: &CancellationToken,
    ) -> Pending<HashMap<String, Self::Value>>;

    /// Write every entry, checking ETags; stops at the first conflict
    fn write(&self, changes: BTreeMap<String, Self::Value>, cancel: &CancellationToken)
        -> Pending<()>;

    /// Delete `keys`; missing keys are skipped
    fn delete(&self, keys: Vec<String>, cancel: &CancellationToken) -> Pending<()>;
}

/// State guarded by the store lock together with the data directory
struct StoreState {
    /// Next ETag to hand out. Starts at 0 on every open.
    next_e_tag: u64,
}

struct StoreInner<C> {
    config: Config,
    codec: C,
    state: Mutex<StoreState>,
}

/// Key-value store keeping one file per key
///
/// ## Concurrency Model: one lock per store
///
/// Every operation runs its file-touching body under `state`'s mutex, so
/// batches never interleave: a reader never sees half of a write batch and
/// two writers never interleave their check-then-write steps. There is no
/// per-key locking and no protection against other processes writing the
/// same directory.
pub struct FileStore<C: Codec> {
    inner: Arc<StoreInner<C>>,
    pool: WorkerPool,
}

impl<C: Codec> FileStore<C> {
    /// Open or create a store with the given config and codec
    pub fn open(config: Config, codec: C) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir).map_err(|e| FileKvError::io(&config.data_dir, e))?;
        let pool = WorkerPool::new(config.worker_threads)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            workers = config.worker_threads,
            "Opened file store"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                codec,
                state: Mutex::new(StoreState { next_e_tag: 0 }),
            }),
            pool,
        })
    }

    // =========================================================================
    // Blocking API (runs on the calling thread)
    // =========================================================================

    /// Read `keys` on the calling thread
    pub fn read_blocking<I, K>(
        &self,
        keys: I,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, C::Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.inner.read_batch(&keys, cancel)
    }

    /// Write `changes` on the calling thread, in iteration order
    pub fn write_blocking<I, K>(&self, changes: I, cancel: &CancellationToken) -> Result<()>
    where
        I: IntoIterator<Item = (K, C::Value)>,
        K: Into<String>,
    {
        let changes: Vec<(String, C::Value)> =
            changes.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.inner.write_batch(changes, cancel)
    }

    /// Delete `keys` on the calling thread
    pub fn delete_blocking<I, K>(&self, keys: I, cancel: &CancellationToken) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.inner.delete_batch(&keys, cancel)
    }

    // =========================================================================
    // Accessors (for diagnostics and testing)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// File that holds `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        self.inner.path_for(key)
    }

    /// Value the next assigned ETag will have
    pub fn current_e_tag_counter(&self) -> u64 {
        self.inner.state.lock().next_e_tag
    }

    /// Names of all record files, sorted
    ///
    /// These are sanitized names, not the original keys.
    pub fn keys(&self) -> Result<Vec<String>> {
        let _state = self.inner.state.lock();
        let dir = self.data_dir();

        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| FileKvError::io(dir, e))? {
            let entry = entry.map_err(|e| FileKvError::io(dir, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| FileKvError::io(entry.path(), e))?
                .is_file();
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }
}

impl<T> FileStore<JsonCodec<T>>
where
    T: StoreItem + Serialize + DeserializeOwned + Send + 'static,
{
    /// Open a JSON store, honoring `config.pretty_json`
    pub fn open_json(config: Config) -> Result<Self> {
        let codec = if config.pretty_json {
            JsonCodec::pretty()
        } else {
            JsonCodec::new()
        };
        Self::open(config, codec)
    }

    /// Open a JSON store in `path` with default settings
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_json(Config::builder().data_dir(path).build())
    }
}

impl<C: Codec> Storage for FileStore<C> {
    type Value = C::Value;

    fn read(
        &self,
        keys: Vec<String>,
        cancel: &CancellationToken,
    ) -> Pending<HashMap<String, C::Value>> {
        let inner = Arc::clone(&self.inner);
        let cancel = cancel.clone();
        self.pool.submit(move || inner.read_batch(&keys, &cancel))
    }

    fn write(&self, changes: BTreeMap<String, C::Value>, cancel: &CancellationToken) -> Pending<()> {
        let inner = Arc::clone(&self.inner);
        let cancel = cancel.clone();
        self.pool
            .submit(move || inner.write_batch(changes.into_iter().collect(), &cancel))
    }

    fn delete(&self, keys: Vec<String>, cancel: &CancellationToken) -> Pending<()> {
        let inner = Arc::clone(&self.inner);
        let cancel = cancel.clone();
        self.pool.submit(move || inner.delete_batch(&keys, &cancel))
    }
}

// =============================================================================
// Critical sections
// =============================================================================

impl<C: Codec> StoreInner<C> {
    /// Take the store lock unless `cancel` fired first
    ///
    /// Checked again after acquiring: time spent waiting for the lock still
    /// counts as "not started".
    fn begin(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, StoreState>> {
        if cancel.is_cancelled() {
            return Err(FileKvError::Cancelled);
        }
        let state = self.state.lock();
        if cancel.is_cancelled() {
            tracing::debug!("Operation cancelled while waiting for the store lock");
            return Err(FileKvError::Cancelled);
        }
        Ok(state)
    }

    fn read_batch(
        &self,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, C::Value>> {
        let _state = self.begin(cancel)?;
        tracing::debug!(keys = keys.len(), "Reading batch");

        let mut found: HashMap<String, C::Value> = HashMap::with_capacity(keys.len());
        for key in keys {
            if found.contains_key(key) {
                continue;
            }
            let path = self.path_for(key)?;
            if let Some(bytes) = read_file(&path)? {
                let value = self
                    .codec
                    .decode(&bytes)
                    .map_err(|e| codec_error(&path, e))?;
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn write_batch(&self, changes: Vec<(String, C::Value)>, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.begin(cancel)?;
        tracing::debug!(entries = changes.len(), "Writing batch");

        for (key, value) in changes {
            let path = self.path_for(&key)?;

            if let Some(declared) = value.e_tag() {
                if !is_wildcard(declared) {
                    if let Some(stored) = self.stored_e_tag(&path)? {
                        if stored != declared {
                            tracing::warn!(
                                key = %key,
                                expected = declared,
                                actual = %stored,
                                "ETag conflict, aborting rest of batch"
                            );
                            return Err(FileKvError::conflict(key, declared, stored));
                        }
                    }
                }
            }

            let e_tag = state.next_e_tag.to_string();
            let bytes = self.codec.encode(&value, &e_tag).map_err(|e| match e {
                CodecError::Serialization(m) | CodecError::Corruption(m) => {
                    FileKvError::Serialization(format!("key '{}': {}", key, m))
                }
            })?;
            state.next_e_tag += 1;

            self.write_file(&path, &bytes)?;
            tracing::trace!(key = %key, e_tag = %e_tag, "Wrote record");
        }
        Ok(())
    }

    fn delete_batch(&self, keys: &[String], cancel: &CancellationToken) -> Result<()> {
        let _state = self.begin(cancel)?;
        tracing::debug!(keys = keys.len(), "Deleting batch");

        for key in keys {
            let path = self.path_for(key)?;
            match fs::remove_file(&path) {
                Ok(()) => tracing::trace!(key = %key, "Deleted record"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(FileKvError::io(&path, e)),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let file_name = key::sanitize(key);
        if !key::is_addressable(&file_name) {
            return Err(FileKvError::io(
                &self.config.data_dir,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("key '{}' does not name a file", key),
                ),
            ));
        }
        Ok(self.config.data_dir.join(file_name))
    }

    fn stored_e_tag(&self, path: &Path) -> Result<Option<String>> {
        match read_file(path)? {
            Some(bytes) => self
                .codec
                .stored_e_tag(&bytes)
                .map_err(|e| codec_error(path, e)),
            None => Ok(None),
        }
    }

    /// Create or truncate `path` and write `bytes`
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = File::create(path).map_err(|e| FileKvError::io(path, e))?;
        file.write_all(bytes).map_err(|e| FileKvError::io(path, e))?;
        if self.config.sync_policy == SyncPolicy::EveryWrite {
            file.sync_all().map_err(|e| FileKvError::io(path, e))?;
        }
        Ok(())
    }
}

/// Whole file contents, or `None` if it does not exist
fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FileKvError::io(path, e)),
    }
}

fn codec_error(path: &Path, err: CodecError) -> FileKvError {
    match err {
        CodecError::Serialization(message) => {
            FileKvError::Serialization(format!("{}: {}", path.display(), message))
        }
        CodecError::Corruption(message) => FileKvError::corruption(path, message),
    }
}
