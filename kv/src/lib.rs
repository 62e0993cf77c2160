//! C2/C3: a filesystem-backed encrypted key-value store, and a counter-map
//! specialization over it (§4.2, §4.3's "add_count" bookkeeping).
//!
//! Grounded on `ProtoSecretKeyStore` (teacher's `secret_key_store/proto_store.rs`):
//! an in-memory `HashMap` guarded by a `parking_lot::RwLock`, checked against
//! the engine's directory-permission policy on open, and persisted with
//! `bincode` on every mutation via an atomic write-to-temp-then-rename
//! (the same durability shape as the teacher's
//! `ic_utils::fs::write_protobuf_using_tmp_file`, minus the protobuf).
//!
//! Keys and values here are already ciphertext/opaque bytes from the SSE
//! schemes' point of view — this crate has no notion of keywords or tokens.

use ic_sse_config::check_dir_has_required_permissions;
use ic_sse_errors::{EngineError, EngineResult};
use ic_sse_logger::{info, warn, EngineLogger};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A map persisted to a single file under an owner-only directory.
pub struct EncryptedStore<V> {
    file: PathBuf,
    data: RwLock<HashMap<Vec<u8>, V>>,
    dirty: Arc<AtomicBool>,
    logger: EngineLogger,
}

impl<V> EncryptedStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Opens (or creates) the store at `dir/file_name`. `dir` must already
    /// exist with mode `0700` (§4.8) — callers create it via
    /// `ic_sse_config::create_state_dir` during setup.
    pub fn open(dir: &Path, file_name: &str, logger: EngineLogger) -> EngineResult<Self> {
        check_dir_has_required_permissions(dir);
        let file = dir.join(file_name);
        let data = Self::read_from_disk(&file)?.unwrap_or_default();
        Ok(EncryptedStore {
            file,
            data: RwLock::new(data),
            dirty: Arc::new(AtomicBool::new(false)),
            logger,
        })
    }

    fn read_from_disk(file: &Path) -> EngineResult<Option<HashMap<Vec<u8>, V>>> {
        match fs::read(file) {
            Ok(bytes) => {
                let map = bincode::deserialize(&bytes).map_err(|e| {
                    EngineError::corrupt_state(file, format!("bincode decode failed: {}", e))
                })?;
                Ok(Some(map))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(EngineError::StorageUnavailable(err.to_string())),
        }
    }

    fn write_to_disk(file: &Path, map: &HashMap<Vec<u8>, V>) -> EngineResult<()> {
        let encoded = bincode::serialize(map)
            .map_err(|e| EngineError::corrupt_state(file, format!("bincode encode failed: {}", e)))?;
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let tmp = dir.join(format!(
            ".{}.tmp",
            file.file_name().and_then(|n| n.to_str()).unwrap_or("kv")
        ));
        fs::write(&tmp, &encoded).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        fs::rename(&tmp, file).map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    fn persist_now(&self, map: &HashMap<Vec<u8>, V>) -> EngineResult<()> {
        let result = Self::write_to_disk(&self.file, map);
        if result.is_ok() {
            self.dirty.store(false, Ordering::Release);
        }
        result
    }

    /// §4.2 `flush(blocking)`. `blocking = true` writes synchronously on the
    /// calling thread, same as every mutator already does. `blocking = false`
    /// marks the store dirty and hands the write off to a detached thread,
    /// returning immediately; the caller gets durability without waiting on
    /// disk I/O, at the cost of the write racing any mutation that follows it.
    pub fn flush(&self, blocking: bool) -> EngineResult<()> {
        if blocking {
            let guard = self.data.read();
            return self.persist_now(&guard);
        }
        self.dirty.store(true, Ordering::Release);
        let file = self.file.clone();
        let snapshot = self.data.read().clone();
        let dirty = Arc::clone(&self.dirty);
        let logger = self.logger.clone();
        std::thread::spawn(move || {
            if let Err(e) = Self::write_to_disk(&file, &snapshot) {
                warn!(logger, "background flush failed"; "store" => %file.display(), "error" => %e);
            } else {
                dirty.store(false, Ordering::Release);
            }
        });
        Ok(())
    }

    /// Whether a mutation or a non-blocking `flush` has happened since the
    /// last successful write to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    /// Inserts `key -> value`, overwriting any existing entry, and persists
    /// the updated map to disk before returning.
    pub fn insert(&self, key: Vec<u8>, value: V) -> EngineResult<()> {
        let mut guard = self.data.write();
        guard.insert(key, value);
        self.persist_now(&guard)
    }

    pub fn remove(&self, key: &[u8]) -> EngineResult<bool> {
        let mut guard = self.data.write();
        let removed = guard.remove(key).is_some();
        if removed {
            self.persist_now(&guard)?;
            info!(self.logger, "removed key from encrypted store"; "store" => %self.file.display());
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// §4.2 `approximate_size() -> u64`: an exact count under this store's
    /// single-`HashMap` backend, but kept distinct from `len` so callers track
    /// the named contract rather than an implementation detail (S6: bounded
    /// above by the number of `put`s issued against the store).
    pub fn approximate_size(&self) -> u64 {
        self.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Specializes [`EncryptedStore`] to `u64` counters with an atomic
/// read-then-increment, used for Diana/Janus's per-keyword `add_count`
/// (§4.5.1: search uses the *old* value, so `get_and_increment` returns it).
pub struct CounterMap {
    store: EncryptedStore<u64>,
}

impl CounterMap {
    pub fn open(dir: &Path, file_name: &str, logger: EngineLogger) -> EngineResult<Self> {
        Ok(CounterMap {
            store: EncryptedStore::open(dir, file_name, logger)?,
        })
    }

    pub fn get(&self, key: &[u8]) -> u64 {
        self.store.get(key).unwrap_or(0)
    }

    /// Atomically reads the current counter for `key` and bumps it by one,
    /// returning the value observed *before* the increment.
    pub fn get_and_increment(&self, key: &[u8]) -> EngineResult<u64> {
        let mut guard = self.store.data.write();
        let old = guard.get(key).copied().unwrap_or(0);
        guard.insert(key.to_vec(), old + 1);
        self.store.persist_now(&guard)?;
        Ok(old)
    }

    /// Increments every key in `keys` under a single lock over the counter
    /// store (§4.5 "Bulk update ... takes all counter increments under a
    /// single lock over C"), returning the pre-increment value for each key
    /// in the same order. Repeated keys are each bumped in turn.
    pub fn get_and_increment_batch(&self, keys: &[Vec<u8>]) -> EngineResult<Vec<u64>> {
        let mut guard = self.store.data.write();
        let mut old_values = Vec::with_capacity(keys.len());
        for key in keys {
            let old = guard.get(key.as_slice()).copied().unwrap_or(0);
            guard.insert(key.clone(), old + 1);
            old_values.push(old);
        }
        self.store.persist_now(&guard)?;
        Ok(old_values)
    }
}
