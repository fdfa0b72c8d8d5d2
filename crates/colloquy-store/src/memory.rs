//! Key-value memory stores.
//!
//! | Store           | Backing            | Survives restart |
//! |-----------------|--------------------|------------------|
//! | `InMemoryStore` | `DashMap` RAM      | no               |
//! | `JsonFileStore` | JSON object on disk | yes (auto-dump) |
//!
//! Keys are non-empty strings, values are strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// A string key-value store shared by every conversation.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn contains(&self, key: &str) -> StoreResult<bool>;
}

fn check_key(key: &str) -> StoreResult<()> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  InMemoryStore
// ═══════════════════════════════════════════════════════════════════════

/// Process-local store.  Contents are lost on exit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<DashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        check_key(key)?;
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        check_key(key)?;
        debug!(key = %key, "memory.set");
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn contains(&self, key: &str) -> StoreResult<bool> {
        check_key(key)?;
        Ok(self.data.contains_key(key))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  JsonFileStore
// ═══════════════════════════════════════════════════════════════════════

/// Store backed by a JSON object file.
///
/// The whole map is written back after every `set`.  Writes go to a sibling
/// temporary file first and are renamed into place, on the blocking pool.
/// Dumps are serialized: each one snapshots the map only after the previous
/// rename finished, so the file never goes back to an older state.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Arc<Mutex<BTreeMap<String, String>>>,
    dump_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    /// Open the store at `path`.  A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        info!(path = %path.display(), keys = data.len(), "memory file opened");
        Ok(Self {
            path,
            data: Arc::new(Mutex::new(data)),
            dump_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dump(&self) -> StoreResult<()> {
        let _dumping = self.dump_lock.lock().await;
        let bytes = serde_json::to_vec_pretty(&*self.lock())?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes)).await??;
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(io)?;
    std::fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        check_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        check_key(key)?;
        self.lock().insert(key.to_string(), value.to_string());
        debug!(key = %key, path = %self.path.display(), "memory.set");
        self.dump().await
    }

    async fn contains(&self, key: &str) -> StoreResult<bool> {
        check_key(key)?;
        Ok(self.lock().contains_key(key))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
