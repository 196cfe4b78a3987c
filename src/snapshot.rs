//! Local fallback snapshot of the layout table
//!
//! One JSON file maps node type to record, so a restart with an unreachable
//! backend still has every layout. Older installs also left a separate tab
//! registry file next to it; until the snapshot has been imported into the
//! backend, its entries are folded into the matching records as
//! `tabRegistry` so the migrator can convert them. The import retires the
//! registry file.
//!
//! When the snapshot outgrows its quota or the disk is full, it switches to
//! memory-only operation for the rest of the process.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::constants::snapshot::{LAYOUTS_FILE, MIGRATED_MARKER, RETIRED_TAB_REGISTRY_FILE, TAB_REGISTRY_FILE};
use crate::types::NodeConfig;

pub struct LocalSnapshot {
    dir: Option<PathBuf>,
    quota_bytes: u64,
    memory_only: AtomicBool,
    migrated: AtomicBool,
    memory: Mutex<BTreeMap<String, Value>>,
}

impl LocalSnapshot {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            dir: Some(dir.into()),
            quota_bytes,
            memory_only: AtomicBool::new(false),
            migrated: AtomicBool::new(false),
            memory: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot that never touches the filesystem
    pub fn memory_only() -> Self {
        Self {
            dir: None,
            quota_bytes: u64::MAX,
            memory_only: AtomicBool::new(true),
            migrated: AtomicBool::new(true),
            memory: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::SeqCst)
    }

    fn disk_dir(&self) -> Option<&Path> {
        if self.is_memory_only() {
            return None;
        }
        self.dir.as_deref()
    }

    fn memory(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw records keyed by node type
    ///
    /// The legacy tab registry is folded in only while the snapshot has not
    /// been imported; afterwards the records alone are authoritative.
    pub async fn read_records(&self) -> Result<BTreeMap<String, Value>, BackendError> {
        let Some(dir) = self.disk_dir() else {
            return Ok(self.memory().clone());
        };

        let mut records = match read_object(&dir.join(LAYOUTS_FILE)).await? {
            Some(map) => map.into_iter().collect::<BTreeMap<_, _>>(),
            None => BTreeMap::new(),
        };

        if !self.is_migrated().await
            && let Some(registry) = read_object(&dir.join(TAB_REGISTRY_FILE)).await?
        {
            fold_tab_registry(&mut records, registry);
        }
        debug!(dir = %dir.display(), records = records.len(), "read local snapshot");
        Ok(records)
    }

    /// Replace the snapshot with `table`
    ///
    /// Running out of space is not an error: the snapshot drops to
    /// memory-only and keeps the table in memory.
    pub async fn write(&self, table: &BTreeMap<String, NodeConfig>) -> Result<(), BackendError> {
        let mut records = BTreeMap::new();
        for (node_type, config) in table {
            records.insert(node_type.clone(), serde_json::to_value(config.compacted())?);
        }

        let Some(dir) = self.disk_dir() else {
            *self.memory() = records;
            return Ok(());
        };

        match self.write_to_disk(dir, &records).await {
            Ok(()) => {
                *self.memory() = records;
                Ok(())
            }
            Err(e) if e.is_storage_exhausted() => {
                warn!(dir = %dir.display(), error = %e, "local snapshot out of space, continuing memory-only");
                self.memory_only.store(true, Ordering::SeqCst);
                *self.memory() = records;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn write_to_disk(&self, dir: &Path, records: &BTreeMap<String, Value>) -> Result<(), BackendError> {
        let contents = serde_json::to_vec(records)?;
        let needed = contents.len() as u64;
        if needed > self.quota_bytes {
            return Err(BackendError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }

        fs::create_dir_all(dir).await.map_err(|e| BackendError::io(dir, e))?;
        let path = dir.join(LAYOUTS_FILE);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).await.map_err(|e| BackendError::io(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| BackendError::io(&path, e))
    }

    /// Whether the one-shot import into the backend already happened
    pub async fn is_migrated(&self) -> bool {
        if self.migrated.load(Ordering::SeqCst) {
            return true;
        }
        match self.disk_dir() {
            Some(dir) => fs::try_exists(dir.join(MIGRATED_MARKER)).await.unwrap_or(false),
            None => false,
        }
    }

    /// Record the import and retire the legacy tab registry
    pub async fn mark_migrated(&self) {
        self.migrated.store(true, Ordering::SeqCst);
        let Some(dir) = self.disk_dir() else {
            return;
        };

        let marker = dir.join(MIGRATED_MARKER);
        let result = match fs::create_dir_all(dir).await {
            Ok(()) => fs::write(&marker, b"").await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!(marker = %marker.display(), "local snapshot imported into backend"),
            Err(e) => warn!(marker = %marker.display(), error = %e, "failed to write snapshot migration marker"),
        }

        let registry = dir.join(TAB_REGISTRY_FILE);
        match fs::rename(&registry, dir.join(RETIRED_TAB_REGISTRY_FILE)).await {
            Ok(()) => info!(path = %registry.display(), "retired legacy tab registry"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %registry.display(), error = %e, "failed to retire legacy tab registry"),
        }
    }
}

/// Top-level JSON object of `path`; missing files read as `None`, unparseable ones are logged and ignored
async fn read_object(path: &Path) -> Result<Option<Map<String, Value>>, BackendError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(BackendError::io(path, e)),
    };
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => {
            warn!(path = %path.display(), kind = crate::layout::sanitize::json_kind(&other), "snapshot file is not a JSON object, ignoring");
            Ok(None)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot file is not valid JSON, ignoring");
            Ok(None)
        }
    }
}

/// Attach each registry entry to its node type's record as `tabRegistry`
fn fold_tab_registry(records: &mut BTreeMap<String, Value>, registry: Map<String, Value>) {
    for (node_type, entry) in registry {
        let Some(Value::Object(record)) = records.get_mut(&node_type) else {
            debug!(node_type = %node_type, "tab registry entry without layout record, dropping");
            continue;
        };
        if !record.contains_key("tabRegistry") {
            record.insert("tabRegistry".to_string(), entry);
        }
    }
}
