//! Async key-value contract for durable layout storage
//!
//! Layout records are handed out raw (`serde_json::Value`) because whatever
//! a backend holds may have been written by an older generation; the
//! coordinator migrates and validates every record it reads.

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

use crate::presets::{DefaultPresets, LayoutPreset, PresetUpdate};
use crate::types::NodeConfig;

pub use file::FileBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} '{id}' already exists")]
    Conflict { kind: &'static str, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}

impl BackendError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Out-of-space conditions, which downgrade local storage to memory-only
    pub fn is_storage_exhausted(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::StorageFull,
            _ => false,
        }
    }
}

/// Result of the one-shot local snapshot import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub layouts: usize,
}

/// Durable storage for layouts, presets and default presets
///
/// Implementations are shared between the caller and the flush worker, so
/// every returned future must be `Send`.
pub trait LayoutBackend: Send + Sync + 'static {
    /// Raw stored record for `node_type`
    fn get_layout(&self, node_type: &str) -> impl Future<Output = Result<Option<Value>, BackendError>> + Send;

    fn set_layout(&self, node_type: &str, config: &NodeConfig) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Write many records in one call; returns how many were written
    fn bulk_set_layouts(
        &self,
        layouts: &BTreeMap<String, NodeConfig>,
    ) -> impl Future<Output = Result<usize, BackendError>> + Send;

    fn list_layouts(&self) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    /// Remove a record; removing a missing record succeeds
    fn delete_layout(&self, node_type: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Import layouts recovered from a local snapshot at first boot
    fn migrate_from_local_snapshot(
        &self,
        layouts: &BTreeMap<String, NodeConfig>,
    ) -> impl Future<Output = Result<MigrationReport, BackendError>> + Send {
        async move {
            if layouts.is_empty() {
                return Ok(MigrationReport::default());
            }
            let layouts = self.bulk_set_layouts(layouts).await?;
            Ok(MigrationReport { layouts })
        }
    }

    /// Presets for one node type, or all presets when `node_type` is `None`
    fn list_presets(&self, node_type: Option<&str>) -> impl Future<Output = Result<Vec<LayoutPreset>, BackendError>> + Send;

    /// Fails with `Conflict` when the id is taken
    fn create_preset(&self, preset: &LayoutPreset) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn update_preset(
        &self,
        id: &str,
        update: PresetUpdate,
    ) -> impl Future<Output = Result<LayoutPreset, BackendError>> + Send;

    /// Returns whether a preset was removed
    fn delete_preset(&self, id: &str) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// Create every preset whose id is free; returns how many were created
    fn bulk_create_presets(&self, presets: &[LayoutPreset]) -> impl Future<Output = Result<usize, BackendError>> + Send {
        async move {
            let mut created = 0;
            for preset in presets {
                match self.create_preset(preset).await {
                    Ok(()) => created += 1,
                    Err(BackendError::Conflict { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(created)
        }
    }

    fn get_defaults(&self, node_type: &str) -> impl Future<Output = Result<Option<DefaultPresets>, BackendError>> + Send;

    fn set_defaults(&self, defaults: &DefaultPresets) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Serialize a config the way backends store it
pub(crate) fn record_value(config: &NodeConfig) -> Result<Value, BackendError> {
    Ok(serde_json::to_value(config.compacted())?)
}

/// Presets sorted for listing: oldest first, then by id
pub(crate) fn sort_presets(presets: &mut [LayoutPreset]) {
    presets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
