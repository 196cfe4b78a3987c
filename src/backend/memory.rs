//! In-process backend
//!
//! Used for memory-only runs and by tests: it counts write calls and can be
//! switched offline to behave like an unreachable service.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BackendError, LayoutBackend, record_value, sort_presets};
use crate::presets::{DefaultPresets, LayoutPreset, PresetUpdate};
use crate::types::NodeConfig;

#[derive(Default)]
struct Tables {
    layouts: BTreeMap<String, Value>,
    presets: BTreeMap<String, LayoutPreset>,
    defaults: BTreeMap<String, DefaultPresets>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    offline: AtomicBool,
    write_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with raw records, e.g. legacy shapes
    pub fn with_records(records: impl IntoIterator<Item = (String, Value)>) -> Self {
        let backend = Self::new();
        backend.tables().layouts.extend(records);
        backend
    }

    /// Make every call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Layout write calls (`set_layout` and `bulk_set_layouts`) that reached the store
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self, node_type: &str) -> Option<Value> {
        self.tables().layouts.get(node_type).cloned()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("memory backend is offline".to_string()));
        }
        Ok(())
    }
}

impl LayoutBackend for MemoryBackend {
    async fn get_layout(&self, node_type: &str) -> Result<Option<Value>, BackendError> {
        self.check_online()?;
        Ok(self.record(node_type))
    }

    async fn set_layout(&self, node_type: &str, config: &NodeConfig) -> Result<(), BackendError> {
        self.check_online()?;
        let value = record_value(config)?;
        self.tables().layouts.insert(node_type.to_string(), value);
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn bulk_set_layouts(&self, layouts: &BTreeMap<String, NodeConfig>) -> Result<usize, BackendError> {
        self.check_online()?;
        let mut values = Vec::with_capacity(layouts.len());
        for (node_type, config) in layouts {
            values.push((node_type.clone(), record_value(config)?));
        }
        self.tables().layouts.extend(values);
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(layouts.len())
    }

    async fn list_layouts(&self) -> Result<Vec<String>, BackendError> {
        self.check_online()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables().layouts.keys().cloned().collect())
    }

    async fn delete_layout(&self, node_type: &str) -> Result<(), BackendError> {
        self.check_online()?;
        self.tables().layouts.remove(node_type);
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_presets(&self, node_type: Option<&str>) -> Result<Vec<LayoutPreset>, BackendError> {
        self.check_online()?;
        let mut presets: Vec<LayoutPreset> = self
            .tables()
            .presets
            .values()
            .filter(|p| node_type.is_none_or(|nt| p.node_type == nt))
            .cloned()
            .collect();
        sort_presets(&mut presets);
        Ok(presets)
    }

    async fn create_preset(&self, preset: &LayoutPreset) -> Result<(), BackendError> {
        self.check_online()?;
        let mut tables = self.tables();
        if tables.presets.contains_key(&preset.id) {
            return Err(BackendError::Conflict {
                kind: "preset",
                id: preset.id.clone(),
            });
        }
        tables.presets.insert(preset.id.clone(), preset.clone());
        Ok(())
    }

    async fn update_preset(&self, id: &str, update: PresetUpdate) -> Result<LayoutPreset, BackendError> {
        self.check_online()?;
        let mut tables = self.tables();
        let preset = tables.presets.get_mut(id).ok_or_else(|| BackendError::NotFound {
            kind: "preset",
            id: id.to_string(),
        })?;
        preset.apply_update(update);
        Ok(preset.clone())
    }

    async fn delete_preset(&self, id: &str) -> Result<bool, BackendError> {
        self.check_online()?;
        Ok(self.tables().presets.remove(id).is_some())
    }

    async fn get_defaults(&self, node_type: &str) -> Result<Option<DefaultPresets>, BackendError> {
        self.check_online()?;
        Ok(self.tables().defaults.get(node_type).cloned())
    }

    async fn set_defaults(&self, defaults: &DefaultPresets) -> Result<(), BackendError> {
        self.check_online()?;
        self.tables()
            .defaults
            .insert(defaults.node_type.clone(), defaults.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GridItem;

    fn preset(id: &str) -> LayoutPreset {
        LayoutPreset {
            id: id.into(),
            name: id.into(),
            node_type: "repacku".into(),
            layout: vec![GridItem::new("path", 0, 0, 4, 3)],
            tab_groups: None,
            created_at: 0,
            is_builtin: false,
        }
    }

    #[tokio::test]
    async fn test_bulk_write_counts_one_call() {
        let backend = MemoryBackend::new();
        let layouts = BTreeMap::from([
            ("a".to_string(), NodeConfig::empty("a")),
            ("b".to_string(), NodeConfig::empty("b")),
        ]);
        assert_eq!(backend.bulk_set_layouts(&layouts).await.unwrap(), 2);
        assert_eq!(backend.write_calls(), 1);
        assert_eq!(backend.list_layouts().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_offline_rejects_everything() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(backend.list_layouts().await, Err(BackendError::Unavailable(_))));
        assert!(backend.set_layout("a", &NodeConfig::empty("a")).await.is_err());
        assert_eq!(backend.write_calls(), 0);

        backend.set_offline(false);
        assert!(backend.set_layout("a", &NodeConfig::empty("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_preset_conflict_and_bulk_skip() {
        let backend = MemoryBackend::new();
        backend.create_preset(&preset("one")).await.unwrap();
        assert!(matches!(
            backend.create_preset(&preset("one")).await,
            Err(BackendError::Conflict { .. })
        ));

        let created = backend
            .bulk_create_presets(&[preset("one"), preset("two")])
            .await
            .unwrap();
        assert_eq!(created, 1);
        assert!(backend.delete_preset("two").await.unwrap());
        assert!(!backend.delete_preset("two").await.unwrap());
        assert!(matches!(
            backend.update_preset("two", PresetUpdate::default()).await,
            Err(BackendError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_migration_skips_empty_table() {
        let backend = MemoryBackend::new();
        let report = backend.migrate_from_local_snapshot(&BTreeMap::new()).await.unwrap();
        assert_eq!(report.layouts, 0);
        assert_eq!(backend.write_calls(), 0);
    }
}
