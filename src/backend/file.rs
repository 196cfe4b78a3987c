//! Directory-of-JSON-files backend
//!
//! Layout layout on disk:
//!
//! ```text
//! <root>/<node type>.json
//! <root>/presets/<preset id>.json
//! <root>/defaults/<node type>.json
//! ```
//!
//! Keys are percent-encoded into file stems so any node type is a valid
//! file name. Writes go through a temporary file and a rename.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{BackendError, LayoutBackend, record_value, sort_presets};
use crate::constants::backend::{DEFAULTS_DIR, PRESETS_DIR, RECORD_EXTENSION};
use crate::presets::{DefaultPresets, LayoutPreset, PresetUpdate};
use crate::types::NodeConfig;

#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn layout_path(&self, node_type: &str) -> PathBuf {
        record_path(&self.root, node_type)
    }

    fn preset_path(&self, id: &str) -> PathBuf {
        record_path(&self.root.join(PRESETS_DIR), id)
    }

    fn defaults_path(&self, node_type: &str) -> PathBuf {
        record_path(&self.root.join(DEFAULTS_DIR), node_type)
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), BackendError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io(parent, e))?;
        }
        let contents = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).await.map_err(|e| BackendError::io(&tmp, e))?;
        fs::rename(&tmp, path).await.map_err(|e| BackendError::io(path, e))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, BackendError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(path, e)),
        }
    }

    /// Decoded keys of every record file directly under `dir`
    async fn list_keys(&self, dir: &Path) -> Result<Vec<String>, BackendError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackendError::io(dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| BackendError::io(dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => warn!(path = %path.display(), "skipping record with undecodable file name"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, path: &Path) -> Result<bool, BackendError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackendError::io(path, e)),
        }
    }
}

impl LayoutBackend for FileBackend {
    async fn get_layout(&self, node_type: &str) -> Result<Option<Value>, BackendError> {
        self.read_json(&self.layout_path(node_type)).await
    }

    async fn set_layout(&self, node_type: &str, config: &NodeConfig) -> Result<(), BackendError> {
        let value = record_value(config)?;
        self.write_json(&self.layout_path(node_type), &value).await
    }

    async fn bulk_set_layouts(&self, layouts: &BTreeMap<String, NodeConfig>) -> Result<usize, BackendError> {
        for (node_type, config) in layouts {
            self.set_layout(node_type, config).await?;
        }
        debug!(root = %self.root.display(), layouts = layouts.len(), "wrote layout records");
        Ok(layouts.len())
    }

    async fn list_layouts(&self) -> Result<Vec<String>, BackendError> {
        self.list_keys(&self.root).await
    }

    async fn delete_layout(&self, node_type: &str) -> Result<(), BackendError> {
        self.remove(&self.layout_path(node_type)).await.map(|_| ())
    }

    async fn list_presets(&self, node_type: Option<&str>) -> Result<Vec<LayoutPreset>, BackendError> {
        let dir = self.root.join(PRESETS_DIR);
        let mut presets = Vec::new();
        for id in self.list_keys(&dir).await? {
            let path = self.preset_path(&id);
            match self.read_json::<LayoutPreset>(&path).await {
                Ok(Some(preset)) if node_type.is_none_or(|nt| preset.node_type == nt) => presets.push(preset),
                Ok(_) => {}
                Err(BackendError::Serialization(e)) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable preset");
                }
                Err(e) => return Err(e),
            }
        }
        sort_presets(&mut presets);
        Ok(presets)
    }

    async fn create_preset(&self, preset: &LayoutPreset) -> Result<(), BackendError> {
        let path = self.preset_path(&preset.id);
        if fs::try_exists(&path).await.map_err(|e| BackendError::io(&path, e))? {
            return Err(BackendError::Conflict {
                kind: "preset",
                id: preset.id.clone(),
            });
        }
        self.write_json(&path, preset).await
    }

    async fn update_preset(&self, id: &str, update: PresetUpdate) -> Result<LayoutPreset, BackendError> {
        let path = self.preset_path(id);
        let mut preset: LayoutPreset = self.read_json(&path).await?.ok_or_else(|| BackendError::NotFound {
            kind: "preset",
            id: id.to_string(),
        })?;
        if preset.apply_update(update) {
            self.write_json(&path, &preset).await?;
        }
        Ok(preset)
    }

    async fn delete_preset(&self, id: &str) -> Result<bool, BackendError> {
        self.remove(&self.preset_path(id)).await
    }

    async fn get_defaults(&self, node_type: &str) -> Result<Option<DefaultPresets>, BackendError> {
        self.read_json(&self.defaults_path(node_type)).await
    }

    async fn set_defaults(&self, defaults: &DefaultPresets) -> Result<(), BackendError> {
        self.write_json(&self.defaults_path(&defaults.node_type), defaults).await
    }
}

fn record_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", encode_key(key), RECORD_EXTENSION))
}

/// Percent-encode everything outside `[A-Za-z0-9_-]`
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridItem, LayoutMode};
    use tempfile::TempDir;

    #[test]
    fn test_key_encoding() {
        for key in ["repacku", "a/b", "ünïcode", "dots.and spaces", "%41"] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
        assert_eq!(encode_key("a/b"), "a%2Fb");
        assert!(decode_key("bad%4").is_none());
    }

    #[tokio::test]
    async fn test_layout_records_on_disk() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.list_layouts().await.unwrap().is_empty());

        let mut config = NodeConfig::empty("tools/repacku");
        config.normal.grid_layout.push(GridItem::new("path", 0, 0, 4, 3));
        backend.set_layout("tools/repacku", &config).await.unwrap();
        backend.set_defaults(&DefaultPresets {
            node_type: "tools/repacku".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(backend.list_layouts().await.unwrap(), vec!["tools/repacku"]);
        let raw = backend.get_layout("tools/repacku").await.unwrap().unwrap();
        assert_eq!(raw["normal"]["gridLayout"][0]["id"], "path");
        assert!(raw["fullscreen"].get("tabGroups").is_none());

        backend.delete_layout("tools/repacku").await.unwrap();
        backend.delete_layout("tools/repacku").await.unwrap();
        assert!(backend.get_layout("tools/repacku").await.unwrap().is_none());
        assert!(backend.get_defaults("tools/repacku").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_presets_on_disk() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());
        let config = NodeConfig::empty("repacku");
        let preset = LayoutPreset::capture("wide", "Wide", &config, LayoutMode::Fullscreen, 5);

        backend.create_preset(&preset).await.unwrap();
        assert!(matches!(
            backend.create_preset(&preset).await,
            Err(BackendError::Conflict { .. })
        ));
        assert!(backend.list_layouts().await.unwrap().is_empty());

        let updated = backend
            .update_preset("wide", PresetUpdate {
                name: Some("Wider".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "Wider");
        assert_eq!(backend.list_presets(Some("repacku")).await.unwrap(), vec![updated]);
        assert!(backend.list_presets(Some("trename")).await.unwrap().is_empty());
        assert!(backend.delete_preset("wide").await.unwrap());
        assert!(!backend.delete_preset("wide").await.unwrap());
    }
}
