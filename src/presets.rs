//! Saved layouts that can be applied to a node type, and per-mode defaults

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{GridItem, LayoutMode, ModeLayoutState, NodeConfig, TabGroup};

/// Named snapshot of one mode's grid layout (and optionally its groups)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPreset {
    pub id: String,
    pub name: String,
    pub node_type: String,
    #[serde(default)]
    pub layout: Vec<GridItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_groups: Option<Vec<TabGroup>>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub is_builtin: bool,
}

impl LayoutPreset {
    /// Capture `mode` of `config` as a user preset
    pub fn capture(id: impl Into<String>, name: impl Into<String>, config: &NodeConfig, mode: LayoutMode, now_ms: u64) -> Self {
        let state = config.mode(mode);
        Self {
            id: id.into(),
            name: name.into(),
            node_type: config.node_type.clone(),
            layout: state.grid_layout.clone(),
            tab_groups: (!state.tab_groups.is_empty()).then(|| state.tab_groups.clone()),
            created_at: now_ms,
            is_builtin: false,
        }
    }

    pub fn to_mode_state(&self) -> ModeLayoutState {
        ModeLayoutState {
            grid_layout: self.layout.clone(),
            size_overrides: Default::default(),
            tab_groups: self.tab_groups.clone().unwrap_or_default(),
        }
    }

    /// Apply a partial update; returns whether any field was given
    pub fn apply_update(&mut self, update: PresetUpdate) -> bool {
        let mut changed = false;
        if let Some(name) = update.name {
            self.name = name;
            changed = true;
        }
        if let Some(layout) = update.layout {
            self.layout = layout;
            changed = true;
        }
        if let Some(tab_groups) = update.tab_groups {
            self.tab_groups = Some(tab_groups);
            changed = true;
        }
        changed
    }
}

/// Fields of a preset that may be changed after creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub layout: Option<Vec<GridItem>>,
    #[serde(default)]
    pub tab_groups: Option<Vec<TabGroup>>,
}

/// Preset applied to each mode of a node type the first time it is seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPresets {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullscreen_preset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_preset_id: Option<String>,
}

impl DefaultPresets {
    pub fn preset_id(&self, mode: LayoutMode) -> Option<&str> {
        match mode {
            LayoutMode::Fullscreen => self.fullscreen_preset_id.as_deref(),
            LayoutMode::Normal => self.normal_preset_id.as_deref(),
        }
    }

    pub fn set_preset_id(&mut self, mode: LayoutMode, preset_id: Option<String>) {
        match mode {
            LayoutMode::Fullscreen => self.fullscreen_preset_id = preset_id,
            LayoutMode::Normal => self.normal_preset_id = preset_id,
        }
    }
}

/// Initial config for a node type seen for the first time
///
/// Modes whose default preset is unset, missing from `presets`, or meant
/// for another node type start empty.
pub fn seed_config(node_type: &str, defaults: Option<&DefaultPresets>, presets: &[LayoutPreset]) -> NodeConfig {
    let mut config = NodeConfig::empty(node_type);
    let Some(defaults) = defaults else {
        return config;
    };

    for mode in LayoutMode::ALL {
        let Some(preset_id) = defaults.preset_id(mode) else {
            continue;
        };
        match presets.iter().find(|p| p.id == preset_id && p.node_type == node_type) {
            Some(preset) => {
                debug!(node_type = %node_type, mode = %mode, preset = %preset_id, "seeding mode from default preset");
                *config.mode_mut(mode) = preset.to_mode_state();
            }
            None => {
                warn!(node_type = %node_type, mode = %mode, preset = %preset_id, "default preset not found, starting empty");
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(id: &str, node_type: &str) -> LayoutPreset {
        LayoutPreset {
            id: id.into(),
            name: id.to_uppercase(),
            node_type: node_type.into(),
            layout: vec![GridItem::new("path", 0, 0, 6, 4), GridItem::new("log", 6, 0, 6, 4)],
            tab_groups: None,
            created_at: 1,
            is_builtin: true,
        }
    }

    #[test]
    fn test_seed_config_uses_matching_defaults() {
        let presets = vec![preset("compact", "repacku"), preset("foreign", "trename")];
        let defaults = DefaultPresets {
            node_type: "repacku".into(),
            fullscreen_preset_id: Some("compact".into()),
            normal_preset_id: Some("foreign".into()),
        };

        let config = seed_config("repacku", Some(&defaults), &presets);
        assert_eq!(config.fullscreen.grid_layout.len(), 2);
        assert!(config.normal.grid_layout.is_empty());
        assert!(seed_config("repacku", None, &presets).fullscreen.grid_layout.is_empty());
    }

    #[test]
    fn test_capture_skips_empty_groups() {
        let mut config = NodeConfig::empty("repacku");
        config.normal.grid_layout = vec![GridItem::new("a", 0, 0, 1, 1)];
        let captured = LayoutPreset::capture("mine", "Mine", &config, LayoutMode::Normal, 42);
        assert_eq!(captured.layout.len(), 1);
        assert!(captured.tab_groups.is_none());
        assert!(!captured.is_builtin);

        let json = serde_json::to_value(&captured).unwrap();
        assert_eq!(json["nodeType"], "repacku");
        assert!(json.get("tabGroups").is_none());
    }

    #[test]
    fn test_apply_update() {
        let mut p = preset("compact", "repacku");
        assert!(!p.apply_update(PresetUpdate::default()));
        assert!(p.apply_update(PresetUpdate {
            name: Some("Renamed".into()),
            ..Default::default()
        }));
        assert_eq!(p.name, "Renamed");
        assert_eq!(p.layout.len(), 2);
    }

    #[test]
    fn test_set_preset_id_touches_one_mode() {
        let mut defaults = DefaultPresets {
            node_type: "repacku".into(),
            fullscreen_preset_id: Some("compact".into()),
            normal_preset_id: None,
        };
        defaults.set_preset_id(LayoutMode::Normal, Some("wide".into()));
        assert_eq!(defaults.preset_id(LayoutMode::Fullscreen), Some("compact"));
        assert_eq!(defaults.preset_id(LayoutMode::Normal), Some("wide"));

        defaults.set_preset_id(LayoutMode::Fullscreen, None);
        assert_eq!(defaults.preset_id(LayoutMode::Fullscreen), None);
    }
}
