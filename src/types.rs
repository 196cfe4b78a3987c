//! Schema types for per-node-type dashboard layouts
//!
//! These are plain data. Validation lives in `layout::sanitize`, mutation in
//! `layout::grouping` and `store`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the two independent layout variants tracked per node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Fullscreen,
    Normal,
}

impl LayoutMode {
    pub const ALL: [LayoutMode; 2] = [LayoutMode::Fullscreen, LayoutMode::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Fullscreen => "fullscreen",
            LayoutMode::Normal => "normal",
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fullscreen" => Ok(LayoutMode::Fullscreen),
            "normal" => Ok(LayoutMode::Normal),
            other => Err(format!("unknown layout mode '{other}' (expected fullscreen or normal)")),
        }
    }
}

/// A block's position and size in grid units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridItem {
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_h: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_h: Option<u32>,
}

impl GridItem {
    pub fn new(id: impl Into<String>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            w,
            h,
            min_w: None,
            min_h: None,
            max_w: None,
            max_h: None,
        }
    }

    /// First row below this item
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }
}

/// Per-block constraint override, independent of position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSizeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_h: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_h: Option<u32>,
}

impl BlockSizeOverride {
    pub fn is_empty(&self) -> bool {
        self.min_w.is_none() && self.min_h.is_none() && self.max_w.is_none() && self.max_h.is_none()
    }
}

/// Virtual grouping of two or more blocks rendered as tabs over one footprint
///
/// `id` always equals `block_ids[0]`. Members stay in the grid layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: String,
    pub block_ids: Vec<String>,
    #[serde(default)]
    pub active_index: usize,
}

impl TabGroup {
    /// Build a group whose id is its first member; `None` for an empty member list
    pub fn from_members(block_ids: Vec<String>, active_index: usize) -> Option<Self> {
        let id = block_ids.first()?.clone();
        let active_index = active_index.min(block_ids.len() - 1);
        Some(Self {
            id,
            block_ids,
            active_index,
        })
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.block_ids.iter().any(|id| id == block_id)
    }

    pub fn position_of(&self, block_id: &str) -> Option<usize> {
        self.block_ids.iter().position(|id| id == block_id)
    }

    pub fn active_block_id(&self) -> Option<&str> {
        self.block_ids.get(self.active_index).map(String::as_str)
    }
}

/// One visual mode of one node type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeLayoutState {
    #[serde(default)]
    pub grid_layout: Vec<GridItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub size_overrides: BTreeMap<String, BlockSizeOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tab_groups: Vec<TabGroup>,
}

impl ModeLayoutState {
    pub fn contains_block(&self, block_id: &str) -> bool {
        self.grid_layout.iter().any(|item| item.id == block_id)
    }

    pub fn grid_item(&self, block_id: &str) -> Option<&GridItem> {
        self.grid_layout.iter().find(|item| item.id == block_id)
    }

    /// Group that has `block_id` as a member
    pub fn group_of(&self, block_id: &str) -> Option<&TabGroup> {
        self.tab_groups.iter().find(|group| group.contains(block_id))
    }

    pub fn group(&self, group_id: &str) -> Option<&TabGroup> {
        self.tab_groups.iter().find(|group| group.id == group_id)
    }

    pub(crate) fn group_index(&self, group_id: &str) -> Option<usize> {
        self.tab_groups.iter().position(|group| group.id == group_id)
    }
}

/// Full layout configuration of one node type
///
/// Keyed by node type, not instance: every instance of a tool shares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub node_type: String,
    #[serde(default)]
    pub fullscreen: ModeLayoutState,
    #[serde(default)]
    pub normal: ModeLayoutState,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub updated_at: u64,
}

impl NodeConfig {
    pub fn empty(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            fullscreen: ModeLayoutState::default(),
            normal: ModeLayoutState::default(),
            updated_at: 0,
        }
    }

    pub fn mode(&self, mode: LayoutMode) -> &ModeLayoutState {
        match mode {
            LayoutMode::Fullscreen => &self.fullscreen,
            LayoutMode::Normal => &self.normal,
        }
    }

    pub fn mode_mut(&mut self, mode: LayoutMode) -> &mut ModeLayoutState {
        match mode {
            LayoutMode::Fullscreen => &mut self.fullscreen,
            LayoutMode::Normal => &mut self.normal,
        }
    }

    /// Copy with empty size overrides removed, ready for serialization
    ///
    /// Empty `sizeOverrides`/`tabGroups` and unset limits are already skipped by serde.
    pub fn compacted(&self) -> NodeConfig {
        let mut config = self.clone();
        for mode in LayoutMode::ALL {
            config
                .mode_mut(mode)
                .size_overrides
                .retain(|_, limits| !limits.is_empty());
        }
        config
    }
}

/// Item of the render list a block-grid widget consumes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderItem<'a> {
    Block {
        #[serde(rename = "gridItem")]
        grid_item: &'a GridItem,
    },
    TabGroup {
        #[serde(rename = "gridItem")]
        grid_item: &'a GridItem,
        group: &'a TabGroup,
    },
}

impl<'a> RenderItem<'a> {
    /// Footprint used to render this item
    pub fn grid_item(&self) -> &'a GridItem {
        match self {
            RenderItem::Block { grid_item } | RenderItem::TabGroup { grid_item, .. } => grid_item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_item_serializes_camel_case_and_skips_unset_limits() {
        let mut item = GridItem::new("path", 0, 1, 4, 3);
        item.min_w = Some(2);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["minW"], 2);
        assert!(json.get("maxH").is_none());
    }

    #[test]
    fn test_tab_group_from_members_clamps_active_index() {
        let group = TabGroup::from_members(vec!["a".into(), "b".into()], 7).unwrap();
        assert_eq!(group.id, "a");
        assert_eq!(group.active_index, 1);
        assert!(TabGroup::from_members(Vec::new(), 0).is_none());
    }

    #[test]
    fn test_compacted_drops_empty_overrides() {
        let mut config = NodeConfig::empty("repacku");
        config
            .fullscreen
            .size_overrides
            .insert("path".into(), BlockSizeOverride::default());
        config.fullscreen.size_overrides.insert(
            "log".into(),
            BlockSizeOverride {
                min_h: Some(4),
                ..Default::default()
            },
        );

        let compact = config.compacted();
        assert_eq!(compact.fullscreen.size_overrides.len(), 1);
        let json = serde_json::to_value(&compact).unwrap();
        assert!(json["normal"].get("sizeOverrides").is_none());
        assert!(json["normal"].get("tabGroups").is_none());
    }

    #[test]
    fn test_render_item_tags() {
        let item = GridItem::new("a", 0, 0, 1, 1);
        let group = TabGroup::from_members(vec!["a".into(), "b".into()], 0).unwrap();
        let json = serde_json::to_value(RenderItem::TabGroup {
            grid_item: &item,
            group: &group,
        })
        .unwrap();
        assert_eq!(json["type"], "tab-group");
        assert_eq!(json["gridItem"]["id"], "a");
        let json = serde_json::to_value(RenderItem::Block { grid_item: &item }).unwrap();
        assert_eq!(json["type"], "block");
    }

    #[test]
    fn test_layout_mode_parse() {
        assert_eq!("Fullscreen".parse::<LayoutMode>(), Ok(LayoutMode::Fullscreen));
        assert!("compact".parse::<LayoutMode>().is_err());
    }
}
