//! Structural validation and repair of untrusted layout records
//!
//! `sanitize` is total: any JSON value becomes a structurally sound
//! `NodeConfig`, dropping only the parts that are invalid. It is re-run on
//! every hydration, so running it twice must not change the result.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::constants::grid::MAX_COORDINATE;
use crate::constants::validation::{MIN_GROUP_MEMBERS, UNKNOWN_NODE_TYPE};
use crate::types::{BlockSizeOverride, GridItem, LayoutMode, ModeLayoutState, NodeConfig, TabGroup};

/// Turn any JSON value into a valid current-format `NodeConfig`
pub fn sanitize(raw: &Value) -> NodeConfig {
    let Some(obj) = raw.as_object() else {
        warn!(kind = json_kind(raw), "layout record is not a JSON object, using empty config");
        return NodeConfig::empty(UNKNOWN_NODE_TYPE);
    };

    let node_type = node_type_of(obj);
    let fullscreen = sanitize_mode(&node_type, LayoutMode::Fullscreen, obj.get("fullscreen"));
    let normal = sanitize_mode(&node_type, LayoutMode::Normal, obj.get("normal"));

    NodeConfig {
        node_type,
        fullscreen,
        normal,
        updated_at: timestamp(obj.get("updatedAt")),
    }
}

/// Node type of a raw record, or the placeholder for missing/blank/non-string values
pub(crate) fn node_type_of(obj: &Map<String, Value>) -> String {
    match obj.get("nodeType").and_then(Value::as_str).map(str::trim) {
        Some(node_type) if !node_type.is_empty() => node_type.to_string(),
        _ => {
            warn!(value = ?obj.get("nodeType"), "layout record has no usable nodeType");
            UNKNOWN_NODE_TYPE.to_string()
        }
    }
}

fn sanitize_mode(node_type: &str, mode: LayoutMode, raw: Option<&Value>) -> ModeLayoutState {
    let Some(obj) = raw.and_then(Value::as_object) else {
        if raw.is_some_and(|v| !v.is_null()) {
            warn!(node_type = %node_type, mode = %mode, "mode state is not an object, using empty state");
        }
        return ModeLayoutState::default();
    };

    let grid_layout = parse_grid_layout(node_type, mode, obj.get("gridLayout"));
    let size_overrides = parse_size_overrides(obj.get("sizeOverrides"));
    let candidates = parse_group_candidates(obj.get("tabGroups"), "blockIds");
    let tab_groups = normalize_groups(node_type, mode, &grid_layout, candidates);

    ModeLayoutState {
        grid_layout,
        size_overrides,
        tab_groups,
    }
}

/// Parse a grid layout array, dropping malformed items and duplicate ids (first wins)
pub(crate) fn parse_grid_layout(node_type: &str, mode: LayoutMode, raw: Option<&Value>) -> Vec<GridItem> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut layout = Vec::with_capacity(items.len());
    for raw_item in items {
        let Some(item) = parse_grid_item(raw_item) else {
            warn!(node_type = %node_type, mode = %mode, item = %raw_item, "dropping malformed grid item");
            continue;
        };
        if !seen.insert(item.id.clone()) {
            warn!(node_type = %node_type, mode = %mode, block = %item.id, "dropping duplicate grid item");
            continue;
        }
        layout.push(item);
    }
    layout
}

/// A grid item needs a non-empty string id; coordinates fall back to the origin, sizes to 1
pub(crate) fn parse_grid_item(raw: &Value) -> Option<GridItem> {
    let obj = raw.as_object()?;
    let id = obj.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())?;

    Some(GridItem {
        id: id.to_string(),
        x: grid_unit(obj.get("x")).unwrap_or(0),
        y: grid_unit(obj.get("y")).unwrap_or(0),
        w: grid_unit(obj.get("w")).filter(|w| *w > 0).unwrap_or(1),
        h: grid_unit(obj.get("h")).filter(|h| *h > 0).unwrap_or(1),
        min_w: grid_unit(obj.get("minW")),
        min_h: grid_unit(obj.get("minH")),
        max_w: grid_unit(obj.get("maxW")),
        max_h: grid_unit(obj.get("maxH")),
    })
}

/// Apply the bounds `parse_grid_item` enforces to an already-typed item
fn clamp_grid_item(item: &mut GridItem) -> bool {
    let mut changed = false;
    for value in [&mut item.x, &mut item.y] {
        if *value > MAX_COORDINATE {
            *value = MAX_COORDINATE;
            changed = true;
        }
    }
    for value in [&mut item.w, &mut item.h] {
        let clamped = if *value == 0 { 1 } else { (*value).min(MAX_COORDINATE) };
        if clamped != *value {
            *value = clamped;
            changed = true;
        }
    }
    for value in [&mut item.min_w, &mut item.min_h, &mut item.max_w, &mut item.max_h] {
        changed |= clamp_unit(value);
    }
    changed
}

fn clamp_unit(value: &mut Option<u32>) -> bool {
    match value {
        Some(n) if *n > MAX_COORDINATE => {
            *n = MAX_COORDINATE;
            true
        }
        _ => false,
    }
}

fn parse_size_overrides(raw: Option<&Value>) -> BTreeMap<String, BlockSizeOverride> {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    obj.iter()
        .filter_map(|(block_id, limits)| {
            let limits = limits.as_object()?;
            Some((
                block_id.clone(),
                BlockSizeOverride {
                    min_w: grid_unit(limits.get("minW")),
                    min_h: grid_unit(limits.get("minH")),
                    max_w: grid_unit(limits.get("maxW")),
                    max_h: grid_unit(limits.get("maxH")),
                },
            ))
        })
        .collect()
}

/// Group data before it is checked against a grid layout
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupCandidate {
    pub block_ids: Vec<String>,
    pub active_index: Option<usize>,
    pub active_id: Option<String>,
}

impl GroupCandidate {
    pub fn from_group(group: &TabGroup) -> Self {
        Self {
            block_ids: group.block_ids.clone(),
            active_index: Some(group.active_index),
            active_id: group.active_block_id().map(str::to_string),
        }
    }
}

/// Read group records, taking members from `members_key` (`blockIds` or a legacy key)
pub(crate) fn parse_group_candidates(raw: Option<&Value>, members_key: &str) -> Vec<GroupCandidate> {
    let Some(groups) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    groups
        .iter()
        .filter_map(|group| parse_group_candidate(group, members_key))
        .collect()
}

pub(crate) fn parse_group_candidate(raw: &Value, members_key: &str) -> Option<GroupCandidate> {
    let obj = raw.as_object()?;
    let block_ids = obj
        .get(members_key)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let active_index = obj.get("activeIndex").and_then(index_value);
    let active_id = ["activeId", "activeTab"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    Some(GroupCandidate {
        block_ids,
        active_index,
        active_id,
    })
}

/// Check group candidates against the grid and turn the survivors into `TabGroup`s
///
/// Members not in the grid, repeated within a group, or already claimed by an
/// earlier group are dropped. Groups left with fewer than two members are
/// removed. The active block is kept when it survives, otherwise the index is clamped.
pub(crate) fn normalize_groups(
    node_type: &str,
    mode: LayoutMode,
    grid_layout: &[GridItem],
    candidates: Vec<GroupCandidate>,
) -> Vec<TabGroup> {
    let known: HashSet<&str> = grid_layout.iter().map(|item| item.id.as_str()).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut groups = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let active_id = candidate.active_id.clone().or_else(|| {
            candidate
                .active_index
                .and_then(|index| candidate.block_ids.get(index).cloned())
        });

        let mut members: Vec<String> = Vec::with_capacity(candidate.block_ids.len());
        for block_id in candidate.block_ids {
            if !known.contains(block_id.as_str()) {
                debug!(node_type = %node_type, mode = %mode, block = %block_id, "dropping group member missing from grid");
            } else if claimed.contains(&block_id) || members.contains(&block_id) {
                debug!(node_type = %node_type, mode = %mode, block = %block_id, "dropping group member already grouped");
            } else {
                members.push(block_id);
            }
        }

        if members.len() < MIN_GROUP_MEMBERS {
            warn!(node_type = %node_type, mode = %mode, members = ?members, "dropping tab group with fewer than two valid blocks");
            continue;
        }

        let active_index = active_id
            .and_then(|id| members.iter().position(|member| *member == id))
            .unwrap_or_else(|| candidate.active_index.unwrap_or(0).min(members.len() - 1));

        claimed.extend(members.iter().cloned());
        if let Some(group) = TabGroup::from_members(members, active_index) {
            groups.push(group);
        }
    }
    groups
}

/// Restore invariants on an already-typed config; returns whether anything changed
pub fn repair(config: &mut NodeConfig) -> bool {
    let node_type = config.node_type.clone();
    let mut changed = false;
    for mode in LayoutMode::ALL {
        let state = config.mode_mut(mode);

        let mut seen = HashSet::new();
        let before = state.grid_layout.len();
        state
            .grid_layout
            .retain(|item| !item.id.is_empty() && seen.insert(item.id.clone()));
        changed |= state.grid_layout.len() != before;

        for item in &mut state.grid_layout {
            if clamp_grid_item(item) {
                debug!(node_type = %node_type, mode = %mode, block = %item.id, "clamped grid item");
                changed = true;
            }
        }
        for limits in state.size_overrides.values_mut() {
            for value in [&mut limits.min_w, &mut limits.min_h, &mut limits.max_w, &mut limits.max_h] {
                changed |= clamp_unit(value);
            }
        }

        let candidates = state.tab_groups.iter().map(GroupCandidate::from_group).collect();
        let groups = normalize_groups(&node_type, mode, &state.grid_layout, candidates);
        if groups != state.tab_groups {
            state.tab_groups = groups;
            changed = true;
        }
    }
    changed
}

/// Describe every broken structural invariant of one mode (empty when sound)
pub fn invariant_violations(state: &ModeLayoutState) -> Vec<String> {
    let mut violations = Vec::new();
    let mut ids = HashSet::new();
    for item in &state.grid_layout {
        if !ids.insert(item.id.as_str()) {
            violations.push(format!("duplicate grid item '{}'", item.id));
        }
    }

    let mut grouped = HashSet::new();
    for group in &state.tab_groups {
        if group.block_ids.len() < MIN_GROUP_MEMBERS {
            violations.push(format!("group '{}' has {} members", group.id, group.block_ids.len()));
        }
        if group.block_ids.first() != Some(&group.id) {
            violations.push(format!("group '{}' id is not its first member", group.id));
        }
        if group.active_index >= group.block_ids.len() {
            violations.push(format!("group '{}' active index {} out of range", group.id, group.active_index));
        }
        for block_id in &group.block_ids {
            if !ids.contains(block_id.as_str()) {
                violations.push(format!("group '{}' member '{}' missing from grid", group.id, block_id));
            }
            if !grouped.insert(block_id.as_str()) {
                violations.push(format!("block '{}' is in more than one group", block_id));
            }
        }
    }
    violations
}

/// Non-negative finite number, floored and capped to the grid bound
pub(crate) fn grid_unit(raw: Option<&Value>) -> Option<u32> {
    let n = raw?.as_f64()?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    Some(n.floor().min(MAX_COORDINATE as f64) as u32)
}

fn index_value(raw: &Value) -> Option<usize> {
    let n = raw.as_f64()?;
    if !n.is_finite() {
        return None;
    }
    Some(n.max(0.0).floor() as usize)
}

pub(crate) fn timestamp(raw: Option<&Value>) -> u64 {
    raw.and_then(Value::as_f64)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.floor().min(u64::MAX as f64) as u64)
        .unwrap_or(0)
}

pub(crate) fn json_kind(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
