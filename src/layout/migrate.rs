//! Normalization of historical layout record shapes into the current one
//!
//! Three generations have been written to disk:
//!
//! - **Restore-position**: groups carry `children` and an `originalPositions`
//!   map; grouped blocks are taken out of `gridLayout` and the group itself
//!   occupies a placeholder grid item.
//! - **Separate registry**: tab containers live in a `tabRegistry` next to the
//!   layout, carrying `createdAt`/`updatedAt` stamps.
//! - **Virtual** (current): groups never remove blocks from the grid.
//!
//! Each legacy shape has one pure conversion into the virtual shape; `migrate`
//! probes the record, runs the matching conversion and finishes with
//! `sanitize`. New generations are added as another variant and conversion.

use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::sanitize::{self, parse_grid_item, parse_grid_layout};
use crate::constants::grid::{COLUMNS, DEFAULT_BLOCK_H, DEFAULT_BLOCK_W, MAX_COORDINATE};
use crate::types::{GridItem, LayoutMode, NodeConfig};

/// Shape of a persisted record, detected structurally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    RestorePosition,
    SeparateRegistry,
    Virtual,
}

impl Generation {
    pub fn is_legacy(&self) -> bool {
        !matches!(self, Generation::Virtual)
    }
}

/// Detect which generation wrote `raw`
pub fn detect_generation(raw: &Value) -> Generation {
    let Some(obj) = raw.as_object() else {
        return Generation::Virtual;
    };
    if obj.contains_key("tabRegistry") {
        return Generation::SeparateRegistry;
    }

    let groups = LayoutMode::ALL.iter().flat_map(|mode| {
        obj.get(mode.as_str())
            .and_then(|state| state.get("tabGroups"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    });

    let mut generation = Generation::Virtual;
    for group in groups {
        if group.contains_key("children") || group.contains_key("originalPositions") {
            return Generation::RestorePosition;
        }
        if group.contains_key("createdAt") || group.contains_key("updatedAt") {
            generation = Generation::SeparateRegistry;
        }
    }
    generation
}

/// Migrate any record to a valid current-format config; never fails
pub fn migrate(raw: &Value) -> NodeConfig {
    migrate_detected(raw).0
}

/// Like `migrate`, also reporting which generation the record came from
pub fn migrate_detected(raw: &Value) -> (NodeConfig, Generation) {
    let generation = detect_generation(raw);
    let current = match generation {
        Generation::Virtual => return (sanitize::sanitize(raw), generation),
        Generation::RestorePosition => restore_position_to_virtual(raw),
        Generation::SeparateRegistry => separate_registry_to_virtual(raw),
    };
    let config = sanitize::sanitize(&current);
    info!(node_type = %config.node_type, generation = ?generation, "migrated legacy layout record");
    (config, generation)
}

/// Restore-position record: groups live inside each mode under `tabGroups`
fn restore_position_to_virtual(raw: &Value) -> Value {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let node_type = label(obj);

    let mut out = obj.clone();
    for mode in LayoutMode::ALL {
        let state = obj.get(mode.as_str());
        let legacy_groups = state
            .and_then(|s| s.get("tabGroups"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        out.insert(
            mode.as_str().to_string(),
            rebuild_mode(&node_type, mode, state, legacy_groups),
        );
    }
    Value::Object(out)
}

/// Separate-registry record: containers come from `tabRegistry.<mode>`
fn separate_registry_to_virtual(raw: &Value) -> Value {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let node_type = label(obj);
    let registry = obj.get("tabRegistry");

    let mut out = obj.clone();
    out.remove("tabRegistry");
    for mode in LayoutMode::ALL {
        let state = obj.get(mode.as_str());
        let mut legacy_groups: Vec<Value> = state
            .and_then(|s| s.get("tabGroups"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        legacy_groups.extend(registry_containers(registry, mode).iter().cloned());
        out.insert(
            mode.as_str().to_string(),
            rebuild_mode(&node_type, mode, state, &legacy_groups),
        );
    }

    if !obj.contains_key("updatedAt") {
        if let Some(stamp) = registry.and_then(|r| r.get("updatedAt")) {
            out.insert("updatedAt".to_string(), stamp.clone());
        }
    }
    Value::Object(out)
}

/// Registry entries are either a bare array per mode or `{ containers: [...] }`
fn registry_containers(registry: Option<&Value>, mode: LayoutMode) -> &[Value] {
    let entry = registry.and_then(|r| r.get(mode.as_str()));
    entry
        .and_then(Value::as_array)
        .or_else(|| entry.and_then(|e| e.get("containers")).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Legacy group after member extraction
struct LegacyGroup {
    id: Option<String>,
    members: Vec<String>,
    active: Option<Value>,
    active_id: Option<Value>,
    original_positions: Option<Value>,
}

fn parse_legacy_group(raw: &Value) -> Option<LegacyGroup> {
    let obj = raw.as_object()?;
    let members_raw = obj
        .get("blockIds")
        .or_else(|| obj.get("children"))
        .and_then(Value::as_array)?;

    let mut seen = HashSet::new();
    let members = members_raw
        .iter()
        .filter_map(Value::as_str)
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();

    Some(LegacyGroup {
        id: obj.get("id").and_then(Value::as_str).map(str::to_string),
        members,
        active: obj.get("activeIndex").cloned(),
        active_id: obj.get("activeId").or_else(|| obj.get("activeTab")).cloned(),
        original_positions: obj.get("originalPositions").cloned(),
    })
}

/// Hands out index-based cells below the existing content
struct DefaultPlacer {
    next: u32,
    base_y: Option<u32>,
}

impl DefaultPlacer {
    fn new() -> Self {
        Self { next: 0, base_y: None }
    }

    fn place(&mut self, id: &str, grid: &[GridItem]) -> GridItem {
        let base_y = *self
            .base_y
            .get_or_insert_with(|| grid.iter().map(GridItem::bottom).max().unwrap_or(0));
        let per_row = (COLUMNS / DEFAULT_BLOCK_W).max(1);
        let index = self.next;
        self.next += 1;
        GridItem::new(
            id,
            (index % per_row) * DEFAULT_BLOCK_W,
            base_y
                .saturating_add((index / per_row) * DEFAULT_BLOCK_H)
                .min(MAX_COORDINATE),
            DEFAULT_BLOCK_W,
            DEFAULT_BLOCK_H,
        )
    }
}

/// Rebuild one mode in the virtual shape from its legacy groups
///
/// Members missing from the grid are re-inserted when there is evidence they
/// are real blocks: an `originalPositions` entry, or a live placeholder item
/// for the group. Other missing members are left for `sanitize` to drop.
fn rebuild_mode(node_type: &str, mode: LayoutMode, state: Option<&Value>, legacy_groups: &[Value]) -> Value {
    let mut grid = parse_grid_layout(node_type, mode, state.and_then(|s| s.get("gridLayout")));
    let mut placer = DefaultPlacer::new();
    let mut groups = Vec::with_capacity(legacy_groups.len());

    for raw_group in legacy_groups {
        let Some(group) = parse_legacy_group(raw_group) else {
            warn!(node_type = %node_type, mode = %mode, group = %raw_group, "skipping malformed legacy tab group");
            continue;
        };

        // A group id that is not one of its members names the placeholder item
        let placeholder = group
            .id
            .as_deref()
            .filter(|id| !group.members.iter().any(|m| m == id))
            .and_then(|id| grid.iter().position(|item| item.id == id));
        let placeholder_item = placeholder.map(|index| grid.remove(index));

        let mut placeholder_slot = placeholder.zip(placeholder_item.clone());
        for member in &group.members {
            if grid.iter().any(|item| item.id == *member) {
                continue;
            }
            let recorded = original_position(group.original_positions.as_ref(), member);
            let has_entry = recorded.is_some();
            let item = if let Some(RecordedPosition::Valid(item)) = recorded {
                item
            } else if let Some((index, mut footprint)) = placeholder_slot.take() {
                // First re-inserted member takes over the placeholder's cell
                footprint.id = member.clone();
                debug!(node_type = %node_type, mode = %mode, block = %member, "re-inserting block at group placeholder");
                grid.insert(index.min(grid.len()), footprint);
                continue;
            } else if has_entry || placeholder_item.is_some() {
                placer.place(member, &grid)
            } else {
                warn!(node_type = %node_type, mode = %mode, block = %member, "group member has no grid item or recorded position, dropping");
                continue;
            };
            debug!(node_type = %node_type, mode = %mode, block = %member, x = item.x, y = item.y, "re-inserting grouped block");
            grid.push(item);
        }

        let mut current = Map::new();
        current.insert("blockIds".into(), json!(group.members));
        if let Some(active) = group.active {
            current.insert("activeIndex".into(), active);
        }
        if let Some(active_id) = group.active_id {
            current.insert("activeId".into(), active_id);
        }
        groups.push(Value::Object(current));
    }

    let size_overrides = state
        .and_then(|s| s.get("sizeOverrides"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    json!({
        "gridLayout": grid,
        "sizeOverrides": size_overrides,
        "tabGroups": groups,
    })
}

enum RecordedPosition {
    Valid(GridItem),
    Unusable,
}

/// Look up a member in a legacy `originalPositions` map (or array of items)
fn original_position(positions: Option<&Value>, block_id: &str) -> Option<RecordedPosition> {
    let entry = match positions? {
        Value::Object(map) => map.get(block_id)?.clone(),
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("id").and_then(Value::as_str) == Some(block_id))?
            .clone(),
        _ => return None,
    };

    let mut with_id = match entry {
        Value::Object(map) => map,
        _ => return Some(RecordedPosition::Unusable),
    };
    with_id.insert("id".into(), Value::String(block_id.to_string()));
    match parse_grid_item(&Value::Object(with_id)) {
        Some(item) => Some(RecordedPosition::Valid(item)),
        None => Some(RecordedPosition::Unusable),
    }
}

fn label(obj: &Map<String, Value>) -> String {
    obj.get("nodeType")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string()
}
