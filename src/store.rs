//! In-memory layout table keyed by node type
//!
//! Every mutation goes through [`LayoutStore::set`], which repairs
//! invariants, stamps `updated_at`, notifies subscribers synchronously and
//! fires the change hook the persistence coordinator listens on. The public
//! API never returns errors: readers fall back to empty values, mutators
//! return `bool`/`Option` and log why they refused.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::layout::grouping::{self, GroupingError, MemberRemoval};
use crate::layout::{migrate, sanitize};
use crate::presets::LayoutPreset;
use crate::types::{
    BlockSizeOverride, GridItem, LayoutMode, ModeLayoutState, NodeConfig, RenderItem, TabGroup,
};

/// Store shared between callers and the persistence worker
pub type SharedStore = Arc<Mutex<LayoutStore>>;

/// Called with the node type and its new config (`None` once removed)
///
/// Runs while the store is borrowed, so it must not call back into the store.
pub type Subscriber = Box<dyn Fn(&str, Option<&NodeConfig>) + Send>;

/// Receives every committed change; must not block
pub type ChangeHook = Box<dyn Fn(StoreChange) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Updated(String),
    Removed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    node_type: String,
    callback: Subscriber,
}

#[derive(Default)]
pub struct LayoutStore {
    configs: BTreeMap<String, NodeConfig>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
    change_hook: Option<ChangeHook>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Install the hook that schedules persistence (replaces any previous one)
    pub fn set_change_hook(&mut self, hook: ChangeHook) {
        self.change_hook = Some(hook);
    }

    pub fn clear_change_hook(&mut self) {
        self.change_hook = None;
    }

    // ------------------------------------------------------------------
    // Core get/set
    // ------------------------------------------------------------------

    pub fn get(&self, node_type: &str) -> Option<&NodeConfig> {
        self.configs.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.configs.contains_key(node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Copy of the whole table, used for coalesced writes
    pub fn snapshot(&self) -> BTreeMap<String, NodeConfig> {
        self.configs.clone()
    }

    /// Return the config for `node_type`, creating (and persisting) `defaults()` on first access
    pub fn get_or_create(&mut self, node_type: &str, defaults: impl FnOnce() -> NodeConfig) -> &NodeConfig {
        if !self.configs.contains_key(node_type) {
            info!(node_type = %node_type, "creating layout config on first access");
            let mut config = defaults();
            config.node_type = node_type.to_string();
            self.set(node_type, config);
        }
        &self.configs[node_type]
    }

    /// Commit a config: repair, stamp, notify, schedule persistence
    pub fn set(&mut self, node_type: &str, mut config: NodeConfig) {
        if sanitize::repair(&mut config) {
            debug!(node_type = %node_type, "repaired layout config on write");
        }
        config.updated_at = now_ms();
        self.configs.insert(node_type.to_string(), config);
        self.notify(node_type);
        self.emit(StoreChange::Updated(node_type.to_string()));
    }

    /// Insert a hydrated config without stamping or scheduling a write
    ///
    /// An entry created in this process before hydration finished is newer and wins.
    pub fn load(&mut self, node_type: &str, config: NodeConfig) -> bool {
        if self.configs.contains_key(node_type) {
            debug!(node_type = %node_type, "keeping in-memory config over hydrated record");
            return false;
        }
        self.configs.insert(node_type.to_string(), config);
        self.notify(node_type);
        true
    }

    /// Administrative reset of one node type
    pub fn remove(&mut self, node_type: &str) -> Option<NodeConfig> {
        let removed = self.configs.remove(node_type)?;
        info!(node_type = %node_type, "removed layout config");
        self.notify(node_type);
        self.emit(StoreChange::Removed(node_type.to_string()));
        Some(removed)
    }

    /// Drop a node type entirely; its record is deleted on the next flush
    pub fn reset(&mut self, node_type: &str) -> bool {
        self.remove(node_type).is_some()
    }

    /// Administrative clear of every node type; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let node_types: Vec<String> = self.configs.keys().cloned().collect();
        for node_type in &node_types {
            self.remove(node_type);
        }
        node_types.len()
    }

    pub fn subscribe(&mut self, node_type: &str, callback: Subscriber) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.push(Subscription {
            id,
            node_type: node_type.to_string(),
            callback,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    fn notify(&self, node_type: &str) {
        let config = self.configs.get(node_type);
        for subscription in self.subscriptions.iter().filter(|s| s.node_type == node_type) {
            (subscription.callback)(node_type, config);
        }
    }

    fn emit(&self, change: StoreChange) {
        if let Some(hook) = &self.change_hook {
            hook(change);
        }
    }

    // ------------------------------------------------------------------
    // Derived readers
    // ------------------------------------------------------------------

    pub fn mode(&self, node_type: &str, mode: LayoutMode) -> Option<&ModeLayoutState> {
        self.configs.get(node_type).map(|config| config.mode(mode))
    }

    pub fn grid_layout(&self, node_type: &str, mode: LayoutMode) -> &[GridItem] {
        self.mode(node_type, mode)
            .map(|state| state.grid_layout.as_slice())
            .unwrap_or(&[])
    }

    pub fn tab_groups(&self, node_type: &str, mode: LayoutMode) -> &[TabGroup] {
        self.mode(node_type, mode)
            .map(|state| state.tab_groups.as_slice())
            .unwrap_or(&[])
    }

    pub fn size_override(&self, node_type: &str, mode: LayoutMode, block_id: &str) -> Option<&BlockSizeOverride> {
        self.mode(node_type, mode)?.size_overrides.get(block_id)
    }

    pub fn group_for_block(&self, node_type: &str, mode: LayoutMode, block_id: &str) -> Option<&TabGroup> {
        self.mode(node_type, mode)?.group_of(block_id)
    }

    /// Render list for one mode (empty for an unknown node type)
    pub fn effective_items(&self, node_type: &str, mode: LayoutMode) -> Vec<RenderItem<'_>> {
        match self.mode(node_type, mode) {
            Some(state) => grouping::compute_effective_items(&state.grid_layout, &state.tab_groups),
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Apply `op` to a copy of one mode and commit it through `set` on success
    fn mutate_mode<R>(
        &mut self,
        node_type: &str,
        mode: LayoutMode,
        action: &str,
        op: impl FnOnce(&mut ModeLayoutState) -> Result<R, GroupingError>,
    ) -> Option<R> {
        let mut config = self
            .configs
            .get(node_type)
            .cloned()
            .unwrap_or_else(|| NodeConfig::empty(node_type));

        match op(config.mode_mut(mode)) {
            Ok(result) => {
                debug!(node_type = %node_type, mode = %mode, action = action, "layout mutation applied");
                self.set(node_type, config);
                Some(result)
            }
            Err(e) => {
                warn!(node_type = %node_type, mode = %mode, action = action, error = %e, "layout mutation rejected");
                None
            }
        }
    }

    /// Replace the grid layout reported by the grid widget
    ///
    /// Groups that lose members to the new layout are shrunk or dropped.
    pub fn update_grid_layout(&mut self, node_type: &str, mode: LayoutMode, layout: Vec<GridItem>) {
        let groups_before = self.tab_groups(node_type, mode).len();
        self.mutate_mode(node_type, mode, "update_grid_layout", |state| {
            state.grid_layout = layout;
            Ok(())
        });
        let groups_after = self.tab_groups(node_type, mode).len();
        if groups_after < groups_before {
            info!(node_type = %node_type, mode = %mode, dropped = groups_before - groups_after, "layout update dissolved tab groups");
        }
    }

    pub fn set_size_override(&mut self, node_type: &str, mode: LayoutMode, block_id: &str, limits: BlockSizeOverride) {
        self.mutate_mode(node_type, mode, "set_size_override", |state| {
            if limits.is_empty() {
                state.size_overrides.remove(block_id);
            } else {
                state.size_overrides.insert(block_id.to_string(), limits);
            }
            Ok(())
        });
    }

    pub fn clear_size_override(&mut self, node_type: &str, mode: LayoutMode, block_id: &str) -> bool {
        if self.size_override(node_type, mode, block_id).is_none() {
            return false;
        }
        self.mutate_mode(node_type, mode, "clear_size_override", |state| {
            state.size_overrides.remove(block_id);
            Ok(())
        })
        .is_some()
    }

    /// Group blocks as tabs; returns the new group id (`block_ids[0]`)
    pub fn create_group(&mut self, node_type: &str, mode: LayoutMode, block_ids: &[String]) -> Option<String> {
        self.mutate_mode(node_type, mode, "create_group", |state| {
            grouping::create_group(state, block_ids)
        })
    }

    pub fn dissolve_group(&mut self, node_type: &str, mode: LayoutMode, group_id: &str) -> bool {
        self.mutate_mode(node_type, mode, "dissolve_group", |state| {
            grouping::dissolve_group(state, group_id)
        })
        .is_some()
    }

    pub fn add_member(&mut self, node_type: &str, mode: LayoutMode, group_id: &str, block_id: &str) -> bool {
        self.mutate_mode(node_type, mode, "add_member", |state| {
            grouping::add_member(state, group_id, block_id)
        })
        .is_some()
    }

    pub fn remove_member(
        &mut self,
        node_type: &str,
        mode: LayoutMode,
        group_id: &str,
        block_id: &str,
    ) -> Option<MemberRemoval> {
        self.mutate_mode(node_type, mode, "remove_member", |state| {
            grouping::remove_member(state, group_id, block_id)
        })
    }

    /// Reorder tabs; returns the group's id after reordering
    pub fn reorder_members(
        &mut self,
        node_type: &str,
        mode: LayoutMode,
        group_id: &str,
        new_order: &[String],
    ) -> Option<String> {
        self.mutate_mode(node_type, mode, "reorder_members", |state| {
            grouping::reorder_members(state, group_id, new_order)
        })
    }

    pub fn set_active_tab(&mut self, node_type: &str, mode: LayoutMode, group_id: &str, index: usize) -> bool {
        self.mutate_mode(node_type, mode, "set_active_tab", |state| {
            grouping::set_active(state, group_id, index)
        })
        .is_some()
    }

    /// Reset one mode to an empty layout
    pub fn reset_mode(&mut self, node_type: &str, mode: LayoutMode) -> bool {
        if !self.contains(node_type) {
            return false;
        }
        self.mutate_mode(node_type, mode, "reset_mode", |state| {
            *state = ModeLayoutState::default();
            Ok(())
        })
        .is_some()
    }

    /// Replace one mode's layout and groups with a preset's
    pub fn apply_preset(&mut self, node_type: &str, mode: LayoutMode, preset: &LayoutPreset) -> bool {
        if preset.node_type != node_type {
            warn!(node_type = %node_type, preset = %preset.id, preset_node_type = %preset.node_type, "preset belongs to another node type");
            return false;
        }
        self.mutate_mode(node_type, mode, "apply_preset", |state| {
            state.grid_layout = preset.layout.clone();
            state.tab_groups = preset.tab_groups.clone().unwrap_or_default();
            Ok(())
        })
        .is_some()
    }

    /// Capture one mode as a preset; `None` when the node type is unknown
    pub fn capture_preset(&self, node_type: &str, mode: LayoutMode, id: &str, name: &str) -> Option<LayoutPreset> {
        let config = self.configs.get(node_type)?;
        Some(LayoutPreset::capture(id, name, config, mode, now_ms()))
    }

    // ------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------

    /// Pretty JSON of one node type's config, or `None` when unknown
    pub fn export_node_config(&self, node_type: &str) -> Option<String> {
        let config = self.configs.get(node_type)?;
        match serde_json::to_string_pretty(&config.compacted()) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(node_type = %node_type, error = %e, "failed to serialize layout config for export");
                None
            }
        }
    }

    /// Accept an exported config (any generation) under `node_type`
    ///
    /// Returns `false` for text that is not a JSON object. Anything else is
    /// migrated and validated, so partially broken exports still import.
    pub fn import_node_config(&mut self, node_type: &str, json: &str) -> bool {
        let raw: serde_json::Value = match serde_json::from_str(json) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(node_type = %node_type, error = %e, "import rejected: not valid JSON");
                return false;
            }
        };
        if !raw.is_object() {
            warn!(node_type = %node_type, kind = sanitize::json_kind(&raw), "import rejected: not a JSON object");
            return false;
        }

        let config = migrate::migrate(&raw);
        info!(node_type = %node_type, record_node_type = %config.node_type, "imported layout config");
        self.set(node_type, config);
        true
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn repacku_store() -> LayoutStore {
        let mut store = LayoutStore::new();
        store.update_grid_layout(
            "repacku",
            LayoutMode::Fullscreen,
            vec![
                GridItem::new("path", 0, 0, 6, 4),
                GridItem::new("operation", 6, 0, 6, 4),
                GridItem::new("log", 0, 4, 12, 3),
            ],
        );
        store
    }

    #[test]
    fn test_create_group_scenario() {
        let mut store = repacku_store();
        let before = store.grid_layout("repacku", LayoutMode::Fullscreen).to_vec();

        let id = store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["path", "operation"]));
        assert_eq!(id.as_deref(), Some("path"));
        assert_eq!(store.tab_groups("repacku", LayoutMode::Fullscreen), &[TabGroup {
            id: "path".into(),
            block_ids: ids(&["path", "operation"]),
            active_index: 0,
        }]);
        assert_eq!(store.grid_layout("repacku", LayoutMode::Fullscreen), before.as_slice());
        assert!(store.tab_groups("repacku", LayoutMode::Normal).is_empty());

        let group = store.group_for_block("repacku", LayoutMode::Fullscreen, "operation");
        assert_eq!(group.map(|g| g.id.as_str()), Some("path"));
        assert!(store.group_for_block("repacku", LayoutMode::Normal, "operation").is_none());
        assert!(store.group_for_block("missing", LayoutMode::Fullscreen, "path").is_none());
    }

    #[test]
    fn test_remove_member_scenario() {
        let mut store = repacku_store();
        let before = store.grid_layout("repacku", LayoutMode::Fullscreen).to_vec();
        store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["path", "operation"]));

        let outcome = store.remove_member("repacku", LayoutMode::Fullscreen, "path", "operation");
        assert_eq!(outcome, Some(MemberRemoval::Dissolved));
        assert!(store.tab_groups("repacku", LayoutMode::Fullscreen).is_empty());
        assert_eq!(store.grid_layout("repacku", LayoutMode::Fullscreen), before.as_slice());
    }

    #[test]
    fn test_import_with_wrong_node_type() {
        let mut store = LayoutStore::new();
        assert!(store.import_node_config("x", r#"{"nodeType":123}"#));
        let config = store.get("x").unwrap();
        assert_eq!(config.node_type, "unknown");
        for mode in LayoutMode::ALL {
            assert!(config.mode(mode).grid_layout.is_empty());
            assert!(config.mode(mode).tab_groups.is_empty());
        }
    }

    #[test]
    fn test_import_rejects_garbage_without_touching_store() {
        let mut store = repacku_store();
        let before = store.get("repacku").cloned();
        for text in ["", "{", "[1,2]", "null", "\"repacku\"", "{\"nodeType\": }"] {
            assert!(!store.import_node_config("repacku", text), "accepted {text:?}");
        }
        assert_eq!(store.get("repacku").cloned(), before);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut store = repacku_store();
        store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["operation", "log"]));
        let exported = store.export_node_config("repacku").unwrap();

        let mut other = LayoutStore::new();
        assert!(other.import_node_config("repacku", &exported));
        let (a, b) = (store.get("repacku").unwrap(), other.get("repacku").unwrap());
        assert_eq!(a.fullscreen, b.fullscreen);
        assert_eq!(a.normal, b.normal);
        assert!(store.export_node_config("missing").is_none());
    }

    #[test]
    fn test_update_grid_layout_prunes_groups() {
        let mut store = repacku_store();
        store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["path", "operation", "log"]));
        store.update_grid_layout(
            "repacku",
            LayoutMode::Fullscreen,
            vec![GridItem::new("path", 0, 0, 6, 4), GridItem::new("log", 0, 4, 12, 3)],
        );
        let groups = store.tab_groups("repacku", LayoutMode::Fullscreen);
        assert_eq!(groups[0].block_ids, ids(&["path", "log"]));

        store.update_grid_layout("repacku", LayoutMode::Fullscreen, vec![GridItem::new("log", 0, 0, 1, 1)]);
        assert!(store.tab_groups("repacku", LayoutMode::Fullscreen).is_empty());
    }

    #[test]
    fn test_stored_layout_matches_rehydrated_layout() {
        let mut store = LayoutStore::new();
        store.update_grid_layout(
            "repacku",
            LayoutMode::Normal,
            vec![GridItem::new("path", 20_000, 0, 0, 4)],
        );
        let item = &store.grid_layout("repacku", LayoutMode::Normal)[0];
        assert_eq!((item.x, item.w), (crate::constants::grid::MAX_COORDINATE, 1));

        let stored = store.get("repacku").unwrap().clone();
        let rehydrated = migrate::migrate(&serde_json::to_value(stored.compacted()).unwrap());
        assert_eq!(rehydrated, stored);
    }

    #[test]
    fn test_failed_mutation_does_not_notify() {
        let mut store = repacku_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        store.set_change_hook(Box::new(move |_: StoreChange| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["path", "ghost"])).is_none());
        assert!(!store.dissolve_group("repacku", LayoutMode::Fullscreen, "nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.create_group("repacku", LayoutMode::Fullscreen, &ids(&["path", "log"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut store = LayoutStore::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let id = store.subscribe(
            "repacku",
            Box::new(move |node_type: &str, config: Option<&NodeConfig>| {
                log.lock().unwrap().push((node_type.to_string(), config.is_some()));
            }),
        );

        store.update_grid_layout("repacku", LayoutMode::Normal, vec![GridItem::new("a", 0, 0, 1, 1)]);
        store.update_grid_layout("other", LayoutMode::Normal, vec![GridItem::new("a", 0, 0, 1, 1)]);
        store.remove("repacku");
        assert_eq!(*calls.lock().unwrap(), vec![("repacku".to_string(), true), ("repacku".to_string(), false)]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update_grid_layout("repacku", LayoutMode::Normal, Vec::new());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_set_stamps_and_repairs() {
        let mut store = LayoutStore::new();
        let mut config = NodeConfig::empty("x");
        config.normal.grid_layout = vec![GridItem::new("a", 0, 0, 1, 1), GridItem::new("a", 1, 0, 1, 1)];
        config.normal.tab_groups = vec![TabGroup {
            id: "wrong".into(),
            block_ids: ids(&["a", "ghost"]),
            active_index: 5,
        }];
        store.set("x", config);

        let stored = store.get("x").unwrap();
        assert!(stored.updated_at > 0);
        assert_eq!(stored.normal.grid_layout.len(), 1);
        assert!(stored.normal.tab_groups.is_empty());
    }

    #[test]
    fn test_get_or_create_and_load() {
        let mut store = LayoutStore::new();
        let created = store.get_or_create("trename", || NodeConfig::empty("ignored")).clone();
        assert_eq!(created.node_type, "trename");
        assert!(!store.load("trename", NodeConfig::empty("trename")));
        assert!(store.load("other", NodeConfig::empty("other")));
        assert_eq!(store.get("other").unwrap().updated_at, 0);
    }

    #[test]
    fn test_reset_and_clear_emit_removals() {
        let mut store = repacku_store();
        store.update_grid_layout("trename", LayoutMode::Normal, Vec::new());
        let changes = Arc::new(Mutex::new(Vec::new()));
        let log = changes.clone();
        store.set_change_hook(Box::new(move |change: StoreChange| log.lock().unwrap().push(change)));

        assert!(store.reset_mode("repacku", LayoutMode::Fullscreen));
        assert!(store.grid_layout("repacku", LayoutMode::Fullscreen).is_empty());
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(*changes.lock().unwrap(), vec![
            StoreChange::Updated("repacku".into()),
            StoreChange::Removed("repacku".into()),
            StoreChange::Removed("trename".into()),
        ]);
    }

    #[test]
    fn test_size_overrides() {
        let mut store = repacku_store();
        let limits = BlockSizeOverride {
            min_w: Some(2),
            ..Default::default()
        };
        store.set_size_override("repacku", LayoutMode::Fullscreen, "log", limits.clone());
        assert_eq!(store.size_override("repacku", LayoutMode::Fullscreen, "log"), Some(&limits));
        assert!(store.clear_size_override("repacku", LayoutMode::Fullscreen, "log"));
        assert!(!store.clear_size_override("repacku", LayoutMode::Fullscreen, "log"));
    }

    #[test]
    fn test_effective_items_for_unknown_node_type() {
        let store = LayoutStore::new();
        assert!(store.effective_items("missing", LayoutMode::Normal).is_empty());
    }
}
