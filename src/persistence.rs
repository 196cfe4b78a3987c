//! Hydration and debounced persistence of the layout table
//!
//! The coordinator owns one background task. The store's change hook feeds
//! it over an unbounded channel; every change re-arms a single quiet-period
//! timer, and when the timer fires the whole table is written in one backend
//! call. Writes that fail leave the table marked dirty, so the next flush
//! re-sends everything. The local snapshot is rewritten on every flush.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::backend::LayoutBackend;
use crate::layout::migrate;
use crate::presets::{self, LayoutPreset};
use crate::snapshot::LocalSnapshot;
use crate::store::{LayoutStore, SharedStore, StoreChange};
use crate::types::{LayoutMode, NodeConfig};

/// Where the in-memory table was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    Backend,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationReport {
    pub source: HydrationSource,
    /// Records loaded into the store
    pub loaded: usize,
    /// Records that were in a legacy shape and have been converted
    pub upgraded: usize,
    /// Layouts imported from the local snapshot during this boot
    pub imported_from_snapshot: Option<usize>,
}

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No layout record needed writing
    Clean,
    Written { layouts: usize },
    /// The backend write failed; the table stays dirty
    Failed,
}

enum Command {
    Changed(StoreChange),
    MarkDirty,
    FlushNow(oneshot::Sender<FlushOutcome>),
    Shutdown(oneshot::Sender<FlushOutcome>),
}

pub struct PersistenceCoordinator<B: LayoutBackend> {
    store: SharedStore,
    backend: Arc<B>,
    snapshot: Arc<LocalSnapshot>,
    hydration: OnceCell<HydrationReport>,
    commands: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) fn lock_store(store: &SharedStore) -> MutexGuard<'_, LayoutStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: LayoutBackend> PersistenceCoordinator<B> {
    /// Wire `store` to `backend` and spawn the flush worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: SharedStore, backend: Arc<B>, snapshot: Arc<LocalSnapshot>, quiet: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();

        let hook_sender = commands.clone();
        lock_store(&store).set_change_hook(Box::new(move |change: StoreChange| {
            let _ = hook_sender.send(Command::Changed(change));
        }));

        let worker = FlushWorker {
            store: store.clone(),
            backend: backend.clone(),
            snapshot: snapshot.clone(),
            quiet,
            dirty: false,
            pending_deletes: BTreeSet::new(),
        };
        let handle = tokio::spawn(worker.run(receiver));
        info!(quiet_ms = quiet.as_millis() as u64, "layout persistence started");

        Self {
            store,
            backend,
            snapshot,
            hydration: OnceCell::new(),
            commands,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Run `f` with the store locked; do not await inside
    pub fn with_store<R>(&self, f: impl FnOnce(&mut LayoutStore) -> R) -> R {
        let mut store = lock_store(&self.store);
        f(&mut *store)
    }

    /// Load the table once; concurrent callers share the same hydration
    pub async fn ensure_hydrated(&self) -> &HydrationReport {
        self.hydration.get_or_init(|| self.hydrate()).await
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydration.initialized()
    }

    async fn hydrate(&self) -> HydrationReport {
        let imported_from_snapshot = self.import_local_snapshot().await;

        let (source, records) = match self.read_backend().await {
            Ok(records) => (HydrationSource::Backend, records),
            Err(e) => {
                warn!(error = %e, "layout backend unreachable, hydrating from local snapshot");
                let records = self.snapshot.read_records().await.unwrap_or_else(|e| {
                    warn!(error = %e, "local snapshot unreadable, starting empty");
                    BTreeMap::new()
                });
                (HydrationSource::Snapshot, records)
            }
        };

        let mut upgraded = 0;
        let configs: Vec<(String, NodeConfig)> = records
            .into_iter()
            .map(|(node_type, raw)| {
                let (config, generation) = migrate::migrate_detected(&raw);
                if generation.is_legacy() {
                    upgraded += 1;
                }
                (node_type, config)
            })
            .collect();

        let loaded = {
            let mut store = lock_store(&self.store);
            configs
                .into_iter()
                .filter(|(node_type, config)| store.load(node_type, config.clone()))
                .count()
        };
        if upgraded > 0 {
            let _ = self.commands.send(Command::MarkDirty);
        }

        let report = HydrationReport {
            source,
            loaded,
            upgraded,
            imported_from_snapshot,
        };
        info!(source = ?report.source, loaded = report.loaded, upgraded = report.upgraded, "layout store hydrated");
        report
    }

    /// Push a pre-existing local snapshot into the backend once; best effort
    async fn import_local_snapshot(&self) -> Option<usize> {
        if self.snapshot.is_migrated().await {
            return None;
        }
        let records = match self.snapshot.read_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "cannot read local snapshot for import");
                return None;
            }
        };

        let layouts: BTreeMap<String, NodeConfig> = records
            .iter()
            .map(|(node_type, raw)| (node_type.clone(), migrate::migrate(raw)))
            .collect();
        match self.backend.migrate_from_local_snapshot(&layouts).await {
            Ok(report) => {
                self.snapshot.mark_migrated().await;
                Some(report.layouts)
            }
            Err(e) => {
                warn!(error = %e, records = layouts.len(), "local snapshot import failed, will retry next start");
                None
            }
        }
    }

    async fn read_backend(&self) -> Result<BTreeMap<String, Value>, crate::backend::BackendError> {
        let mut records = BTreeMap::new();
        for node_type in self.backend.list_layouts().await? {
            match self.backend.get_layout(&node_type).await {
                Ok(Some(raw)) => {
                    records.insert(node_type, raw);
                }
                Ok(None) => debug!(node_type = %node_type, "listed layout disappeared before read"),
                Err(e) if matches!(e, crate::backend::BackendError::Unavailable(_)) => return Err(e),
                Err(e) => warn!(node_type = %node_type, error = %e, "skipping unreadable layout record"),
            }
        }
        Ok(records)
    }

    /// Config for `node_type`, creating it from its default presets on first access
    pub async fn get_or_create(&self, node_type: &str) -> NodeConfig {
        self.ensure_hydrated().await;
        if let Some(config) = lock_store(&self.store).get(node_type) {
            return config.clone();
        }

        let defaults = self.backend.get_defaults(node_type).await.unwrap_or_else(|e| {
            warn!(node_type = %node_type, error = %e, "cannot read default presets");
            None
        });
        let presets = match &defaults {
            Some(_) => self.list_presets(Some(node_type)).await,
            None => Vec::new(),
        };
        let seeded = presets::seed_config(node_type, defaults.as_ref(), &presets);

        lock_store(&self.store).get_or_create(node_type, || seeded).clone()
    }

    /// Presets from the backend; empty (and logged) when it is unreachable
    pub async fn list_presets(&self, node_type: Option<&str>) -> Vec<LayoutPreset> {
        self.backend.list_presets(node_type).await.unwrap_or_else(|e| {
            warn!(node_type = ?node_type, error = %e, "cannot list presets");
            Vec::new()
        })
    }

    /// Capture one mode of a node type and store it as a new preset
    pub async fn save_preset(&self, node_type: &str, mode: LayoutMode, id: &str, name: &str) -> anyhow::Result<LayoutPreset> {
        let preset = lock_store(&self.store)
            .capture_preset(node_type, mode, id, name)
            .ok_or_else(|| anyhow::anyhow!("no layout stored for node type '{node_type}'"))?;
        self.backend.create_preset(&preset).await?;
        info!(node_type = %node_type, mode = %mode, preset = %id, "saved layout preset");
        Ok(preset)
    }

    /// Apply a stored preset to one mode of its node type
    pub async fn apply_preset(&self, node_type: &str, mode: LayoutMode, preset_id: &str) -> bool {
        let presets = self.list_presets(Some(node_type)).await;
        let Some(preset) = presets.iter().find(|p| p.id == preset_id) else {
            warn!(node_type = %node_type, preset = %preset_id, "preset not found");
            return false;
        };
        lock_store(&self.store).apply_preset(node_type, mode, preset)
    }

    /// Cancel the pending timer and write now
    ///
    /// After `shutdown` the write happens inline on the caller's task.
    pub async fn flush_now(&self) -> FlushOutcome {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::FlushNow(ack)).is_err() {
            return self.flush_inline().await;
        }
        match done.await {
            Ok(outcome) => outcome,
            Err(_) => self.flush_inline().await,
        }
    }

    /// Flush pending changes and stop the worker
    pub async fn shutdown(&self) -> FlushOutcome {
        lock_store(&self.store).clear_change_hook();

        let (ack, done) = oneshot::channel();
        let outcome = if self.commands.send(Command::Shutdown(ack)).is_ok() {
            done.await.unwrap_or(FlushOutcome::Failed)
        } else {
            FlushOutcome::Clean
        };

        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "layout flush worker ended abnormally");
        }
        info!(outcome = ?outcome, "layout persistence stopped");
        outcome
    }

    async fn flush_inline(&self) -> FlushOutcome {
        let table = compact_table(&self.store);
        if let Err(e) = self.snapshot.write(&table).await {
            warn!(error = %e, "failed to write local snapshot");
        }
        match self.backend.bulk_set_layouts(&table).await {
            Ok(layouts) => FlushOutcome::Written { layouts },
            Err(e) => {
                warn!(error = %e, "layout flush failed");
                FlushOutcome::Failed
            }
        }
    }
}

fn compact_table(store: &SharedStore) -> BTreeMap<String, NodeConfig> {
    lock_store(store)
        .snapshot()
        .into_iter()
        .map(|(node_type, config)| (node_type, config.compacted()))
        .collect()
}

struct FlushWorker<B: LayoutBackend> {
    store: SharedStore,
    backend: Arc<B>,
    snapshot: Arc<LocalSnapshot>,
    quiet: Duration,
    dirty: bool,
    pending_deletes: BTreeSet<String>,
}

impl<B: LayoutBackend> FlushWorker<B> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut deadline: Option<Instant> = None;
        loop {
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Changed(change)) => {
                        self.record(change);
                        deadline = Some(Instant::now() + self.quiet);
                    }
                    Some(Command::MarkDirty) => {
                        self.dirty = true;
                        deadline = Some(Instant::now() + self.quiet);
                    }
                    Some(Command::FlushNow(ack)) => {
                        deadline = None;
                        let _ = ack.send(self.flush().await);
                    }
                    Some(Command::Shutdown(ack)) => {
                        let _ = ack.send(self.flush().await);
                        break;
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                () = timer => {
                    deadline = None;
                    self.flush().await;
                }
            }
        }
        debug!("layout flush worker exited");
    }

    fn record(&mut self, change: StoreChange) {
        match change {
            StoreChange::Updated(node_type) => {
                self.pending_deletes.remove(&node_type);
                self.dirty = true;
            }
            StoreChange::Removed(node_type) => {
                self.pending_deletes.insert(node_type);
            }
        }
    }

    async fn flush(&mut self) -> FlushOutcome {
        if !self.dirty && self.pending_deletes.is_empty() {
            return FlushOutcome::Clean;
        }

        let table = compact_table(&self.store);
        if let Err(e) = self.snapshot.write(&table).await {
            warn!(error = %e, "failed to write local snapshot");
        }

        let mut failed = false;
        for node_type in std::mem::take(&mut self.pending_deletes) {
            if table.contains_key(&node_type) {
                continue;
            }
            if let Err(e) = self.backend.delete_layout(&node_type).await {
                warn!(node_type = %node_type, error = %e, "failed to delete layout record");
                self.pending_deletes.insert(node_type);
                failed = true;
            }
        }

        if !self.dirty {
            return if failed { FlushOutcome::Failed } else { FlushOutcome::Clean };
        }
        match self.backend.bulk_set_layouts(&table).await {
            Ok(layouts) => {
                self.dirty = false;
                info!(layouts = layouts, "flushed layout table");
                if failed { FlushOutcome::Failed } else { FlushOutcome::Written { layouts } }
            }
            Err(e) => {
                warn!(error = %e, layouts = table.len(), "layout flush failed, keeping in-memory state");
                FlushOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::presets::DefaultPresets;
    use crate::types::GridItem;
    use serde_json::json;
    use tempfile::TempDir;

    const QUIET: Duration = Duration::from_millis(500);

    fn start(backend: Arc<MemoryBackend>, snapshot: LocalSnapshot) -> PersistenceCoordinator<MemoryBackend> {
        PersistenceCoordinator::start(LayoutStore::new().into_shared(), backend, Arc::new(snapshot), QUIET)
    }

    fn layout(block: &str) -> Vec<GridItem> {
        vec![GridItem::new(block, 0, 0, 4, 3)]
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_updates_is_one_write() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        coordinator.ensure_hydrated().await;

        for i in 1..=5 {
            lock_store(coordinator.store()).update_grid_layout(
                "repacku",
                LayoutMode::Fullscreen,
                layout(&format!("block{i}")),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(backend.write_calls(), 0);

        tokio::time::sleep(QUIET + Duration::from_millis(100)).await;
        assert_eq!(backend.write_calls(), 1);
        let record = backend.record("repacku").unwrap();
        assert_eq!(record["fullscreen"]["gridLayout"][0]["id"], "block5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearms_on_each_change() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        coordinator.ensure_hydrated().await;

        for _ in 0..4 {
            lock_store(coordinator.store()).update_grid_layout("repacku", LayoutMode::Normal, layout("a"));
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(backend.write_calls(), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.write_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_and_shutdown() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        coordinator.ensure_hydrated().await;

        assert_eq!(coordinator.flush_now().await, FlushOutcome::Clean);
        lock_store(coordinator.store()).update_grid_layout("repacku", LayoutMode::Normal, layout("a"));
        assert_eq!(coordinator.flush_now().await, FlushOutcome::Written { layouts: 1 });
        assert_eq!(backend.write_calls(), 1);

        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(backend.write_calls(), 1);

        lock_store(coordinator.store()).update_grid_layout("trename", LayoutMode::Normal, layout("b"));
        assert_eq!(coordinator.shutdown().await, FlushOutcome::Written { layouts: 2 });
        assert_eq!(backend.write_calls(), 2);

        assert_eq!(coordinator.flush_now().await, FlushOutcome::Written { layouts: 2 });
        assert_eq!(backend.write_calls(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_hydration() {
        let backend = Arc::new(MemoryBackend::with_records([(
            "repacku".to_string(),
            json!({"nodeType": "repacku", "normal": {"gridLayout": [{"id": "a", "x": 0, "y": 0, "w": 2, "h": 2}]}}),
        )]));
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());

        let (first, second) = tokio::join!(coordinator.ensure_hydrated(), coordinator.ensure_hydrated());
        assert_eq!(first, second);
        assert_eq!(first.loaded, 1);
        assert_eq!(backend.list_calls(), 1);
        assert!(coordinator.is_hydrated());
        assert_eq!(lock_store(coordinator.store()).grid_layout("repacku", LayoutMode::Normal).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_backend_falls_back_to_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(crate::constants::snapshot::LAYOUTS_FILE),
            json!({
                "repacku": {
                    "nodeType": "repacku",
                    "fullscreen": {
                        "gridLayout": [{"id": "path", "x": 0, "y": 0, "w": 6, "h": 4}],
                        "tabGroups": [{"id": "path", "children": ["path", "ghost"]}]
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.set_offline(true);
        let coordinator = start(backend.clone(), LocalSnapshot::new(dir.path(), 1 << 20));

        let report = coordinator.ensure_hydrated().await.clone();
        assert_eq!(report.source, HydrationSource::Snapshot);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.upgraded, 1);
        assert_eq!(report.imported_from_snapshot, None);
        {
            let store = lock_store(coordinator.store());
            assert_eq!(store.grid_layout("repacku", LayoutMode::Fullscreen).len(), 1);
            assert!(store.tab_groups("repacku", LayoutMode::Fullscreen).is_empty());
        }

        lock_store(coordinator.store()).update_grid_layout("repacku", LayoutMode::Normal, layout("log"));
        assert_eq!(coordinator.flush_now().await, FlushOutcome::Failed);
        assert_eq!(lock_store(coordinator.store()).grid_layout("repacku", LayoutMode::Normal).len(), 1);

        backend.set_offline(false);
        assert_eq!(coordinator.flush_now().await, FlushOutcome::Written { layouts: 1 });
        assert_eq!(backend.record("repacku").unwrap()["normal"]["gridLayout"][0]["id"], "log");
    }

    #[tokio::test]
    async fn test_snapshot_imported_once() {
        let dir = TempDir::new().unwrap();
        let snapshot = LocalSnapshot::new(dir.path(), 1 << 20);
        snapshot
            .write(&BTreeMap::from([("repacku".to_string(), NodeConfig::empty("repacku"))]))
            .await
            .unwrap();

        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), snapshot);
        let report = coordinator.ensure_hydrated().await;
        assert_eq!(report.imported_from_snapshot, Some(1));
        assert_eq!(report.source, HydrationSource::Backend);
        assert!(backend.record("repacku").is_some());

        let again = start(backend.clone(), LocalSnapshot::new(dir.path(), 1 << 20));
        assert_eq!(again.ensure_hydrated().await.imported_from_snapshot, None);
    }

    #[tokio::test]
    async fn test_dissolved_group_stays_dissolved_after_snapshot_fallback() {
        use crate::constants::snapshot::{LAYOUTS_FILE, TAB_REGISTRY_FILE};

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(LAYOUTS_FILE),
            json!({
                "repacku": {
                    "nodeType": "repacku",
                    "fullscreen": {"gridLayout": [
                        {"id": "a", "x": 0, "y": 0, "w": 4, "h": 3},
                        {"id": "b", "x": 4, "y": 0, "w": 4, "h": 3}
                    ]}
                }
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TAB_REGISTRY_FILE),
            json!({"repacku": {"fullscreen": [{"id": "a", "blockIds": ["a", "b"], "createdAt": 1}]}}).to_string(),
        )
        .unwrap();

        let backend = Arc::new(MemoryBackend::new());
        let first = start(backend.clone(), LocalSnapshot::new(dir.path(), 1 << 20));
        assert_eq!(first.ensure_hydrated().await.imported_from_snapshot, Some(1));
        assert_eq!(lock_store(first.store()).tab_groups("repacku", LayoutMode::Fullscreen).len(), 1);
        assert!(lock_store(first.store()).dissolve_group("repacku", LayoutMode::Fullscreen, "a"));
        assert_eq!(first.shutdown().await, FlushOutcome::Written { layouts: 1 });

        backend.set_offline(true);
        let second = start(backend.clone(), LocalSnapshot::new(dir.path(), 1 << 20));
        let report = second.ensure_hydrated().await.clone();
        assert_eq!(report.source, HydrationSource::Snapshot);
        assert_eq!(report.upgraded, 0);
        let store = lock_store(second.store());
        assert_eq!(store.grid_layout("repacku", LayoutMode::Fullscreen).len(), 2);
        assert!(store.tab_groups("repacku", LayoutMode::Fullscreen).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_deletes_record_on_flush() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        coordinator.ensure_hydrated().await;

        lock_store(coordinator.store()).update_grid_layout("repacku", LayoutMode::Normal, layout("a"));
        coordinator.flush_now().await;
        assert!(backend.record("repacku").is_some());

        assert!(lock_store(coordinator.store()).reset("repacku"));
        assert_eq!(coordinator.flush_now().await, FlushOutcome::Clean);
        assert!(backend.record("repacku").is_none());
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_seeds_from_default_preset() {
        let backend = Arc::new(MemoryBackend::new());
        let preset = LayoutPreset {
            id: "compact".into(),
            name: "Compact".into(),
            node_type: "repacku".into(),
            layout: layout("path"),
            tab_groups: None,
            created_at: 0,
            is_builtin: true,
        };
        backend.create_preset(&preset).await.unwrap();
        backend
            .set_defaults(&DefaultPresets {
                node_type: "repacku".into(),
                fullscreen_preset_id: Some("compact".into()),
                normal_preset_id: None,
            })
            .await
            .unwrap();

        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        let config = coordinator.get_or_create("repacku").await;
        assert_eq!(config.fullscreen.grid_layout, preset.layout);
        assert!(config.normal.grid_layout.is_empty());

        let other = coordinator.get_or_create("trename").await;
        assert!(other.fullscreen.grid_layout.is_empty());
        assert_eq!(coordinator.shutdown().await, FlushOutcome::Written { layouts: 2 });
    }

    #[tokio::test]
    async fn test_save_and_apply_preset() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = start(backend.clone(), LocalSnapshot::memory_only());
        coordinator.ensure_hydrated().await;

        lock_store(coordinator.store()).update_grid_layout("repacku", LayoutMode::Fullscreen, layout("path"));
        coordinator
            .save_preset("repacku", LayoutMode::Fullscreen, "mine", "Mine")
            .await
            .unwrap();
        assert!(coordinator.save_preset("missing", LayoutMode::Normal, "x", "X").await.is_err());

        assert!(coordinator.apply_preset("repacku", LayoutMode::Normal, "mine").await);
        assert!(!coordinator.apply_preset("repacku", LayoutMode::Normal, "nope").await);
        assert_eq!(
            lock_store(coordinator.store()).grid_layout("repacku", LayoutMode::Normal),
            layout("path").as_slice()
        );
    }
}
