#![forbid(unsafe_code)]
//! Per-node-type dashboard layout store
//!
//! Each node type (tool) has a grid layout for its fullscreen and normal
//! views, optional per-block size limits, and tab groups that stack blocks
//! over one footprint without moving them. Records from older on-disk
//! shapes are migrated on load, and the table is persisted through a
//! debounced whole-table write.

pub mod backend;
pub mod config;
pub mod constants;
pub mod layout;
pub mod persistence;
pub mod presets;
pub mod snapshot;
pub mod store;
pub mod types;

pub use backend::{BackendError, FileBackend, LayoutBackend, MemoryBackend};
pub use persistence::{FlushOutcome, HydrationReport, HydrationSource, PersistenceCoordinator};
pub use presets::{DefaultPresets, LayoutPreset, PresetUpdate};
pub use snapshot::LocalSnapshot;
pub use store::{LayoutStore, SharedStore, StoreChange, SubscriptionId};
pub use types::{BlockSizeOverride, GridItem, LayoutMode, ModeLayoutState, NodeConfig, RenderItem, TabGroup};
