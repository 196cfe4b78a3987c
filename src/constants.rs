//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the layout store, providing a single source of truth for constant values.

/// Settings file location
pub mod config {
    /// Directory under the platform config/data/cache dirs
    pub const APP_DIR: &str = "aestiv";

    /// Settings file name inside `APP_DIR`
    pub const FILENAME: &str = "layout-store.json";

    /// Subdirectory of the data dir holding backend records
    pub const LAYOUTS_DIR: &str = "layouts";

    /// Subdirectory of the cache dir holding the local snapshot
    pub const SNAPSHOT_DIR: &str = "snapshot";

    /// Environment overrides
    pub const ENV_DATA_DIR: &str = "AESTIV_LAYOUT_DATA_DIR";
    pub const ENV_SNAPSHOT_DIR: &str = "AESTIV_LAYOUT_SNAPSHOT_DIR";
    pub const ENV_FLUSH_MS: &str = "AESTIV_LAYOUT_FLUSH_MS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
}

/// Grid geometry used when a block has to be placed without a known position
pub mod grid {
    /// Column count of the dashboard grid
    pub const COLUMNS: u32 = 12;

    /// Width of a block re-inserted at a computed default cell
    pub const DEFAULT_BLOCK_W: u32 = 4;

    /// Height of a block re-inserted at a computed default cell
    pub const DEFAULT_BLOCK_H: u32 = 3;

    /// Upper bound for any coordinate or size read from persisted data
    pub const MAX_COORDINATE: u32 = 10_000;
}

/// Debounced flush and hydration
pub mod persistence {
    /// Quiet interval after the last mutation before the table is written
    pub const DEFAULT_FLUSH_QUIET_MS: u64 = 500;

    /// Allowed range for the quiet interval
    pub const MIN_FLUSH_QUIET_MS: u64 = 50;
    pub const MAX_FLUSH_QUIET_MS: u64 = 10_000;
}

/// Local fallback snapshot
pub mod snapshot {
    /// Current-format snapshot: a JSON object keyed by node type
    pub const LAYOUTS_FILE: &str = "layouts.json";

    /// Legacy tab registry written by the separate-registry generation
    pub const TAB_REGISTRY_FILE: &str = "tab-registry.json";

    /// Name the legacy tab registry is moved to once it has been imported
    pub const RETIRED_TAB_REGISTRY_FILE: &str = "tab-registry.json.imported";

    /// Marker written once the snapshot has been pushed into the backend
    pub const MIGRATED_MARKER: &str = ".migrated";

    /// Quota applied to the snapshot file (mirrors a browser local storage budget)
    pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
    pub const MIN_QUOTA_BYTES: u64 = 4 * 1024;
    pub const MAX_QUOTA_BYTES: u64 = 64 * 1024 * 1024;
}

/// File backend layout
pub mod backend {
    /// Extension of per-node-type layout records
    pub const RECORD_EXTENSION: &str = "json";

    /// Subdirectory holding preset records
    pub const PRESETS_DIR: &str = "presets";

    /// Subdirectory holding default preset records
    pub const DEFAULTS_DIR: &str = "defaults";
}

/// Values substituted for missing or malformed fields
pub mod validation {
    /// Node type used when a record carries no usable `nodeType`
    pub const UNKNOWN_NODE_TYPE: &str = "unknown";

    /// Minimum member count of a tab group
    pub const MIN_GROUP_MEMBERS: usize = 2;
}
