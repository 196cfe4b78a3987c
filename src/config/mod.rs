//! Configuration management for the layout store
//!
//! Settings are a single JSON file under the platform config directory,
//! with a few environment overrides for scripted runs.

pub mod settings;

pub use settings::Settings;
