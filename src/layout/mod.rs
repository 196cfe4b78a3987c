//! Layout record pipeline: validation, migration and virtual grouping

pub mod grouping;
pub mod migrate;
pub mod sanitize;

pub use grouping::{GroupingError, MemberRemoval, compute_effective_items};
pub use migrate::{Generation, detect_generation, migrate};
pub use sanitize::{invariant_violations, repair, sanitize};
