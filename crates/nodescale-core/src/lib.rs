//! nodescale-core — shared types for agent pool scaling.
//!
//! - **`model`**: the on-disk cluster model and the per-invocation
//!   `ClusterSnapshot` derived from it
//! - **`identity`**: VM / scale set name parsing into `NodeIdentity`
//! - **`config`**: `nodescale.toml` parsing and resolved settings

pub mod config;
pub mod error;
pub mod identity;
pub mod model;

pub use config::{ScaleConfig, ScaleSettings};
pub use error::{ConfigError, ConfigResult, IdentityError, IdentityResult, SnapshotError};
pub use identity::{NameParser, NodeIdentity};
pub use model::*;
