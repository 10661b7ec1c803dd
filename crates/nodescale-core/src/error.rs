//! Error types shared by the nodescale crates.

use thiserror::Error;

pub type IdentityResult<T> = Result<T, IdentityError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A VM or scale set name that matches neither naming family.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unparseable node name {name:?}: {reason}")]
    Unparseable { name: String, reason: String },

    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {value:?} for {field}")]
    Duration { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cluster model has neither a nameSuffix nor a masterProfile.dnsPrefix")]
    MissingClusterIdentity,
}
