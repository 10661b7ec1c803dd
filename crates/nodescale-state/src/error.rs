//! Error types for api model persistence.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("specified api model does not exist ({0})")]
    NotFound(String),

    #[error("failed to read api model {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing the api model {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node pool {0} was not found in the api model")]
    PoolNotFound(String),

    #[error("failed to serialize api model: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write api model {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
