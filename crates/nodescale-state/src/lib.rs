//! nodescale-state — the on-disk cluster model.
//!
//! The api model file is the operator's record of the cluster. The scaler
//! reads it once to plan, and after the infrastructure change succeeds it
//! reloads the file fresh and writes back a single field: the scaled
//! pool's count. Writes go through a temp file in the same directory and
//! an atomic rename.

pub mod error;
pub mod store;

pub use error::{ModelError, ModelResult};
pub use store::ModelStore;
