//! ModelStore — load and save the api model file.

use std::io::Write;
use std::path::{Path, PathBuf};

use nodescale_core::ClusterModel;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};

/// File-backed api model.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the model. The api version travels inside it (`apiVersion`).
    pub fn load(&self) -> ModelResult<ClusterModel> {
        let bytes = self.read()?;
        let model: ClusterModel =
            serde_json::from_slice(&bytes).map_err(|source| self.parse_err(source))?;
        debug!(path = ?self.path, api_version = %model.api_version, "api model loaded");
        Ok(model)
    }

    /// Write the model atomically: temp file in the same directory, then rename.
    pub fn save(&self, model: &ClusterModel) -> ModelResult<()> {
        self.write(&serde_json::to_value(model)?)
    }

    /// Reload the model from disk and set one pool's count.
    ///
    /// The file is edited as an untyped document, so the count is the
    /// only value that changes. Anything edited in the file since it was
    /// first read is preserved.
    pub fn persist_pool_count(&self, pool_name: &str, count: u32) -> ModelResult<()> {
        let bytes = self.read()?;
        let mut doc: Value =
            serde_json::from_slice(&bytes).map_err(|source| self.parse_err(source))?;

        let pool = doc
            .pointer_mut("/properties/agentPoolProfiles")
            .and_then(Value::as_array_mut)
            .and_then(|pools| {
                pools
                    .iter_mut()
                    .find(|p| p.get("name").and_then(Value::as_str) == Some(pool_name))
            })
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ModelError::PoolNotFound(pool_name.to_string()))?;
        let previous = pool.insert("count".to_string(), Value::from(count));

        self.write(&doc)?;
        info!(pool = %pool_name, from = ?previous, to = count, "pool count saved to api model");
        Ok(())
    }

    fn read(&self) -> ModelResult<Vec<u8>> {
        if !self.path.exists() {
            return Err(ModelError::NotFound(self.path.display().to_string()));
        }
        std::fs::read(&self.path).map_err(|source| ModelError::Read {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn parse_err(&self, source: serde_json::Error) -> ModelError {
        ModelError::Parse {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn write(&self, doc: &Value) -> ModelResult<()> {
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |source| ModelError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = ?self.path, bytes = bytes.len(), "api model saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{
  "apiVersion": "vlabs",
  "location": "westus2",
  "properties": {
    "orchestratorProfile": { "orchestratorType": "Kubernetes" },
    "masterProfile": { "dnsPrefix": "mycluster", "vmSize": "Standard_D2_v3" },
    "agentPoolProfiles": [
      { "name": "agentpool1", "count": 3 },
      { "name": "agentpool2", "count": 5 }
    ]
  }
}"#;

    fn store_with_model() -> (tempfile::TempDir, ModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimodel.json");
        std::fs::write(&path, MODEL).unwrap();
        (dir, ModelStore::new(path))
    }

    #[test]
    fn load_reads_model() {
        let (_dir, store) = store_with_model();
        let model = store.load().unwrap();
        assert_eq!(model.api_version, "vlabs");
        assert_eq!(model.properties.agent_pool_profiles.len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("nope.json"));
        assert!(matches!(store.load(), Err(ModelError::NotFound(_))));
    }

    #[test]
    fn load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimodel.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ModelStore::new(path).load(), Err(ModelError::Parse { .. })));
    }

    #[test]
    fn persist_pool_count_changes_only_that_pool() {
        let (_dir, store) = store_with_model();
        store.persist_pool_count("agentpool1", 7).unwrap();

        let model = store.load().unwrap();
        assert_eq!(model.properties.agent_pool_profiles[0].count, 7);
        assert_eq!(model.properties.agent_pool_profiles[1].count, 5);
        assert_eq!(
            model.properties.master_profile.unwrap().extra["vmSize"],
            "Standard_D2_v3"
        );
    }

    #[test]
    fn persist_changes_nothing_but_the_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimodel.json");
        let original = serde_json::json!({
            "apiVersion": "vlabs",
            "properties": {
                "orchestratorProfile": { "orchestratorType": "Kubernetes" },
                "masterProfile": { "dnsPrefix": "mycluster" },
                "agentPoolProfiles": [
                    { "name": "a", "count": 1 },
                    { "name": "b", "count": 2, "storageProfile": "Ephemeral" }
                ],
                "servicePrincipalProfile": { "clientId": "x" }
            }
        });
        let text = |v: &Value| format!("{}\n", serde_json::to_string_pretty(v).unwrap());
        std::fs::write(&path, text(&original)).unwrap();

        let store = ModelStore::new(&path);
        store.persist_pool_count("a", 3).unwrap();

        let mut expected = original.clone();
        expected["properties"]["agentPoolProfiles"][0]["count"] = 3.into();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(saved, text(&expected));
        assert!(!saved.contains("location"));
        assert!(!saved.contains("osType"));
        assert!(!saved.contains("availabilityProfile"));
    }

    #[test]
    fn typed_save_does_not_add_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apimodel.json");
        std::fs::write(
            &path,
            r#"{"properties":{"orchestratorProfile":{"orchestratorType":"Kubernetes"},"agentPoolProfiles":[{"name":"a","count":1}]}}"#,
        )
        .unwrap();
        let store = ModelStore::new(&path);
        store.save(&store.load().unwrap()).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("location"));
        assert!(!saved.contains("storageProfile"));
        assert!(!saved.contains("osType"));
    }

    #[test]
    fn persist_picks_up_external_edits() {
        let (_dir, store) = store_with_model();
        // Someone edits the file between planning and persisting.
        let mut edited = store.load().unwrap();
        edited.properties.agent_pool_profiles[1].count = 9;
        store.save(&edited).unwrap();

        store.persist_pool_count("agentpool1", 4).unwrap();
        let model = store.load().unwrap();
        assert_eq!(model.properties.agent_pool_profiles[0].count, 4);
        assert_eq!(model.properties.agent_pool_profiles[1].count, 9);
    }

    #[test]
    fn persist_unknown_pool() {
        let (_dir, store) = store_with_model();
        assert!(matches!(
            store.persist_pool_count("ghost", 1),
            Err(ModelError::PoolNotFound(_))
        ));
    }
}
