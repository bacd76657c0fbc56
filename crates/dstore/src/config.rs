use crate::registry::BackendRegistry;
use dstore_core::{from_json, from_yaml, DatastoreError, Key, Result};
use dstore_keytransform::namespace;
use dstore_mount::{Mount, MountDatastore};
use dstore_storage::Datastore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Mount table read from a YAML or JSON document
///
/// ```yaml
/// mounts:
///   - prefix: /
///     backend: { type: redb, path: ./dstore.redb }
///   - prefix: /cache
///     backend: { type: memory }
///     namespace: /v1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub prefix: Key,
    pub backend: BackendConfig,
    /// Keys are stored under this prefix inside the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Key>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Read a mount table; `.json` files are parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config: Config = if is_json {
            from_json(&data)?
        } else {
            from_yaml(&data)?
        };
        config.validate()?;
        info!("Loaded {} mount(s) from {}", config.mounts.len(), path.display());
        Ok(config)
    }

    /// A single redb file mounted at the root
    pub fn single_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts: vec![MountConfig {
                prefix: Key::root(),
                backend: BackendConfig {
                    kind: "redb".to_string(),
                    path: Some(path.into()),
                },
                namespace: None,
            }],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mounts.is_empty() {
            return Err(DatastoreError::configuration(
                "The mount table is empty",
                "Add at least one mount, usually at prefix /",
            ));
        }
        let mut seen = BTreeSet::new();
        for mount in &self.mounts {
            if !seen.insert(&mount.prefix) {
                return Err(DatastoreError::configuration(
                    format!("Prefix {} is mounted more than once", mount.prefix),
                    "Give every mount a distinct prefix",
                ));
            }
        }
        Ok(())
    }

    /// Construct every backend and assemble the mount datastore
    pub fn build(&self, registry: &BackendRegistry) -> Result<MountDatastore> {
        self.validate()?;
        let mut mounts = Vec::with_capacity(self.mounts.len());
        for mount in &self.mounts {
            let backend = registry
                .build(&mount.backend)
                .map_err(|e| e.at_mount("opening", mount.prefix.as_str()))?;
            let datastore: Arc<dyn Datastore> = match &mount.namespace {
                Some(ns) => Arc::new(namespace::wrap(backend, ns.clone())),
                None => backend,
            };
            mounts.push(Mount::new(mount.prefix.clone(), datastore));
        }
        MountDatastore::new(mounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    const YAML: &str = r#"
mounts:
  - prefix: /
    backend: { type: memory }
  - prefix: /tmp/
    backend:
      type: "null"
  - prefix: /ns
    backend: { type: memory }
    namespace: scoped
"#;

    #[test]
    fn test_parse_yaml() {
        let config: Config = from_yaml(YAML).unwrap();
        assert_eq!(config.mounts.len(), 3);
        assert_eq!(config.mounts[1].prefix, Key::new("/tmp"));
        assert_eq!(config.mounts[1].backend.kind, "null");
        assert_eq!(config.mounts[2].namespace, Some(Key::new("/scoped")));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mounts.json");
        let db = dir.path().join("root.redb");
        std::fs::write(
            &path,
            format!(
                r#"{{"mounts":[{{"prefix":"/","backend":{{"type":"redb","path":{:?}}}}}]}}"#,
                db.display().to_string()
            ),
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::single_file(&db));
    }

    #[test]
    fn test_duplicate_prefix() {
        let config: Config = from_yaml(
            "mounts:\n  - prefix: /a\n    backend: { type: memory }\n  - prefix: /a/\n    backend: { type: memory }\n",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DatastoreError::Configuration { .. }));
    }

    #[test]
    fn test_empty_and_unknown() {
        let empty = Config { mounts: Vec::new() };
        assert!(empty.validate().is_err());

        let unknown: Config =
            from_yaml("mounts:\n  - prefix: /\n    backend: { type: leveldb }\n").unwrap();
        let err = unknown.build(&BackendRegistry::with_defaults()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "opening datastore at /: Invalid configuration: Unknown backend type 'leveldb'"
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(from_yaml::<Config>("mounts:\n  - prefix: /\n    backend: { type: memory, size: 3 }\n").is_err());
    }

    #[test]
    fn test_build_routes_through_namespace() {
        let config: Config = from_yaml(YAML).unwrap();
        let ds = config.build(&BackendRegistry::with_defaults()).unwrap();

        ds.put(&Key::new("/ns/a"), Bytes::from("1")).unwrap();
        ds.put(&Key::new("/tmp/gone"), Bytes::from("2")).unwrap();
        ds.put(&Key::new("/top"), Bytes::from("3")).unwrap();

        assert_eq!(ds.get(&Key::new("/ns/a")).unwrap(), Bytes::from("1"));
        assert!(!ds.has(&Key::new("/tmp/gone")).unwrap());

        let ns_mount = ds
            .mounts()
            .iter()
            .find(|m| m.prefix == Key::new("/ns"))
            .unwrap();
        assert!(ns_mount.datastore.has(&Key::new("/a")).unwrap());
    }
}
