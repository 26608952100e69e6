use greeter_crypto::keys::{read_metadata, KeyPaths};
use greeter_types::{GreeterError, GreeterResult, MAX_TREE_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::logging::LoggingConfig;
use super::tree::{KeysConfig, TreeConfig};
use super::types::LogLevel;
use crate::storage::StorageConfig;

/// Largest tree the local trusted setup will run for.
const MAX_LOCAL_SETUP_DEPTH: usize = 24;

/// What opening a node with this config will do about keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    Prover { vk_hash: String },
    VerifierOnly { vk_hash: String },
    LocalSetup,
    Missing,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeterConfig {
    pub data_dir: PathBuf,
    pub tree: TreeConfig,
    pub keys: KeysConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for GreeterConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/greeter"));

        Self {
            data_dir: home.join(".greeter"),
            tree: TreeConfig::default(),
            keys: KeysConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GreeterConfig {
    pub fn load(path: impl AsRef<Path>) -> GreeterResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| GreeterError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| GreeterError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> GreeterResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GreeterError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GreeterError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| GreeterError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("GREETER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(depth) = var("GREETER_TREE_DEPTH") {
            match depth.parse() {
                Ok(d) => self.tree.depth = d,
                Err(_) => warn!("Ignoring unparseable GREETER_TREE_DEPTH={}", depth),
            }
        }

        if let Some(history) = var("GREETER_ROOT_HISTORY") {
            if let Ok(h) = history.parse() {
                self.tree.root_history = h;
            }
        }

        if let Some(dir) = var("GREETER_KEYS_DIR") {
            self.keys.dir = Some(PathBuf::from(dir));
        }

        if let Some(path) = var("GREETER_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        if let Some(level) = var("GREETER_LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&level).unwrap_or(LogLevel::Info);
        }

        if var("GREETER_LOG_JSON").is_some() {
            self.logging.json = true;
        }
    }

    pub fn validate(&self) -> GreeterResult<()> {
        if self.tree.depth == 0 || self.tree.depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "tree.depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH, self.tree.depth
            )));
        }

        if self.tree.root_history == 0 {
            return Err(GreeterError::Config(
                "tree.root_history must keep at least the current root".into(),
            ));
        }

        if self.keys.setup_if_missing && self.tree.depth > MAX_LOCAL_SETUP_DEPTH {
            return Err(GreeterError::Config(format!(
                "keys.setup_if_missing is limited to depth {}; run greeter-keygen instead",
                MAX_LOCAL_SETUP_DEPTH
            )));
        }

        if self.storage.cache_capacity_bytes == 0 {
            return Err(GreeterError::Config(
                "storage.cache_capacity_bytes cannot be 0".into(),
            ));
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(GreeterError::Config("storage.path cannot be empty".into()));
        }

        Ok(())
    }

    /// Storage settings with the database path resolved against `data_dir`.
    pub fn resolved_storage(&self) -> StorageConfig {
        StorageConfig {
            path: self.resolve(&self.storage.path),
            ..self.storage.clone()
        }
    }

    pub fn keys_dir(&self) -> PathBuf {
        match &self.keys.dir {
            Some(dir) => self.resolve(dir),
            None => self.data_dir.join("keys"),
        }
    }

    pub fn identities_dir(&self) -> PathBuf {
        self.data_dir.join("identities")
    }

    /// Inspects the key directory without loading any key. Keys made for a
    /// different tree depth are an error.
    pub fn key_status(&self) -> GreeterResult<KeyStatus> {
        let dir = self.keys_dir();
        let paths = KeyPaths::in_dir(&dir);

        if !paths.exist() {
            return Ok(if self.keys.setup_if_missing {
                KeyStatus::LocalSetup
            } else {
                KeyStatus::Missing
            });
        }

        let metadata = read_metadata(&dir)?;
        if metadata.merkle_depth != self.tree.depth {
            return Err(GreeterError::Config(format!(
                "keys in {} are for depth {} but tree.depth is {}",
                dir.display(),
                metadata.merkle_depth,
                self.tree.depth
            )));
        }

        Ok(if paths.proving_key.exists() {
            KeyStatus::Prover {
                vk_hash: metadata.vk_hash,
            }
        } else {
            KeyStatus::VerifierOnly {
                vk_hash: metadata.vk_hash,
            }
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_validation() {
        assert!(GreeterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_depth() {
        let mut config = GreeterConfig::default();
        config.tree.depth = 0;
        assert!(config.validate().is_err());

        config.tree.depth = MAX_TREE_DEPTH + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_root_history() {
        let mut config = GreeterConfig::default();
        config.tree.root_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_setup_depth_limit() {
        let mut config = GreeterConfig::default();
        config.keys.setup_if_missing = true;
        assert!(config.validate().is_ok());

        config.tree.depth = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_resolve_against_data_dir() {
        let config = GreeterConfig {
            data_dir: PathBuf::from("/srv/greeter"),
            ..Default::default()
        };
        assert_eq!(config.resolved_storage().path, PathBuf::from("/srv/greeter/data"));
        assert_eq!(config.keys_dir(), PathBuf::from("/srv/greeter/keys"));

        let config = GreeterConfig {
            data_dir: PathBuf::from("/srv/greeter"),
            keys: KeysConfig {
                dir: Some(PathBuf::from("/opt/keys")),
                setup_if_missing: false,
            },
            ..Default::default()
        };
        assert_eq!(config.keys_dir(), PathBuf::from("/opt/keys"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GREETER_DATA_DIR", "/tmp/g"),
            ("GREETER_TREE_DEPTH", "3"),
            ("GREETER_LOG_LEVEL", "DEBUG"),
            ("GREETER_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = GreeterConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/g"));
        assert_eq!(config.tree.depth, 3);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.json);
    }

    #[test]
    fn test_unparseable_depth_ignored() {
        let mut config = GreeterConfig::default();
        config.apply_overrides(|k| (k == "GREETER_TREE_DEPTH").then(|| "deep".to_string()));
        assert_eq!(config.tree.depth, greeter_types::DEFAULT_TREE_DEPTH);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("greeter.toml");

        let mut config = GreeterConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.tree.depth = 4;
        config.keys.setup_if_missing = true;
        config.save(&path).unwrap();

        let loaded = GreeterConfig::load(&path).unwrap();
        assert_eq!(loaded.tree.depth, 4);
        assert!(loaded.keys.setup_if_missing);
        assert_eq!(loaded.data_dir, dir.path());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeter.toml");
        std::fs::write(&path, "[tree]\ndepth = 5\n").unwrap();

        let config: GreeterConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.tree.depth, 5);
        assert_eq!(config.tree.root_history, greeter_types::DEFAULT_ROOT_HISTORY);
        assert_eq!(config.storage, StorageConfig::default());
    }

    fn write_metadata(dir: &Path, depth: usize) {
        let metadata = greeter_crypto::keys::KeyMetadata {
            circuit: greeter_crypto::keys::CIRCUIT_NAME.to_string(),
            version: greeter_crypto::keys::CIRCUIT_VERSION.to_string(),
            merkle_depth: depth,
            vk_hash: "ab".repeat(32),
            pk_size: 0,
            vk_size: 0,
            generated_at: String::new(),
        };
        let paths = KeyPaths::in_dir(dir);
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(&paths.metadata, serde_json::to_vec(&metadata).unwrap()).unwrap();
        std::fs::write(&paths.verifying_key, b"vk").unwrap();
    }

    #[test]
    fn test_key_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GreeterConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.tree.depth = 4;
        assert_eq!(config.key_status().unwrap(), KeyStatus::Missing);

        config.keys.setup_if_missing = true;
        assert_eq!(config.key_status().unwrap(), KeyStatus::LocalSetup);

        write_metadata(&config.keys_dir(), 4);
        assert!(matches!(
            config.key_status().unwrap(),
            KeyStatus::VerifierOnly { .. }
        ));

        std::fs::write(KeyPaths::in_dir(&config.keys_dir()).proving_key, b"pk").unwrap();
        assert!(matches!(config.key_status().unwrap(), KeyStatus::Prover { .. }));

        config.tree.depth = 5;
        assert!(matches!(config.key_status(), Err(GreeterError::Config(_))));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = GreeterConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: GreeterConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.tree, config.tree);
        assert_eq!(parsed.logging.level, config.logging.level);
    }
}
