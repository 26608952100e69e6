//! Key artifact files.
//!
//! A key directory holds `signal.pk.bin`, `signal.vk.bin` (compressed
//! arkworks encodings) and `signal.meta.json`, which records the tree depth
//! and the verifying key fingerprint.

use crate::backend::{vk_fingerprint, Groth16Backend, ProvingBackend};
use greeter_types::{GreeterError, GreeterResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CIRCUIT_NAME: &str = "signal";
pub const CIRCUIT_VERSION: &str = "1.0.0";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub circuit: String,
    pub version: String,
    pub merkle_depth: usize,
    pub vk_hash: String,
    pub pk_size: usize,
    pub vk_size: usize,
    pub generated_at: String,
}

#[derive(Clone, Debug)]
pub struct KeyPaths {
    pub proving_key: PathBuf,
    pub verifying_key: PathBuf,
    pub metadata: PathBuf,
}

impl KeyPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            proving_key: dir.join(format!("{}.pk.bin", CIRCUIT_NAME)),
            verifying_key: dir.join(format!("{}.vk.bin", CIRCUIT_NAME)),
            metadata: dir.join(format!("{}.meta.json", CIRCUIT_NAME)),
        }
    }

    pub fn exist(&self) -> bool {
        self.verifying_key.exists() && self.metadata.exists()
    }
}

fn io_err(path: &Path, e: std::io::Error) -> GreeterError {
    GreeterError::Storage(format!("{}: {}", path.display(), e))
}

pub fn write_keys(backend: &Groth16Backend, dir: &Path) -> GreeterResult<KeyMetadata> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let paths = KeyPaths::in_dir(dir);

    let pk_bytes = backend.proving_key_bytes()?;
    let vk_bytes = backend.verifying_key_bytes()?;

    fs::write(&paths.proving_key, &pk_bytes).map_err(|e| io_err(&paths.proving_key, e))?;
    fs::write(&paths.verifying_key, &vk_bytes).map_err(|e| io_err(&paths.verifying_key, e))?;

    let metadata = KeyMetadata {
        circuit: CIRCUIT_NAME.to_string(),
        version: CIRCUIT_VERSION.to_string(),
        merkle_depth: backend.depth(),
        vk_hash: vk_fingerprint(&vk_bytes),
        pk_size: pk_bytes.len(),
        vk_size: vk_bytes.len(),
        generated_at: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| GreeterError::Serialization(e.to_string()))?;
    fs::write(&paths.metadata, json).map_err(|e| io_err(&paths.metadata, e))?;

    info!(
        "Wrote keys for depth {} to {} (vk {})",
        metadata.merkle_depth,
        dir.display(),
        metadata.vk_hash
    );
    Ok(metadata)
}

pub fn read_metadata(dir: &Path) -> GreeterResult<KeyMetadata> {
    let path = KeyPaths::in_dir(dir).metadata;
    let content = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let metadata: KeyMetadata = serde_json::from_str(&content)
        .map_err(|e| GreeterError::Serialization(format!("{}: {}", path.display(), e)))?;
    if metadata.circuit != CIRCUIT_NAME {
        return Err(GreeterError::Config(format!(
            "key directory holds keys for circuit '{}'",
            metadata.circuit
        )));
    }
    Ok(metadata)
}

fn check_fingerprint(backend: &Groth16Backend, metadata: &KeyMetadata) -> GreeterResult<()> {
    let actual = backend.fingerprint()?;
    if actual != metadata.vk_hash {
        return Err(GreeterError::Crypto(format!(
            "verifying key fingerprint {} does not match metadata {}",
            actual, metadata.vk_hash
        )));
    }
    Ok(())
}

/// Backend able to prove and verify.
pub fn load_prover(dir: &Path) -> GreeterResult<Groth16Backend> {
    let metadata = read_metadata(dir)?;
    let path = KeyPaths::in_dir(dir).proving_key;
    let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;

    let backend = Groth16Backend::from_proving_key_bytes(metadata.merkle_depth, &bytes)?;
    check_fingerprint(&backend, &metadata)?;
    Ok(backend)
}

/// Backend that only verifies.
pub fn load_verifier(dir: &Path) -> GreeterResult<Groth16Backend> {
    let metadata = read_metadata(dir)?;
    let path = KeyPaths::in_dir(dir).verifying_key;
    let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;

    let backend = Groth16Backend::from_verifying_key_bytes(metadata.merkle_depth, &bytes)?;
    check_fingerprint(&backend, &metadata)?;
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::{test_backend, TEST_DEPTH};

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = write_keys(test_backend(), dir.path()).unwrap();

        assert_eq!(metadata.merkle_depth, TEST_DEPTH);
        assert!(KeyPaths::in_dir(dir.path()).exist());
        assert_eq!(read_metadata(dir.path()).unwrap(), metadata);

        let prover = load_prover(dir.path()).unwrap();
        assert!(prover.can_prove());
        assert_eq!(prover.fingerprint().unwrap(), metadata.vk_hash);

        let verifier = load_verifier(dir.path()).unwrap();
        assert!(!verifier.can_prove());
    }

    #[test]
    fn test_tampered_metadata_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = write_keys(test_backend(), dir.path()).unwrap();
        metadata.vk_hash = "00".repeat(32);
        fs::write(
            KeyPaths::in_dir(dir.path()).metadata,
            serde_json::to_vec(&metadata).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            load_verifier(dir.path()),
            Err(GreeterError::Crypto(_))
        ));
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!KeyPaths::in_dir(dir.path()).exist());
        assert!(load_verifier(dir.path()).is_err());
    }
}
