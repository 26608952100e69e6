use super::commands::{IdentityAction, OutputFormat};
use super::utils::{print_json, to_json};
use greeter_crypto::{create_identity, Identity};
use greeter_types::{Commitment, GreeterError, GreeterResult};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

const IDENTITY_FILE_VERSION: u32 = 1;

/// On-disk identity. Holds the raw secrets, so the file must stay private.
#[serde_as]
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct IdentityFile {
    #[zeroize(skip)]
    pub version: u32,
    #[zeroize(skip)]
    pub id: String,
    #[zeroize(skip)]
    pub label: String,
    #[zeroize(skip)]
    pub commitment: Commitment,
    #[serde_as(as = "Hex")]
    trapdoor: [u8; 32],
    #[serde_as(as = "Hex")]
    nullifier_secret: [u8; 32],
    #[zeroize(skip)]
    pub created_at: String,
    #[zeroize(skip)]
    pub merkle_index: Option<u64>,
}

impl IdentityFile {
    fn new(identity: &Identity, label: Option<String>) -> Self {
        let commitment = identity.commitment();
        let id = hex::encode(&commitment.as_bytes()[..8]);
        Self {
            version: IDENTITY_FILE_VERSION,
            label: label.unwrap_or_else(|| format!("identity-{}", &id[..6])),
            id,
            commitment,
            trapdoor: *identity.trapdoor(),
            nullifier_secret: *identity.nullifier_secret(),
            created_at: chrono::Utc::now().to_rfc3339(),
            merkle_index: None,
        }
    }

    pub fn identity(&self) -> GreeterResult<Identity> {
        let identity = Identity::from_secrets(self.trapdoor, self.nullifier_secret)?;
        if identity.commitment() != self.commitment {
            return Err(GreeterError::InvalidSeed(format!(
                "identity file {} does not match its commitment",
                self.id
            )));
        }
        Ok(identity)
    }

    fn path_in(&self, identities_dir: &Path) -> PathBuf {
        identities_dir.join(format!("{}.json", self.id))
    }

    /// Writes the file owner-only from the moment it exists.
    pub fn save(&self, identities_dir: &Path) -> GreeterResult<PathBuf> {
        let path = self.path_in(identities_dir);
        let json = to_json(self)?;

        let mut file = private_file_options()
            .open(&path)
            .map_err(|e| GreeterError::Storage(format!("Failed to create identity file: {}", e)))?;
        restrict_permissions(&file)?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| GreeterError::Storage(format!("Failed to write identity: {}", e)))?;
        Ok(path)
    }
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

/// `mode` only applies on creation; a file that already existed is
/// tightened before anything is written to it.
#[cfg(unix)]
fn restrict_permissions(file: &File) -> GreeterResult<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .map_err(|e| GreeterError::Storage(format!("Failed to set permissions: {}", e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> GreeterResult<()> {
    Ok(())
}

fn ensure_dir(identities_dir: &Path) -> GreeterResult<()> {
    std::fs::create_dir_all(identities_dir)
        .map_err(|e| GreeterError::Config(format!("Failed to create identities dir: {}", e)))
}

pub fn handle_identity(
    action: IdentityAction,
    identities_dir: &Path,
    format: &OutputFormat,
) -> GreeterResult<()> {
    ensure_dir(identities_dir)?;

    match action {
        IdentityAction::New { label, seed_file } => {
            new_identity(identities_dir, label, seed_file, format)
        }
        IdentityAction::List => list_identities(identities_dir, format),
        IdentityAction::Show { id } => show_identity(identities_dir, &id, format),
    }
}

fn new_identity(
    identities_dir: &Path,
    label: Option<String>,
    seed_file: Option<PathBuf>,
    format: &OutputFormat,
) -> GreeterResult<()> {
    let identity = match seed_file {
        Some(path) => {
            let mut seed = std::fs::read(&path)
                .map_err(|e| GreeterError::InvalidSeed(format!("{:?}: {}", path, e)))?;
            let identity = create_identity(&seed);
            seed.zeroize();
            identity?
        }
        None => Identity::random(),
    };

    let file = IdentityFile::new(&identity, label);
    if file.path_in(identities_dir).exists() {
        return Err(GreeterError::Config(format!(
            "identity {} already exists",
            file.id
        )));
    }
    let path = file.save(identities_dir)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": file.id,
            "label": file.label,
            "commitment": file.commitment,
            "file": path.to_string_lossy(),
        })),
        OutputFormat::Text => {
            println!("\x1b[38;5;46m[+]\x1b[0m Identity created");
            println!("  ID:         \x1b[38;5;226m{}\x1b[0m", file.id);
            println!("  Label:      {}", file.label);
            println!("  Commitment: {}", file.commitment.to_hex());
            println!("  Secrets:    \x1b[38;5;51m{}\x1b[0m", path.display());
            println!();
            println!("Back up this file. Next: \x1b[38;5;51mgreeter register {}\x1b[0m", file.id);
            Ok(())
        }
    }
}

fn read_identity_file(path: &Path) -> GreeterResult<IdentityFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GreeterError::Storage(format!("Failed to read {:?}: {}", path, e)))?;
    serde_json::from_str(&content)
        .map_err(|e| GreeterError::Serialization(format!("Invalid identity file {:?}: {}", path, e)))
}

fn all_identities(identities_dir: &Path) -> GreeterResult<Vec<IdentityFile>> {
    let mut identities = Vec::new();
    if !identities_dir.exists() {
        return Ok(identities);
    }

    for entry in std::fs::read_dir(identities_dir)
        .map_err(|e| GreeterError::Storage(format!("Failed to read dir: {}", e)))?
    {
        let path = entry
            .map_err(|e| GreeterError::Storage(format!("Failed to read entry: {}", e)))?
            .path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            identities.push(read_identity_file(&path)?);
        }
    }
    identities.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(identities)
}

/// Finds an identity by ID, ID prefix or label.
pub fn find_identity(identities_dir: &Path, key: &str) -> GreeterResult<IdentityFile> {
    let mut matches: Vec<IdentityFile> = all_identities(identities_dir)?
        .into_iter()
        .filter(|f| f.id.starts_with(key) || f.label == key)
        .collect();

    match matches.len() {
        0 => Err(GreeterError::Config(format!("no identity matches '{}'", key))),
        1 => Ok(matches.remove(0)),
        n => Err(GreeterError::Config(format!(
            "'{}' matches {} identities; use a longer ID",
            key, n
        ))),
    }
}

pub fn record_index(identities_dir: &Path, mut file: IdentityFile, index: u64) -> GreeterResult<()> {
    file.merkle_index = Some(index);
    file.save(identities_dir)?;
    Ok(())
}

fn list_identities(identities_dir: &Path, format: &OutputFormat) -> GreeterResult<()> {
    let identities = all_identities(identities_dir)?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = identities
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "id": f.id,
                        "label": f.label,
                        "created_at": f.created_at,
                        "merkle_index": f.merkle_index,
                    })
                })
                .collect();
            print_json(&rows)
        }
        OutputFormat::Text => {
            if identities.is_empty() {
                println!("No identities. Create one with \x1b[38;5;51mgreeter identity new\x1b[0m");
            }
            for f in &identities {
                let status = match f.merkle_index {
                    Some(i) => format!("member #{}", i),
                    None => "unregistered".to_string(),
                };
                println!("{}  {:<24} {}", f.id, f.label, status);
            }
            Ok(())
        }
    }
}

fn show_identity(identities_dir: &Path, key: &str, format: &OutputFormat) -> GreeterResult<()> {
    let file = find_identity(identities_dir, key)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "id": file.id,
            "label": file.label,
            "commitment": file.commitment,
            "created_at": file.created_at,
            "merkle_index": file.merkle_index,
        })),
        OutputFormat::Text => {
            println!("ID:           {}", file.id);
            println!("Label:        {}", file.label);
            println!("Commitment:   {}", file.commitment.to_hex());
            println!("Created:      {}", file.created_at);
            match file.merkle_index {
                Some(i) => println!("Member index: {}", i),
                None => println!("Member index: (not registered)"),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::random();
        let file = IdentityFile::new(&identity, Some("alice".into()));
        file.save(dir.path()).unwrap();

        let found = find_identity(dir.path(), "alice").unwrap();
        assert_eq!(found.identity().unwrap().commitment(), identity.commitment());
        assert!(find_identity(dir.path(), &file.id[..4]).is_ok());
        assert!(find_identity(dir.path(), "bob").is_err());
    }

    #[test]
    fn test_tampered_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = IdentityFile::new(&Identity::random(), None);
        file.commitment = Identity::random().commitment();
        file.save(dir.path()).unwrap();

        assert!(find_identity(dir.path(), &file.id).unwrap().identity().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose.json");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut file = IdentityFile::new(&Identity::random(), None);
        file.id = "loose".into();
        let saved = file.save(dir.path()).unwrap();
        assert_eq!(saved, path);

        let fresh = IdentityFile::new(&Identity::random(), None);
        let fresh_path = fresh.save(dir.path()).unwrap();

        for p in [&saved, &fresh_path] {
            let mode = std::fs::metadata(p).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{:?}", p);
        }
        assert!(find_identity(dir.path(), "loose").unwrap().identity().is_ok());
    }
}
