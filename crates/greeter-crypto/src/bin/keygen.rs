//! Groth16 key generation tool for greeter signal proofs.
//!
//! Usage:
//!   greeter-keygen generate --output ./greeter-keys --depth 20
//!   greeter-keygen verify --vk ./greeter-keys/signal.vk.bin
//!   greeter-keygen info --keys-dir ./greeter-keys

use ark_bn254::Bn254;
use ark_serialize::CanonicalDeserialize;
use clap::{Parser, Subcommand};
use greeter_crypto::keys::{read_metadata, write_keys, KeyPaths, CIRCUIT_VERSION};
use greeter_crypto::{vk_fingerprint, Groth16Backend};
use greeter_types::{DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "greeter-keygen")]
#[command(about = "Generate Groth16 proving and verifying keys for greeter signal proofs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new proving and verifying keys.
    Generate {
        /// Output directory for keys.
        #[arg(short, long, default_value = "./greeter-keys")]
        output: PathBuf,

        /// Membership tree depth the circuit is built for.
        #[arg(short, long, default_value_t = DEFAULT_TREE_DEPTH)]
        depth: usize,
    },

    /// Verify that a verifying key parses and matches an expected hash.
    Verify {
        /// Path to verifying key file.
        #[arg(short, long)]
        vk: PathBuf,

        /// Expected VK hash (hex).
        #[arg(short, long)]
        expected_hash: Option<String>,
    },

    /// Show information about existing keys.
    Info {
        /// Directory containing keys.
        #[arg(short, long, default_value = "./greeter-keys")]
        keys_dir: PathBuf,
    },
}

fn generate_keys(output: &PathBuf, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(format!("depth must be 1..={}", MAX_TREE_DEPTH).into());
    }

    println!("Greeter Key Generator v{}", CIRCUIT_VERSION);
    println!("==============================");
    println!("Merkle depth: {}", depth);
    println!();
    println!("Running trusted setup (circuit-specific)...");
    println!("This may take several minutes at production depths.");

    let backend = Groth16Backend::setup(depth, &mut rand::thread_rng())?;
    let metadata = write_keys(&backend, output)?;
    let paths = KeyPaths::in_dir(output);

    println!("Setup complete.");
    println!();
    println!(
        "Proving key: {} ({} bytes)",
        paths.proving_key.display(),
        metadata.pk_size
    );
    println!(
        "Verifying key: {} ({} bytes)",
        paths.verifying_key.display(),
        metadata.vk_size
    );
    println!("Metadata: {}", paths.metadata.display());
    println!("VK hash: {}", metadata.vk_hash);
    println!();
    println!("To use these keys:");
    println!("  1. Point [keys].dir in greeter.toml at {}", output.display());
    println!("  2. Verifiers only need signal.vk.bin and signal.meta.json");
    println!("  3. Check the VK hash matches: {}", metadata.vk_hash);

    Ok(())
}

fn verify_key(vk_path: &PathBuf, expected_hash: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying key: {}", vk_path.display());

    let vk_bytes = fs::read(vk_path)?;
    let actual_hash = vk_fingerprint(&vk_bytes);
    println!("VK hash: {}", actual_hash);
    println!("Size: {} bytes", vk_bytes.len());

    let _vk = ark_groth16::VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])?;
    println!("Deserialization: OK");

    if let Some(expected) = expected_hash {
        if actual_hash == expected.trim_start_matches("0x") {
            println!("Hash match: OK");
        } else {
            eprintln!("Hash MISMATCH!");
            eprintln!("  Expected: {}", expected);
            eprintln!("  Actual:   {}", actual_hash);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn show_info(keys_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Greeter Keys Info");
    println!("=================");
    println!("Directory: {}", keys_dir.display());
    println!();

    if !KeyPaths::in_dir(keys_dir).exist() {
        println!("No keys found. Run 'greeter-keygen generate' first.");
        return Ok(());
    }

    let metadata = read_metadata(keys_dir)?;
    println!("Signal Circuit:");
    println!("  Version: {}", metadata.version);
    println!("  Merkle depth: {}", metadata.merkle_depth);
    println!("  VK hash: {}", metadata.vk_hash);
    println!("  PK size: {} bytes", metadata.pk_size);
    println!("  VK size: {} bytes", metadata.vk_size);
    println!("  Generated: {}", metadata.generated_at);

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, depth } => {
            generate_keys(&output, depth)?;
        }
        Commands::Verify { vk, expected_hash } => {
            verify_key(&vk, expected_hash)?;
        }
        Commands::Info { keys_dir } => {
            show_info(&keys_dir)?;
        }
    }

    Ok(())
}
