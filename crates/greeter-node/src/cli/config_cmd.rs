use super::commands::ConfigAction;
use super::utils::load_config;
use greeter_node::{GreeterConfig, KeyStatus};
use greeter_types::{GreeterError, GreeterResult};
use std::path::Path;

pub fn handle_config(
    config_path: &Path,
    data_dir: Option<&Path>,
    action: Option<ConfigAction>,
) -> GreeterResult<()> {
    match action {
        Some(ConfigAction::Show) | None => show_config(config_path, data_dir),
        Some(ConfigAction::Validate) => validate_config(config_path, data_dir),
    }
}

/// Prints the configuration as the node will see it, after environment
/// overrides and `--data-dir`.
fn show_config(config_path: &Path, data_dir: Option<&Path>) -> GreeterResult<()> {
    let config = load_config(config_path, data_dir)?;
    let content = toml::to_string_pretty(&config)
        .map_err(|e| GreeterError::Config(format!("Failed to serialize config: {}", e)))?;

    if config_path.exists() {
        println!("\x1b[38;5;245m# {}\x1b[0m", config_path.display());
    } else {
        println!("\x1b[38;5;245m# defaults (no file at {})\x1b[0m", config_path.display());
    }
    println!("{}", content);
    Ok(())
}

fn validate_config(config_path: &Path, data_dir: Option<&Path>) -> GreeterResult<()> {
    if !config_path.exists() {
        println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
        println!("Run '\x1b[38;5;51mgreeter init\x1b[0m' to create one");
        return Ok(());
    }

    let config = match load_config(config_path, data_dir) {
        Ok(config) => config,
        Err(e) => {
            println!("\x1b[38;5;196m[-]\x1b[0m Configuration error: {}", e);
            return Err(e);
        }
    };
    print_tree(&config);

    match config.key_status() {
        Ok(status) => {
            print_keys(&config, &status);
            println!("\x1b[38;5;46m[+]\x1b[0m Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("\x1b[38;5;196m[-]\x1b[0m Key directory error: {}", e);
            Err(e)
        }
    }
}

fn print_tree(config: &GreeterConfig) {
    println!(
        "  Tree:       depth {} ({} members max), {} recent roots accepted",
        config.tree.depth,
        1u64 << config.tree.depth,
        config.tree.root_history
    );
    println!("  Database:   {}", config.resolved_storage().path.display());
    println!("  Identities: {}", config.identities_dir().display());
}

fn print_keys(config: &GreeterConfig, status: &KeyStatus) {
    let dir = config.keys_dir();
    match status {
        KeyStatus::Prover { vk_hash } => {
            println!("  Keys:       {} (prove + verify, vk {})", dir.display(), vk_hash);
        }
        KeyStatus::VerifierOnly { vk_hash } => {
            println!("  Keys:       {} (verify only, vk {})", dir.display(), vk_hash);
        }
        KeyStatus::LocalSetup => {
            println!(
                "  Keys:       \x1b[38;5;226mnone in {}; a development setup runs on first use\x1b[0m",
                dir.display()
            );
        }
        KeyStatus::Missing => {
            println!(
                "  Keys:       \x1b[38;5;226mnone in {}\x1b[0m; run \x1b[38;5;51mgreeter-keygen generate --depth {} --output {}\x1b[0m",
                dir.display(),
                config.tree.depth,
                dir.display()
            );
        }
    }
}
