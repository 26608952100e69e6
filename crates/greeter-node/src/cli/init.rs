use greeter_node::{load_backend, GreeterConfig};
use greeter_types::{GreeterError, GreeterResult, MAX_TREE_DEPTH};
use std::path::Path;

pub async fn init_node(
    config_path: &Path,
    data_dir: &Path,
    force: bool,
    depth: Option<usize>,
    setup_keys: bool,
) -> GreeterResult<()> {
    println!("\x1b[38;5;46mInitializing greeter...\x1b[0m");
    println!();

    if config_path.exists() && !force {
        println!("\x1b[38;5;226mConfiguration already exists at {:?}\x1b[0m", config_path);
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| GreeterError::Config(format!("Failed to create data directory: {}", e)))?;

    let mut config = GreeterConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    if let Some(depth) = depth {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "depth must be between 1 and {}",
                MAX_TREE_DEPTH
            )));
        }
        config.tree.depth = depth;
    }
    config.keys.setup_if_missing = setup_keys;
    config.validate()?;
    config.save(config_path)?;

    std::fs::create_dir_all(config.identities_dir())
        .map_err(|e| GreeterError::Config(format!("Failed to create identities dir: {}", e)))?;

    if setup_keys {
        println!("Running local trusted setup for depth {}...", config.tree.depth);
        load_backend(&config.keys_dir(), config.tree.depth, true).await?;
        println!("\x1b[38;5;46m[+]\x1b[0m Development keys in {:?}", config.keys_dir());
    }

    println!();
    println!("\x1b[38;5;46m[+]\x1b[0m Greeter initialized");
    println!("  Config: \x1b[38;5;51m{:?}\x1b[0m", config_path);
    println!("  Data:   \x1b[38;5;51m{:?}\x1b[0m", data_dir);
    println!("  Depth:  {} ({} members max)", config.tree.depth, 1u64 << config.tree.depth);
    println!();
    println!("\x1b[38;5;226mNext steps:\x1b[0m");
    if !setup_keys {
        println!(
            "  0. Generate keys: \x1b[38;5;51mgreeter-keygen generate --depth {} --output {:?}\x1b[0m",
            config.tree.depth,
            config.keys_dir()
        );
    }
    println!("  1. Create an identity: \x1b[38;5;51mgreeter identity new --label me\x1b[0m");
    println!("  2. Join the group:     \x1b[38;5;51mgreeter register me\x1b[0m");
    println!("  3. Say hello:          \x1b[38;5;51mgreeter greet me hello\x1b[0m");

    Ok(())
}
