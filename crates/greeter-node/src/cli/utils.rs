use super::commands::{Cli, OutputFormat};
use greeter_node::{GreeterConfig, LogLevel, LoggingConfig};
use greeter_types::{GreeterError, GreeterResult, Signal, Verdict};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(cli: &Cli, logging: &LoggingConfig) -> GreeterResult<()> {
    let level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => logging.filter_directives(),
            1 => LoggingConfig {
                level: LogLevel::Debug,
                ..logging.clone()
            }
            .filter_directives(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = cli.log_json || logging.json;
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match cli.log_file.clone().or_else(|| logging.file.clone()) {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    GreeterError::Config(format!("Failed to open log file {:?}: {}", log_file, e))
                })?;
            let writer = std::sync::Mutex::new(file);
            if json {
                subscriber.with(fmt::layer().json().with_writer(writer)).init();
            } else {
                subscriber
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .init();
            }
        }
        None if json => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        None => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(cli.verbose >= 2)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(())
}

/// Config file contents. `--data-dir`, when given, replaces the file's
/// `data_dir`.
pub fn load_config(config_path: &Path, data_dir: Option<&Path>) -> GreeterResult<GreeterConfig> {
    let mut config = GreeterConfig::load(config_path)?;
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    }
    Ok(config)
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".greeter"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/greeter"))
}

pub fn read_signal(path: &Path) -> GreeterResult<Signal> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GreeterError::Storage(format!("Failed to read {:?}: {}", path, e)))?;
    serde_json::from_str(&content)
        .map_err(|e| GreeterError::Serialization(format!("Invalid signal file {:?}: {}", path, e)))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> GreeterResult<()> {
    let content = to_json(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| GreeterError::Storage(format!("Failed to create {:?}: {}", parent, e)))?;
    }
    std::fs::write(path, content)
        .map_err(|e| GreeterError::Storage(format!("Failed to write {:?}: {}", path, e)))
}

pub fn to_json<T: Serialize>(value: &T) -> GreeterResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| GreeterError::Serialization(format!("Failed to serialize: {}", e)))
}

pub fn print_json<T: Serialize>(value: &T) -> GreeterResult<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

pub fn print_verdict(verdict: &Verdict, format: &OutputFormat) -> GreeterResult<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "accepted": verdict.is_accepted(),
            "verdict": verdict,
        })),
        OutputFormat::Text => {
            if verdict.is_accepted() {
                println!("\x1b[38;5;46m[+]\x1b[0m Greeting accepted");
            } else {
                println!("\x1b[38;5;196m[-]\x1b[0m Greeting {}", verdict);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("greeter.toml");
        let config = GreeterConfig {
            data_dir: dir.join("from-file"),
            ..Default::default()
        };
        config.save(&path).unwrap();
        path
    }

    #[test]
    fn test_file_data_dir_kept_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());

        let config = load_config(&path, None).unwrap();
        assert_eq!(config.data_dir, dir.path().join("from-file"));
        assert_eq!(config.keys_dir(), dir.path().join("from-file").join("keys"));
    }

    #[test]
    fn test_flag_overrides_file_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());

        let config = load_config(&path, Some(&dir.path().join("flag"))).unwrap();
        assert_eq!(config.data_dir, dir.path().join("flag"));
    }
}
