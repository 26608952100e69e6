use super::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Crates whose events `level` applies to.
const GREETER_TARGETS: [&str; 3] = ["greeter", "greeter_node", "greeter_crypto"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the greeter crates.
    pub level: LogLevel,
    /// Level for everything else (sled, tokio).
    pub dependencies: LogLevel,
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            dependencies: LogLevel::Warn,
            file: None,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives: the dependency level as default, then one
    /// directive per greeter crate.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.dependencies.to_string()];
        directives.extend(
            GREETER_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.level)),
        );
        directives.join(",")
    }
}
