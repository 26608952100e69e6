use greeter_types::{DEFAULT_ROOT_HISTORY, DEFAULT_TREE_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Fixed for the life of a data directory.
    pub depth: usize,
    /// Superseded roots that signals may still be proven against.
    pub root_history: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            root_history: DEFAULT_ROOT_HISTORY,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Defaults to `<data_dir>/keys`.
    pub dir: Option<PathBuf>,
    /// Run a local trusted setup when no keys are found. Development only.
    pub setup_if_missing: bool,
}
