mod logging;
mod node;
mod tree;
mod types;

pub use logging::LoggingConfig;
pub use node::{GreeterConfig, KeyStatus};
pub use tree::{KeysConfig, TreeConfig};
pub use types::LogLevel;
