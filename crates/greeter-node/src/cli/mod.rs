mod commands;
mod config_cmd;
mod identity;
mod init;
mod membership;
mod signal;
mod utils;

pub use commands::{Cli, Commands};
pub use config_cmd::handle_config;
pub use identity::handle_identity;
pub use init::init_node;
pub use membership::{register, show_root, show_stats, snapshot};
pub use signal::{greet, show_board, submit, verify, GreetArgs};
pub use utils::{default_data_dir, init_logging, load_config};
