use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "greeter")]
#[command(version = BUILD_VERSION)]
#[command(about = "Greeter - anonymous greetings from a registered group")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "GREETER_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Initialize a data directory")]
    #[command(long_about = "Initialize configuration for a new group.\n\nWrites config.toml and, with --setup-keys, runs a local trusted setup for the chosen depth.")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
        #[arg(long, value_name = "DEPTH", help = "Membership tree depth")]
        depth: Option<usize>,
        #[arg(long, help = "Generate development keys now if none exist")]
        setup_keys: bool,
    },

    #[command(about = "Manage member identities")]
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    #[command(about = "Register an identity commitment into the group")]
    Register {
        #[arg(help = "Identity ID or label", required_unless_present = "commitment")]
        id: Option<String>,
        #[arg(long, value_name = "HEX", help = "Register a raw commitment instead")]
        commitment: Option<String>,
    },

    #[command(about = "Show the current membership root")]
    Root,

    #[command(about = "Export the commitment set")]
    Snapshot {
        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Prove membership and publish a greeting")]
    Greet {
        #[arg(help = "Identity ID or label")]
        id: String,
        #[arg(help = "Greeting text (at most 31 bytes)")]
        message: String,
        #[arg(long, help = "Signal scope (defaults to the message)")]
        topic: Option<String>,
        #[arg(long, short, help = "Also write the signal to this file")]
        output: Option<PathBuf>,
        #[arg(long, help = "Build the signal without submitting it")]
        no_submit: bool,
    },

    #[command(about = "Check a signal file without recording it")]
    Verify {
        #[arg(help = "Signal JSON file")]
        signal: PathBuf,
    },

    #[command(about = "Submit a signal file")]
    Submit {
        #[arg(help = "Signal JSON file")]
        signal: PathBuf,
    },

    #[command(about = "List accepted greetings")]
    Board {
        #[arg(long, default_value_t = 0, help = "First sequence number to show")]
        from: u64,
    },

    #[command(about = "Show statistics")]
    Stats,

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Validate configuration")]
    Validate,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    #[command(about = "Create a new identity")]
    New {
        #[arg(long, help = "Label for the identity")]
        label: Option<String>,
        #[arg(long, value_name = "FILE", help = "Derive from a 32..1024 byte seed file instead of randomness")]
        seed_file: Option<PathBuf>,
    },
    #[command(about = "List all identities")]
    List,
    #[command(about = "Show identity details")]
    Show {
        #[arg(help = "Identity ID or label")]
        id: String,
    },
}
