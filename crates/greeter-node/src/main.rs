mod cli;

use clap::Parser;
use cli::{
    default_data_dir, greet, handle_config, handle_identity, init_logging, init_node,
    load_config, register, show_board, show_root, show_stats, snapshot, submit, verify, Cli,
    Commands, GreetArgs,
};
use greeter_node::{GreeterNode, LoggingConfig};
use greeter_types::GreeterResult;

#[tokio::main]
async fn main() -> GreeterResult<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    // A broken config file should still be reportable by `config validate`.
    let config = load_config(&config_path, cli.data_dir.as_deref());
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    init_logging(&cli, &logging)?;

    match cli.command {
        Commands::Init { force, depth, setup_keys } => {
            init_node(&config_path, &data_dir, force, depth, setup_keys).await?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, cli.data_dir.as_deref(), action)?;
        }
        Commands::Identity { action } => {
            handle_identity(action, &config?.identities_dir(), &cli.format)?;
        }
        command => {
            let config = config?;
            let node = GreeterNode::open(&config).await?;
            let identities_dir = config.identities_dir();

            match command {
                Commands::Register { id, commitment } => {
                    register(&node, &identities_dir, id, commitment, &cli.format).await?;
                }
                Commands::Root => show_root(&node, &cli.format).await?,
                Commands::Snapshot { output } => snapshot(&node, output).await?,
                Commands::Greet { id, message, topic, output, no_submit } => {
                    let args = GreetArgs { id, message, topic, output, no_submit };
                    greet(&node, &identities_dir, args, &cli.format).await?;
                }
                Commands::Verify { signal } => verify(&node, &signal, &cli.format).await?,
                Commands::Submit { signal } => submit(&node, &signal, &cli.format).await?,
                Commands::Board { from } => show_board(&node, from, &cli.format)?,
                Commands::Stats => show_stats(&node, &cli.format).await?,
                Commands::Init { .. } | Commands::Config { .. } | Commands::Identity { .. } => {}
            }
        }
    }

    Ok(())
}
