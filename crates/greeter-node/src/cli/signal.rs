use super::commands::OutputFormat;
use super::identity::find_identity;
use super::utils::{print_json, print_verdict, read_signal, write_json};
use greeter_node::{CancellationToken, GreeterNode};
use greeter_types::{GreeterResult, Verification};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct GreetArgs {
    pub id: String,
    pub message: String,
    pub topic: Option<String>,
    pub output: Option<PathBuf>,
    pub no_submit: bool,
}

pub async fn greet(
    node: &GreeterNode,
    identities_dir: &Path,
    args: GreetArgs,
    format: &OutputFormat,
) -> GreeterResult<()> {
    let identity = find_identity(identities_dir, &args.id)?.identity()?;

    let (handle, token) = CancellationToken::new();
    let interrupt = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.cancel(),
            // Without a signal handler, never cancel.
            Err(_) => std::future::pending::<()>().await,
        }
    });

    info!("Generating membership proof...");
    let result = node
        .greet_cancellable(
            &identity,
            args.message.as_bytes(),
            args.topic.as_deref().map(str::as_bytes),
            token,
        )
        .await;
    interrupt.abort();
    let signal = result?;

    if let Some(path) = &args.output {
        write_json(path, &signal)?;
        info!("Signal written to {:?}", path);
    }

    if args.no_submit {
        return match format {
            OutputFormat::Json => print_json(&signal),
            OutputFormat::Text => {
                println!("\x1b[38;5;46m[+]\x1b[0m Signal ready (not submitted)");
                println!("  Nullifier hash: {}", signal.nullifier_hash.to_hex());
                println!("  Root:           {}", signal.public_signals.root.to_hex());
                Ok(())
            }
        };
    }

    let verdict = node.submit(&signal).await?;
    node.flush().await?;
    print_verdict(&verdict, format)
}

pub async fn verify(node: &GreeterNode, path: &Path, format: &OutputFormat) -> GreeterResult<()> {
    let signal = read_signal(path)?;
    let verification = node.check(&signal).await;
    let already_used = node
        .registry()
        .is_seen(&signal.scope(), &signal.nullifier_hash)
        .await;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "valid": verification.is_valid(),
            "reason": match verification {
                Verification::Valid => None,
                Verification::Invalid(reason) => Some(reason),
            },
            "already_used": already_used,
        })),
        OutputFormat::Text => {
            match verification {
                Verification::Valid => println!("\x1b[38;5;46m[+]\x1b[0m Proof is valid"),
                Verification::Invalid(reason) => {
                    println!("\x1b[38;5;196m[-]\x1b[0m Proof is invalid: {}", reason)
                }
            }
            if already_used {
                println!("    This nullifier has already been used in its scope");
            }
            Ok(())
        }
    }
}

pub async fn submit(node: &GreeterNode, path: &Path, format: &OutputFormat) -> GreeterResult<()> {
    let signal = read_signal(path)?;
    let verdict = node.submit(&signal).await?;
    node.flush().await?;
    print_verdict(&verdict, format)
}

pub fn show_board(node: &GreeterNode, from: u64, format: &OutputFormat) -> GreeterResult<()> {
    let events: Vec<_> = node
        .board()
        .events()
        .into_iter()
        .skip(from as usize)
        .collect();

    match format {
        OutputFormat::Json => print_json(&events),
        OutputFormat::Text => {
            if events.is_empty() {
                println!("No greetings yet");
            }
            for event in &events {
                let when = chrono::DateTime::from_timestamp_millis(event.accepted_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!(
                    "#{:<5} {}  {:<32} {}",
                    event.sequence,
                    when,
                    event.message_lossy(),
                    event.nullifier_hash.short()
                );
            }
            Ok(())
        }
    }
}
