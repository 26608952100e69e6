use super::commands::OutputFormat;
use super::identity::{find_identity, record_index};
use super::utils::{print_json, to_json, write_json};
use greeter_node::GreeterNode;
use greeter_types::{Commitment, GreeterResult};
use std::path::{Path, PathBuf};

pub async fn register(
    node: &GreeterNode,
    identities_dir: &Path,
    id: Option<String>,
    commitment: Option<String>,
    format: &OutputFormat,
) -> GreeterResult<()> {
    let (commitment, file) = match (commitment, id) {
        (Some(hex), _) => (Commitment::from_hex(&hex)?, None),
        (None, Some(id)) => {
            let file = find_identity(identities_dir, &id)?;
            (file.commitment, Some(file))
        }
        (None, None) => {
            return Err(greeter_types::GreeterError::Config(
                "give an identity or --commitment".into(),
            ))
        }
    };

    let index = node.register(commitment).await?;
    node.flush().await?;
    if let Some(file) = file {
        record_index(identities_dir, file, index)?;
    }
    let root = node.current_root().await;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "commitment": commitment,
            "index": index,
            "root": root,
        })),
        OutputFormat::Text => {
            println!("\x1b[38;5;46m[+]\x1b[0m Registered as member #{}", index);
            println!("  New root: {}", root.to_hex());
            Ok(())
        }
    }
}

pub async fn show_root(node: &GreeterNode, format: &OutputFormat) -> GreeterResult<()> {
    let root = node.current_root().await;
    let members = node.accumulator().len().await;
    let depth = node.accumulator().depth().await;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "root": root,
            "members": members,
            "depth": depth,
        })),
        OutputFormat::Text => {
            println!("Root:    {}", root.to_hex());
            println!("Members: {} / {}", members, 1u64 << depth);
            Ok(())
        }
    }
}

pub async fn snapshot(node: &GreeterNode, output: Option<PathBuf>) -> GreeterResult<()> {
    let snapshot = node.accumulator().snapshot().await;
    match output {
        Some(path) => {
            write_json(&path, &snapshot)?;
            println!(
                "\x1b[38;5;46m[+]\x1b[0m Wrote {} commitments to {:?}",
                snapshot.commitments.len(),
                path
            );
        }
        None => println!("{}", to_json(&snapshot)?),
    }
    Ok(())
}

pub async fn show_stats(node: &GreeterNode, format: &OutputFormat) -> GreeterResult<()> {
    let stats = node.stats().await;
    let storage = node.storage().map(|s| s.storage_metrics().snapshot());

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "members": stats.members,
            "registrations": stats.registrations,
            "rejected_registrations": stats.rejected_registrations,
            "accepted_greetings": stats.accepted_greetings,
            "repeat_signals": stats.repeat_signals,
            "scopes": stats.scopes,
            "prover": {
                "generated": stats.prover.generated,
                "cancelled": stats.prover.cancelled,
                "failed": stats.prover.failed,
                "verified_valid": stats.prover.verified_valid,
                "verified_invalid": stats.prover.verified_invalid,
            },
            "storage": storage,
        })),
        OutputFormat::Text => {
            println!("Members:            {}", stats.members);
            println!(
                "Registrations:      {} ({} rejected)",
                stats.registrations, stats.rejected_registrations
            );
            println!("Accepted greetings: {}", stats.accepted_greetings);
            println!("Repeat signals:     {}", stats.repeat_signals);
            println!("Scopes:             {}", stats.scopes);
            println!(
                "Proofs verified:    {} valid, {} invalid",
                stats.prover.verified_valid, stats.prover.verified_invalid
            );
            if let Some(s) = storage {
                println!("Storage reads:      {}", s.reads);
                println!("Storage writes:     {}", s.writes);
                println!("Storage flushes:    {}", s.flushes);
            }
            Ok(())
        }
    }
}
