//! seance-timeline - debug tool that prints a normalized QA timeline
//!
//! Reads a JSON file containing an array of QA pairs (the shape the backend's
//! `list_session_qa_pairs` operation returns) and prints the flattened,
//! newest-first feed the UI would render.

use anyhow::{Context, Result};
use clap::Parser;
use seance_core::timeline;
use seance_core::types::QaPair;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seance-timeline")]
#[command(about = "Normalize a QA-pairs file into a timeline feed")]
#[command(version)]
struct Args {
    /// JSON file containing an array of QA pairs
    file: PathBuf,

    /// Print full message JSON instead of one summary line per message
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let pairs: Vec<QaPair> =
        serde_json::from_str(&content).context("failed to parse QA pairs")?;

    let feed = timeline::from_qa_pairs(&pairs);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else {
        for message in &feed {
            println!(
                "{} [{}] {} {}",
                message.ts.format("%Y-%m-%d %H:%M:%S"),
                message.kind.as_str(),
                message.uuid,
                message.summary.as_deref().unwrap_or("")
            );
        }
        println!(
            "{} pairs -> {} messages",
            pairs.len(),
            feed.len()
        );
    }

    Ok(())
}
