//! tklmerge - merge the keyframe tables of several `.tmd` models into one `.tkl`
//!
//! Models that reference different tables are rewritten against a single master table whose
//! slots hold a reduced set of the locations and rotations they all use.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tklmerge::LutKind;
use tklmerge::binary::{TABLE_MAGIC, decode_model, decode_table};

#[derive(Parser)]
#[command(name = "tklmerge")]
#[command(about = "Merge model keyframe tables into a single master table")]
#[command(version)]
struct Cli {
    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge models into one table and write the rewritten set
    Merge {
        /// TOML file with merge settings (flags override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Table whose slot counts bound the merged table
        #[arg(short, long)]
        master: Option<String>,

        /// Output directory (default: ./merged)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// File name fragment of models sharing animation data (repeatable)
        #[arg(short, long = "family")]
        families: Vec<String>,

        /// Seed for the clustering initialisation
        #[arg(long)]
        seed: Option<u64>,

        /// Fail instead of merging distinct values when a table is too small
        #[arg(long)]
        strict: bool,

        /// Write the merge report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Input models
        models: Vec<PathBuf>,
    },

    /// Print the table references and key counts of models and tables
    Inspect {
        /// `.tmd` or `.tkl` files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Merge {
            config,
            master,
            output,
            families,
            seed,
            strict,
            report,
            models,
        } => {
            let overrides = config::Overrides {
                master,
                output,
                families,
                seed,
                strict,
                models,
            };
            let config = config::resolve(config.as_deref(), overrides)?;
            let merged = tklmerge::merge(&config).context("Merge failed")?;
            if merged.locations.is_lossy() || merged.rotations.is_lossy() {
                tracing::info!("Done (lossy)");
            } else {
                tracing::info!("Done!");
            }
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&merged)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
            }
        }

        Commands::Inspect { files } => {
            for path in &files {
                inspect(path)?;
            }
        }
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.starts_with(TABLE_MAGIC) {
        let table = decode_table(&bytes).with_context(|| format!("{}", path.display()))?;
        println!(
            "{}: table '{}', {} locations, {} rotations",
            path.display(),
            table.name(),
            table.len(LutKind::Location),
            table.len(LutKind::Rotation)
        );
        return Ok(());
    }

    let model = decode_model(&bytes).with_context(|| format!("{}", path.display()))?;
    let counts = model.key_counts();
    println!(
        "{}: table '{}', {} nodes, {} animations, {} location keys, {} rotation keys",
        path.display(),
        model.header.table_name(),
        model.header.scene.num_nodes,
        model.animations.len(),
        counts.locations,
        counts.rotations
    );
    for anim in &model.animations {
        println!(
            "  {:<15} {:>7.3}s  {} channels",
            anim.name(),
            anim.duration,
            anim.channels.len()
        );
    }
    Ok(())
}
