//! Command line front-end for multisearch archives.
//!
//! - `build` turns a `shard<TAB>phrase` file into an archive
//! - `query` searches an archive
//! - `stats` prints per-shard counts

mod commands;
mod config;
mod telemetry;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{QueryArgs, run_build, run_query, run_stats};

#[derive(Parser, Debug)]
#[command(name = "multisearch")]
#[command(about = "Build and search sharded semantic archives", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML settings file; defaults to `<command>.toml` when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an archive from tab-separated dialogue lines
    Build {
        /// Input file, one `shard<TAB>phrase` per line
        #[arg(short, long)]
        input: PathBuf,

        /// Archive to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Search an archive
    Query {
        #[arg(short, long)]
        archive: PathBuf,

        /// Query text
        #[arg(short, long)]
        text: String,

        /// Number of results
        #[arg(short, long, conflicts_with = "all")]
        k: Option<usize>,

        /// Return every candidate
        #[arg(long)]
        all: bool,

        /// Restrict the search to one shard; an empty value selects the default shard
        #[arg(short, long)]
        shard: Option<String>,

        /// Rank sentences instead of phrases
        #[arg(long)]
        sentences: bool,
    },

    /// Print phrase and sentence counts per shard
    Stats {
        #[arg(short, long)]
        archive: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Build { input, output } => run_build(cli.config, &input, &output),
        Command::Query {
            archive,
            text,
            k,
            all,
            shard,
            sentences,
        } => run_query(
            cli.config,
            &QueryArgs {
                archive,
                text,
                k,
                all,
                shard,
                sentences,
            },
        ),
        Command::Stats { archive } => run_stats(cli.config, &archive),
    }
}
