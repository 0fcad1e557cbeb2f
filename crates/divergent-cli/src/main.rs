//! CLI for divergent: score byte streams against a persistent entropy baseline.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use divergent_core::DEFAULT_STORE;

#[derive(Parser)]
#[command(name = "divergent")]
#[command(about = "divergent: how far is this data from everything seen before?")]
#[command(version = divergent_core::VERSION)]
struct Cli {
    /// Log pipeline, engine and store progress (overrides the default `warn` filter)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a file against the reference store and optionally absorb it.
    /// Exit status bits: 1 error, 2 warning, 4 alert.
    Score {
        /// File whose bytes are scored
        input: PathBuf,

        /// Reference store file (created on first absorbing run)
        #[arg(long, default_value = DEFAULT_STORE)]
        store: PathBuf,

        /// Geometry byte: granularity, densify, surroundify, deltas, channelize, overlap
        #[arg(long, default_value = "0")]
        geometry: String,

        /// Mode byte: absorb, reset, polarity, asymmetric divergence
        #[arg(long, default_value = "0")]
        mode: String,

        /// Mundane threshold: a fraction in [0, 1] or a 0x-prefixed 128-bit word
        #[arg(long, default_value = "0.5")]
        threshold: String,

        /// Sweep window in masks; 0 scores the whole input
        #[arg(long, default_value_t = 0)]
        sweep: u64,

        /// Write the full report as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Verify a store file and summarize its contents
    Inspect {
        /// Store file to verify
        store: PathBuf,

        /// Alphabet size the store was built for
        #[arg(long)]
        alphabet: u64,

        /// Number of most frequent masks to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Write a fresh, all-zero store for a geometry
    Init {
        /// Store file to create
        store: PathBuf,

        /// Geometry byte (densify is not allowed: its alphabet depends on data)
        #[arg(long, default_value = "0")]
        geometry: String,

        /// Overwrite an existing store
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Score {
            input,
            store,
            geometry,
            mode,
            threshold,
            sweep,
            output,
        } => commands::score::run(commands::score::ScoreCommandConfig {
            input: &input,
            store: &store,
            geometry: &geometry,
            mode: &mode,
            threshold: &threshold,
            sweep,
            output_path: output.as_deref(),
        }),
        Commands::Inspect {
            store,
            alphabet,
            top,
        } => commands::inspect::run(&store, alphabet, top),
        Commands::Init {
            store,
            geometry,
            force,
        } => commands::init::run(&store, &geometry, force),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => commands::fail(&e),
    };
    std::process::exit(i32::from(code));
}
