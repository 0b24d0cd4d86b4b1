//! Orgdir CLI
//!
//! - Building `.orgd` snapshots from seed documents (`db import`)
//! - Inspecting a directory (`db stats`, `db export`)
//! - One-shot lookups printed as JSON (`query ...`)
//! - Serving the read-only HTTP API (`serve`)

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use orgdir_core::{QueryConfig, DEFAULT_MAX_DEPTH};
use orgdir_storage::{load_directory, DirectoryStorage, StorageConfig};

mod query;
mod server;

#[derive(Parser)]
#[command(name = "orgdir")]
#[command(
    author,
    version,
    about = "Orgdir: a directory of organizations, their buildings and activities"
)]
struct Cli {
    /// Log filter, e.g. `info` or `orgdir_core=debug`.
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot management.
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Run one lookup against a directory and print the result as JSON.
    Query(QueryArgs),

    /// Serve the read-only HTTP API over a loaded directory.
    ///
    /// Endpoints live under `/api/v1` and require `X-API-Key`. `/healthz`
    /// needs no key.
    Serve(ServeArgs),
}

#[derive(Subcommand)]
enum DbCommands {
    /// Build a `.orgd` snapshot from a JSON seed document.
    Import {
        /// Seed document (`.json`: buildings, activities, organizations, tags, phones).
        #[arg(long)]
        seed: PathBuf,
        /// Output snapshot.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Write a directory back out as a JSON seed document.
    Export {
        #[arg(long, env = "ORGDIR_DATABASE")]
        db: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print row counts.
    Stats {
        #[arg(long, env = "ORGDIR_DATABASE")]
        db: PathBuf,
    },
}

/// Traversal depths for the activity queries.
#[derive(Args, Debug, Clone, Copy)]
struct DepthArgs {
    /// Levels expanded below an activity for by-activity lookups.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    activity_depth: u32,

    /// Levels expanded below the matched root for by-activity-name lookups.
    #[arg(long, default_value_t = QueryConfig::DEFAULT_NAME_ACTIVITY_DEPTH)]
    name_activity_depth: u32,
}

impl From<DepthArgs> for QueryConfig {
    fn from(args: DepthArgs) -> Self {
        QueryConfig {
            activity_depth: args.activity_depth,
            name_activity_depth: args.name_activity_depth,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Directory to query (`.orgd` snapshot or `.json` seed).
    #[arg(long, env = "ORGDIR_DATABASE")]
    db: PathBuf,

    #[command(flatten)]
    depth: DepthArgs,

    #[command(subcommand)]
    command: query::QueryCommands,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: std::net::SocketAddr,

    /// Directory to serve (`.orgd` snapshot or `.json` seed).
    #[arg(long, env = "ORGDIR_DATABASE")]
    db: PathBuf,

    /// Key every `/api/v1` request must send in `X-API-Key`.
    #[arg(long, env = "ORGDIR_API_KEY", hide_env_values = true)]
    api_key: String,

    /// If set, write a small JSON file once the server is listening.
    #[arg(long)]
    ready_file: Option<PathBuf>,

    #[command(flatten)]
    depth: DepthArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    match cli.command {
        Commands::Db { command } => match command {
            DbCommands::Import { seed, out } => cmd_db_import(&seed, &out),
            DbCommands::Export { db, out } => cmd_db_export(&db, &out),
            DbCommands::Stats { db } => cmd_db_stats(&db),
        },
        Commands::Query(args) => query::cmd_query(args.db, args.depth.into(), args.command),
        Commands::Serve(args) => server::cmd_serve(args),
    }
}

fn init_logging(filter: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|e| anyhow!("invalid --log filter `{filter}`: {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))
}

fn cmd_db_import(seed: &Path, out: &Path) -> Result<()> {
    let storage = DirectoryStorage::open(StorageConfig {
        db_path: seed.to_path_buf(),
    })?;
    storage.save_snapshot(out)?;

    let stats = storage.stats().unwrap_or_default();
    eprintln!(
        "{} {} ({} buildings, {} activities, {} organizations)",
        "wrote".green().bold(),
        out.display().to_string().bold(),
        stats.buildings,
        stats.activities,
        stats.organizations
    );
    Ok(())
}

fn cmd_db_export(db: &Path, out: &Path) -> Result<()> {
    let directory = load_directory(db)?;
    fs::write(out, directory.to_seed().to_json_pretty()?)
        .with_context(|| format!("writing {}", out.display()))?;
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}

fn cmd_db_stats(db: &Path) -> Result<()> {
    let directory = load_directory(db)?;
    let stats = directory.stats();

    println!("{} {}", "directory".green().bold(), db.display().to_string().bold());
    for (label, count) in [
        ("buildings", stats.buildings),
        ("activities", stats.activities),
        ("organizations", stats.organizations),
        ("organization activities", stats.organization_activities),
        ("organization phones", stats.organization_phones),
    ] {
        println!("  {:<24} {}", label, count.to_string().cyan());
    }
    if directory.is_empty() {
        println!("  {}", "(empty)".yellow());
    }
    Ok(())
}
