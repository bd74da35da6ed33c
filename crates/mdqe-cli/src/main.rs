//! mdqe — metadata quality check runner.
//!
//! ## Commands
//!
//! - `check`: run a single check against a metadata document and print its
//!   result JSON (also the worker entry point for suite runs)
//! - `suite`: run a suite of checks across a worker pool and print the
//!   aggregated report JSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use mdqe_core::{
    CheckExecutor, ExecutorOptions, HttpCatalogClient, Registry, RunDisposition, StoreConfig,
    SuiteRunner, SuiteRunnerOptions, DEFAULT_NODE_REGISTRY,
};

#[derive(Parser)]
#[command(name = "mdqe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Metadata quality check execution engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single check against a metadata document
    Check {
        /// Path to the check definition XML
        #[arg(long)]
        check: PathBuf,

        /// Path to the metadata document under check
        #[arg(long)]
        metadata: PathBuf,

        /// Path to the document's system metadata
        #[arg(long)]
        sysmeta: PathBuf,

        /// Store configuration JSON forwarded to check routines
        #[arg(long)]
        store_config: Option<PathBuf>,

        /// Node registry used to resolve catalog endpoints
        #[arg(long, default_value = DEFAULT_NODE_REGISTRY)]
        node_registry: String,

        /// Directory hint for routines that read bundled resources
        #[arg(long)]
        resources_dir: Option<PathBuf>,

        /// Skip catalog resolution (no associated data pids)
        #[arg(long)]
        offline: bool,
    },

    /// Run a suite of checks and print the aggregated report
    Suite {
        /// Path to the suite definition XML
        #[arg(long)]
        suite: PathBuf,

        /// Directory containing check definition XML files
        #[arg(long)]
        checks_dir: PathBuf,

        /// Path to the metadata document under check
        #[arg(long)]
        metadata: PathBuf,

        /// Path to the document's system metadata
        #[arg(long)]
        sysmeta: PathBuf,

        /// Store configuration JSON forwarded to check routines
        #[arg(long)]
        store_config: Option<PathBuf>,

        /// Node registry used to resolve catalog endpoints
        #[arg(long)]
        node_registry: Option<String>,

        /// Directory hint for routines that read bundled resources
        #[arg(long)]
        resources_dir: Option<PathBuf>,

        /// Skip catalog resolution (no associated data pids)
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    mdqe_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Check {
            check,
            metadata,
            sysmeta,
            store_config,
            node_registry,
            resources_dir,
            offline,
        } => {
            let store_config = store_config
                .map(|path| StoreConfig::from_json_file(&path))
                .transpose()?;
            let executor = CheckExecutor::with_options(
                Arc::new(Registry::with_builtins()),
                Arc::new(HttpCatalogClient::new(node_registry)),
                ExecutorOptions {
                    offline,
                    resources_dir,
                },
            );
            let disposition = executor
                .run(&check, &metadata, &sysmeta, store_config)
                .await?;
            match disposition {
                RunDisposition::Completed(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                RunDisposition::Skipped { check_id, reason } => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "check_id": check_id,
                            "skipped": reason,
                        }))?
                    );
                }
            }
        }

        Commands::Suite {
            suite,
            checks_dir,
            metadata,
            sysmeta,
            store_config,
            node_registry,
            resources_dir,
            offline,
        } => {
            // Fail fast on a bad store configuration before spawning workers.
            if let Some(path) = &store_config {
                StoreConfig::from_json_file(path)?;
            }
            let runner = SuiteRunner::new(SuiteRunnerOptions {
                parallelism: None,
                offline,
                node_registry,
                store_config_path: store_config,
                resources_dir,
                worker_exe: None,
            });
            let report = runner.run(&suite, &checks_dir, &metadata, &sysmeta).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
