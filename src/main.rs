//! # Member Chat CLI (`mchat`)
//!
//! ## Usage
//!
//! ```bash
//! mchat --config ./config/mchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mchat init` | Create the SQLite database and run schema migrations |
//! | `mchat seed <file>` | Upsert members from a JSON fixture |
//! | `mchat get <id>` | Print a stored member |
//! | `mchat ask "<query>"` | Run one query through the pipeline |
//! | `mchat serve` | Start the HTTP server |
//!
//! Logging goes to stderr. `RUST_LOG` overrides `[logging].filter`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use member_chat::orchestrator::ChatOrchestrator;
use member_chat::{config, get, migrate, seed, server};

/// Member Chat CLI: route questions to general chat or a validated member
/// lookup.
#[derive(Parser)]
#[command(
    name = "mchat",
    about = "Member Chat: an LLM-orchestrated chat pipeline over a member database",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Upsert members from a JSON fixture into SQLite.
    Seed {
        /// JSON array of members.
        file: PathBuf,
    },

    /// Print a stored member. The credential is never shown.
    Get {
        /// Member id.
        id: i64,
    },

    /// Run one query through the chat pipeline and print the answer.
    Ask {
        /// The question.
        query: String,

        /// Also print the stage reached, the degraded flag and the audit SQL.
        #[arg(long)]
        trace: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.filter);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { file } => {
            seed::run_seed(&cfg, &file).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Ask { query, trace } => {
            let orchestrator = ChatOrchestrator::from_config(&cfg).await?;
            let result = orchestrator.process(&query).await;
            println!("{}", result.text);
            if trace {
                println!();
                println!("--- Trace ---");
                println!("stage:    {:?}", result.stage_reached);
                println!("degraded: {}", result.degraded);
                if let Some(sql) = &result.sql {
                    println!("sql:");
                    for line in sql.lines() {
                        println!("  {}", line);
                    }
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
