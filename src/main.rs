//! # refdex CLI (`index`)
//!
//! The `index` binary builds snapshot files from a Markdown tree and
//! answers budgeted queries against them, either one-shot from the command
//! line or from a long-running HTTP service.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `index build <source-dir> <index-out>` | Build a snapshot from a Markdown tree |
//! | `index query <index-file> --q "<text>" --budget <n>` | Budgeted retrieval |
//! | `index rank <index-file> --q "<text>"` | Ranked section list |
//! | `index stats <index-file>` | Snapshot summary |
//! | `index serve <source-dir>` | Build in the background and serve HTTP |
//! | `index completions <shell>` | Print shell completions |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | Success |
//! | `1` | I/O, configuration, usage or snapshot error |
//! | `2` | A source document was malformed (skipped, or `--strict` aborted) |
//! | `3` | Empty query, or a budget smaller than every section |

use clap::{CommandFactory, Parser, Subcommand};
use refdex::config::load_config_or_default;
use refdex::progress::ProgressMode;
use refdex::{logging, pipeline, query, server, stats};
use refdex_core::Error as CoreError;
use std::path::PathBuf;
use std::process::ExitCode;

/// refdex: index Markdown reference docs and retrieve the sections that
/// fit a token budget.
#[derive(Parser)]
#[command(
    name = "index",
    about = "refdex: a Markdown reference-documentation indexer with token-budgeted retrieval",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index snapshot from a directory of Markdown files.
    ///
    /// Malformed documents (unclosed code fences) are skipped and reported;
    /// the snapshot is still written and the command exits with code 2.
    Build {
        /// Corpus root directory.
        source: PathBuf,
        /// Snapshot file to write (replaced atomically).
        out: PathBuf,
        /// Abort without writing anything if any document is malformed.
        #[arg(long)]
        strict: bool,
        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Retrieve the most relevant sections that fit a token budget.
    Query {
        /// Snapshot file written by `index build`.
        index: PathBuf,
        /// Query text.
        #[arg(long = "q")]
        q: String,
        /// Maximum total tokens returned. Defaults to `[retrieval].default_budget`.
        #[arg(long)]
        budget: Option<usize>,
        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
        /// Include per-term score contributions.
        #[arg(long)]
        explain: bool,
    },

    /// List ranked sections without their text.
    Rank {
        index: PathBuf,
        #[arg(long = "q")]
        q: String,
        /// Defaults to `[ranking].default_limit`.
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        explain: bool,
    },

    /// Summarize an index snapshot.
    Stats { index: PathBuf },

    /// Build a corpus in the background and serve queries over HTTP.
    Serve {
        source: PathBuf,
        /// Listen address. Defaults to `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::from(1);
        }
        Err(err) => err.exit(),
    };

    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if let Some(minimum) = core_error(&err).and_then(CoreError::minimum_budget) {
                eprintln!("hint: use --budget {} or larger", minimum);
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "index", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            source,
            out,
            strict,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let report = pipeline::run_build(&cfg, &source, &out, strict, progress).await?;
            if report.skipped > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Query {
            index,
            q,
            budget,
            json,
            explain,
        } => {
            query::run_query(&cfg, &index, &q, budget, json, explain)?;
        }
        Commands::Rank {
            index,
            q,
            limit,
            explain,
        } => {
            query::run_rank(&cfg, &index, &q, limit, explain)?;
        }
        Commands::Stats { index } => {
            stats::run_stats(&index)?;
        }
        Commands::Serve { source, bind } => {
            server::run_server(&cfg, &source, bind).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn core_error(err: &anyhow::Error) -> Option<&CoreError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CoreError>())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match core_error(err) {
        Some(CoreError::MalformedDocument { .. }) => 2,
        Some(CoreError::EmptyQuery | CoreError::BudgetTooSmall { .. }) => 3,
        _ => 1,
    }
}
