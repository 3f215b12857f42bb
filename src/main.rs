//! # Quality Harness CLI (`dqh`)
//!
//! The `dqh` binary is the primary interface for Quality Harness. It builds
//! the table index, answers discovery queries, runs data-quality
//! assessments and renders their reports.
//!
//! ## Usage
//!
//! ```bash
//! dqh --config ./config/dqh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqh init` | Create the SQLite database and run schema migrations |
//! | `dqh sources` | List configured sources and their health |
//! | `dqh index <source>` | Catalog a source and embed its tables |
//! | `dqh search "<query>"` | Rank indexed tables for a query |
//! | `dqh assess <dataset> [--source <name>]` | Run checks against one dataset |
//! | `dqh report <assessment.json>` | Re-render a saved assessment |
//! | `dqh check "<query>"` | Search, then assess the best table |
//! | `dqh serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! dqh index warehouse --schema main
//! dqh search "staging customers" --limit 5
//! dqh assess main.customers --source warehouse --check duplicates --format html
//! dqh report reports/dq_report_main_customers_20240101_000000.json --format html
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use quality_harness::assessment::Assessment;
use quality_harness::config::{self, Config};
use quality_harness::harness::{BuildOptions, Harness};
use quality_harness::ranker::SearchResponse;
use quality_harness::report::{self, ReportFormat};
use quality_harness::{migrate, server, sources};

/// Quality Harness CLI: semantic table discovery and data-quality
/// assessment.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqh",
    about = "Quality Harness: find tables by description and assess their data quality",
    version,
    long_about = "Quality Harness catalogs the tables of SQL and flat-file sources, embeds a \
    description of each into a local index, ranks tables for natural-language queries and runs \
    duplicate, null-value and descriptive-statistics checks with Markdown, HTML and JSON reports."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dqh.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the vector tables. Safe to run
    /// more than once.
    Init,

    /// List configured sources and whether they answer a connection probe.
    Sources,

    /// Catalog a source and write its tables to the index.
    ///
    /// Without `--append` the collection is rebuilt in a staging area and
    /// swapped in, so concurrent searches never see a partial index.
    Index {
        /// Source name or alias from `[sources]`.
        source: String,

        /// Database to scan instead of the source's current one.
        #[arg(long)]
        database: Option<String>,

        /// Schema to scan; repeat for several. Defaults to auto-discovery.
        #[arg(long = "schema")]
        schemas: Vec<String>,

        /// Upsert into the existing collection instead of rebuilding it.
        #[arg(long)]
        append: bool,

        /// Include sample rows in each table description.
        #[arg(long)]
        sample: bool,
    },

    /// Rank indexed tables for a natural-language query.
    Search {
        query: String,

        /// Maximum number of hits.
        #[arg(long)]
        limit: Option<usize>,

        /// Drop hits scoring below this relevance (0.0 to 1.0).
        #[arg(long)]
        min_relevance: Option<f64>,

        /// Prefer tables from this connector.
        #[arg(long)]
        connector: Option<String>,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run data-quality checks against one dataset.
    Assess {
        /// Dataset id, e.g. `main.customers` or `staging.orders.csv`.
        dataset: String,

        /// Source name or alias the dataset lives in. Inferred from an
        /// environment prefix in the dataset id when omitted.
        #[arg(long)]
        source: Option<String>,

        /// Check to run; repeat for several. Defaults to `[assessment].checks`.
        #[arg(long = "check")]
        checks: Vec<String>,

        /// Format printed to stdout: markdown, html or json.
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Also write every configured report format to disk.
        #[arg(long)]
        save: bool,

        /// Directory for saved reports. Defaults to `[reports].output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Re-render a saved JSON assessment without running any check.
    Report {
        path: PathBuf,

        #[arg(long, default_value = "markdown")]
        format: String,

        /// Also write every configured report format to `[reports].output_dir`.
        #[arg(long)]
        save: bool,
    },

    /// Search for the best matching table, assess it and save the reports.
    Check {
        query: String,

        #[arg(long = "check")]
        checks: Vec<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg)
                .await
                .context("Failed to initialize database")?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            let harness = open(cfg).await?;
            sources::print_sources(&harness.sources().await);
        }
        Commands::Index {
            source,
            database,
            schemas,
            append,
            sample,
        } => {
            let harness = open(cfg).await?;
            let options = BuildOptions {
                database,
                schemas,
                append,
                include_sample: sample.then_some(true),
            };
            let outcome = harness
                .build_index(&source, &options)
                .await
                .with_context(|| format!("Failed to index source '{}'", source))?;

            println!(
                "Indexed {} tables from '{}' into '{}' ({}, model {}).",
                outcome.report.documents,
                outcome.source,
                outcome.report.collection,
                if outcome.report.recreated { "rebuilt" } else { "appended" },
                outcome.report.model
            );
            for (table, reason) in &outcome.skipped {
                println!("  skipped {}: {}", table, reason);
            }
        }
        Commands::Search {
            query,
            limit,
            min_relevance,
            connector,
            json,
        } => {
            let harness = open(cfg).await?;
            let response = harness
                .search_tables(&query, limit, min_relevance, connector.as_deref())
                .await
                .context("Search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search(&response);
            }
        }
        Commands::Assess {
            dataset,
            source,
            checks,
            format,
            save,
            output_dir,
        } => {
            let format: ReportFormat = format.parse()?;
            let harness = open(cfg).await?;
            let source = match source.or_else(|| harness.infer_source(&dataset)) {
                Some(source) => source,
                None => anyhow::bail!(
                    "cannot tell which source holds '{}'; pass --source",
                    dataset
                ),
            };
            let assessment = harness.run_assessment(&dataset, &source, &checks).await;

            println!("{}", harness.render(&assessment, format)?);
            if save {
                save_reports(&harness, &assessment, output_dir.as_deref())?;
            }
        }
        Commands::Report { path, format, save } => {
            let format: ReportFormat = format.parse()?;
            let assessment = report::load_assessment(&path)
                .with_context(|| format!("Failed to load assessment: {}", path.display()))?;
            println!("{}", report::render(&assessment, format)?);
            if save {
                let written = report::persist(
                    &assessment,
                    &cfg.reports.output_dir,
                    &cfg.reports.formats,
                )?;
                for file in written.values() {
                    println!("Saved {}", file.display());
                }
            }
        }
        Commands::Check { query, checks } => {
            let harness = open(cfg).await?;
            let outcome = harness.check_query(&query, &checks).await?;
            print_search(&outcome.search);

            match outcome.assessment {
                Some(assessment) => {
                    println!();
                    println!("{}", harness.render(&assessment, ReportFormat::Markdown)?);
                    save_reports(&harness, &assessment, None)?;
                }
                None => println!("No table matched confidently; nothing assessed."),
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn open(cfg: Config) -> anyhow::Result<Harness> {
    Harness::open(cfg)
        .await
        .context("Failed to open the index database (did you run `dqh init`?)")
}

fn save_reports(
    harness: &Harness,
    assessment: &Assessment,
    output_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let written = harness
        .persist(assessment, output_dir, None)
        .context("Failed to save reports")?;
    for file in written.values() {
        println!("Saved {}", file.display());
    }
    Ok(())
}

fn print_search(response: &SearchResponse) {
    if let Some(connector) = &response.inferred_connector {
        println!("connector: {}", connector);
    }
    if response.hits.is_empty() {
        match &response.diagnostic {
            Some(diagnostic) => println!("No results. {}", diagnostic),
            None => println!("No results."),
        }
        return;
    }

    for hit in &response.hits {
        println!(
            "{}. [{:.2}] {} ({})",
            hit.rank, hit.boosted_score, hit.full_name, hit.connector_type
        );
        println!("    raw: {:.2}", hit.raw_similarity);
    }
}
