//! PolicyPal CLI - classify, summarise and score policy pages
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use policypal::coordinator::RequestOutcome;
use policypal::dashboard::{self, DashboardView, ErrorView};
use policypal::service::ServiceClient;
use policypal::storage::AnalysisRecord;
use policypal::workflow::{Analysis, Workflow};
use policypal::{
    classifier, scraper, ui, Config, Coordinator, DocumentType, ScrapedDocument, SearchIndex,
    Storage,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "policypal")]
#[command(author, version, about = "Classify, summarise and score privacy policies and terms of service", long_about = None)]
struct Cli {
    /// Config file to use instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. "debug" or "policypal=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer whether a page is a privacy policy or terms and conditions
    Classify {
        /// URL or local HTML file
        target: String,
    },
    /// Summarise a page
    Summarise {
        /// URL or local HTML file
        target: String,
        /// Document type, when it cannot be inferred
        #[arg(long, value_enum)]
        doc_type: Option<DocTypeArg>,
        /// Show raw extracted text instead of summary
        #[arg(long)]
        raw: bool,
    },
    /// Analyse a page for violations and show the dashboard
    Analyze {
        /// URL or local HTML file
        target: String,
        /// Document type, when it cannot be inferred
        #[arg(long, value_enum)]
        doc_type: Option<DocTypeArg>,
    },
    /// Browse stored analyses
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List all stored analyses
    List,
    /// Search stored analyses
    Search {
        /// Search query
        query: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DocTypeArg {
    Privacy,
    Terms,
}

impl From<DocTypeArg> for DocumentType {
    fn from(arg: DocTypeArg) -> Self {
        match arg {
            DocTypeArg::Privacy => DocumentType::PrivacyPolicy,
            DocTypeArg::Terms => DocumentType::TermsAndConditions,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_logging(cli.log_level.as_deref(), &config)?;

    match cli.command {
        Commands::Classify { target } => {
            let document = load_target(&target, &config).await?;
            let classification = classifier::classify(&document);

            println!("{}", document.url);
            println!("  Path:           {}", document.path());
            println!("  Characters:     {}", document.text.chars().count());
            println!("  Classification: {}", classification);
            let actions: Vec<String> = classification
                .offered_actions()
                .iter()
                .map(|doc_type| format!("Summarise {doc_type}"))
                .collect();
            println!("  Actions:        {}", actions.join(", "));
        }
        Commands::Summarise {
            target,
            doc_type,
            raw,
        } => {
            if raw {
                let document = load_target(&target, &config).await?;
                // Just show raw extracted text
                println!("{}", document.text);
                println!(
                    "\n--- Extracted {} characters ---",
                    document.text.chars().count()
                );
                return Ok(());
            }

            let (workflow, _storage) = start_workflow(&config)?;
            let document = workflow.scrape(&target, &config.scraper).await?;
            let doc_type = resolve_doc_type(&document, doc_type)?;

            let reporter = tokio::spawn(ui::report_progress(
                workflow.coordinator().clone(),
                config.scraper.max_chars,
            ));
            let outcome = workflow.summarise(&document, doc_type).await;
            reporter.abort();
            eprintln!();

            match outcome? {
                RequestOutcome::Completed { summary } => {
                    println!("=== {} ({}) ===\n", dashboard::site_name(&document.url), doc_type);
                    println!("{}", summary);
                }
                RequestOutcome::Failed {
                    document_length,
                    elapsed_secs,
                } => {
                    show_error(&ErrorView::new(document_length, elapsed_secs));
                    bail!("summarisation failed");
                }
            }
        }
        Commands::Analyze { target, doc_type } => {
            let (workflow, storage) = start_workflow(&config)?;
            let document = workflow.scrape(&target, &config.scraper).await?;
            let doc_type = resolve_doc_type(&document, doc_type)?;

            let reporter = tokio::spawn(ui::report_progress(
                workflow.coordinator().clone(),
                config.scraper.max_chars,
            ));
            let analysis = workflow.analyze(&document, doc_type).await;
            reporter.abort();
            eprintln!();

            match analysis? {
                Analysis::Completed { document, response } => {
                    let record = AnalysisRecord::new(document.page_url.clone(), doc_type, response);

                    // Persist the analysis to sled storage
                    storage.store_analysis(&record)?;

                    // Index in tantivy for full-text search
                    match SearchIndex::open(config.storage.path.join("search_index")) {
                        Ok(search_index) => {
                            if let Err(e) = search_index.index_analysis(&record) {
                                warn!(error = %e, "failed to index analysis");
                            }
                        }
                        Err(e) => warn!(error = %e, "search index unavailable"),
                    }

                    let view = DashboardView::new(&record.response, &record.url);
                    if let Err(e) = ui::print_dashboard(&view) {
                        info!(error = %e, "falling back to plain output");
                        print!("{}", dashboard::render_plain(&view));
                    }
                }
                Analysis::Failed {
                    document_length,
                    elapsed_secs,
                    cause,
                } => {
                    show_error(&ErrorView::new(document_length, elapsed_secs));
                    return Err(cause).context("analysis failed");
                }
            }
        }
        Commands::History { command } => {
            let storage = Storage::open(config.storage.path.join("db"))?;
            match command {
                HistoryCommand::List => {
                    let records = storage.list_analyses()?;
                    if records.is_empty() {
                        println!("No stored analyses found.");
                    } else {
                        println!("Stored analyses ({}):\n", records.len());
                        for record in &records {
                            print_record(record);
                        }
                    }
                }
                HistoryCommand::Search { query } => {
                    // Try tantivy first, fall back to simple search
                    let search_path = config.storage.path.join("search_index");
                    let results = match SearchIndex::open(&search_path)
                        .and_then(|index| index.search(&query, 20))
                    {
                        Ok(urls) if !urls.is_empty() => urls,
                        _ => simple_search(&storage, &query)?,
                    };

                    if results.is_empty() {
                        println!("No results found for: {}", query);
                    } else {
                        println!("Search results for '{}':\n", query);
                        for url in &results {
                            if let Ok(Some(record)) = storage.get_analysis(url) {
                                print_record(&record);
                            }
                        }
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "policypal", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_logging(cli_level: Option<&str>, config: &Config) -> anyhow::Result<()> {
    let level = cli_level.unwrap_or(config.logging.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer = if config.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("failed to init logging")
}

/// Fetch a URL or read a local file
async fn load_target(target: &str, config: &Config) -> anyhow::Result<ScrapedDocument> {
    info!(page = target, "loading page");
    Ok(scraper::load_target(target, &config.scraper).await?)
}

fn resolve_doc_type(
    document: &ScrapedDocument,
    requested: Option<DocTypeArg>,
) -> anyhow::Result<DocumentType> {
    if let Some(requested) = requested {
        return Ok(requested.into());
    }
    match classifier::classify(document).document_type() {
        Some(doc_type) => {
            info!(%doc_type, "inferred document type");
            Ok(doc_type)
        }
        None => bail!("could not infer the document type; pass --doc-type privacy|terms"),
    }
}

fn start_workflow(config: &Config) -> anyhow::Result<(Workflow, Storage)> {
    let storage = Storage::open(config.storage.path.join("db"))?;
    let (coordinator, _task) = Coordinator::spawn(storage.clone());
    let service = ServiceClient::from_config(config)?;
    Ok((
        Workflow::new(coordinator, service, config.scraper.max_chars),
        storage,
    ))
}

fn show_error(view: &ErrorView) {
    if ui::print_error(view).is_err() {
        eprint!("{}", dashboard::render_error_plain(view));
    }
}

fn print_record(record: &AnalysisRecord) {
    let aggregations = &record.response.aggregations;
    println!(
        "📄 {} - {} ({})",
        record.site_name,
        record.doc_type,
        record.created_at.format("%Y-%m-%d %H:%M")
    );
    println!("   {}", record.url);
    println!(
        "   Risk score {} % · {} violations",
        dashboard::risk_score(
            aggregations.high_severity,
            aggregations.medium_severity,
            aggregations.low_severity
        ),
        aggregations.total_violations
    );
    println!("   {}\n", record.response.summary);
}

/// Simple text-based search fallback when tantivy index is not available
fn simple_search(storage: &Storage, query: &str) -> anyhow::Result<Vec<String>> {
    let query_lower = query.to_lowercase();
    let results = storage
        .list_analyses()?
        .into_iter()
        .filter(|record| {
            record.site_name.to_lowercase().contains(&query_lower)
                || record.response.summary.to_lowercase().contains(&query_lower)
                || record.response.violations.iter().any(|v| {
                    v.violating_rule.to_lowercase().contains(&query_lower)
                        || v.source.to_lowercase().contains(&query_lower)
                })
        })
        .map(|record| record.url)
        .collect();

    Ok(results)
}
