//! A3S Suggest CLI - manage search engines and preview autocomplete suggestions.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use a3s_suggest::{
    CatalogStore, EngineDescriptor, HttpFetcher, JsonFileStore, SuggestConfig, SuggestContext,
    SuggestEvent, TracingTelemetry,
};

const DEFAULT_STORE: &str = "a3s-suggest-engines.json";

/// A3S Suggest - search engine catalog and autocomplete suggestions
#[derive(Parser)]
#[command(name = "a3s-suggest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Engine catalog file
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List default and other search engines
    Engines,

    /// Make a known engine a default engine
    Add {
        /// Engine id
        id: String,
    },

    /// Move a default engine back to the other engines
    Remove {
        /// Engine id
        id: String,
    },

    /// Reorder the default engines (comma-separated ids)
    Sort {
        #[arg(value_delimiter = ',', required = true)]
        ids: Vec<String>,
    },

    /// Fetch suggestions from every default engine
    Suggest(SuggestArgs),

    /// Remove every engine and the stored catalog
    Reset,
}

#[derive(Parser)]
struct SuggestArgs {
    /// Typed terms
    terms: String,

    /// Seconds to wait for all engines
    #[arg(short, long, default_value = "10")]
    timeout: u64,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Compact single-line output
    Compact,
}

#[derive(Serialize)]
struct EngineSuggestions {
    engine: String,
    name: String,
    suggestions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SuggestConfig::load(path)?,
        None => SuggestConfig::from_env()?,
    };
    let context = start_context(&cli, config)?;

    let outcome = match cli.command {
        Commands::Engines => list_engines(&context).await,
        Commands::Add { id } => add_engine(&context, &id).await,
        Commands::Remove { id } => remove_engine(&context, &id).await,
        Commands::Sort { ids } => sort_engines(&context, &ids).await,
        Commands::Suggest(args) => run_suggest(&context, args).await,
        Commands::Reset => {
            context.clear().await?;
            println!("Catalog cleared");
            Ok(())
        }
    };
    context.shutdown();
    outcome
}

fn start_context(cli: &Cli, config: SuggestConfig) -> Result<SuggestContext> {
    let path = cli
        .store
        .clone()
        .or_else(|| config.store_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE));
    let mut store = JsonFileStore::new(path);
    if let Some(quota) = config.storage_quota_bytes {
        store = store.with_quota(quota);
    }
    let store: Arc<dyn CatalogStore> = Arc::new(store);

    let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout())?;
    let context = SuggestContext::builder(store, Arc::new(fetcher))
        .config(config)
        .telemetry(Arc::new(TracingTelemetry))
        .start()
        .context("failed to load engine catalog")?;
    Ok(context)
}

fn print_engine(index: usize, engine: &EngineDescriptor) {
    let marker = if engine.has_suggestions() { "" } else { " (no suggestions)" };
    println!("  {}. {}{}", index + 1, engine.name(), marker);
    println!("     {}", engine.id());
}

async fn list_engines(context: &SuggestContext) -> Result<()> {
    println!("Default engines:\n");
    for (i, engine) in context.defaults().await.iter().enumerate() {
        print_engine(i, engine);
    }
    println!();
    println!("Other engines:\n");
    for (i, engine) in context.others().await.iter().enumerate() {
        print_engine(i, engine);
    }
    println!();
    println!("Usage: a3s-suggest add \"https://www.yelp.com/\"");
    Ok(())
}

async fn add_engine(context: &SuggestContext, id: &str) -> Result<()> {
    match context.promote(id).await? {
        Some(engine) => println!("{} is now a default engine", engine.name()),
        None => anyhow::bail!("Unknown engine '{}'", id),
    }
    Ok(())
}

async fn remove_engine(context: &SuggestContext, id: &str) -> Result<()> {
    match context.remove_default(id).await? {
        Some(engine) => println!("{} is no longer a default engine", engine.name()),
        None => anyhow::bail!("'{}' is not a default engine", id),
    }
    Ok(())
}

async fn sort_engines(context: &SuggestContext, ids: &[String]) -> Result<()> {
    if !context.sort_defaults(ids).await? {
        println!("Default engines already in that order");
    }
    for (i, engine) in context.defaults().await.iter().enumerate() {
        print_engine(i, engine);
    }
    Ok(())
}

async fn run_suggest(context: &SuggestContext, args: SuggestArgs) -> Result<()> {
    let mut pending: HashSet<String> = context.aggregator().engine_ids().into_iter().collect();
    if pending.is_empty() {
        anyhow::bail!("No default engine offers suggestions");
    }

    let mut events = context.subscribe();
    context.search(&args.terms);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.timeout);
    let mut collected = Vec::new();
    while !pending.is_empty() {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                eprintln!("Timed out waiting for {} engine(s)", pending.len());
                break;
            }
        };
        let SuggestEvent::Suggestions {
            engine, results, ..
        } = event
        else {
            continue;
        };
        if !pending.remove(engine.id()) {
            continue;
        }

        match args.format {
            OutputFormat::Text => {
                println!("{}:", engine.name());
                if results.is_empty() {
                    println!("   (none)");
                }
                for (i, suggestion) in results.iter().enumerate() {
                    println!("   {}. {}", i + 1, suggestion);
                }
                println!();
            }
            OutputFormat::Compact => println!("{}\t{}", engine.name(), results.join("\t")),
            OutputFormat::Json => collected.push(EngineSuggestions {
                engine: engine.id().to_string(),
                name: engine.name().to_string(),
                suggestions: results,
            }),
        }
    }

    if matches!(args.format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&collected)?);
    }
    Ok(())
}
