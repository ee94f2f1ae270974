//! Trawler command-line interface
//!
//! Subcommands mirror the crawler's deployment shapes: `crawl` runs a fetch
//! manager and dispatcher in one process, `fetch` and `dispatch` run each
//! alone, and `seed`/`schema`/`readlink` are one-shot datastore utilities.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use trawler::config::{load_config, Config};
use trawler::dispatch::Dispatcher;
use trawler::handler::PageWriterHandler;
use trawler::storage::{schema, Datastore, LinkFinder, MemoryDatastore};
use trawler::url::Normalizer;
use trawler::FetchManager;
use tracing_subscriber::EnvFilter;

/// A distributed, polite web crawler
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version)]
#[command(about = "A distributed, polite web crawler", long_about = None)]
struct Cli {
    /// Path to a TOML config file to load
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an all-in-one crawler: fetch manager plus dispatcher
    Crawl,

    /// Start only a fetch manager
    Fetch,

    /// Start only a dispatcher
    Dispatch,

    /// Add a seed URL to the datastore
    ///
    /// Seeds bypass the add-new-domains policy, so this is the way to
    /// bootstrap a crawl or hand-feed links that must be fetched soon.
    Seed {
        /// URL to add as a seed
        #[arg(short, long)]
        url: String,
    },

    /// Write the datastore schema, substituting configured keyspace and
    /// replication settings
    Schema {
        /// File to write the schema to
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the latest recorded state of a link
    Readlink {
        /// URL to look up
        #[arg(short, long)]
        url: String,

        /// Print only the stored HTTP body
        #[arg(short, long, conflicts_with = "meta_only")]
        body_only: bool,

        /// Omit the body from printed results
        #[arg(short, long)]
        meta_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version exit cleanly; real argument errors exit 1
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            Arc::new(load_config(path)?)
        }
        None => Arc::new(Config::default()),
    };

    match cli.command {
        Command::Crawl => run_services(config, true, true).await?,
        Command::Fetch => run_services(config, true, false).await?,
        Command::Dispatch => run_services(config, false, true).await?,
        Command::Seed { url } => run_seed(&config, &url).await?,
        Command::Schema { out } => run_schema(&config, &out)?,
        Command::Readlink {
            url,
            body_only,
            meta_only,
        } => run_readlink(&config, &url, body_only, meta_only).await?,
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity flags
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Builds the in-memory datastore and loads configured seeds into it
fn build_datastore(config: &Config) -> trawler::Result<Arc<MemoryDatastore>> {
    let datastore = Arc::new(MemoryDatastore::new(config.dispatcher.add_new_domains));
    let normalizer = Normalizer::new(&config.fetcher.purge_sid_list);
    for seed in &config.datastore.seeds {
        datastore.add_seed(normalizer.parse(seed)?);
    }
    if !config.datastore.seeds.is_empty() {
        tracing::info!("Seeded {} links from config", config.datastore.seeds.len());
    }
    Ok(datastore)
}

/// Runs the long-lived services until SIGINT, then shuts down gracefully
async fn run_services(config: Arc<Config>, fetch: bool, dispatch: bool) -> trawler::Result<()> {
    let datastore = build_datastore(&config)?;
    let mut tasks: tokio::task::JoinSet<trawler::Result<()>> = tokio::task::JoinSet::new();

    let manager = if fetch {
        let handler = Arc::new(PageWriterHandler::new(&config.handler.output_dir));
        let manager = Arc::new(FetchManager::new(
            config.clone(),
            datastore.clone(),
            handler,
        ));
        let runner = manager.clone();
        tasks.spawn(async move { runner.run().await });
        Some(manager)
    } else {
        None
    };

    let dispatcher = if dispatch {
        let dispatcher = Arc::new(Dispatcher::new(config.clone(), datastore.clone()));
        let runner = dispatcher.clone();
        tasks.spawn(async move { runner.run().await });
        Some(dispatcher)
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");

    if let Some(dispatcher) = &dispatcher {
        dispatcher.stop();
    }
    if let Some(manager) = &manager {
        manager.stop();
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => result?,
            Err(e) => tracing::error!("Service task failed: {}", e),
        }
    }

    Ok(())
}

/// Inserts a seed link, creating its domain regardless of add-new-domains
async fn run_seed(config: &Config, url: &str) -> trawler::Result<()> {
    let normalizer = Normalizer::new(&config.fetcher.purge_sid_list);
    let link = normalizer.parse(url)?;

    // Seeds always may create their domain
    let datastore = MemoryDatastore::new(true);
    datastore.store_parsed_url(&link, None).await?;
    println!("Seeded {} (domain {})", link, link.domain_plus_one());
    Ok(())
}

/// Writes the rendered datastore schema to a file
fn run_schema(config: &Config, out: &PathBuf) -> trawler::Result<()> {
    let rendered = schema::render_schema(
        &config.datastore.keyspace,
        config.datastore.replication_factor,
    );
    std::fs::write(out, rendered)?;
    println!("Wrote schema to {}", out.display());
    Ok(())
}

/// Prints a link's latest recorded state
async fn run_readlink(
    config: &Config,
    url: &str,
    body_only: bool,
    meta_only: bool,
) -> trawler::Result<()> {
    let normalizer = Normalizer::new(&config.fetcher.purge_sid_list);
    let link = normalizer.parse(url)?;

    let datastore = build_datastore(config)?;
    let info = datastore
        .find_link(&link, !meta_only)
        .await?
        .ok_or_else(|| trawler::TrawlerError::LinkNotFound(link.to_string()))?;

    let Some(crawl_time) = info.crawl_time else {
        println!("Link {} is present, but has not yet been fetched", info.url);
        return Ok(());
    };

    if !body_only {
        println!("Url:            {}", info.url);
        println!("HttpStatus:     {}", format_opt(info.status));
        println!("CrawlTime:      {}", crawl_time);
        println!("Error:          {}", info.error.as_deref().unwrap_or(""));
        println!("RobotsExcluded: {}", info.robots_excluded);
        println!("RedirectedTo:   {}", info.redirected_to.as_deref().unwrap_or(""));
        println!("GetNow:         {}", info.get_now);
        println!("Mime:           {}", info.mime_type.as_deref().unwrap_or(""));
        println!("FnvFingerprint: {}", info.fnv_fingerprint);
        if info.headers.is_empty() {
            println!("HEADERS:        <none>");
        } else {
            println!("HEADERS:");
            for (name, value) in &info.headers {
                println!("    {}: {}", name, value);
            }
        }
    }

    if !meta_only {
        match (&info.body, body_only) {
            (Some(body), true) => println!("{}", body),
            (Some(body), false) => println!("BODY:\n{}", body),
            (None, _) => println!("BODY:           <none>"),
        }
    }

    Ok(())
}

fn format_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
