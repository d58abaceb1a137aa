use annotation_search::config::{Config, ObservabilityConfig};
use annotation_search::search::{
    AnalysisConfig, HttpSearchClient, IndexManager, QueryRegistry, SearchClient, SearchRequest,
    SearchService,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "annotation-search")]
#[command(about = "Annotation search index and query tool", long_about = None, version)]
struct Cli {
    /// Search backend URL, overriding the configuration
    #[arg(short, long, env = "ANNOTATION_SEARCH_URL")]
    url: Option<String>,

    /// Index or alias name, overriding the configuration
    #[arg(short, long)]
    index: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a timestamped index and point the alias at it
    Init,

    /// Create an index named after the alias if nothing exists under that name
    Configure,

    /// Show the concrete index behind the alias
    Alias,

    /// Create a fresh concrete index for a reindex and print its name
    #[command(name = "new-index")]
    NewIndex,

    /// Atomically repoint the alias at another index
    Swap {
        #[arg(value_name = "INDEX")]
        index: String,
    },

    /// Build (and optionally run) a search query
    Query {
        /// Request parameters, e.g. `q=climate` or `uri=http://example.com`
        #[arg(value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Search as this user
        #[arg(short, long)]
        user: Option<String>,

        /// Groups the user may read (repeatable)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Send the query to the backend instead of printing it
        #[arg(short, long)]
        execute: bool,
    },
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("annotation_search={}", config.log_level).into());

    let (json_layer, text_layer) = if config.json_logs {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn parse_params(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|param| match param.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => bail!("expected KEY=VALUE, got {:?}", param),
        })
        .collect()
}

fn index_manager(config: &Config, client: Arc<dyn SearchClient>) -> anyhow::Result<IndexManager> {
    Ok(IndexManager::new(
        client,
        config.search.index.clone(),
        AnalysisConfig::default(),
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = cli.url {
        config.elasticsearch.url = url;
    }
    if let Some(index) = cli.index {
        config.search.index = index;
    }

    init_tracing(&config.observability);
    tracing::debug!(
        url = %config.elasticsearch.url,
        index = %config.search.index,
        "Loaded configuration"
    );

    let client: Arc<dyn SearchClient> = Arc::new(HttpSearchClient::from_config(
        &config.elasticsearch,
    )?);

    match cli.command {
        Commands::Query {
            params,
            user,
            groups,
            execute,
        } => {
            let settings = Arc::new(config.search.clone());
            let registry = Arc::new(QueryRegistry::with_defaults(&settings));
            let service = SearchService::new(client, registry, settings.clone());

            let mut request = SearchRequest::from_params(&parse_params(&params)?, &settings)?;
            if let Some(user) = user {
                request = request.with_user(user);
            }
            request = request.with_readable_groups(groups);

            if execute {
                let response = service.search(&request).await?;
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                let body = service.build_query(&request)?;
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }

        Commands::Init => {
            let manager = index_manager(&config, client)?;
            match manager.init().await? {
                Some(index) => println!("{} -> {}", manager.alias(), index),
                None => println!("{} already exists", manager.alias()),
            }
        }

        Commands::Configure => {
            let manager = index_manager(&config, client)?;
            if manager.configure_index().await? {
                println!("Created index {}", manager.alias());
            } else {
                println!("{} already exists", manager.alias());
            }
        }

        Commands::Alias => {
            let manager = index_manager(&config, client)?;
            match manager.get_aliased_index().await? {
                Some(index) => println!("{}", index),
                None => bail!("{} is not an alias", manager.alias()),
            }
        }

        Commands::NewIndex => {
            let manager = index_manager(&config, client)?;
            let index = manager.new_index_name();
            manager.create_index(&index).await?;
            println!("{}", index);
        }

        Commands::Swap { index } => {
            let manager = index_manager(&config, client)?;
            manager.update_aliased_index(&index).await?;
            println!("{} -> {}", manager.alias(), index);
        }
    }

    Ok(())
}
