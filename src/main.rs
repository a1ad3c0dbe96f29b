mod config;
mod opener;
mod pipeline;
mod render;
mod session;
mod wikipedia;

pub const USER_AGENT: &str = concat!("wikisearch/", env!("CARGO_PKG_VERSION"));

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use tokio::io::BufReader;
use tracing::info;

use config::{Config, Overrides};
use opener::BrowserOpener;
use wikipedia::{WikipediaClient, format_results};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request ceiling; a request that hits it counts as failed and is retried.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Search Wikipedia as you type.
///
/// Each line read from stdin replaces the search field. Queries are sent once
/// the field has been quiet for the debounce period. Type `:open N` to open
/// the N-th result and `:quit` to leave.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,

    /// Opensearch endpoint URL [env: WIKISEARCH_ENDPOINT]
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Wikipedia language edition, e.g. "de" [env: WIKISEARCH_LANG, default: en]
    #[arg(long, global = true)]
    lang: Option<String>,

    /// Quiet period before a query is sent [env: WIKISEARCH_DEBOUNCE_MS, default: 2000]
    #[arg(long, global = true, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// Wait between retries of a failed query [env: WIKISEARCH_RETRY_DELAY_MS, default: 3000]
    #[arg(long, global = true, value_name = "MS")]
    retry_delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a single query, print its results and exit
    Query {
        /// Search term
        term: String,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            lang: self.lang.clone(),
            debounce_ms: self.debounce_ms,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wikisearch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env(&cli.overrides())?;

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let client = WikipediaClient::new(http, config.endpoint.clone());
    info!(endpoint = %client.endpoint(), "starting wikisearch");

    match cli.command {
        Some(Cmd::Query { term }) => {
            let body = tokio::select! {
                body = pipeline::query_with_retry(&client, &term, config.settings.retry_delay) => body,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    return Ok(());
                }
            };
            let results = format_results(body)?;
            info!(term = %term, count = results.len(), "results received");
            print!("{}", render::render_results(&results));
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            tokio::select! {
                outcome = session::run(stdin, &mut stdout, client, config.settings, &BrowserOpener) => outcome?,
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
    }
    Ok(())
}
