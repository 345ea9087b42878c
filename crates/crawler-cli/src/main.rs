mod bootstrap;
mod config_loader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crawler_core::{CancellationToken, ExitClass, ExitCode, RunSummary};
use crawler_enrichment::EnrichmentMode;
use crawler_health::HealthScope;
use crawler_http::ProtocolFetcher;
use crawler_store::Store;

use bootstrap::init_tracing;
use config_loader::{load_enrichment_overrides, load_or_default};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    Federation,
    Channels,
    Videos,
    Tags,
    UpdateTags,
    Comments,
    Health,
}

/// PeerTube federated-network crawler.
#[derive(Debug, Parser)]
#[command(name = "crawler", about = "Walks the PeerTube federation to enumerate channels, videos, and metadata", version)]
struct Cli {
    /// Which stage to run; each stage reads and writes the same store.
    #[arg(long, value_enum)]
    stage: Stage,

    /// Path to the sqlite store shared by every stage.
    #[arg(long, env = "CRAWLER_STORE_PATH", default_value = "crawler.sqlite")]
    store: PathBuf,

    /// Drop and recreate the store before running.
    #[arg(long, default_value_t = false)]
    recreate: bool,

    /// TOML file holding the stage-specific configuration body.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the config file's whitelist source (federation/channels stages).
    #[arg(long, env = "CRAWLER_WHITELIST")]
    whitelist: Option<String>,

    /// Single host to target for `--stage health` (ignored otherwise).
    #[arg(long)]
    host: Option<String>,

    /// Only re-probe hosts already marked unhealthy (`--stage health`).
    #[arg(long, default_value_t = false)]
    errors_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = Arc::new(Store::open(&cli.store, cli.recreate).context("opening store")?);
    let http = Arc::new(ProtocolFetcher::new());
    let cancel = CancellationToken::new();

    let summary = dispatch(&cli, store, http, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    std::process::exit(exit_class_of(summary.exit_class).exit_code());
}

fn exit_class_of(code: ExitCode) -> ExitClass {
    match code {
        ExitCode::Success => ExitClass::Success,
        ExitCode::NoNetwork => ExitClass::NoNetwork,
        ExitCode::StoreFatal => ExitClass::StoreFatal,
    }
}

async fn dispatch(
    cli: &Cli,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    match cli.stage {
        Stage::Federation => {
            let mut cfg: crawler_federation::FederationConfig = load_or_default(cli.config.as_deref())?;
            if let Some(whitelist) = &cli.whitelist {
                cfg.whitelist_source = whitelist.clone();
            }
            crawler_federation::run(cfg, store, http, cancel).await
        }
        Stage::Channels => {
            let mut cfg: crawler_channels::ChannelsConfig = load_or_default(cli.config.as_deref())?;
            if let Some(whitelist) = &cli.whitelist {
                cfg.whitelist_source = whitelist.clone();
            }
            crawler_channels::run(cfg, store, http, cancel).await
        }
        Stage::Videos => {
            let cfg: crawler_videos::VideosConfig = load_or_default(cli.config.as_deref())?;
            crawler_videos::run(cfg, store, http, cancel).await
        }
        Stage::Tags | Stage::UpdateTags | Stage::Comments => {
            let mode = match cli.stage {
                Stage::Tags => EnrichmentMode::Tags,
                Stage::UpdateTags => EnrichmentMode::UpdateTags,
                Stage::Comments => EnrichmentMode::Comments,
                _ => unreachable!(),
            };
            let overrides = load_enrichment_overrides(cli.config.as_deref())?;
            let cfg = overrides.apply(crawler_enrichment::EnrichmentConfig::new(mode));
            crawler_enrichment::run(cfg, store, http, cancel).await
        }
        Stage::Health => {
            let scope = match (&cli.host, cli.errors_only) {
                (Some(host), _) => HealthScope::SingleHost(host.clone()),
                (None, true) => HealthScope::ErrorsOnly,
                (None, false) => HealthScope::All,
            };
            let mut cfg: crawler_health::HealthConfig = load_or_default(cli.config.as_deref())?;
            cfg.scope = scope;
            crawler_health::run(cfg, store, http, cancel).await
        }
    }
}
