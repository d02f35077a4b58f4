//! News relay binary entrypoint.
//! Loads config, opens the fingerprint store, wires the Bot API collaborators
//! (or dry-run doubles) and runs until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_relay::clock::SystemClock;
use news_relay::config::credentials::{bot_api_url, http_addr, store_path_override};
use news_relay::config::{Credentials, RelayConfig};
use news_relay::dedup::sqlite::SqliteFingerprintStore;
use news_relay::ingest::providers::{bot_api::BotApiSource, replay::ReplaySource};
use news_relay::ingest::types::SourceClient;
use news_relay::metrics::Metrics;
use news_relay::publish::telegram::{BotApi, BotApiPublisher};
use news_relay::publish::{LogPublisher, Publisher};
use news_relay::transform::rules::RuleTransform;
use news_relay::{api, shutdown, Relay};

/// `RELAY_LOG_JSON=1` switches to JSON lines; filter comes from `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_relay=info,warn"));
    let json = std::env::var("RELAY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut cfg = RelayConfig::load_default().context("loading relay config")?;
    if let Some(p) = store_path_override() {
        cfg.store_path = p;
    }
    let cfg = Arc::new(cfg);
    tracing::info!(
        channels = cfg.channels.len(),
        capacity = cfg.queue_capacity,
        policy = ?cfg.overflow_policy,
        "relay config loaded"
    );

    let metrics = Metrics::init().context("installing prometheus recorder")?;

    let store = SqliteFingerprintStore::open(&cfg.store_path, cfg.fingerprint_ttl())
        .with_context(|| format!("opening fingerprint store {}", cfg.store_path))?;

    let creds = Credentials::from_env().context("reading credentials")?;
    let (source, publisher): (Arc<dyn SourceClient>, Arc<dyn Publisher>) = match creds {
        Some(c) => {
            tracing::info!(?c, "bot api credentials loaded");
            let mut api = BotApi::new(&c.bot_token);
            if let Some(url) = bot_api_url() {
                tracing::info!(%url, "using self-hosted bot api server");
                api = api.with_base_url(&url, &c.bot_token);
            }
            (
                Arc::new(BotApiSource::new(api.clone())),
                Arc::new(
                    BotApiPublisher::new(api, c.target_chat)
                        .with_signatures(cfg.news_signature.clone(), cfg.proxy_signature.clone()),
                ),
            )
        }
        None => {
            tracing::warn!("no bot token configured, running in dry-run mode");
            (Arc::new(ReplaySource::new()), Arc::new(LogPublisher))
        }
    };

    let relay = Relay::new(
        cfg.clone(),
        source,
        Arc::new(RuleTransform::from_config(&cfg)),
        Arc::new(store),
        publisher,
        Arc::new(SystemClock),
    );

    let app = api::create_router(relay.status()).merge(metrics.router());
    let addr = http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "liveness endpoint listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "http server stopped");
        }
    });

    let (stop_tx, stop_rx) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    tracing::info!("news relay started");
    let summary = relay.run(stop_rx).await.context("starting live subscription")?;
    tracing::info!(
        backfill_enqueued = summary.backfill.enqueued,
        live_enqueued = summary.live.enqueued,
        published = summary.worker.published,
        failed = summary.worker.failed,
        "news relay stopped"
    );
    Ok(())
}
