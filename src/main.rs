use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use call_analytics::config::{load_config, StoreBackend};
use call_analytics::store::{CallStore, MemoryStore, RedisStore};
use call_analytics::tracker::{CallTracker, SystemClock};
use call_analytics::{server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration + logging ───────────────────────────────
    let cfg = load_config()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cfg.log_filter().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 2. Store ─────────────────────────────────────────────────
    let store: Arc<dyn CallStore> = match cfg.store {
        StoreBackend::Redis => {
            tracing::info!(url = %cfg.redis_url, "connecting to redis");
            let store = RedisStore::open(&cfg.redis_url)
                .await
                .with_context(|| format!("cannot connect to redis at {}", cfg.redis_url))?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    // ── 3. Shared state + router ─────────────────────────────────
    let tracker = Arc::new(CallTracker::new(
        store,
        Arc::new(SystemClock),
        cfg.tracker_settings(),
    ));
    let state = Arc::new(AppState::new(tracker, cfg.store_timeout));
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;

    tracing::info!(
        addr = %cfg.listen_addr,
        retention = cfg.ledger_retention,
        atomic_record = cfg.atomic_record,
        "call analytics listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
