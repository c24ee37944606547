//! arc-daemon entry point.
//!
//! Sets up tracing, loads config, starts the engine against the simulated
//! ledger, wires middleware and serves HTTP. Handlers live in `routes.rs`;
//! shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use arc_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, EngineConfig, UnusedKeyPolicy,
};
use arc_daemon::{routes, state};
use arc_ledger::LedgerClient;
use arc_sim::{SimConfig, SimLedger};
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let (cfg, config_hash) = load_config()?;

    let sim = SimLedger::new(SimConfig::from_settings(&cfg.sim));
    spawn_sim_drawer(sim.clone(), Duration::from_secs(1));
    let ledger: Arc<dyn LedgerClient> = Arc::new(sim);

    let (engine, _engine_task) =
        arc_runtime::start(&cfg, ledger, config_hash).context("engine start failed")?;

    let shared = Arc::new(state::AppState::new(engine));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_engine_relay(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env()
        .or_else(|| cfg.daemon_addr.parse().ok())
        .context("no usable bind address")?;
    info!("arc-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    shared.engine.shutdown().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `ARC_CONFIG_PATHS` is a comma-separated list of YAML layers, later ones
/// overriding earlier ones. Unset means built-in defaults.
fn load_config() -> anyhow::Result<(EngineConfig, Option<String>)> {
    let Ok(raw) = std::env::var("ARC_CONFIG_PATHS") else {
        info!("ARC_CONFIG_PATHS unset; using default config");
        return Ok((EngineConfig::default(), None));
    };
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(ConfigMode::Sim, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys nothing reads");
    }
    let cfg = EngineConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");
    Ok((cfg, Some(loaded.config_hash)))
}

/// The simulated ledger has no miner; close rounds once their deadline passes.
fn spawn_sim_drawer(sim: SimLedger, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match sim.draw_if_due() {
                Ok(true) => info!("sim round drawn"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "sim draw failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ARC_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
