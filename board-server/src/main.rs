//! # Sketchboard Server
//!
//! Session sync server for collaborative drawing boards.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use board_core::{
    AccountStore, BoardStore, FileAccountStore, FileBoardStore, IdentityProvider, JwtProvider,
    MemoryAccountStore, MemoryBoardStore, StaticTokenProvider,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use board_server::config::{Cli, LogFormat};
use board_server::{app_router, metrics, AccountService, AppState, SyncEngine};

/// Build a CORS layer for the configured browser origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Initialize structured tracing.
///
/// Set `RUST_LOG` to control log levels (default: info,board_server=debug,tower_http=debug).
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,board_server=debug,tower_http=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init(),
    }
}

fn open_board_store(cli: &Cli) -> anyhow::Result<Arc<dyn BoardStore>> {
    match &cli.data_dir {
        Some(dir) => {
            let store = FileBoardStore::open(dir)
                .with_context(|| format!("Failed to open board store at {}", dir.display()))?;
            tracing::info!(data_dir = %dir.display(), "Saving boards to disk");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("Keeping boards in memory");
            Ok(Arc::new(MemoryBoardStore::new()))
        }
    }
}

fn open_accounts(cli: &Cli, tokens: Arc<JwtProvider>) -> anyhow::Result<AccountService> {
    let store: Arc<dyn AccountStore> = match &cli.data_dir {
        Some(dir) => {
            let path = dir.join("accounts.json");
            let store = FileAccountStore::open(&path)
                .with_context(|| format!("Failed to open accounts at {}", path.display()))?;
            tracing::info!(path = %store.path().display(), "Saving accounts to disk");
            Arc::new(store)
        }
        None => Arc::new(MemoryAccountStore::new()),
    };
    Ok(AccountService::new(store, tokens))
}

fn load_identity(
    cli: &Cli,
) -> anyhow::Result<(Arc<dyn IdentityProvider>, Option<AccountService>)> {
    if let Some(secret) = &cli.jwt_secret {
        let tokens = Arc::new(JwtProvider::new(secret.as_bytes()));
        let accounts = open_accounts(cli, Arc::clone(&tokens))?;
        if cli.tokens_file.is_some() {
            tracing::warn!("Ignoring tokens file; account tokens are enabled");
        }
        tracing::info!("Account signup and login enabled");
        let identity: Arc<dyn IdentityProvider> = tokens;
        return Ok((identity, Some(accounts)));
    }
    let identity: Arc<dyn IdentityProvider> = match &cli.tokens_file {
        Some(path) => {
            let provider = StaticTokenProvider::from_file(path)
                .with_context(|| format!("Failed to load tokens from {}", path.display()))?;
            tracing::info!(tokens = provider.len(), "Loaded board API tokens");
            Arc::new(provider)
        }
        None => {
            tracing::warn!("No tokens file or JWT secret configured; the board API will reject every request");
            Arc::new(StaticTokenProvider::new())
        }
    };
    Ok((identity, None))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
    tracing::info!("Prometheus metrics initialized");

    let gateway = cli.gateway_config();
    let (identity, accounts) = load_identity(&cli)?;
    let state = AppState {
        engine: SyncEngine::new(),
        boards: open_board_store(&cli)?,
        identity,
        accounts,
        gateway: gateway.clone(),
    };

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let app = app_router(state)
        .merge(metrics_router)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(build_cors_layer(&gateway.allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = cli.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        allowed_origins = ?gateway.allowed_origins,
        keepalive_secs = gateway.keepalive_interval.as_secs(),
        "Sketchboard server starting on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tracing::instrument(name = "metrics", skip(handle))]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
