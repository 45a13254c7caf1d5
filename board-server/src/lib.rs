//! # Sketchboard Server Library
//!
//! Session sync server for the collaborative drawing surface. This library
//! is used by both the binary and integration tests.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use board_core::{
    AccountStore, BoardStore, IdentityProvider, JwtProvider, MemoryBoardStore, StaticTokenProvider,
};

pub mod config;
pub mod engine;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod routes;
pub mod validation;

pub use config::{Cli, GatewayConfig};
pub use engine::SyncEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Synchronization engine for live sessions.
    pub engine: SyncEngine,
    /// Saved-board collaborator.
    pub boards: Arc<dyn BoardStore>,
    /// Bearer token collaborator for the board API.
    pub identity: Arc<dyn IdentityProvider>,
    /// Signup and login; `None` disables the account routes.
    pub accounts: Option<AccountService>,
    /// Connection gateway settings.
    pub gateway: GatewayConfig,
}

/// Account storage paired with the issuer of its bearer tokens.
#[derive(Clone)]
pub struct AccountService {
    /// Registered accounts.
    pub store: Arc<dyn AccountStore>,
    /// Signs the tokens handed out at signup and login.
    pub tokens: Arc<JwtProvider>,
}

impl AccountService {
    /// Pair a store with a token issuer.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, tokens: Arc<JwtProvider>) -> Self {
        Self { store, tokens }
    }
}

impl AppState {
    /// State with an in-memory board store and no API tokens.
    #[must_use]
    pub fn in_memory(gateway: GatewayConfig) -> Self {
        Self {
            engine: SyncEngine::new(),
            boards: Arc::new(MemoryBoardStore::new()),
            identity: Arc::new(StaticTokenProvider::new()),
            accounts: None,
            gateway,
        }
    }
}

/// Routes for the socket gateway, the board and account APIs, and health checks.
///
/// The binary adds `/metrics` and the HTTP middleware stack on top.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/ws", get(gateway::ws_handler))
        .route(
            "/api/boards",
            get(routes::list_boards).post(routes::create_board),
        )
        .route(
            "/api/boards/{id}",
            get(routes::get_board)
                .put(routes::update_board)
                .delete(routes::delete_board),
        )
        .route("/api/sessions/{key}", get(routes::get_session_snapshot))
        .route("/api/auth/signup", post(routes::signup))
        .route("/api/auth/login", post(routes::login))
        .with_state(state)
}
