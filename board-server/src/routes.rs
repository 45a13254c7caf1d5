//! API route handlers.
//!
//! Saved boards are owner scoped: every `/api/boards` route authenticates
//! the bearer token and only ever sees the caller's boards. The
//! `/api/auth` routes hand out those tokens when accounts are enabled.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use board_core::{
    Account, Board, BoardDraft, BoardId, BoardSummary, CanvasError, CanvasSnapshot, Identity,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AccountService, AppState};

/// Errors returned by the REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No `Authorization: Bearer` header.
    #[error("Missing bearer token")]
    MissingCredential,
    /// No live session with this key.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    /// The server runs without accounts.
    #[error("Accounts are not enabled")]
    AccountsDisabled,
    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Error from a core collaborator.
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingCredential
            | Self::Canvas(CanvasError::InvalidCredential | CanvasError::ExpiredCredential) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            Self::SessionNotFound(_)
            | Self::AccountsDisabled
            | Self::Canvas(CanvasError::BoardNotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Canvas(CanvasError::InvalidBoard(_)) => (StatusCode::BAD_REQUEST, "invalid_board"),
            Self::Canvas(CanvasError::InvalidAccount(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_account")
            }
            Self::Canvas(CanvasError::AccountExists) => (StatusCode::CONFLICT, "account_exists"),
            Self::Task(_)
            | Self::Canvas(
                CanvasError::Serialization(_)
                | CanvasError::Io(_)
                | CanvasError::PasswordHash(_)
                | CanvasError::Token(_),
            ) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }
        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// The authenticated caller of a board route.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::MissingCredential)?;
        let identity = state.identity.authenticate(token)?;
        Ok(Self(identity))
    }
}

/// `GET /api/boards`
#[tracing::instrument(name = "list_boards", skip_all)]
pub async fn list_boards(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<BoardSummary>>, ApiError> {
    Ok(Json(state.boards.list(&caller.principal_id)?))
}

/// `POST /api/boards`
#[tracing::instrument(name = "create_board", skip_all)]
pub async fn create_board(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(draft): Json<BoardDraft>,
) -> Result<(StatusCode, Json<Board>), ApiError> {
    let board = state.boards.create(&caller.principal_id, draft)?;
    tracing::info!(board_id = %board.id, "Board created");
    Ok((StatusCode::CREATED, Json(board)))
}

/// `GET /api/boards/{id}`
#[tracing::instrument(name = "get_board", skip_all)]
pub async fn get_board(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Board>, ApiError> {
    let id = BoardId::parse(&id)?;
    Ok(Json(state.boards.get(id, &caller.principal_id)?))
}

/// `PUT /api/boards/{id}`
#[tracing::instrument(name = "update_board", skip_all)]
pub async fn update_board(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(draft): Json<BoardDraft>,
) -> Result<Json<Board>, ApiError> {
    let id = BoardId::parse(&id)?;
    Ok(Json(state.boards.update(id, &caller.principal_id, draft)?))
}

/// `DELETE /api/boards/{id}`
#[tracing::instrument(name = "delete_board", skip_all)]
pub async fn delete_board(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = BoardId::parse(&id)?;
    state.boards.delete(id, &caller.principal_id)?;
    tracing::info!(board_id = %id, "Board deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/auth/signup` body.
#[derive(Deserialize)]
pub struct SignupRequest {
    /// Unique display name.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// Clear-text password; hashed before storage.
    pub password: String,
}

/// `POST /api/auth/login` body.
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Clear-text password.
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct AccountView {
    /// Principal id.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Login email.
    pub email: String,
}

/// Response to a successful signup or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// Bearer token for the board API.
    pub token: String,
    /// The account the token authenticates as.
    pub user: AccountView,
}

fn auth_response(accounts: &AccountService, account: Account) -> Result<AuthResponse, ApiError> {
    let token = accounts
        .tokens
        .issue(&account.identity(), Some(&account.email))?;
    Ok(AuthResponse {
        token,
        user: AccountView {
            id: account.id,
            username: account.username,
            email: account.email,
        },
    })
}

/// `POST /api/auth/signup`
#[tracing::instrument(name = "signup", skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let accounts = state.accounts.ok_or(ApiError::AccountsDisabled)?;
    let store = Arc::clone(&accounts.store);
    let account = tokio::task::spawn_blocking(move || {
        store.signup(&request.username, &request.email, &request.password)
    })
    .await??;
    Ok((StatusCode::CREATED, Json(auth_response(&accounts, account)?)))
}

/// `POST /api/auth/login`
#[tracing::instrument(name = "login", skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let accounts = state.accounts.ok_or(ApiError::AccountsDisabled)?;
    let store = Arc::clone(&accounts.store);
    let account =
        tokio::task::spawn_blocking(move || store.login(&request.email, &request.password))
            .await??;
    tracing::debug!(account_id = %account.id, "Logged in");
    Ok(Json(auth_response(&accounts, account)?))
}

/// `GET /api/sessions/{key}`: current canvas of a live session.
///
/// This is the payload a client saves as a board.
pub async fn get_session_snapshot(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CanvasSnapshot>, ApiError> {
    state
        .engine
        .registry()
        .get(&key)
        .map(|session| Json(session.snapshot()))
        .ok_or(ApiError::SessionNotFound(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::MissingCredential, StatusCode::UNAUTHORIZED),
            (
                ApiError::Canvas(CanvasError::ExpiredCredential),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Canvas(CanvasError::BoardNotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::SessionNotFound("k".into()), StatusCode::NOT_FOUND),
            (
                ApiError::Canvas(CanvasError::InvalidBoard("title".into())),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::AccountsDisabled, StatusCode::NOT_FOUND),
            (
                ApiError::Canvas(CanvasError::AccountExists),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Canvas(CanvasError::InvalidAccount("email".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
