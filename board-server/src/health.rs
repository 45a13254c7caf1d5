//! Health check endpoints for container orchestration.
//!
//! - `/health/live` - Liveness check (restart if fails)
//! - `/health/ready` - Readiness check (remove from LB if fails)

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: &'static str,
    /// Server version
    pub version: &'static str,
    /// Individual component checks
    pub checks: HealthChecks,
}

/// Individual health checks.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Board store can serve and accept writes
    pub board_store: bool,
    /// Live sessions
    pub sessions: usize,
    /// Open connections
    pub connections: usize,
}

/// Liveness check - is the server running?
#[tracing::instrument(name = "liveness")]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check - is the server ready to accept traffic?
#[tracing::instrument(name = "readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let board_store_ok = match state.boards.check() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Board store failed its health check");
            false
        }
    };

    let all_ok = board_store_ok;
    let status = HealthStatus {
        status: if all_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            board_store: board_store_ok,
            sessions: state.engine.registry().len(),
            connections: state.engine.connection_count(),
        },
    };

    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy",
            version: "0.2.0",
            checks: HealthChecks {
                board_store: true,
                sessions: 2,
                connections: 3,
            },
        };

        let json = serde_json::to_value(&status).expect("should serialize");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["sessions"], 2);
        assert_eq!(json["checks"]["connections"], 3);
        assert!(json["checks"].get("registry").is_none());
    }
}
