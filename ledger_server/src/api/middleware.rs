//! Service token middleware for the ledger routes.
//!
//! The ledger is called by game services, not by players. When
//! `LEDGER_API_TOKEN` is set every `/api/v1` request must carry it:
//!
//! ```text
//! Authorization: Bearer <LEDGER_API_TOKEN>
//! ```

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chip_ledger::LedgerStore;

use super::AppState;

/// Reject requests without the configured service token
///
/// - **No token configured**: every request passes
/// - **Missing or malformed header**: `401 Unauthorized`
/// - **Wrong token**: `401 Unauthorized`
pub async fn require_service_token<S: LedgerStore>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            tracing::debug!(uri = %request.uri(), "Rejected request without valid service token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
