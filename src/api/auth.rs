//! `/auth/token`: issues the bearer JWT that `middleware::auth` checks on
//! every other route. No session cookies — the hub is a machine-to-machine
//! API, not a browser-facing one.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::HubError;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Caller-supplied identity recorded as the JWT `sub` claim. The hub
    /// does not maintain a user directory; any non-empty subject is
    /// accepted as long as the caller already holds the configured secret
    /// out-of-band (this endpoint is only reachable when `jwt_secret` is
    /// set, since without one auth is disabled entirely).
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

const TOKEN_TTL_SECS: i64 = 3600;

pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, HubError> {
    if state.config.api.jwt_secret.is_empty() {
        return Err(HubError::Validation(
            "token issuance is disabled: no jwt_secret configured".to_string(),
        ));
    }
    if req.subject.trim().is_empty() {
        return Err(HubError::Validation("subject must not be empty".to_string()));
    }

    let token = crate::middleware::issue_token(&state.config.api.jwt_secret, &req.subject, TOKEN_TTL_SECS)
        .map_err(|e| HubError::Validation(format!("failed to issue token: {e}")))?;

    Ok(Json(TokenResponse { access_token: token, token_type: "Bearer", expires_in: TOKEN_TTL_SECS }))
}

