//! Bearer-token auth middleware. HS256 JWTs issued by `/auth/token`,
//! checked on every other route. Auth is a no-op pass-through when no
//! `jwt_secret` is configured, rather than refusing to boot.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody { error: message.to_string(), code: "UNAUTHORIZED" }),
    )
        .into_response()
}

/// Issues an HS256 token for `subject`, valid for `ttl_secs`. Used by
/// `POST /auth/token`.
pub fn issue_token(secret: &str, subject: &str, ttl_secs: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs)).timestamp() as usize;
    let claims = Claims { sub: subject.to_string(), exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

const PUBLIC_PATHS: &[&str] = &["/health", "/metrics", "/auth/token", "/docs", "/openapi.json"];

/// Validates `Authorization: Bearer <jwt>` on every route not in
/// `PUBLIC_PATHS`. Pass-through (no validation at all) when
/// `ApiConfig::jwt_secret` is empty.
pub async fn require_bearer_token(
    State(config): State<ApiConfig>,
    request: Request,
    next: Next,
) -> Response {
    if config.jwt_secret.is_empty() {
        return next.run(request).await;
    }

    if PUBLIC_PATHS.iter().any(|p| request.uri().path() == *p) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized("missing bearer token");
    };

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    );

    match decoded {
        Ok(_) => next.run(request).await,
        Err(e) => unauthorized(&format!("invalid bearer token: {e}")),
    }
}
