use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Per-request operator context carried by the bearer token. Issuance and
/// expiry live outside this service.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("expected a bearer token".to_string()))?;

        if token.is_empty() {
            return Err(AppError::Unauthorized("empty bearer token".to_string()));
        }

        let accepted = &state.config.api_tokens;
        if !accepted.is_empty() && !accepted.iter().any(|known| known == token) {
            return Err(AppError::Unauthorized("unknown bearer token".to_string()));
        }

        Ok(Session {
            token: token.to_string(),
        })
    }
}
