//! Request extractors

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::UserIdentity;

/// Caller resolved from an `Authorization: Bearer <token>` header
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserIdentity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let user = state.verifier.verify(token).await?;
        Ok(AuthUser(user))
    }
}
