use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::error::Error;
use crate::state::AppState;
use crate::store::types::{Role, User};

/// Resolves the bearer token to the acting user via the session gate.
pub struct CurrentUser(pub User);

impl CurrentUser {
    /// Guardian-only endpoints call this before touching the workflow.
    pub fn require_guardian(&self) -> Result<(), Error> {
        if self.0.role != Role::Guardian {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(Error::Unauthenticated("missing Authorization header"))?;

        // Expect "Bearer <token>"; a bare token is accepted too, as the
        // original clients send it without a scheme.
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .unwrap_or(auth);

        let user = state.auth.validate(token).await?;
        Ok(CurrentUser(user))
    }
}
