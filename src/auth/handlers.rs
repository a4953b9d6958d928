use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
    error::Error,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, Error> {
    let username = payload.username.trim().to_lowercase();
    let user = state
        .auth
        .register(
            &username,
            &payload.password,
            payload.role,
            &payload.display_name,
            payload.grade,
            payload.family_id,
        )
        .await
        .map_err(|e| {
            warn!(username = %username, error = %e, "registration rejected");
            e
        })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(Json(AuthResponse {
        token: None,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, Error> {
    let username = payload.username.trim().to_lowercase();
    let (user, token) = state.auth.login(&username, &payload.password).await.map_err(|e| {
        warn!(username = %username, "login failed");
        e
    })?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        token: Some(token),
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Error> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h))
        .ok_or(Error::Unauthenticated("missing Authorization header"))?;

    state.auth.logout(token).await?;
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}
