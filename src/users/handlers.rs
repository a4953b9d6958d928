use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{auth::dto::PublicUser, auth::extractors::CurrentUser, error::Error, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/students", get(student_roster))
}

/// `/ranking` is public in the original; it lives outside the
/// authenticated router.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/ranking", get(ranking))
}

#[derive(Debug, Deserialize)]
pub struct RankingQueryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[instrument(skip(state, user))]
pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<PublicUser>, Error> {
    let user = state.users.profile(user.0.id).await?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, user))]
pub async fn student_roster(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<PublicUser>>, Error> {
    user.require_guardian()?;
    let students = state.users.students_by_family(user.0.family_id).await?;
    Ok(Json(students.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn ranking(
    State(state): State<AppState>,
    Query(params): Query<RankingQueryParams>,
) -> Result<Json<Vec<PublicUser>>, Error> {
    let top = state.users.top_students(params.limit.min(100)).await?;
    Ok(Json(top.into_iter().map(PublicUser::from).collect()))
}
