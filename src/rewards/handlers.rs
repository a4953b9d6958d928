use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::CurrentUser,
    error::Error,
    state::AppState,
    store::types::{Redemption, Reward},
};

use super::dto::{CreateRewardRequest, RedeemRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rewards", get(list_rewards).post(create_reward))
        .route("/rewards/redeem", post(redeem))
        .route("/redemptions", get(list_redemptions))
}

#[instrument(skip(state, _user))]
pub async fn list_rewards(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<Reward>>, Error> {
    Ok(Json(state.rewards.list_rewards().await?))
}

#[instrument(skip(state, user, payload))]
pub async fn create_reward(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateRewardRequest>,
) -> Result<Json<Reward>, Error> {
    user.require_guardian()?;
    let reward = state
        .rewards
        .create_reward(&payload.title, payload.cost, payload.category, payload.stock)
        .await?;
    info!(reward_id = reward.id, title = %reward.title, "reward created");
    Ok(Json(reward))
}

#[instrument(skip(state, user, payload))]
pub async fn redeem(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<Redemption>, Error> {
    let redemption = state
        .rewards
        .redeem(user.0.id, payload.reward_id, payload.cost)
        .await?;
    info!(
        redemption_id = redemption.id,
        student_id = user.0.id,
        reward_id = payload.reward_id,
        cost = redemption.cost,
        "reward redeemed"
    );
    Ok(Json(redemption))
}

#[instrument(skip(state, user))]
pub async fn list_redemptions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Redemption>>, Error> {
    Ok(Json(state.rewards.redemptions_for_student(user.0.id).await?))
}
