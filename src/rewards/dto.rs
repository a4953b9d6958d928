use serde::Deserialize;

use crate::store::types::RewardCategory;

#[derive(Debug, Deserialize)]
pub struct CreateRewardRequest {
    pub title: String,
    pub cost: i64,
    #[serde(default = "default_category")]
    pub category: RewardCategory,
    #[serde(default)]
    pub stock: i64,
}

fn default_category() -> RewardCategory {
    RewardCategory::Item
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub reward_id: i64,
    /// What the client believes the reward costs. Compared against the
    /// stored cost; never trusted as the amount to charge.
    pub cost: Option<i64>,
}
