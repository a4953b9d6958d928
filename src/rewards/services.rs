use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::types::{NewRedemption, NewReward, Redemption, Reward, RewardCategory};
use crate::store::{RewardRepo, UserRepo};

/// Redemption flow. The cost is always the stored Reward's cost; a
/// client-supplied expectation is only ever compared against it. The
/// balance check and the debit are one atomic ledger call, so concurrent
/// redemptions cannot overdraw.
#[derive(Clone)]
pub struct RewardService {
    rewards: Arc<dyn RewardRepo>,
    users: Arc<dyn UserRepo>,
}

impl RewardService {
    pub fn new(rewards: Arc<dyn RewardRepo>, users: Arc<dyn UserRepo>) -> Self {
        Self { rewards, users }
    }

    pub async fn create_reward(
        &self,
        title: &str,
        cost: i64,
        category: RewardCategory,
        stock: i64,
    ) -> Result<Reward> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidArgument("title must be non-empty".into()));
        }
        if cost <= 0 {
            return Err(Error::InvalidArgument("cost must be positive".into()));
        }
        self.rewards
            .create_reward(NewReward {
                title: title.into(),
                cost,
                category,
                stock: stock.max(0),
            })
            .await
    }

    pub async fn list_rewards(&self) -> Result<Vec<Reward>> {
        self.rewards.list_rewards().await
    }

    pub async fn redemptions_for_student(&self, student_id: i64) -> Result<Vec<Redemption>> {
        self.rewards.redemptions_for_student(student_id).await
    }

    pub async fn redeem(
        &self,
        student_id: i64,
        reward_id: i64,
        expected_cost: Option<i64>,
    ) -> Result<Redemption> {
        let reward = self.rewards.get_reward(reward_id).await?;
        self.users.get(student_id).await?;

        if let Some(expected) = expected_cost {
            if expected != reward.cost {
                return Err(Error::InvalidArgument(format!(
                    "cost mismatch: reward costs {}, request says {}",
                    reward.cost, expected
                )));
            }
        }

        self.users.debit_points(student_id, reward.cost).await?;

        // Advisory stock counter; a failure here must not lose the debit.
        self.rewards.decrement_stock(reward_id).await?;

        match self
            .rewards
            .create_redemption(NewRedemption {
                student_id,
                reward_id,
                reward_title: reward.title.clone(),
                cost: reward.cost,
            })
            .await
        {
            Ok(redemption) => Ok(redemption),
            Err(e) => {
                // Receipt did not land; give the points back best-effort.
                let _ = self.users.add_points(student_id, reward.cost).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod redemption_tests {
    use super::*;
    use crate::store::types::{NewUser, Role};
    use crate::store::Stores;

    async fn student(stores: &Stores, points: i64) -> i64 {
        stores
            .users
            .create(NewUser {
                username: "kim".into(),
                password_hash: "x".into(),
                display_name: "Kim".into(),
                role: Role::Student,
                points,
                family_id: 1,
                grade: Some(3),
            })
            .await
            .expect("create student")
            .id
    }

    fn service(stores: &Stores) -> RewardService {
        RewardService::new(stores.rewards.clone(), stores.users.clone())
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_everything_unchanged() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, 30).await;
        let reward = svc
            .create_reward("Cinema trip", 40, RewardCategory::Time, 5)
            .await
            .expect("create reward");

        let err = svc.redeem(sid, reward.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { have: 30, need: 40 }
        ));
        assert_eq!(stores.users.get(sid).await.expect("get").points, 30);
        assert_eq!(
            stores
                .rewards
                .get_reward(reward.id)
                .await
                .expect("get")
                .stock,
            5
        );
        assert!(svc
            .redemptions_for_student(sid)
            .await
            .expect("history")
            .is_empty());
    }

    #[tokio::test]
    async fn redeem_snapshots_title_and_cost() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, 100).await;
        let reward = svc
            .create_reward("Ice cream", 80, RewardCategory::Item, 10)
            .await
            .expect("create reward");

        let redemption = svc.redeem(sid, reward.id, Some(80)).await.expect("redeem");
        assert_eq!(redemption.reward_title, "Ice cream");
        assert_eq!(redemption.cost, 80);
        assert_eq!(stores.users.get(sid).await.expect("get").points, 20);
        assert_eq!(
            stores
                .rewards
                .get_reward(reward.id)
                .await
                .expect("get")
                .stock,
            9
        );
    }

    #[tokio::test]
    async fn client_cost_mismatch_is_rejected_without_debit() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, 100).await;
        let reward = svc
            .create_reward("Ice cream", 80, RewardCategory::Item, 10)
            .await
            .expect("create reward");

        // A tampered client claiming a cheaper price gets refused.
        let err = svc.redeem(sid, reward.id, Some(1)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(stores.users.get(sid).await.expect("get").points, 100);
    }

    #[tokio::test]
    async fn unknown_reward_or_student_is_not_found() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, 100).await;
        assert!(matches!(
            svc.redeem(sid, 99, None).await.unwrap_err(),
            Error::NotFound("reward")
        ));
        let reward = svc
            .create_reward("Ice cream", 80, RewardCategory::Item, 10)
            .await
            .expect("create reward");
        assert!(matches!(
            svc.redeem(999, reward.id, None).await.unwrap_err(),
            Error::NotFound("user")
        ));
    }

    /// Two redemptions racing for one balance: exactly one may win. This
    /// is the check-then-debit race from the reference behavior, closed by
    /// the atomic `debit_points`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemptions_never_overdraw() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, 100).await;
        let reward = svc
            .create_reward("Board game", 60, RewardCategory::Item, 10)
            .await
            .expect("create reward");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            let reward_id = reward.id;
            handles.push(tokio::spawn(
                async move { svc.redeem(sid, reward_id, None).await },
            ));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.expect("join").is_ok() {
                wins += 1;
            }
        }

        // 100 points buy exactly one 60-point reward.
        assert_eq!(wins, 1);
        let balance = stores.users.get(sid).await.expect("get").points;
        assert_eq!(balance, 40);
        assert!(balance >= 0);
        assert_eq!(
            svc.redemptions_for_student(sid)
                .await
                .expect("history")
                .len(),
            1
        );
    }
}
