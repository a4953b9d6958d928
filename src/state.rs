use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::auth::services::AuthService;
use crate::config::AppConfig;
use crate::rewards::services::RewardService;
use crate::store::{seed, Stores};
use crate::tasks::services::TaskService;
use crate::users::services::UserService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub tasks: TaskService,
    pub rewards: RewardService,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let stores = match &config.database_url {
            Some(url) => match PgPoolOptions::new().max_connections(10).connect(url).await {
                Ok(pool) => {
                    sqlx::migrate!("./migrations").run(&pool).await?;
                    tracing::info!("connected to postgres");
                    Stores::postgres(pool)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "postgres unreachable; falling back to in-memory store");
                    Stores::in_memory()
                }
            },
            None => {
                tracing::info!("DATABASE_URL not set; using in-memory store");
                Stores::in_memory()
            }
        };

        if config.seed_demo {
            seed::seed_demo(&stores, config.starting_points).await?;
            tracing::info!("demo data seeded");
        }

        Ok(Self::from_stores(config, stores))
    }

    pub fn from_stores(config: Arc<AppConfig>, stores: Stores) -> Self {
        Self {
            auth: AuthService::new(
                stores.users.clone(),
                stores.sessions.clone(),
                config.session_ttl_hours,
                config.starting_points,
            ),
            tasks: TaskService::new(stores.tasks.clone(), stores.users.clone()),
            rewards: RewardService::new(stores.rewards.clone(), stores.users.clone()),
            users: UserService::new(stores.users.clone()),
            config,
        }
    }

    /// In-memory state for tests: no database, no seeding.
    pub fn in_memory() -> Self {
        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            session_ttl_hours: 1,
            starting_points: 100,
            seed_demo: false,
        });
        Self::from_stores(config, Stores::in_memory())
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::error::Error;
    use crate::store::types::{Role, RewardCategory, TaskCategory, TaskStatus};

    /// Full happy-path walk through the wired services: create a task,
    /// assign it, submit, approve, then fail a too-expensive redemption.
    #[tokio::test]
    async fn homework_earns_points_but_not_enough_for_the_cinema() {
        let state = AppState::in_memory();

        let student = state
            .auth
            .register("student7", "123456", Role::Student, "Kim", Some(4), None)
            .await
            .expect("register student");
        // Spend the registration grant up front so the arithmetic below
        // tracks earned points only.
        let grant = state
            .rewards
            .create_reward("Sticker pack", student.points, RewardCategory::Item, 1)
            .await
            .expect("create drain reward");
        state
            .rewards
            .redeem(student.id, grant.id, None)
            .await
            .expect("drain grant");
        assert_eq!(state.users.profile(student.id).await.expect("profile").points, 0);

        let task = state
            .tasks
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create task");

        let assignment = state
            .tasks
            .assign_to_student(student.id, task.id)
            .await
            .expect("assign");
        assert_eq!(assignment.status, TaskStatus::Todo);

        let submitted = state
            .tasks
            .submit(assignment.id, student.id)
            .await
            .expect("submit");
        assert_eq!(submitted.status, TaskStatus::Pending);
        assert!(submitted.submitted_at.is_some());

        let done = state.tasks.approve(assignment.id).await.expect("approve");
        assert_eq!(done.status, TaskStatus::Done);
        assert!(done.approved_at.is_some());
        assert_eq!(
            state.users.profile(student.id).await.expect("profile").points,
            30
        );

        let cinema = state
            .rewards
            .create_reward("Cinema trip", 40, RewardCategory::Time, 1)
            .await
            .expect("create reward");
        let err = state
            .rewards
            .redeem(student.id, cinema.id, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { have: 30, need: 40 }
        ));
        assert_eq!(
            state.users.profile(student.id).await.expect("profile").points,
            30
        );
    }
}
