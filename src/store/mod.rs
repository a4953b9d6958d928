//! Abstract persistence contract for the five entity families (plus the
//! session collection owned by the auth layer). Each repository call is
//! atomic; nothing here spans two calls in one transaction — composite
//! operations are sequenced by the workflow services.

pub mod memory;
pub mod postgres;
pub mod seed;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use self::types::{
    NewRedemption, NewReward, NewTask, NewUser, Redemption, Reward, Session, Task, TaskAssignment,
    TaskStatus, User,
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User>;
    async fn get(&self, id: i64) -> Result<User>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Ledger primitive: add `delta` (either sign) to the balance and
    /// return the new value. Does not re-check non-negativity; callers
    /// issuing debits go through `debit_points` instead.
    async fn add_points(&self, user_id: i64, delta: i64) -> Result<i64>;

    /// Atomic check-and-debit: fails `InsufficientBalance` and leaves the
    /// balance untouched unless `balance >= cost` at the moment of the
    /// debit. Concurrent debits serialize on the user store.
    async fn debit_points(&self, user_id: i64, cost: i64) -> Result<i64>;

    async fn students_by_family(&self, family_id: i64) -> Result<Vec<User>>;

    /// Students ordered by points descending, ties broken by ascending
    /// user id, truncated to `limit`.
    async fn top_students(&self, limit: usize) -> Result<Vec<User>>;
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn create_task(&self, new: NewTask) -> Result<Task>;
    async fn get_task(&self, id: i64) -> Result<Task>;
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Creates an assignment in Todo, snapshotting the task's title and
    /// points. Fails `NotFound` if the task does not exist.
    async fn assign(&self, student_id: i64, task_id: i64) -> Result<TaskAssignment>;

    async fn get_assignment(&self, id: i64) -> Result<TaskAssignment>;
    async fn assignments_for_student(&self, student_id: i64) -> Result<Vec<TaskAssignment>>;
    async fn pending_assignments(&self) -> Result<Vec<TaskAssignment>>;

    /// Todo → Pending, stamping `submitted_at`. `InvalidState` otherwise.
    async fn mark_submitted(&self, id: i64) -> Result<TaskAssignment>;

    /// Non-terminal → Done, stamping `approved_at`. `InvalidState` on a
    /// terminal assignment.
    async fn mark_done(&self, id: i64) -> Result<TaskAssignment>;

    /// Non-terminal → Rejected. `InvalidState` on a terminal assignment.
    async fn mark_rejected(&self, id: i64) -> Result<TaskAssignment>;

    /// Rollback hook for the approve flow: forces the status back without
    /// lifecycle checks. Not part of the workflow surface.
    async fn reset_status(&self, id: i64, status: TaskStatus) -> Result<()>;
}

#[async_trait]
pub trait RewardRepo: Send + Sync {
    async fn create_reward(&self, new: NewReward) -> Result<Reward>;
    async fn get_reward(&self, id: i64) -> Result<Reward>;
    async fn list_rewards(&self) -> Result<Vec<Reward>>;

    /// Advisory stock decrement, saturating at zero.
    async fn decrement_stock(&self, id: i64) -> Result<()>;

    async fn create_redemption(&self, new: NewRedemption) -> Result<Redemption>;
    async fn redemptions_for_student(&self, student_id: i64) -> Result<Vec<Redemption>>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, session: Session) -> Result<()>;

    /// Returns `None` for unknown or expired tokens. Expiry is a wall-clock
    /// comparison at lookup time; expired rows are pruned lazily here, not
    /// by a background sweep.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    async fn delete(&self, token: &str) -> Result<()>;
}

/// Bundle of the per-family repositories behind one backend.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepo>,
    pub tasks: Arc<dyn TaskRepo>,
    pub rewards: Arc<dyn RewardRepo>,
    pub sessions: Arc<dyn SessionRepo>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUserRepo::new()),
            tasks: Arc::new(memory::MemoryTaskRepo::new()),
            rewards: Arc::new(memory::MemoryRewardRepo::new()),
            sessions: Arc::new(memory::MemorySessionRepo::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(postgres::PgUserRepo::new(pool.clone())),
            tasks: Arc::new(postgres::PgTaskRepo::new(pool.clone())),
            rewards: Arc::new(postgres::PgRewardRepo::new(pool.clone())),
            sessions: Arc::new(postgres::PgSessionRepo::new(pool)),
        }
    }
}
