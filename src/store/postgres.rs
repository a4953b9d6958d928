//! Postgres backend. State-machine guards and the ledger debit are single
//! conditional UPDATEs, so each call is atomic on the database side just
//! like the in-memory tables are behind their mutexes.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::types::{
    NewRedemption, NewReward, NewTask, NewUser, Redemption, Reward, RewardCategory, Role, Session,
    Task, TaskAssignment, TaskCategory, TaskStatus, User,
};
use crate::store::{RewardRepo, SessionRepo, TaskRepo, UserRepo};

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    display_name: String,
    role: String,
    points: i64,
    family_id: i64,
    grade: Option<i16>,
    deleted: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(r: UserRow) -> Result<User> {
        let role = Role::from_str(&r.role)
            .ok_or_else(|| Error::Internal(anyhow!("unknown role {:?} for user {}", r.role, r.id)))?;
        Ok(User {
            id: r.id,
            username: r.username,
            password_hash: r.password_hash,
            display_name: r.display_name,
            role,
            points: r.points,
            family_id: r.family_id,
            grade: r.grade,
            deleted: r.deleted,
            created_at: r.created_at,
        })
    }
}

const USER_COLS: &str =
    "id, username, password_hash, display_name, role, points, family_id, grade, deleted, created_at";

pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, new: NewUser) -> Result<User> {
        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = $1")
            .bind(&new.username)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(Error::InvalidArgument("username already taken".into()));
        }
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, password_hash, display_name, role, points, family_id, grade) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLS}"
        ))
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.display_name)
        .bind(new.role.as_str())
        .bind(new.points)
        .bind(new.family_id)
        .bind(new.grade)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: i64) -> Result<User> {
        let row =
            sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(Error::NotFound("user"))?;
        row.try_into()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn add_points(&self, user_id: i64, delta: i64) -> Result<i64> {
        let points = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET points = points + $2 WHERE id = $1 RETURNING points",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound("user"))?;
        Ok(points)
    }

    async fn debit_points(&self, user_id: i64, cost: i64) -> Result<i64> {
        // One conditional UPDATE: the check and the debit cannot interleave
        // with a concurrent debit.
        let points = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET points = points - $2 WHERE id = $1 AND points >= $2 RETURNING points",
        )
        .bind(user_id)
        .bind(cost)
        .fetch_optional(&self.pool)
        .await?;
        match points {
            Some(p) => Ok(p),
            None => {
                let user = self.get(user_id).await?;
                Err(Error::InsufficientBalance {
                    have: user.points,
                    need: cost,
                })
            }
        }
    }

    async fn students_by_family(&self, family_id: i64) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE family_id = $1 AND role = 'student'"
        ))
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn top_students(&self, limit: usize) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE role = 'student' \
             ORDER BY points DESC, id ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    points: i64,
    category: i16,
    recurrence: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<TaskRow> for Task {
    type Error = Error;

    fn try_from(r: TaskRow) -> Result<Task> {
        let category = TaskCategory::from_i16(r.category).ok_or_else(|| {
            Error::Internal(anyhow!("unknown category {} for task {}", r.category, r.id))
        })?;
        Ok(Task {
            id: r.id,
            title: r.title,
            points: r.points,
            category,
            recurrence: r.recurrence,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    id: i64,
    student_id: i64,
    task_id: i64,
    task_title: String,
    task_points: i64,
    status: i16,
    submitted_at: Option<OffsetDateTime>,
    approved_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<AssignmentRow> for TaskAssignment {
    type Error = Error;

    fn try_from(r: AssignmentRow) -> Result<TaskAssignment> {
        let status = TaskStatus::from_i16(r.status).ok_or_else(|| {
            Error::Internal(anyhow!("unknown status {} for assignment {}", r.status, r.id))
        })?;
        Ok(TaskAssignment {
            id: r.id,
            student_id: r.student_id,
            task_id: r.task_id,
            task_title: r.task_title,
            task_points: r.task_points,
            status,
            submitted_at: r.submitted_at,
            approved_at: r.approved_at,
            created_at: r.created_at,
        })
    }
}

const ASSIGNMENT_COLS: &str =
    "id, student_id, task_id, task_title, task_points, status, submitted_at, approved_at, created_at";

pub struct PgTaskRepo {
    pool: PgPool,
}

impl PgTaskRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Disambiguates a no-op conditional UPDATE: unknown id vs. a
    /// lifecycle violation.
    async fn state_error(&self, id: i64) -> Error {
        match self.get_assignment(id).await {
            Ok(a) => Error::InvalidState(format!("assignment is {:?}", a.status)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn create_task(&self, new: NewTask) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            "INSERT INTO tasks (title, points, category, recurrence) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, points, category, recurrence, created_at",
        )
        .bind(&new.title)
        .bind(new.points)
        .bind(new.category.as_i16())
        .bind(&new.recurrence)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_task(&self, id: i64) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT id, title, points, category, recurrence, created_at FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound("task"))?;
        row.try_into()
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, title, points, category, recurrence, created_at FROM tasks",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn assign(&self, student_id: i64, task_id: i64) -> Result<TaskAssignment> {
        // INSERT..SELECT takes the title/points snapshot in the same
        // statement that proves the task exists.
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "INSERT INTO task_assignments (student_id, task_id, task_title, task_points, status) \
             SELECT $1, t.id, t.title, t.points, 0 FROM tasks t WHERE t.id = $2 \
             RETURNING {ASSIGNMENT_COLS}"
        ))
        .bind(student_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound("task"))?;
        row.try_into()
    }

    async fn get_assignment(&self, id: i64) -> Result<TaskAssignment> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLS} FROM task_assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound("assignment"))?;
        row.try_into()
    }

    async fn assignments_for_student(&self, student_id: i64) -> Result<Vec<TaskAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLS} FROM task_assignments WHERE student_id = $1"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn pending_assignments(&self) -> Result<Vec<TaskAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLS} FROM task_assignments WHERE status = 1"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn mark_submitted(&self, id: i64) -> Result<TaskAssignment> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "UPDATE task_assignments SET status = 1, submitted_at = NOW() \
             WHERE id = $1 AND status = 0 RETURNING {ASSIGNMENT_COLS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => r.try_into(),
            None => Err(self.state_error(id).await),
        }
    }

    async fn mark_done(&self, id: i64) -> Result<TaskAssignment> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "UPDATE task_assignments SET status = 2, approved_at = NOW() \
             WHERE id = $1 AND status IN (0, 1) RETURNING {ASSIGNMENT_COLS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => r.try_into(),
            None => Err(self.state_error(id).await),
        }
    }

    async fn mark_rejected(&self, id: i64) -> Result<TaskAssignment> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "UPDATE task_assignments SET status = 3 \
             WHERE id = $1 AND status IN (0, 1) RETURNING {ASSIGNMENT_COLS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => r.try_into(),
            None => Err(self.state_error(id).await),
        }
    }

    async fn reset_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        let done = sqlx::query(
            "UPDATE task_assignments SET status = $2, \
             approved_at = CASE WHEN $2 = 2 THEN approved_at ELSE NULL END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_i16())
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("assignment"));
        }
        Ok(())
    }
}

#[derive(FromRow)]
struct RewardRow {
    id: i64,
    title: String,
    cost: i64,
    category: i16,
    stock: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<RewardRow> for Reward {
    type Error = Error;

    fn try_from(r: RewardRow) -> Result<Reward> {
        let category = RewardCategory::from_i16(r.category).ok_or_else(|| {
            Error::Internal(anyhow!("unknown category {} for reward {}", r.category, r.id))
        })?;
        Ok(Reward {
            id: r.id,
            title: r.title,
            cost: r.cost,
            category,
            stock: r.stock,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct RedemptionRow {
    id: i64,
    student_id: i64,
    reward_id: i64,
    reward_title: String,
    cost: i64,
    created_at: OffsetDateTime,
}

impl From<RedemptionRow> for Redemption {
    fn from(r: RedemptionRow) -> Redemption {
        Redemption {
            id: r.id,
            student_id: r.student_id,
            reward_id: r.reward_id,
            reward_title: r.reward_title,
            cost: r.cost,
            created_at: r.created_at,
        }
    }
}

pub struct PgRewardRepo {
    pool: PgPool,
}

impl PgRewardRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RewardRepo for PgRewardRepo {
    async fn create_reward(&self, new: NewReward) -> Result<Reward> {
        let row = sqlx::query_as::<_, RewardRow>(
            "INSERT INTO rewards (title, cost, category, stock) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, cost, category, stock, created_at",
        )
        .bind(&new.title)
        .bind(new.cost)
        .bind(new.category.as_i16())
        .bind(new.stock)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_reward(&self, id: i64) -> Result<Reward> {
        let row = sqlx::query_as::<_, RewardRow>(
            "SELECT id, title, cost, category, stock, created_at FROM rewards WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound("reward"))?;
        row.try_into()
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        let rows = sqlx::query_as::<_, RewardRow>(
            "SELECT id, title, cost, category, stock, created_at FROM rewards",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryFrom::try_from).collect()
    }

    async fn decrement_stock(&self, id: i64) -> Result<()> {
        let done = sqlx::query(
            "UPDATE rewards SET stock = GREATEST(stock - 1, 0) WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("reward"));
        }
        Ok(())
    }

    async fn create_redemption(&self, new: NewRedemption) -> Result<Redemption> {
        let row = sqlx::query_as::<_, RedemptionRow>(
            "INSERT INTO redemptions (student_id, reward_id, reward_title, cost) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, student_id, reward_id, reward_title, cost, created_at",
        )
        .bind(new.student_id)
        .bind(new.reward_id)
        .bind(&new.reward_title)
        .bind(new.cost)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn redemptions_for_student(&self, student_id: i64) -> Result<Vec<Redemption>> {
        let rows = sqlx::query_as::<_, RedemptionRow>(
            "SELECT id, student_id, reward_id, reward_title, cost, created_at \
             FROM redemptions WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(FromRow)]
struct SessionRow {
    token: String,
    user_id: i64,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<SessionRow> for Session {
    fn from(r: SessionRow) -> Session {
        Session {
            token: r.token,
            user_id: r.user_id,
            expires_at: r.expires_at,
            created_at: r.created_at,
        }
    }
}

pub struct PgSessionRepo {
    pool: PgPool,
}

impl PgSessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn create(&self, session: Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        // Expired rows are swept opportunistically on lookup.
        sqlx::query("DELETE FROM sessions WHERE token = $1 AND expires_at <= NOW()")
            .bind(token)
            .execute(&self.pool)
            .await?;
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, user_id, expires_at, created_at FROM sessions \
             WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
