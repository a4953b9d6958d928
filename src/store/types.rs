use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guardian,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guardian => "guardian",
            Role::Student => "student",
        }
    }

    pub fn from_str(s: &str) -> Option<Role> {
        match s {
            "guardian" => Some(Role::Guardian),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Study,
    Chore,
    Habit,
}

impl TaskCategory {
    pub fn as_i16(self) -> i16 {
        match self {
            TaskCategory::Study => 1,
            TaskCategory::Chore => 2,
            TaskCategory::Habit => 3,
        }
    }

    pub fn from_i16(v: i16) -> Option<TaskCategory> {
        match v {
            1 => Some(TaskCategory::Study),
            2 => Some(TaskCategory::Chore),
            3 => Some(TaskCategory::Habit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardCategory {
    Time,
    Item,
}

impl RewardCategory {
    pub fn as_i16(self) -> i16 {
        match self {
            RewardCategory::Time => 1,
            RewardCategory::Item => 2,
        }
    }

    pub fn from_i16(v: i16) -> Option<RewardCategory> {
        match v {
            1 => Some(RewardCategory::Time),
            2 => Some(RewardCategory::Item),
            _ => None,
        }
    }
}

/// Assignment lifecycle: Todo → Pending → {Done, Rejected}.
/// Done and Rejected are terminal; nothing moves an assignment out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Pending,
    Done,
    Rejected,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Rejected)
    }

    pub fn as_i16(self) -> i16 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::Pending => 1,
            TaskStatus::Done => 2,
            TaskStatus::Rejected => 3,
        }
    }

    pub fn from_i16(v: i16) -> Option<TaskStatus> {
        match v {
            0 => Some(TaskStatus::Todo),
            1 => Some(TaskStatus::Pending),
            2 => Some(TaskStatus::Done),
            3 => Some(TaskStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub points: i64,
    pub family_id: i64,
    pub grade: Option<i16>,
    /// Soft-delete flag. Reserved; no core operation sets it.
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub points: i64,
    pub family_id: i64,
    pub grade: Option<i16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub points: i64,
    pub category: TaskCategory,
    pub recurrence: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub points: i64,
    pub category: TaskCategory,
    pub recurrence: Option<String>,
}

/// One instance of a Task given to one student. Carries a title/points
/// snapshot taken at assign time; the approval credit pays `task_points`,
/// so a later catalog edit cannot change what an open assignment is worth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: i64,
    pub student_id: i64,
    pub task_id: i64,
    pub task_title: String,
    pub task_points: i64,
    pub status: TaskStatus,
    pub submitted_at: Option<OffsetDateTime>,
    pub approved_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub title: String,
    pub cost: i64,
    pub category: RewardCategory,
    /// Advisory counter; decremented on redemption, floored at zero,
    /// never blocks a redemption.
    pub stock: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewReward {
    pub title: String,
    pub cost: i64,
    pub category: RewardCategory,
    pub stock: i64,
}

/// Immutable receipt of one exchange. Title and cost are snapshotted at
/// redemption time, not recomputed if the Reward later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: i64,
    pub student_id: i64,
    pub reward_id: i64,
    pub reward_title: String,
    pub cost: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub student_id: i64,
    pub reward_id: i64,
    pub reward_title: String,
    pub cost: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}
