use serde::Deserialize;

use crate::store::types::TaskCategory;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub points: i64,
    #[serde(default = "default_category")]
    pub category: TaskCategory,
    pub recurrence: Option<String>,
}

fn default_category() -> TaskCategory {
    TaskCategory::Study
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub student_id: i64,
    pub task_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    /// Assignment (task log) id, not the catalog task id.
    pub assignment_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ReviewTaskRequest {
    pub assignment_id: i64,
    pub action: ReviewAction,
}
