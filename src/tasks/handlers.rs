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
    store::types::{Task, TaskAssignment},
};

use super::dto::{
    AssignTaskRequest, CreateTaskRequest, ReviewAction, ReviewTaskRequest, SubmitTaskRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/assign", post(assign_task))
        .route("/tasks/today", get(today_tasks))
        .route("/tasks/pending", get(pending_tasks))
        .route("/tasks/submit", post(submit_task))
        .route("/tasks/review", post(review_task))
}

#[instrument(skip(state, _user))]
pub async fn list_tasks(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<Task>>, Error> {
    Ok(Json(state.tasks.list_tasks().await?))
}

#[instrument(skip(state, user, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<Task>, Error> {
    user.require_guardian()?;
    let task = state
        .tasks
        .create_task(
            &payload.title,
            payload.points,
            payload.category,
            payload.recurrence,
        )
        .await?;
    info!(task_id = task.id, title = %task.title, "task created");
    Ok(Json(task))
}

#[instrument(skip(state, user, payload))]
pub async fn assign_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<AssignTaskRequest>,
) -> Result<Json<TaskAssignment>, Error> {
    user.require_guardian()?;
    let assignment = state
        .tasks
        .assign_to_student(payload.student_id, payload.task_id)
        .await?;
    info!(
        assignment_id = assignment.id,
        student_id = payload.student_id,
        task_id = payload.task_id,
        "task assigned"
    );
    Ok(Json(assignment))
}

#[instrument(skip(state, user))]
pub async fn today_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<TaskAssignment>>, Error> {
    Ok(Json(state.tasks.today_tasks(user.0.id).await?))
}

#[instrument(skip(state, user))]
pub async fn pending_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<TaskAssignment>>, Error> {
    user.require_guardian()?;
    Ok(Json(state.tasks.pending_tasks().await?))
}

#[instrument(skip(state, user, payload))]
pub async fn submit_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<SubmitTaskRequest>,
) -> Result<Json<TaskAssignment>, Error> {
    let assignment = state.tasks.submit(payload.assignment_id, user.0.id).await?;
    info!(
        assignment_id = assignment.id,
        student_id = user.0.id,
        "task submitted"
    );
    Ok(Json(assignment))
}

#[instrument(skip(state, user, payload))]
pub async fn review_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<ReviewTaskRequest>,
) -> Result<Json<TaskAssignment>, Error> {
    user.require_guardian()?;
    let assignment = match payload.action {
        ReviewAction::Approve => state.tasks.approve(payload.assignment_id).await?,
        ReviewAction::Reject => state.tasks.reject(payload.assignment_id).await?,
    };
    info!(
        assignment_id = assignment.id,
        status = ?assignment.status,
        "task reviewed"
    );
    Ok(Json(assignment))
}
