use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::types::{NewTask, Task, TaskAssignment, TaskCategory};
use crate::store::{TaskRepo, UserRepo};

/// The assignment state machine. Persistence checks that are atomic on a
/// single entity family live in the repos; this service owns argument
/// validation, the ownership rule, and the approve = flip-then-credit
/// composition.
#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepo>,
    users: Arc<dyn UserRepo>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepo>, users: Arc<dyn UserRepo>) -> Self {
        Self { tasks, users }
    }

    /// Creates a catalog task. Never assigns it; assignment is the
    /// separate explicit step below.
    pub async fn create_task(
        &self,
        title: &str,
        points: i64,
        category: TaskCategory,
        recurrence: Option<String>,
    ) -> Result<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidArgument("title must be non-empty".into()));
        }
        if points <= 0 {
            return Err(Error::InvalidArgument("points must be positive".into()));
        }
        self.tasks
            .create_task(NewTask {
                title: title.into(),
                points,
                category,
                recurrence,
            })
            .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.list_tasks().await
    }

    pub async fn assign_to_student(&self, student_id: i64, task_id: i64) -> Result<TaskAssignment> {
        // Surface a missing student before creating the assignment row.
        self.users.get(student_id).await?;
        self.tasks.assign(student_id, task_id).await
    }

    /// A student hands in their own assignment: Todo → Pending.
    pub async fn submit(&self, assignment_id: i64, acting_student_id: i64) -> Result<TaskAssignment> {
        let assignment = self.tasks.get_assignment(assignment_id).await?;
        if assignment.student_id != acting_student_id {
            return Err(Error::Unauthorized);
        }
        self.tasks.mark_submitted(assignment_id).await
    }

    /// Non-terminal → Done, then credit the snapshotted points. The two
    /// persisted steps are not one transaction; if the credit fails the
    /// flip is reverted to the prior status and the error propagates.
    pub async fn approve(&self, assignment_id: i64) -> Result<TaskAssignment> {
        let prior = self.tasks.get_assignment(assignment_id).await?;
        let done = self.tasks.mark_done(assignment_id).await?;
        match self
            .users
            .add_points(done.student_id, done.task_points)
            .await
        {
            Ok(_) => Ok(done),
            Err(credit_err) => {
                let _ = self.tasks.reset_status(assignment_id, prior.status).await;
                Err(credit_err)
            }
        }
    }

    pub async fn reject(&self, assignment_id: i64) -> Result<TaskAssignment> {
        self.tasks.mark_rejected(assignment_id).await
    }

    pub async fn today_tasks(&self, student_id: i64) -> Result<Vec<TaskAssignment>> {
        self.tasks.assignments_for_student(student_id).await
    }

    pub async fn pending_tasks(&self) -> Result<Vec<TaskAssignment>> {
        self.tasks.pending_assignments().await
    }
}

#[cfg(test)]
mod workflow_tests {
    use super::*;
    use crate::store::types::{NewUser, Role, TaskStatus};
    use crate::store::Stores;

    async fn student(stores: &Stores, username: &str, points: i64) -> i64 {
        stores
            .users
            .create(NewUser {
                username: username.into(),
                password_hash: "x".into(),
                display_name: username.into(),
                role: Role::Student,
                points,
                family_id: 1,
                grade: Some(3),
            })
            .await
            .expect("create student")
            .id
    }

    fn service(stores: &Stores) -> TaskService {
        TaskService::new(stores.tasks.clone(), stores.users.clone())
    }

    #[tokio::test]
    async fn create_task_validates_arguments() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        assert!(matches!(
            svc.create_task("  ", 10, TaskCategory::Study, None)
                .await
                .unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            svc.create_task("Read a book", 0, TaskCategory::Study, None)
                .await
                .unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            svc.create_task("Read a book", -5, TaskCategory::Study, None)
                .await
                .unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn assign_requires_existing_task_and_student() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 0).await;
        assert!(matches!(
            svc.assign_to_student(sid, 42).await.unwrap_err(),
            Error::NotFound("task")
        ));
        let task = svc
            .create_task("Tidy the room", 20, TaskCategory::Chore, None)
            .await
            .expect("create");
        assert!(matches!(
            svc.assign_to_student(999, task.id).await.unwrap_err(),
            Error::NotFound("user")
        ));
    }

    #[tokio::test]
    async fn submit_enforces_ownership() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let owner = student(&stores, "owner", 0).await;
        let intruder = student(&stores, "intruder", 0).await;
        let task = svc
            .create_task("Practice piano", 15, TaskCategory::Habit, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(owner, task.id).await.expect("assign");

        assert!(matches!(
            svc.submit(assignment.id, intruder).await.unwrap_err(),
            Error::Unauthorized
        ));
        // The refused submit left the assignment untouched.
        let unchanged = stores
            .tasks
            .get_assignment(assignment.id)
            .await
            .expect("get");
        assert_eq!(unchanged.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn double_submit_succeeds_once() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 0).await;
        let task = svc
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(sid, task.id).await.expect("assign");

        let submitted = svc.submit(assignment.id, sid).await.expect("first submit");
        assert_eq!(submitted.status, TaskStatus::Pending);
        assert!(submitted.submitted_at.is_some());

        assert!(matches!(
            svc.submit(assignment.id, sid).await.unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn approve_credits_exactly_once() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 0).await;
        let task = svc
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(sid, task.id).await.expect("assign");
        svc.submit(assignment.id, sid).await.expect("submit");

        let done = svc.approve(assignment.id).await.expect("approve");
        assert_eq!(done.status, TaskStatus::Done);
        assert!(done.approved_at.is_some());
        assert_eq!(stores.users.get(sid).await.expect("get").points, 30);

        // Re-approval is an explicit error and must not credit again.
        assert!(matches!(
            svc.approve(assignment.id).await.unwrap_err(),
            Error::InvalidState(_)
        ));
        assert_eq!(stores.users.get(sid).await.expect("get").points, 30);
    }

    #[tokio::test]
    async fn approve_is_allowed_straight_from_todo() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 0).await;
        let task = svc
            .create_task("Water the plants", 10, TaskCategory::Chore, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(sid, task.id).await.expect("assign");

        let done = svc.approve(assignment.id).await.expect("approve from todo");
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(stores.users.get(sid).await.expect("get").points, 10);
    }

    #[tokio::test]
    async fn approve_rolls_back_when_credit_fails() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 0).await;
        let task = svc
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(sid, task.id).await.expect("assign");
        svc.submit(assignment.id, sid).await.expect("submit");

        // Sever the credit target by swapping in an empty user store.
        let broken = TaskService::new(
            stores.tasks.clone(),
            std::sync::Arc::new(crate::store::memory::MemoryUserRepo::new()),
        );
        assert!(matches!(
            broken.approve(assignment.id).await.unwrap_err(),
            Error::NotFound("user")
        ));

        let reverted = stores
            .tasks
            .get_assignment(assignment.id)
            .await
            .expect("get");
        assert_eq!(reverted.status, TaskStatus::Pending);
        assert!(reverted.approved_at.is_none());

        // The assignment is still approvable once the credit can land.
        let done = svc.approve(assignment.id).await.expect("approve");
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(stores.users.get(sid).await.expect("get").points, 30);
    }

    #[tokio::test]
    async fn reject_has_no_point_effect_and_is_terminal() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let sid = student(&stores, "kim", 50).await;
        let task = svc
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create");
        let assignment = svc.assign_to_student(sid, task.id).await.expect("assign");
        svc.submit(assignment.id, sid).await.expect("submit");

        let rejected = svc.reject(assignment.id).await.expect("reject");
        assert_eq!(rejected.status, TaskStatus::Rejected);
        assert_eq!(stores.users.get(sid).await.expect("get").points, 50);

        assert!(matches!(
            svc.approve(assignment.id).await.unwrap_err(),
            Error::InvalidState(_)
        ));
        assert!(matches!(
            svc.submit(assignment.id, sid).await.unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn queries_filter_by_student_and_status() {
        let stores = Stores::in_memory();
        let svc = service(&stores);
        let kim = student(&stores, "kim", 0).await;
        let lee = student(&stores, "lee", 0).await;
        let task = svc
            .create_task("Math homework", 30, TaskCategory::Study, None)
            .await
            .expect("create");

        let a1 = svc.assign_to_student(kim, task.id).await.expect("assign");
        svc.assign_to_student(lee, task.id).await.expect("assign");
        svc.submit(a1.id, kim).await.expect("submit");

        let today = svc.today_tasks(kim).await.expect("today");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].task_title, "Math homework");

        let pending = svc.pending_tasks().await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a1.id);
    }
}
