//! In-memory backend: one mutex-guarded table per entity family. State
//! checks run inside the lock, so every trait call is atomic on its own
//! family; nothing here coordinates across families.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::types::{
    NewRedemption, NewReward, NewTask, NewUser, Redemption, Reward, Role, Session, Task,
    TaskAssignment, TaskStatus, User,
};
use crate::store::{RewardRepo, SessionRepo, TaskRepo, UserRepo};

struct UserTable {
    rows: HashMap<i64, User>,
    by_username: HashMap<String, i64>,
    next_id: i64,
}

pub struct MemoryUserRepo {
    inner: Mutex<UserTable>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(UserTable {
                rows: HashMap::new(),
                by_username: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, new: NewUser) -> Result<User> {
        let mut t = self.inner.lock().expect("user table poisoned");
        if t.by_username.contains_key(&new.username) {
            return Err(Error::InvalidArgument("username already taken".into()));
        }
        let id = t.next_id;
        t.next_id += 1;
        let user = User {
            id,
            username: new.username.clone(),
            password_hash: new.password_hash,
            display_name: new.display_name,
            role: new.role,
            points: new.points,
            family_id: new.family_id,
            grade: new.grade,
            deleted: false,
            created_at: OffsetDateTime::now_utc(),
        };
        t.by_username.insert(new.username, id);
        t.rows.insert(id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<User> {
        let t = self.inner.lock().expect("user table poisoned");
        t.rows.get(&id).cloned().ok_or(Error::NotFound("user"))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let t = self.inner.lock().expect("user table poisoned");
        Ok(t.by_username
            .get(username)
            .and_then(|id| t.rows.get(id))
            .cloned())
    }

    async fn add_points(&self, user_id: i64, delta: i64) -> Result<i64> {
        let mut t = self.inner.lock().expect("user table poisoned");
        let user = t.rows.get_mut(&user_id).ok_or(Error::NotFound("user"))?;
        user.points += delta;
        Ok(user.points)
    }

    async fn debit_points(&self, user_id: i64, cost: i64) -> Result<i64> {
        let mut t = self.inner.lock().expect("user table poisoned");
        let user = t.rows.get_mut(&user_id).ok_or(Error::NotFound("user"))?;
        if user.points < cost {
            return Err(Error::InsufficientBalance {
                have: user.points,
                need: cost,
            });
        }
        user.points -= cost;
        Ok(user.points)
    }

    async fn students_by_family(&self, family_id: i64) -> Result<Vec<User>> {
        let t = self.inner.lock().expect("user table poisoned");
        Ok(t.rows
            .values()
            .filter(|u| u.role == Role::Student && u.family_id == family_id)
            .cloned()
            .collect())
    }

    async fn top_students(&self, limit: usize) -> Result<Vec<User>> {
        let t = self.inner.lock().expect("user table poisoned");
        let mut students: Vec<User> = t
            .rows
            .values()
            .filter(|u| u.role == Role::Student)
            .cloned()
            .collect();
        students.sort_by(|a, b| b.points.cmp(&a.points).then(a.id.cmp(&b.id)));
        students.truncate(limit);
        Ok(students)
    }
}

struct TaskTable {
    tasks: HashMap<i64, Task>,
    assignments: HashMap<i64, TaskAssignment>,
    next_task_id: i64,
    next_assignment_id: i64,
}

pub struct MemoryTaskRepo {
    inner: Mutex<TaskTable>,
}

impl MemoryTaskRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TaskTable {
                tasks: HashMap::new(),
                assignments: HashMap::new(),
                next_task_id: 1,
                next_assignment_id: 1,
            }),
        }
    }
}

impl Default for MemoryTaskRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepo for MemoryTaskRepo {
    async fn create_task(&self, new: NewTask) -> Result<Task> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let id = t.next_task_id;
        t.next_task_id += 1;
        let task = Task {
            id,
            title: new.title,
            points: new.points,
            category: new.category,
            recurrence: new.recurrence,
            created_at: OffsetDateTime::now_utc(),
        };
        t.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: i64) -> Result<Task> {
        let t = self.inner.lock().expect("task table poisoned");
        t.tasks.get(&id).cloned().ok_or(Error::NotFound("task"))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let t = self.inner.lock().expect("task table poisoned");
        Ok(t.tasks.values().cloned().collect())
    }

    async fn assign(&self, student_id: i64, task_id: i64) -> Result<TaskAssignment> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let (title, points) = {
            let task = t.tasks.get(&task_id).ok_or(Error::NotFound("task"))?;
            (task.title.clone(), task.points)
        };
        let id = t.next_assignment_id;
        t.next_assignment_id += 1;
        let assignment = TaskAssignment {
            id,
            student_id,
            task_id,
            task_title: title,
            task_points: points,
            status: TaskStatus::Todo,
            submitted_at: None,
            approved_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.assignments.insert(id, assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: i64) -> Result<TaskAssignment> {
        let t = self.inner.lock().expect("task table poisoned");
        t.assignments
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("assignment"))
    }

    async fn assignments_for_student(&self, student_id: i64) -> Result<Vec<TaskAssignment>> {
        let t = self.inner.lock().expect("task table poisoned");
        Ok(t.assignments
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn pending_assignments(&self) -> Result<Vec<TaskAssignment>> {
        let t = self.inner.lock().expect("task table poisoned");
        Ok(t.assignments
            .values()
            .filter(|a| a.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_submitted(&self, id: i64) -> Result<TaskAssignment> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let a = t
            .assignments
            .get_mut(&id)
            .ok_or(Error::NotFound("assignment"))?;
        if a.status != TaskStatus::Todo {
            return Err(Error::InvalidState(format!(
                "assignment is {:?}, expected todo",
                a.status
            )));
        }
        a.status = TaskStatus::Pending;
        a.submitted_at = Some(OffsetDateTime::now_utc());
        Ok(a.clone())
    }

    async fn mark_done(&self, id: i64) -> Result<TaskAssignment> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let a = t
            .assignments
            .get_mut(&id)
            .ok_or(Error::NotFound("assignment"))?;
        if a.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "assignment already {:?}",
                a.status
            )));
        }
        a.status = TaskStatus::Done;
        a.approved_at = Some(OffsetDateTime::now_utc());
        Ok(a.clone())
    }

    async fn mark_rejected(&self, id: i64) -> Result<TaskAssignment> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let a = t
            .assignments
            .get_mut(&id)
            .ok_or(Error::NotFound("assignment"))?;
        if a.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "assignment already {:?}",
                a.status
            )));
        }
        a.status = TaskStatus::Rejected;
        Ok(a.clone())
    }

    async fn reset_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        let mut t = self.inner.lock().expect("task table poisoned");
        let a = t
            .assignments
            .get_mut(&id)
            .ok_or(Error::NotFound("assignment"))?;
        a.status = status;
        if status != TaskStatus::Done {
            a.approved_at = None;
        }
        Ok(())
    }
}

struct RewardTable {
    rewards: HashMap<i64, Reward>,
    redemptions: HashMap<i64, Redemption>,
    next_reward_id: i64,
    next_redemption_id: i64,
}

pub struct MemoryRewardRepo {
    inner: Mutex<RewardTable>,
}

impl MemoryRewardRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RewardTable {
                rewards: HashMap::new(),
                redemptions: HashMap::new(),
                next_reward_id: 1,
                next_redemption_id: 1,
            }),
        }
    }
}

impl Default for MemoryRewardRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RewardRepo for MemoryRewardRepo {
    async fn create_reward(&self, new: NewReward) -> Result<Reward> {
        let mut t = self.inner.lock().expect("reward table poisoned");
        let id = t.next_reward_id;
        t.next_reward_id += 1;
        let reward = Reward {
            id,
            title: new.title,
            cost: new.cost,
            category: new.category,
            stock: new.stock,
            created_at: OffsetDateTime::now_utc(),
        };
        t.rewards.insert(id, reward.clone());
        Ok(reward)
    }

    async fn get_reward(&self, id: i64) -> Result<Reward> {
        let t = self.inner.lock().expect("reward table poisoned");
        t.rewards.get(&id).cloned().ok_or(Error::NotFound("reward"))
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        let t = self.inner.lock().expect("reward table poisoned");
        Ok(t.rewards.values().cloned().collect())
    }

    async fn decrement_stock(&self, id: i64) -> Result<()> {
        let mut t = self.inner.lock().expect("reward table poisoned");
        let reward = t.rewards.get_mut(&id).ok_or(Error::NotFound("reward"))?;
        if reward.stock > 0 {
            reward.stock -= 1;
        }
        Ok(())
    }

    async fn create_redemption(&self, new: NewRedemption) -> Result<Redemption> {
        let mut t = self.inner.lock().expect("reward table poisoned");
        let id = t.next_redemption_id;
        t.next_redemption_id += 1;
        let redemption = Redemption {
            id,
            student_id: new.student_id,
            reward_id: new.reward_id,
            reward_title: new.reward_title,
            cost: new.cost,
            created_at: OffsetDateTime::now_utc(),
        };
        t.redemptions.insert(id, redemption.clone());
        Ok(redemption)
    }

    async fn redemptions_for_student(&self, student_id: i64) -> Result<Vec<Redemption>> {
        let t = self.inner.lock().expect("reward table poisoned");
        Ok(t.redemptions
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }
}

pub struct MemorySessionRepo {
    inner: Mutex<HashMap<String, Session>>,
}

impl MemorySessionRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepo for MemorySessionRepo {
    async fn create(&self, session: Session) -> Result<()> {
        let mut t = self.inner.lock().expect("session table poisoned");
        t.insert(session.token.clone(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let mut t = self.inner.lock().expect("session table poisoned");
        match t.get(token) {
            Some(s) if s.expires_at <= OffsetDateTime::now_utc() => {
                t.remove(token);
                Ok(None)
            }
            Some(s) => Ok(Some(s.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let mut t = self.inner.lock().expect("session table poisoned");
        t.remove(token);
        Ok(())
    }
}
