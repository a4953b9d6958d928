use std::sync::Arc;

use crate::error::Result;
use crate::store::types::User;
use crate::store::UserRepo;

/// Read-only user queries: profile, family roster, ranking.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepo>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepo>) -> Self {
        Self { users }
    }

    pub async fn profile(&self, user_id: i64) -> Result<User> {
        self.users.get(user_id).await
    }

    pub async fn students_by_family(&self, family_id: i64) -> Result<Vec<User>> {
        self.users.students_by_family(family_id).await
    }

    pub async fn top_students(&self, limit: usize) -> Result<Vec<User>> {
        self.users.top_students(limit).await
    }
}

#[cfg(test)]
mod ranking_tests {
    use super::*;
    use crate::store::types::{NewUser, Role};
    use crate::store::Stores;

    async fn add(stores: &Stores, username: &str, role: Role, points: i64, family_id: i64) -> i64 {
        stores
            .users
            .create(NewUser {
                username: username.into(),
                password_hash: "x".into(),
                display_name: username.into(),
                role,
                points,
                family_id,
                grade: None,
            })
            .await
            .expect("create user")
            .id
    }

    #[tokio::test]
    async fn top_students_is_descending_and_truncated() {
        let stores = Stores::in_memory();
        let svc = UserService::new(stores.users.clone());
        add(&stores, "a", Role::Student, 10, 1).await;
        add(&stores, "b", Role::Student, 30, 1).await;
        add(&stores, "c", Role::Student, 20, 2).await;
        add(&stores, "g", Role::Guardian, 999, 1).await;

        let top = svc.top_students(2).await.expect("top");
        let points: Vec<i64> = top.iter().map(|u| u.points).collect();
        assert_eq!(points, vec![30, 20]);
    }

    #[tokio::test]
    async fn ties_break_by_ascending_id() {
        let stores = Stores::in_memory();
        let svc = UserService::new(stores.users.clone());
        let first = add(&stores, "a", Role::Student, 25, 1).await;
        let second = add(&stores, "b", Role::Student, 25, 1).await;

        let top = svc.top_students(2).await.expect("top");
        assert_eq!(top[0].id, first);
        assert_eq!(top[1].id, second);
    }

    #[tokio::test]
    async fn roster_is_scoped_to_the_family() {
        let stores = Stores::in_memory();
        let svc = UserService::new(stores.users.clone());
        add(&stores, "a", Role::Student, 0, 1).await;
        add(&stores, "b", Role::Student, 0, 2).await;
        add(&stores, "g", Role::Guardian, 0, 1).await;

        let roster = svc.students_by_family(1).await.expect("roster");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].username, "a");
    }
}
