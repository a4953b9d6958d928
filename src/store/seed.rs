//! Demo data for first runs, mirrored over the repository traits so both
//! backends seed identically. Skipped when the demo users already exist.

use crate::auth::password::hash_password;
use crate::error::Result;
use crate::store::types::{NewReward, NewTask, NewUser, RewardCategory, Role, TaskCategory};
use crate::store::Stores;

pub async fn seed_demo(stores: &Stores, starting_points: i64) -> Result<()> {
    if stores.users.get_by_username("student1").await?.is_some() {
        return Ok(());
    }

    let hash = hash_password("123456")?;

    let student = stores
        .users
        .create(NewUser {
            username: "student1".into(),
            password_hash: hash.clone(),
            display_name: "Xiao Ming".into(),
            role: Role::Student,
            points: starting_points,
            family_id: 1,
            grade: Some(3),
        })
        .await?;

    stores
        .users
        .create(NewUser {
            username: "guardian1".into(),
            password_hash: hash,
            display_name: "Mama Li".into(),
            role: Role::Guardian,
            points: 0,
            family_id: 1,
            grade: None,
        })
        .await?;

    let homework = stores
        .tasks
        .create_task(NewTask {
            title: "Finish math homework".into(),
            points: 30,
            category: TaskCategory::Study,
            recurrence: Some("daily".into()),
        })
        .await?;
    let chores = stores
        .tasks
        .create_task(NewTask {
            title: "Tidy the room".into(),
            points: 20,
            category: TaskCategory::Chore,
            recurrence: None,
        })
        .await?;

    stores.tasks.assign(student.id, homework.id).await?;
    stores.tasks.assign(student.id, chores.id).await?;

    stores
        .rewards
        .create_reward(NewReward {
            title: "30 minutes of screen time".into(),
            cost: 50,
            category: RewardCategory::Time,
            stock: 99,
        })
        .await?;
    stores
        .rewards
        .create_reward(NewReward {
            title: "Ice cream".into(),
            cost: 80,
            category: RewardCategory::Item,
            stock: 10,
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod seed_tests {
    use super::*;

    #[tokio::test]
    async fn seeding_twice_is_a_no_op() {
        let stores = Stores::in_memory();
        seed_demo(&stores, 100).await.expect("first seed");
        seed_demo(&stores, 100).await.expect("second seed");
        assert_eq!(stores.tasks.list_tasks().await.expect("tasks").len(), 2);
        assert_eq!(stores.rewards.list_rewards().await.expect("rewards").len(), 2);
        let student = stores
            .users
            .get_by_username("student1")
            .await
            .expect("lookup")
            .expect("seeded student");
        assert_eq!(student.points, 100);
    }
}
