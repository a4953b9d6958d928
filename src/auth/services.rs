use std::sync::Arc;

use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};

use crate::auth::password::{hash_password, verify_password};
use crate::error::{Error, Result};
use crate::store::types::{NewUser, Role, Session, User};
use crate::store::{SessionRepo, UserRepo};

const TOKEN_LEN: usize = 48;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Opaque-token session gate. Tokens carry no claims; every validation is
/// a store lookup plus a wall-clock expiry comparison.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    sessions: Arc<dyn SessionRepo>,
    session_ttl: Duration,
    starting_points: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        sessions: Arc<dyn SessionRepo>,
        session_ttl_hours: i64,
        starting_points: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl: Duration::hours(session_ttl_hours),
            starting_points,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Role,
        display_name: &str,
        grade: Option<i16>,
        family_id: Option<i64>,
    ) -> Result<User> {
        if !is_valid_username(username) {
            return Err(Error::InvalidArgument(
                "username must be 3-32 characters (letters, digits, underscore)".into(),
            ));
        }
        if password.len() < 6 {
            return Err(Error::InvalidArgument(
                "password must be at least 6 characters".into(),
            ));
        }

        let points = match role {
            Role::Student => self.starting_points,
            Role::Guardian => 0,
        };

        self.users
            .create(NewUser {
                username: username.into(),
                password_hash: hash_password(password)?,
                display_name: display_name.into(),
                role,
                points,
                family_id: family_id.unwrap_or(1),
                grade: if role == Role::Student { grade } else { None },
            })
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or(Error::Unauthenticated("invalid username or password"))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(Error::Unauthenticated("invalid username or password"));
        }

        let token = generate_token();
        let now = OffsetDateTime::now_utc();
        self.sessions
            .create(Session {
                token: token.clone(),
                user_id: user.id,
                expires_at: now + self.session_ttl,
                created_at: now,
            })
            .await?;

        Ok((user, token))
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.delete(token).await
    }

    /// Resolves an opaque token to the acting user, or fails
    /// `Unauthenticated`.
    pub async fn validate(&self, token: &str) -> Result<User> {
        let session = self
            .sessions
            .get(token)
            .await?
            .ok_or(Error::Unauthenticated("invalid or expired session"))?;
        self.users.get(session.user_id).await
    }
}
