use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// When unset (or unreachable at startup) the in-memory backend is used.
    pub database_url: Option<String>,
    pub session_ttl_hours: i64,
    /// Point grant for newly registered students.
    pub starting_points: i64,
    pub seed_demo: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            database_url: std::env::var("DATABASE_URL").ok(),
            session_ttl_hours: std::env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24),
            starting_points: std::env::var("STARTING_POINTS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(100),
            seed_demo: std::env::var("SEED_DEMO")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}
