use crate::Error;

#[derive(Clone, Copy, Debug, strum::EnumString, strum::Display, strum_macros::EnumIter)]
pub enum Environment {
    Production,
    Development,
    Test,
}

#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub socket_address: String,
    pub database_url: String,
}

pub fn get_env_config(env: Environment) -> EnvironmentConfig {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| match env {
        Environment::Production => "sqlite://spares-main.sqlite".to_string(),
        Environment::Development => "sqlite://spares-dev.sqlite".to_string(),
        Environment::Test => "sqlite::memory:".to_string(),
    });
    let socket_address = std::env::var("SPARES_SOCKET_ADDRESS").unwrap_or_else(|_| match env {
        Environment::Production => "0.0.0.0:8080".to_string(),
        Environment::Development => "127.0.0.1:8081".to_string(),
        Environment::Test => "127.0.0.1:0".to_string(),
    });

    EnvironmentConfig {
        socket_address,
        database_url,
    }
}

/// Recognised configuration options. Read once at startup from
/// environment variables, each with the documented default. The daily
/// boundary is intentionally absent: it is fixed UTC and not
/// configurable (see DESIGN.md).
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub session_duration_days: i64,
    pub default_new_cards_per_day: i64,
    pub invitation_expiry_days: i64,
    pub algorithm_version: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            session_duration_days: 30,
            default_new_cards_per_day: 20,
            invitation_expiry_days: 30,
            algorithm_version: "fsrs-1".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("SESSION_DURATION_DAYS") {
            config.session_duration_days = v
                .parse()
                .map_err(|_| Error::Internal(format!("invalid SESSION_DURATION_DAYS: {v}")))?;
        }
        if let Ok(v) = std::env::var("DEFAULT_NEW_CARDS_PER_DAY") {
            config.default_new_cards_per_day = v.parse().map_err(|_| {
                Error::Internal(format!("invalid DEFAULT_NEW_CARDS_PER_DAY: {v}"))
            })?;
        }
        if let Ok(v) = std::env::var("INVITATION_EXPIRY_DAYS") {
            config.invitation_expiry_days = v
                .parse()
                .map_err(|_| Error::Internal(format!("invalid INVITATION_EXPIRY_DAYS: {v}")))?;
        }
        if let Ok(v) = std::env::var("ALGORITHM_VERSION") {
            config.algorithm_version = v;
        }
        if config.invitation_expiry_days < 30 {
            return Err(Error::Internal(
                "invitation_expiry_days must be at least 30 per the relationship graph invariant"
                    .to_string(),
            ));
        }
        Ok(config)
    }
}
