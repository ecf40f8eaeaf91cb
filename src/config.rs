// src/config.rs
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub deploy_api_token: String,
    pub deploy_api_base_url: String,
    pub deploy_team_id: Option<String>,
    pub anthropic_api_key: String,
    pub chat_model: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub hidden_project_substring: String,
    pub demo_step_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let demo_step_delay = match optional("DEMO_STEP_DELAY_MS") {
            Some(raw) => {
                let ms = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                    name: "DEMO_STEP_DELAY_MS",
                    value: raw.clone(),
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_secs(1),
        };

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            deploy_api_token: required("DEPLOY_API_TOKEN")?,
            deploy_api_base_url: optional("DEPLOY_API_BASE_URL")
                .unwrap_or_else(|| "https://api.vercel.com".to_string()),
            deploy_team_id: optional("DEPLOY_TEAM_ID"),
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            chat_model: optional("CHAT_MODEL").unwrap_or_else(|| "claude-sonnet-4-5".to_string()),
            jwt_secret: optional("JWT_SECRET").unwrap_or_else(|| {
                tracing::warn!("JWT_SECRET not set, falling back to an insecure default");
                "default_secret".to_string()
            }),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            hidden_project_substring: optional("HIDDEN_PROJECT_SUBSTRING")
                .unwrap_or_else(|| "backend".to_string()),
            demo_step_delay,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
