use std::path::PathBuf;

use anyhow::{Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_SUGGEST_URL: &str = "https://api.openai.com/v1";

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub suggest_url: String,
    pub openai_api_key: Option<String>,
}

impl Config {
    /// Read configuration from the environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("MYSTERY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MYSTERY_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let db_path: PathBuf = std::env::var("MYSTERY_DB_PATH")
            .unwrap_or_else(|_| "mystery.db".into())
            .into();
        let host = std::env::var("MYSTERY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("MYSTERY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;
        let suggest_url =
            std::env::var("MYSTERY_SUGGEST_URL").unwrap_or_else(|_| DEFAULT_SUGGEST_URL.into());
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            suggest_url,
            openai_api_key,
        })
    }
}
