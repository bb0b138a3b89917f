//! Environment-driven configuration. `.env` loading happens in `main`;
//! everything here reads the process environment once at startup.

use std::env;

use anyhow::Context;
use url::Url;

const DEFAULT_PORT: &str = "3000";
const DEFAULT_IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Absent means the in-memory demo store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub smtp: SmtpConfig,
    pub imgbb_key: String,
    pub imgbb_endpoint: Url,
    /// Tag codes provisioned at startup, e.g. `DEMO123` for local runs.
    pub seed_codes: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| DEFAULT_PORT.to_string())
            .parse()
            .context("PORT must be a number")?;

        let imgbb_endpoint = env::var("IMGBB_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_IMGBB_ENDPOINT.to_string())
            .parse()
            .context("IMGBB_ENDPOINT must be a URL")?;

        let seed_codes = env::var("SEED_TAG_CODES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: required("JWT_SECRET")?,
            smtp: SmtpConfig {
                host: required("SMTP_HOST")?,
                username: required("SMTP_USERNAME")?,
                password: required("SMTP_PASSWORD")?,
                from: required("SMTP_FROM")?,
            },
            imgbb_key: required("IMGBB_API_KEY")?,
            imgbb_endpoint,
            seed_codes,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}
