use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use rewear_ai::AiConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "your_jwt_secret",
    "secret",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub upload_dir: PathBuf,
    pub admin_email: Option<String>,
    pub ai: AiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let jwt_secret = get("REWEAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("REWEAR_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = var("REWEAR_PORT", "5000")
            .parse()
            .context("REWEAR_PORT must be a port number")?;
        let token_ttl_days = var("REWEAR_TOKEN_TTL_DAYS", "7")
            .parse()
            .context("REWEAR_TOKEN_TTL_DAYS must be a whole number of days")?;

        let defaults = AiConfig::default();
        Ok(Self {
            host: var("REWEAR_HOST", "0.0.0.0"),
            port,
            db_path: var("REWEAR_DB_PATH", "rewear.db").into(),
            jwt_secret,
            token_ttl_days,
            upload_dir: var("REWEAR_UPLOAD_DIR", "./uploads").into(),
            admin_email: get("REWEAR_ADMIN_EMAIL")
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            ai: AiConfig {
                api_key: get("OPENAI_API_KEY"),
                base_url: var("REWEAR_AI_BASE_URL", &defaults.base_url),
                model: var("REWEAR_AI_MODEL", &defaults.model),
                vision_model: var("REWEAR_AI_VISION_MODEL", &defaults.vision_model),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("REWEAR_JWT_SECRET", "a-long-random-value")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, PathBuf::from("rewear.db"));
        assert_eq!(config.token_ttl_days, 7);
        assert_eq!(config.admin_email, None);
        assert_eq!(config.ai.model, "gpt-3.5-turbo");
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("REWEAR_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("REWEAR_JWT_SECRET", "a-long-random-value"),
            ("REWEAR_PORT", "8080"),
            ("REWEAR_ADMIN_EMAIL", " Admin@Example.com "),
            ("REWEAR_AI_MODEL", "gpt-4o"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.admin_email.as_deref(), Some("admin@example.com"));
        assert_eq!(config.ai.model, "gpt-4o");

        assert!(load(&[("REWEAR_JWT_SECRET", "x-y-z-long"), ("REWEAR_PORT", "http")]).is_err());
    }
}
