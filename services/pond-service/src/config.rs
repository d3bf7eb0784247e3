use aquapin_common::{env_opt, env_or};
use std::{path::PathBuf, time::Duration};

use crate::ai::GeminiConfig;

const DEFAULT_MODEL_PATH: &str = "ml_engine/models/yield_predictor.json";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct ServiceConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub model_path: PathBuf,
    pub price_per_kg: f64,
    pub gemini: Option<GeminiConfig>,
    pub upload_limit_bytes: usize,
    pub chat_history_limit: i64,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8000u16),
            database_url: env_opt("DATABASE_URL").map(|url| normalize_database_url(&url)),
            model_path: env_opt("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            price_per_kg: env_or("PRICE_PER_KG", 150.0f64),
            gemini: gemini_from_env(),
            upload_limit_bytes: env_or("UPLOAD_LIMIT_BYTES", 8 * 1024 * 1024usize),
            chat_history_limit: env_or("CHAT_HISTORY_LIMIT", 50i64),
        }
    }
}

// Without an API key the assistant runs offline.
fn gemini_from_env() -> Option<GeminiConfig> {
    let api_key = env_opt("GEMINI_API_KEY")?;
    Some(GeminiConfig {
        api_key,
        model: env_opt("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        base_url: env_opt("GEMINI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        timeout: Duration::from_secs(env_or("AI_TIMEOUT_SECS", 30u64)),
    })
}

/// Hosting platforms hand out `postgres://` as well as `postgresql://`; both
/// are accepted, and SQLAlchemy-style driver suffixes are stripped.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    for prefix in ["postgresql+psycopg2://", "postgresql+asyncpg://"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return format!("postgresql://{rest}");
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_urls() {
        assert_eq!(
            normalize_database_url("postgres://u:p@db:5432/aquapin"),
            "postgres://u:p@db:5432/aquapin"
        );
    }

    #[test]
    fn strips_driver_suffix() {
        assert_eq!(
            normalize_database_url(" postgresql+psycopg2://u@db/aquapin "),
            "postgresql://u@db/aquapin"
        );
    }
}
