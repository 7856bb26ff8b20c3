use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::matching::scorer::{MatchConfig, MatchWeights};
use crate::tasks::runner::RunnerConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub embedding: EmbeddingSettings,
    pub port: u16,
    pub rust_log: String,
    pub runner: RunnerConfig,
    pub matching: MatchConfig,
    /// Hard timeout applied to every LLM / embedding provider call.
    pub provider_timeout: Duration,
    /// A `screening_in_progress` marker older than this is considered abandoned.
    pub screening_stale_after: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_chars: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| -> Result<String> {
            lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let matching = MatchConfig {
            weights: MatchWeights {
                similarity: optional(&lookup, "MATCH_WEIGHT_SIMILARITY", 0.40)?,
                skills: optional(&lookup, "MATCH_WEIGHT_SKILLS", 0.30)?,
                experience: optional(&lookup, "MATCH_WEIGHT_EXPERIENCE", 0.20)?,
                location: optional(&lookup, "MATCH_WEIGHT_LOCATION", 0.10)?,
            },
            structured_floor: parse_floor(lookup("MATCH_STRUCTURED_FLOOR"))?,
            default_limit: optional(&lookup, "MATCH_DEFAULT_LIMIT", 25)?,
        };
        matching.weights.validate()?;

        let runner = RunnerConfig {
            worker_count: optional(&lookup, "WORKER_COUNT", 4)?,
            max_attempts: optional(&lookup, "WORK_MAX_ATTEMPTS", 5)?,
            lease: positive_secs(&lookup, "WORK_LEASE_SECS", 120)?,
            poll_interval: positive_secs(&lookup, "WORK_POLL_INTERVAL_SECS", 5)?,
            sweep_interval: positive_secs(&lookup, "WORK_SWEEP_INTERVAL_SECS", 30)?,
        };
        if runner.worker_count == 0 {
            bail!("WORKER_COUNT must be at least 1");
        }

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            redis_url: require("REDIS_URL")?,
            s3_bucket: require("S3_BUCKET")?,
            s3_endpoint: require("S3_ENDPOINT")?,
            aws_access_key_id: require("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            embedding: EmbeddingSettings {
                api_url: lookup("EMBEDDING_API_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
                api_key: require("EMBEDDING_API_KEY")?,
                model: lookup("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                dimensions: optional(&lookup, "EMBEDDING_DIMENSIONS", 1536)?,
                max_chars: optional(&lookup, "EMBEDDING_MAX_CHARS", 8000)?,
            },
            port: optional(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            runner,
            matching,
            provider_timeout: positive_secs(&lookup, "PROVIDER_TIMEOUT_SECS", 60)?,
            screening_stale_after: Duration::from_secs(optional(
                &lookup,
                "SCREENING_STALE_SECS",
                600,
            )?),
        })
    }
}

fn optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

/// Intervals and timeouts; zero would spin or panic the timers built from them.
fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration> {
    let secs: u64 = optional(lookup, key, default)?;
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

/// `none` (or `off`) disables surfacing candidates that have no embedding.
fn parse_floor(raw: Option<String>) -> Result<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(Some(0.5));
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "off" | "" => Ok(None),
        value => {
            let floor: f64 = value
                .parse()
                .with_context(|| format!("MATCH_STRUCTURED_FLOOR has an invalid value '{raw}'"))?;
            if !(0.0..=1.0).contains(&floor) {
                bail!("MATCH_STRUCTURED_FLOOR must be within 0.0..=1.0, got {floor}");
            }
            Ok(Some(floor))
        }
    }
}
