//! Configuration module
//!
//! Environment-driven configuration for the API, worker pool, storage, and
//! notification hub. Loaded once at startup and validated before anything
//! else is initialized (fail fast on misconfiguration).

use std::env;

const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_SLIDES_PER_DECK: usize = 500;
const DEFAULT_UPLOAD_TOKEN_TTL_SECS: i64 = 900;
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_PER_JOB_ANALYSIS_LIMIT: usize = 4;
const DEFAULT_INFRA_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_STALE_CLAIM_CEILING_SECS: i64 = 600;
const DEFAULT_PENDING_REQUEUE_AFTER_SECS: i64 = 120;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_CONNECTION_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,

    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Object store (local backend)
    pub storage_path: String,
    pub upload_token_secret: String,
    pub upload_token_ttl_secs: i64,
    pub max_upload_bytes: usize,
    pub max_slides_per_deck: usize,

    // Ingestion worker pool
    pub worker_max_workers: usize,
    pub worker_poll_interval_ms: u64,
    pub per_job_analysis_limit: usize,
    pub infra_max_attempts: u32,
    /// A job held in `processing` longer than this without a progress update
    /// is presumed dead and force-failed by the reconciler.
    pub stale_claim_ceiling_secs: i64,
    /// A `pending` job older than this is re-announced to the pool.
    pub pending_requeue_after_secs: i64,
    pub reconcile_interval_secs: u64,

    // Notification hub
    pub connection_buffer: usize,
}

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let upload_token_secret = env::var("UPLOAD_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("UPLOAD_TOKEN_SECRET must be set"))?;

        Ok(Self {
            server_port: env_parse("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            cors_origins: env_list("CORS_ORIGINS"),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", DEFAULT_DB_TIMEOUT_SECS)?,
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "./data/objects".to_string()),
            upload_token_secret,
            upload_token_ttl_secs: env_parse("UPLOAD_TOKEN_TTL_SECS", DEFAULT_UPLOAD_TOKEN_TTL_SECS)?,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_slides_per_deck: env_parse("MAX_SLIDES_PER_DECK", DEFAULT_MAX_SLIDES_PER_DECK)?,
            worker_max_workers: env_parse("WORKER_MAX_WORKERS", DEFAULT_MAX_WORKERS)?,
            worker_poll_interval_ms: env_parse("WORKER_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            per_job_analysis_limit: env_parse(
                "PER_JOB_ANALYSIS_LIMIT",
                DEFAULT_PER_JOB_ANALYSIS_LIMIT,
            )?,
            infra_max_attempts: env_parse("INFRA_MAX_ATTEMPTS", DEFAULT_INFRA_MAX_ATTEMPTS)?,
            stale_claim_ceiling_secs: env_parse(
                "STALE_CLAIM_CEILING_SECS",
                DEFAULT_STALE_CLAIM_CEILING_SECS,
            )?,
            pending_requeue_after_secs: env_parse(
                "PENDING_REQUEUE_AFTER_SECS",
                DEFAULT_PENDING_REQUEUE_AFTER_SECS,
            )?,
            reconcile_interval_secs: env_parse(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?,
            connection_buffer: env_parse("CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?,
        })
    }

    /// Validate invariants that env parsing alone cannot catch.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upload_token_secret.len() < 32 {
            anyhow::bail!("UPLOAD_TOKEN_SECRET must be at least 32 bytes");
        }
        if self.worker_max_workers == 0 {
            anyhow::bail!("WORKER_MAX_WORKERS must be at least 1");
        }
        if self.per_job_analysis_limit == 0 {
            anyhow::bail!("PER_JOB_ANALYSIS_LIMIT must be at least 1");
        }
        if self.connection_buffer == 0 {
            anyhow::bail!("CONNECTION_BUFFER must be at least 1");
        }
        if self.stale_claim_ceiling_secs <= 0 {
            anyhow::bail!("STALE_CLAIM_CEILING_SECS must be positive");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 3000,
            cors_origins: vec![],
            environment: "test".into(),
            database_url: "postgres://localhost/deckform".into(),
            db_max_connections: 5,
            db_timeout_seconds: 30,
            storage_path: "/tmp/deckform".into(),
            upload_token_secret: "0123456789abcdef0123456789abcdef".into(),
            upload_token_ttl_secs: 900,
            max_upload_bytes: 1024,
            max_slides_per_deck: 100,
            worker_max_workers: 2,
            worker_poll_interval_ms: 100,
            per_job_analysis_limit: 2,
            infra_max_attempts: 3,
            stale_claim_ceiling_secs: 600,
            pending_requeue_after_secs: 120,
            reconcile_interval_secs: 60,
            connection_buffer: 16,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_token_secret_is_rejected() {
        let mut config = base_config();
        config.upload_token_secret = "short".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = base_config();
        config.worker_max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn nonpositive_stale_ceiling_is_rejected() {
        let mut config = base_config();
        config.stale_claim_ceiling_secs = 0;
        assert!(config.validate().is_err());
    }
}
