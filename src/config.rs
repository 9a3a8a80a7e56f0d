use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub queue_name: String,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub job_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl WorkerConfig {
    /// `None` when job timeouts are disabled (`JOB_TIMEOUT_SECS=0`).
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "local" | "fs" => Ok(StorageBackend::Local),
            // R2 speaks the S3 protocol
            "s3" | "r2" => Ok(StorageBackend::S3),
            other => bail!("unsupported STORAGE_PROVIDER: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageBackend,
    pub local_path: PathBuf,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub org_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
                run_migrations: parse_var("RUN_MIGRATIONS", "false")?,
            },
            redis: RedisConfig {
                url: first_var(&["REDIS_URL", "REDIS_URI"])
                    .map(|url| normalize_redis_url(&url))
                    .unwrap_or_else(|| "redis://localhost:6379".to_string()),
                queue_name: env::var("TASK_QUEUE").unwrap_or_else(|_| "task_queue".to_string()),
                retry_delay_ms: parse_var("QUEUE_RETRY_DELAY_MS", "1000")?,
            },
            worker: WorkerConfig {
                concurrency: parse_var("WORKER_CONCURRENCY", "10")?,
                job_timeout_secs: parse_var("JOB_TIMEOUT_SECS", "300")?,
                http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", "30")?,
            },
            storage: StorageConfig {
                provider: env::var("STORAGE_PROVIDER")
                    .unwrap_or_else(|_| "local".to_string())
                    .parse()?,
                local_path: env::var("LOCAL_STORAGE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./reports")),
                s3_bucket: first_var(&["S3_BUCKET", "R2_BUCKET_NAME"]).unwrap_or_default(),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
                s3_endpoint: first_var(&["S3_ENDPOINT", "R2_ENDPOINT"]),
                s3_access_key_id: first_var(&["AWS_ACCESS_KEY_ID", "R2_ACCESS_KEY_ID"]),
                s3_secret_access_key: first_var(&["AWS_SECRET_ACCESS_KEY", "R2_SECRET_ACCESS_KEY"]),
                public_url: first_var(&["S3_PUBLIC_URL", "R2_PUBLIC_URL"]).unwrap_or_default(),
            },
            report: ReportConfig {
                org_name: env::var("ORG_NAME")
                    .ok()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Community Organization".to_string()),
            },
            logging: LoggingConfig {
                log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
                file_prefix: env::var("LOG_FILE_PREFIX")
                    .unwrap_or_else(|_| "org-worker.log".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.storage.provider == StorageBackend::S3 {
            if self.storage.s3_bucket.is_empty() {
                bail!("S3_BUCKET (or R2_BUCKET_NAME) must be set for the object store backend");
            }
            if self.storage.public_url.is_empty() {
                bail!("S3_PUBLIC_URL (or R2_PUBLIC_URL) must be set for the object store backend");
            }
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", key, raw))
}

fn first_var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Accepts bare `host:port` addresses as used by older deployments.
fn normalize_redis_url(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("redis://{}", raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/org".into(),
                max_connections: 10,
                min_connections: 1,
                run_migrations: false,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".into(),
                queue_name: "task_queue".into(),
                retry_delay_ms: 1000,
            },
            worker: WorkerConfig {
                concurrency: 10,
                job_timeout_secs: 300,
                http_timeout_secs: 30,
            },
            storage: StorageConfig {
                provider: StorageBackend::Local,
                local_path: PathBuf::from("./reports"),
                s3_bucket: String::new(),
                s3_region: "auto".into(),
                s3_endpoint: None,
                s3_access_key_id: None,
                s3_secret_access_key: None,
                public_url: String::new(),
            },
            report: ReportConfig { org_name: "Community Organization".into() },
            logging: LoggingConfig { log_dir: None, file_prefix: "org-worker.log".into() },
        }
    }

    #[test]
    fn test_storage_backend_parsing() {
        assert_eq!("r2".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert!("gcs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());

        let mut zero = sample();
        zero.worker.concurrency = 0;
        assert!(zero.validate().is_err());

        let mut s3 = sample();
        s3.storage.provider = StorageBackend::S3;
        assert!(s3.validate().is_err());
        s3.storage.s3_bucket = "reports".into();
        s3.storage.public_url = "https://cdn.example.org".into();
        assert!(s3.validate().is_ok());
    }

    #[test]
    fn test_timeouts() {
        let mut config = sample();
        assert_eq!(config.worker.job_timeout(), Some(Duration::from_secs(300)));
        config.worker.job_timeout_secs = 0;
        assert_eq!(config.worker.job_timeout(), None);
    }

    #[test]
    fn test_normalize_redis_url() {
        assert_eq!(normalize_redis_url("localhost:6379"), "redis://localhost:6379");
        assert_eq!(normalize_redis_url("rediss://cache:6380"), "rediss://cache:6380");
    }
}
