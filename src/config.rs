//! Configuration management for the multipart relay

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default cap on a single part body: 64 MiB
pub const DEFAULT_MAX_PART_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    /// Deadline applied to every store call
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
    Memory,
}

impl FromStr for StorageProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minio" => Ok(Self::Minio),
            "r2" => Ok(Self::R2),
            "s3" => Ok(Self::S3),
            "b2" => Ok(Self::B2),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// What `complete` does with the session when it cannot finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Remove the session before any check; a failed completion cannot be retried
    #[default]
    Consume,
    /// Keep the session on an incomplete part set or a store failure.
    /// A completion that hits the store deadline still drops the session,
    /// since the store may have assembled the object anyway.
    Retain,
}

impl FromStr for CompletionPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "consume" => Ok(Self::Consume),
            "retain" => Ok(Self::Retain),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_part_bytes: usize,
    pub completion_policy: CompletionPolicy,
    /// Sessions older than this are aborted by the sweeper; `None` disables it
    pub session_ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout: Duration::from_secs(60),
            },
            storage: StorageConfig {
                provider: StorageProvider::Memory,
                endpoint: None,
                bucket: "uploads".to_string(),
                access_key: None,
                secret_key: None,
                region: None,
                call_timeout: Duration::from_secs(30),
            },
            upload: UploadConfig {
                max_part_bytes: DEFAULT_MAX_PART_BYTES,
                completion_policy: CompletionPolicy::Consume,
                session_ttl: None,
                sweep_interval: Duration::from_secs(300),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match var("S3_PROVIDER") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "S3_PROVIDER",
                value: raw,
            })?,
            None => StorageProvider::S3,
        };

        let bucket = match var("S3_BUCKET").or_else(|| var("AWS_BUCKET_NAME")) {
            Some(bucket) => bucket,
            None if provider == StorageProvider::Memory => "uploads".to_string(),
            None => return Err(ConfigError::Missing("S3_BUCKET")),
        };

        let port = match var("SERVER_PORT").or_else(|| var("PORT")) {
            Some(raw) => parse_as("SERVER_PORT", raw)?,
            None => 8080,
        };

        let completion_policy = match var("UPLOAD_COMPLETION_POLICY") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "UPLOAD_COMPLETION_POLICY",
                value: raw,
            })?,
            None => CompletionPolicy::default(),
        };

        let session_ttl = var("UPLOAD_SESSION_TTL_SECS")
            .map(|raw| parse_secs("UPLOAD_SESSION_TTL_SECS", raw))
            .transpose()?;

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                request_timeout: secs_or(var("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 60)?,
            },
            storage: StorageConfig {
                provider,
                endpoint: var("S3_ENDPOINT"),
                bucket,
                access_key: var("S3_ACCESS_KEY"),
                secret_key: var("S3_SECRET_KEY"),
                region: var("S3_REGION"),
                call_timeout: secs_or(var("STORE_TIMEOUT_SECS"), "STORE_TIMEOUT_SECS", 30)?,
            },
            upload: UploadConfig {
                max_part_bytes: match var("UPLOAD_MAX_PART_BYTES") {
                    Some(raw) => parse_as("UPLOAD_MAX_PART_BYTES", raw)?,
                    None => DEFAULT_MAX_PART_BYTES,
                },
                completion_policy,
                session_ttl,
                sweep_interval: secs_or(
                    var("UPLOAD_SWEEP_INTERVAL_SECS"),
                    "UPLOAD_SWEEP_INTERVAL_SECS",
                    300,
                )?,
            },
        })
    }
}

fn parse_as<T: FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn parse_secs(var: &'static str, raw: String) -> Result<Duration, ConfigError> {
    match parse_as::<u64>(var, raw.clone())? {
        0 => Err(ConfigError::Invalid { var, value: raw }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn secs_or(raw: Option<String>, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => parse_secs(var, raw),
        None => Ok(Duration::from_secs(default)),
    }
}
