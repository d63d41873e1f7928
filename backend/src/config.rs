//! # Configuration
//!
//! Runtime settings read from the environment, with defaults suitable for a
//! single-machine deployment.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_URL: &str = "sqlite://student_records.db?mode=rwc";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Where records are persisted
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Connection string for the primary database
    pub database_url: String,
    /// Upper bound on the startup connection attempt
    pub connect_timeout: Duration,
    /// Directory holding the fallback `students.json` / `holidays.json`
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Base URL used when rendering absolute links (QR info page photos)
    pub public_url: String,
    pub upload_dir: PathBuf,
    pub frontend_dir: Option<PathBuf>,
    pub log_level: String,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_var("PORT", "a port number", DEFAULT_PORT)?;
        let bind_addr = parse_var(
            "STUDENT_BIND_ADDR",
            "an IP address",
            IpAddr::from([0, 0, 0, 0]),
        )?;
        let connect_timeout_secs = parse_var(
            "STUDENT_DB_CONNECT_TIMEOUT_SECS",
            "a whole number of seconds",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;

        let public_url = string_var("RENDER_EXTERNAL_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            bind_addr,
            port,
            public_url: public_url.trim_end_matches('/').to_string(),
            upload_dir: string_var("STUDENT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            frontend_dir: string_var("STUDENT_FRONTEND_DIR").map(PathBuf::from),
            log_level: string_var("STUDENT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            storage: StorageConfig {
                database_url: string_var("DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                data_dir: string_var("STUDENT_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data")),
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match string_var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, expected, value }),
        None => Ok(default),
    }
}
