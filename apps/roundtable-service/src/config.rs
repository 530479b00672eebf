use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8484";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MOCK_MAGIC_CODE: &str = "123456";
const DEFAULT_AUTH_CHALLENGE_TTL_SECONDS: u64 = 600;
const DEFAULT_AUTH_ACCESS_TTL_SECONDS: u64 = 3600;
const DEFAULT_PAGE_SIZE_CAP: u64 = roundtable_domain::MAX_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub workspace_store_path: Option<PathBuf>,
    pub auth_store_path: Option<PathBuf>,
    pub mock_magic_code: String,
    pub auth_challenge_ttl_seconds: u64,
    pub auth_access_ttl_seconds: u64,
    pub page_size_cap: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env_string("ROUNDTABLE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|error| ConfigError::Invalid {
                key: "ROUNDTABLE_BIND_ADDR",
                message: error.to_string(),
            })?;

        Ok(Self {
            bind_addr,
            log_filter: env_string("ROUNDTABLE_LOG_FILTER")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            workspace_store_path: env_string("ROUNDTABLE_STORE_PATH").map(PathBuf::from),
            auth_store_path: env_string("ROUNDTABLE_AUTH_STORE_PATH").map(PathBuf::from),
            mock_magic_code: env_string("ROUNDTABLE_MOCK_MAGIC_CODE")
                .unwrap_or_else(|| DEFAULT_MOCK_MAGIC_CODE.to_string()),
            auth_challenge_ttl_seconds: env_u64(
                "ROUNDTABLE_AUTH_CHALLENGE_TTL_SECONDS",
                DEFAULT_AUTH_CHALLENGE_TTL_SECONDS,
            )?,
            auth_access_ttl_seconds: env_u64(
                "ROUNDTABLE_AUTH_ACCESS_TTL_SECONDS",
                DEFAULT_AUTH_ACCESS_TTL_SECONDS,
            )?,
            page_size_cap: env_u64("ROUNDTABLE_PAGE_SIZE_CAP", DEFAULT_PAGE_SIZE_CAP)?,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            workspace_store_path: None,
            auth_store_path: None,
            mock_magic_code: DEFAULT_MOCK_MAGIC_CODE.to_string(),
            auth_challenge_ttl_seconds: DEFAULT_AUTH_CHALLENGE_TTL_SECONDS,
            auth_access_ttl_seconds: DEFAULT_AUTH_ACCESS_TTL_SECONDS,
            page_size_cap: DEFAULT_PAGE_SIZE_CAP,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env_string(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
            key,
            message: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_binds_an_ephemeral_port() {
        let config = Config::for_tests();
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.workspace_store_path.is_none());
        assert_eq!(config.page_size_cap, roundtable_domain::MAX_PAGE_SIZE);
    }
}
