//! API service configuration, read from `API_*` environment variables

use anyhow::{Context, Result, anyhow};
use booking::admission::{
    AdmissionPolicy, DEFAULT_USER_DAILY_CEILING, DEFAULT_UTC_OFFSET_MINUTES,
};
use config::{Config, ConfigError, Environment};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// RSA public key in PEM form, or a path to a PEM file
    pub jwt_public_key: String,

    #[serde(default = "default_user_daily_ceiling")]
    pub user_daily_ceiling: u32,

    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_user_daily_ceiling() -> u32 {
    DEFAULT_USER_DAILY_CEILING
}

fn default_utc_offset_minutes() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn admission_policy(&self) -> Result<AdmissionPolicy> {
        AdmissionPolicy::new(self.user_daily_ceiling, self.utc_offset_minutes).ok_or_else(|| {
            anyhow!(
                "API_UTC_OFFSET_MINUTES {} is not a valid UTC offset",
                self.utc_offset_minutes
            )
        })
    }

    pub fn public_key_pem(&self) -> Result<String> {
        if self.jwt_public_key.starts_with("-----BEGIN") {
            return Ok(self.jwt_public_key.clone());
        }

        // Try the path as given, then relative to the crate
        let pem = std::fs::read_to_string(&self.jwt_public_key)
            .or_else(|_| {
                let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
                path.push(&self.jwt_public_key);
                std::fs::read_to_string(path)
            })
            .with_context(|| format!("Failed to read public key file {}", self.jwt_public_key))?;
        Ok(pem.trim().to_string())
    }

    pub fn decoding_key(&self) -> Result<DecodingKey> {
        let pem = self.public_key_pem()?;
        DecodingKey::from_rsa_pem(pem.as_bytes()).context("Invalid JWT public key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear() {
        for var in ["API_JWT_PUBLIC_KEY", "API_LISTEN_ADDR", "API_USER_DAILY_CEILING"] {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        unsafe {
            env::set_var("API_JWT_PUBLIC_KEY", "-----BEGIN PUBLIC KEY-----");
        }

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3001");
        assert_eq!(config.user_daily_ceiling, 5);
        assert_eq!(config.utc_offset_minutes, 300);
        assert_eq!(config.public_key_pem().unwrap(), "-----BEGIN PUBLIC KEY-----");

        clear();
    }

    #[test]
    #[serial]
    fn test_missing_key_file_is_an_error() {
        clear();
        unsafe {
            env::set_var("API_JWT_PUBLIC_KEY", "does/not/exist.pem");
        }

        let config = ApiConfig::from_env().unwrap();
        assert!(config.public_key_pem().is_err());

        clear();
    }

    #[test]
    #[serial]
    fn test_public_key_is_required() {
        clear();
        assert!(ApiConfig::from_env().is_err());
    }
}
