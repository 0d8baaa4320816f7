use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Secret shipped in `.env.example`; refusing it keeps it out of production.
const PLACEHOLDER_SECRET: &str = "change-me";

/// Runtime settings, read from `SWAP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    /// Base URL uploaded objects are published under
    pub public_url: String,
    pub heartbeat: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("SWAP_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("SWAP_JWT_SECRET must be set")?;
        if jwt_secret.contains(PLACEHOLDER_SECRET) {
            bail!("SWAP_JWT_SECRET still holds the placeholder value; generate a real secret");
        }

        let port: u16 = var("SWAP_PORT", "3000")
            .parse()
            .context("SWAP_PORT must be a port number")?;

        let heartbeat_secs: u64 = var("SWAP_HEARTBEAT_SECS", "30")
            .parse()
            .context("SWAP_HEARTBEAT_SECS must be a whole number of seconds")?;
        if heartbeat_secs == 0 {
            bail!("SWAP_HEARTBEAT_SECS must be at least 1");
        }

        let public_url = lookup("SWAP_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}/media", port));

        Ok(Self {
            host: var("SWAP_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("SWAP_DB_PATH", "swap.db")),
            jwt_secret,
            storage_dir: PathBuf::from(var("SWAP_STORAGE_DIR", "./media")),
            public_url,
            heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = load(&[("SWAP_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("swap.db"));
        assert_eq!(config.storage_dir, PathBuf::from("./media"));
        assert_eq!(config.public_url, "http://localhost:3000/media");
        assert_eq!(config.heartbeat, Duration::from_secs(30));
    }

    #[test]
    fn public_url_follows_the_port() {
        let config = load(&[("SWAP_JWT_SECRET", "s3cr3t"), ("SWAP_PORT", "8080")]).unwrap();
        assert_eq!(config.public_url, "http://localhost:8080/media");

        let config = load(&[
            ("SWAP_JWT_SECRET", "s3cr3t"),
            ("SWAP_PUBLIC_URL", "https://cdn.example.com/snacks"),
        ])
        .unwrap();
        assert_eq!(config.public_url, "https://cdn.example.com/snacks");
    }

    #[test]
    fn missing_or_placeholder_secret_is_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("SWAP_JWT_SECRET", "  ")]).is_err());
        assert!(load(&[("SWAP_JWT_SECRET", "change-me-in-production")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_refused() {
        assert!(load(&[("SWAP_JWT_SECRET", "s"), ("SWAP_PORT", "http")]).is_err());
        assert!(load(&[("SWAP_JWT_SECRET", "s"), ("SWAP_HEARTBEAT_SECS", "0")]).is_err());
    }
}
