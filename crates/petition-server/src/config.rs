use std::path::PathBuf;

use anyhow::{Context, Result};

use petition_db::DEFAULT_READER_POOL_SIZE;

/// Server configuration, read from `PETITION_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub db_readers: usize,
    pub photo_dir: PathBuf,
    pub root_url: String,
    pub max_photo_bytes: usize,
    /// Seconds between orphan photo sweeps; 0 disables the sweep.
    pub photo_sweep_secs: u64,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("PETITION_PORT", "4941")
            .parse()
            .context("Invalid PETITION_PORT")?;
        let db_readers = var("PETITION_DB_READERS", &DEFAULT_READER_POOL_SIZE.to_string())
            .parse()
            .context("Invalid PETITION_DB_READERS")?;
        let max_photo_bytes = var("PETITION_MAX_PHOTO_BYTES", "20971520")
            .parse()
            .context("Invalid PETITION_MAX_PHOTO_BYTES")?;
        let photo_sweep_secs = var("PETITION_PHOTO_SWEEP_SECS", "3600")
            .parse()
            .context("Invalid PETITION_PHOTO_SWEEP_SECS")?;

        let cors_origins = lookup("PETITION_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        Ok(Config {
            host: var("PETITION_HOST", "0.0.0.0"),
            port,
            db_path: var("PETITION_DB_PATH", "petitions.db").into(),
            db_readers,
            photo_dir: var("PETITION_PHOTO_DIR", "./photos").into(),
            root_url: var("PETITION_ROOT_URL", "/api/v1"),
            max_photo_bytes,
            photo_sweep_secs,
            cors_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:4941");
        assert_eq!(config.db_path, PathBuf::from("petitions.db"));
        assert_eq!(config.db_readers, DEFAULT_READER_POOL_SIZE);
        assert_eq!(config.root_url, "/api/v1");
        assert_eq!(config.max_photo_bytes, 20 * 1024 * 1024);
        assert_eq!(config.photo_sweep_secs, 3600);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("PETITION_PORT", "8080"),
            ("PETITION_ROOT_URL", "/api/v2"),
            ("PETITION_PHOTO_SWEEP_SECS", "0"),
            ("PETITION_CORS_ORIGINS", "http://localhost:5173, https://petitions.example.com"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.root_url, "/api/v2");
        assert_eq!(config.photo_sweep_secs, 0);
        assert_eq!(
            config.cors_origins.unwrap(),
            vec!["http://localhost:5173", "https://petitions.example.com"]
        );
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config_from(&[("PETITION_PORT", "eighty")]).is_err());
        assert!(config_from(&[("PETITION_DB_READERS", "-1")]).is_err());
    }
}
