//! Configuration management for Archive Backend

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub files: FilesConfig,
    pub local: Option<LocalConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent upload workers
    pub count: usize,
    /// Pause after an empty claim or a failed upload
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where `file_pointer`s are resolved
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    pub root: Option<PathBuf>,
}

/// Local filesystem provider
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    pub path: PathBuf,
}

/// S3-compatible provider
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./archive.db".to_string(),
            },
            worker: WorkerConfig {
                count: 2,
                poll_interval_ms: 1000,
            },
            files: FilesConfig { root: None },
            local: Some(LocalConfig {
                path: PathBuf::from("./archive"),
            }),
            s3: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Self::from_lookup(|key| env::var(key))
    }

    fn from_lookup<F>(var: F) -> Result<Self, env::VarError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let s3 = match (var("S3_ENDPOINT").ok(), var("S3_BUCKET").ok()) {
            (Some(endpoint), Some(bucket)) => Some(S3Config {
                endpoint,
                bucket,
                access_key: var("S3_ACCESS_KEY")?,
                secret_key: var("S3_SECRET_KEY")?,
                region: var("S3_REGION").ok(),
            }),
            _ => None,
        };

        let local = match var("LOCAL_STORAGE_DIR") {
            Ok(dir) if dir.is_empty() => None,
            Ok(dir) => Some(LocalConfig { path: dir.into() }),
            Err(_) => Some(LocalConfig {
                path: PathBuf::from("./archive"),
            }),
        };

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./archive.db".to_string()),
            },
            worker: WorkerConfig {
                count: var("WORKER_COUNT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
                poll_interval_ms: var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            },
            files: FilesConfig {
                root: var("FILE_ROOT").ok().map(PathBuf::from),
            },
            local,
            s3,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:./archive.db");
        assert_eq!(config.worker.count, 2);
        assert!(config.local.is_some());
        assert!(config.s3.is_none());
    }

    #[test]
    fn test_s3_block_requires_credentials() {
        let partial = lookup(&[("S3_ENDPOINT", "http://minio:9000"), ("S3_BUCKET", "archive")]);
        assert!(Config::from_lookup(partial).is_err());

        let full = lookup(&[
            ("S3_ENDPOINT", "http://minio:9000"),
            ("S3_BUCKET", "archive"),
            ("S3_ACCESS_KEY", "admin"),
            ("S3_SECRET_KEY", "secret"),
            ("LOCAL_STORAGE_DIR", ""),
            ("WORKER_COUNT", "8"),
        ]);
        let config = Config::from_lookup(full).unwrap();

        assert_eq!(config.s3.unwrap().bucket, "archive");
        assert!(config.local.is_none());
        assert_eq!(config.worker.count, 8);
    }
}
