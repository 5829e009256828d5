use chrono::Duration;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Longest bearer token lifetime accepted from config: ten years.
pub const MAX_TOKEN_HOURS: u64 = 24 * 365 * 10;

#[derive(Parser, Debug)]
#[command(name = "abode", about = "A property listing marketplace server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Runtime environment; `development` exposes internal error details
    #[arg(long, value_enum)]
    pub env: Option<Environment>,
}

/// Controls how much of an internal failure is shown to API callers.
#[derive(Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    /// URL prefix stored images are served under
    pub public_prefix: String,
    pub max_upload_bytes: usize,
    pub max_files: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub token_hours: u64,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: Environment::Production,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            public_prefix: "/uploads".to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_hours: 24 * 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    /// Token lifetime, or an error naming the setting when it is out of range.
    pub fn token_ttl(&self) -> anyhow::Result<Duration> {
        if !(1..=MAX_TOKEN_HOURS).contains(&self.token_hours) {
            anyhow::bail!(
                "auth.token_hours must be between 1 and {MAX_TOKEN_HOURS}, got {}",
                self.token_hours
            );
        }
        i64::try_from(self.token_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| anyhow::anyhow!("auth.token_hours is out of range"))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 12 }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(env) = cli.env {
            config.server.environment = env;
        }

        config.auth.token_ttl()?;

        // Resolve paths relative to data dir
        config.resolve_paths(&data_dir);

        Ok(config)
    }

    /// Fill in any unset paths beneath `data_dir`.
    pub fn resolve_paths(&mut self, data_dir: &std::path::Path) {
        if self.database.path.is_none() {
            self.database.path = Some(data_dir.join("abode.db"));
        }
        if self.storage.path.is_none() {
            self.storage.path = Some(data_dir.join("uploads"));
        }
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".abode")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("abode.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }
}
