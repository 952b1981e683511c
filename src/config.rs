use std::{net::SocketAddr, path::Path, time::Duration};

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "financeview", about = "FinanceView - personal expense tracking service")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "financeview.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Storage backend (overrides config file)
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Database connection URL (overrides config file)
    #[arg(long, env = "DBURL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid listen address {0}")]
    ListenAddr(String),
    #[error("the {0:?} backend requires a database url (set DBURL or storage.url)")]
    MissingUrl(StorageBackend),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Postgres connection string, or SQLite file path.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_init_schema")]
    pub init_schema: bool,

    /// Postgres only.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_init_schema() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            url: None,
            init_schema: default_init_schema(),
            statement_timeout_ms: None,
        }
    }
}

impl StorageConfig {
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// The url this backend needs, if any; the memory backend needs none.
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingUrl(self.backend))
    }
}

impl Config {
    /// Reads the config file (a missing file means defaults), then applies CLI overrides.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(Path::new(&cli.config))?;

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(backend) = cli.backend {
            config.storage.backend = backend;
        }
        if let Some(ref url) = cli.database_url {
            config.storage.url = Some(url.clone());
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse().map_err(|_| ConfigError::ListenAddr(addr))
    }
}
