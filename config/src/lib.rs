//! # Configuration Management for dbwrap
//!
//! This crate provides the immutable configuration values for every backend the
//! data-access layer talks to: PostgreSQL, MySQL, MSSQL, SQLite and Redis.
//! A configuration is built once at startup and injected into the connection
//! managers; nothing in the workspace mutates it afterwards.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{BackendConfig, BackendKind};
//!
//! let pg = BackendConfig::new(
//!     BackendKind::Postgres,
//!     "localhost".to_string(),
//!     "app".to_string(),
//!     "postgres".to_string(),
//!     "password".to_string(),
//! )
//! .with_max_connections(10)
//! .with_connection_timeout(5);
//!
//! assert_eq!(pg.effective_port(), 5432);
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [backends.main]
//! kind = "postgres"
//! host = "localhost"
//! database = "app"
//! username = "postgres"
//! password = "password"
//! connection_timeout_seconds = 5
//!
//! [backends.main.pool]
//! min_connections = 1
//! max_connections = 10
//!
//! [backends.cache]
//! kind = "redis"
//! host = "localhost"
//! database = "0"
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from the path in DBWRAP_CONFIG, or ./dbwrap.toml
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use std::{env, path::Path};
use thiserror::Error;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "./dbwrap.toml";
const CONFIG_ENV_VAR: &str = "DBWRAP_CONFIG";

/// Number of acquisition attempts before a pool gives up.
pub const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Backend engine a configuration points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
    MySql,
    #[serde(alias = "sqlserver")]
    MsSql,
    Sqlite,
    Redis,
}

impl BackendKind {
    /// Port used when the configuration leaves it out
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Postgres => 5432,
            BackendKind::MySql => 3306,
            BackendKind::MsSql => 1433,
            BackendKind::Redis => 6379,
            BackendKind::Sqlite => 0,
        }
    }

    /// Whether the backend is reached over the network
    pub fn is_networked(&self) -> bool {
        !matches!(self, BackendKind::Sqlite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
            BackendKind::MsSql => "mssql",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS negotiation mode, named after libpq's `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// libpq spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// MySQL `ssl-mode` spelling
    pub fn as_mysql_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disabled",
            SslMode::Allow | SslMode::Prefer => "preferred",
            SslMode::Require => "required",
            SslMode::VerifyCa => "verify_ca",
            SslMode::VerifyFull => "verify_identity",
        }
    }

    /// Whether the mode refuses a plaintext connection
    pub fn requires_tls(&self) -> bool {
        matches!(
            self,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull
        )
    }
}

/// Connection pool bounds and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Zero disables the idle limit
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Zero disables the lifetime limit
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            idle_timeout_seconds: default_idle_timeout(),
            max_lifetime_seconds: default_max_lifetime(),
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_seconds > 0).then(|| Duration::from_secs(self.max_lifetime_seconds))
    }
}

/// Configuration of a single backend instance
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Database name; a file path or `:memory:` for SQLite, a database index for Redis
    pub database: String,
    #[serde(default)]
    pub ssl_mode: Option<SslMode>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Driver specific query parameters for the URL-configured engines
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.effective_port())
            .field("username", &self.username)
            .field("database", &self.database)
            .field("ssl_mode", &self.effective_ssl_mode())
            .field("instance_name", &self.instance_name)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl BackendConfig {
    /// Create a new backend configuration with default pool and timeout settings
    pub fn new(
        kind: BackendKind,
        host: String,
        database: String,
        username: String,
        password: String,
    ) -> Self {
        Self {
            kind,
            host,
            port: None,
            username,
            password,
            database,
            ssl_mode: None,
            connection_timeout_seconds: default_connection_timeout(),
            retry_backoff_seconds: default_retry_backoff(),
            instance_name: default_instance_name(),
            pool: PoolConfig::default(),
            extra: BTreeMap::new(),
        }
    }

    /// SQLite database at `path`, or an in-memory database for `:memory:`
    pub fn sqlite(path: &str) -> Self {
        Self::new(
            BackendKind::Sqlite,
            String::new(),
            path.to_string(),
            String::new(),
            String::new(),
        )
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = Some(ssl_mode);
        self
    }

    pub fn with_min_connections(mut self, min_connections: u32) -> Self {
        self.pool.min_connections = min_connections;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.pool.max_connections = max_connections;
        self
    }

    pub fn with_idle_timeout(mut self, seconds: u64) -> Self {
        self.pool.idle_timeout_seconds = seconds;
        self
    }

    pub fn with_max_lifetime(mut self, seconds: u64) -> Self {
        self.pool.max_lifetime_seconds = seconds;
        self
    }

    pub fn with_connection_timeout(mut self, seconds: u64) -> Self {
        self.connection_timeout_seconds = seconds;
        self
    }

    pub fn with_retry_backoff(mut self, seconds: u64) -> Self {
        self.retry_backoff_seconds = seconds;
        self
    }

    pub fn with_instance_name(mut self, name: &str) -> Self {
        self.instance_name = name.to_string();
        self
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    /// Configured port, or the engine default
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port != 0 => port,
            _ => self.kind.default_port(),
        }
    }

    /// Configured TLS mode, or "prefer" for engines that negotiate TLS
    pub fn effective_ssl_mode(&self) -> Option<SslMode> {
        match self.kind {
            BackendKind::Postgres | BackendKind::MySql => {
                Some(self.ssl_mode.unwrap_or(SslMode::Prefer))
            }
            _ => self.ssl_mode,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }

    /// Connection URL for the engines configured through one: PostgreSQL, MySQL
    /// and Redis. Every component is percent-encoded by `url::Url`, so a value
    /// cannot add or override query parameters.
    pub fn connection_url(&self) -> Result<Url, ConfigError> {
        self.build_url(Some(&self.password))
    }

    /// Target description with the password masked, for logs
    pub fn redacted_url(&self) -> String {
        let mask = (!self.password.is_empty()).then_some("****");
        match self.build_url(mask) {
            Ok(url) => url.to_string(),
            Err(_) if self.kind == BackendKind::Sqlite => format!("sqlite://{}", self.database),
            Err(_) => format!(
                "{}://{}:{}/{}",
                self.kind,
                self.host,
                self.effective_port(),
                self.database
            ),
        }
    }

    fn build_url(&self, password: Option<&str>) -> Result<Url, ConfigError> {
        let name = &self.instance_name;
        let scheme = match self.kind {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
            BackendKind::Redis => match self.ssl_mode {
                Some(mode) if mode.requires_tls() => "rediss",
                _ => "redis",
            },
            BackendKind::Sqlite | BackendKind::MsSql => {
                return Err(ConfigError::Invalid(format!(
                    "Backend '{}': {} is not configured through a URL",
                    name, self.kind
                )))
            }
        };

        let invalid = |what: &str| {
            ConfigError::Invalid(format!("Backend '{}': invalid {} for a URL", name, what))
        };
        let mut url = Url::parse(&format!("{}://localhost", scheme)).map_err(|_| invalid("scheme"))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        url.set_port(Some(self.effective_port()))
            .map_err(|_| invalid("port"))?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| invalid("username"))?;
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| invalid("password"))?;
        }
        url.set_path(&format!("/{}", self.database));

        let ssl_mode = self.effective_ssl_mode().unwrap_or(SslMode::Prefer);
        let mut params: Vec<(&str, String)> = match self.kind {
            BackendKind::Postgres => vec![
                ("sslmode", ssl_mode.as_str().to_string()),
                ("connect_timeout", self.connection_timeout_seconds.to_string()),
                ("application_name", self.instance_name.clone()),
            ],
            BackendKind::MySql => vec![("ssl-mode", ssl_mode.as_mysql_str().to_string())],
            _ => Vec::new(),
        };
        params.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.clone())));
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        Ok(url)
    }

    /// Query parameters the configuration sets itself; `extra` may not repeat them
    fn managed_params(&self) -> &'static [&'static str] {
        match self.kind {
            BackendKind::Postgres => &["sslmode", "connect_timeout", "application_name"],
            BackendKind::MySql => &["ssl-mode"],
            _ => &[],
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.instance_name;

        if self.kind.is_networked() && self.host.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': host cannot be empty",
                name
            )));
        }
        if self.database.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': database cannot be empty",
                name
            )));
        }
        if self.kind == BackendKind::Redis && self.database.parse::<u32>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': redis database must be a numeric index",
                name
            )));
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': max_connections must be greater than 0",
                name
            )));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': min_connections cannot be greater than max_connections",
                name
            )));
        }
        if !self.extra.is_empty()
            && matches!(self.kind, BackendKind::Sqlite | BackendKind::MsSql)
        {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': {} takes no extra options",
                name, self.kind
            )));
        }
        if let Some(key) = self
            .managed_params()
            .iter()
            .find(|key| self.extra.contains_key(**key))
        {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': extra option '{}' is set from the configuration fields",
                name, key
            )));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(format!(
                "Backend '{}': connection_timeout_seconds must be greater than 0",
                name
            )));
        }

        Ok(())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

impl AppConfig {
    /// Load configuration from TOML file specified in .env or defaults
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine, a malformed one is not
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        if let Ok(config_path) = env::var(CONFIG_ENV_VAR) {
            Self::from_file(&config_path)
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            Err(ConfigError::Invalid(format!(
                "Config path must be specified in .env file as {} or in {} file",
                CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH
            )))
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;

        // Backends without an explicit instance name are named after their table key
        for (name, backend) in config.backends.iter_mut() {
            if backend.instance_name == default_instance_name() {
                backend.instance_name = name.clone();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Get a backend configuration by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one backend must be configured".to_string(),
            ));
        }
        for backend in self.backends.values() {
            backend.validate()?;
        }
        Ok(())
    }
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    5
}

fn default_idle_timeout() -> u64 {
    400
}

fn default_max_lifetime() -> u64 {
    20 * 60
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_instance_name() -> String {
    "database_backend".to_string()
}
