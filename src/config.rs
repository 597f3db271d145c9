use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use log::warn;

use crate::error::ConfigError;

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

// Feed Configuration
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_SUBSCRIBER_COUNT: usize = 2;
pub const RANDOM_WALK_MAX_STEP: f64 = 2.0;

// Broadcast Configuration
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

// Database Configuration
pub const MEMORY_DATABASE_URL: &str = "memory";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: &str = "5432";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASSWORD: &str = "postgres";
pub const DEFAULT_DB_NAME: &str = "stocks";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingKind {
    RandomWalk,
    WallClock,
}

impl FromStr for PricingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random_walk" => Ok(PricingKind::RandomWalk),
            "wall_clock" => Ok(PricingKind::WallClock),
            other => Err(ConfigError::Invalid(format!("Unknown pricing model: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE_URL
    }

    /// URL with any password replaced, safe to log.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database: DatabaseConfig,
    pub tick_interval_secs: u64,
    pub subscriber_queue_capacity: usize,
    pub subscriber_count: usize,
    pub pricing: PricingKind,
    pub log_level: String,
    /// `KEY='value'` entries that could not be parsed.
    pub invalid_vars: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Values that fail to parse fall
    /// back to their default and are recorded in `invalid_vars`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = VarReader { lookup, invalid: Vec::new() };
        let database = DatabaseConfig {
            url: vars.raw("DATABASE_URL").unwrap_or_else(|| vars.postgres_url()),
            max_connections: vars.parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            connect_timeout_secs: DB_CONNECT_TIMEOUT_SECS,
        };

        Self {
            bind_address: vars.raw("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            database,
            tick_interval_secs: vars.parse("TICK_INTERVAL_SECS", DEFAULT_TICK_INTERVAL_SECS),
            subscriber_queue_capacity: vars.parse("SUBSCRIBER_QUEUE_CAPACITY", SUBSCRIBER_QUEUE_CAPACITY),
            subscriber_count: vars.parse("SUBSCRIBER_COUNT", DEFAULT_SUBSCRIBER_COUNT),
            pricing: vars.parse("PRICING_MODEL", PricingKind::RandomWalk),
            log_level: vars.raw("RUST_LOG")
                .unwrap_or_else(|| "info".to_string()),
            invalid_vars: vars.invalid,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.invalid_vars.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Unparsable environment variables: {}",
                self.invalid_vars.join(", ")
            )));
        }

        if self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!("Invalid bind address: {}", self.bind_address)));
        }

        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid("Tick interval must be at least 1 second".to_string()));
        }

        if self.subscriber_queue_capacity == 0 {
            return Err(ConfigError::Invalid("Subscriber queue capacity must be greater than 0".to_string()));
        }

        if self.subscriber_count == 0 {
            return Err(ConfigError::Invalid("At least one subscriber is required".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("Database pool needs at least one connection".to_string()));
        }

        if self.database.is_memory() {
            warn!("Using in-memory price history - nothing survives a restart");
        }

        Ok(())
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  Bind Address: {}", self.bind_address);
        println!("  Database: {}", self.database.redacted_url());
        println!("  Tick Interval: {}s", self.tick_interval_secs);
        println!("  Subscribers: {} (queue capacity {})", self.subscriber_count, self.subscriber_queue_capacity);
        println!("  Pricing: {:?}", self.pricing);
        println!("  Log Level: {}", self.log_level);
    }
}

struct VarReader<F> {
    lookup: F,
    invalid: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> VarReader<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn parse<T: FromStr>(&mut self, key: &str, default: T) -> T {
        match self.raw(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                self.invalid.push(format!("{}='{}'", key, raw));
                default
            }),
            None => default,
        }
    }

    fn postgres_url(&self) -> String {
        let var = |key: &str, default: &str| self.raw(key).unwrap_or_else(|| default.to_string());
        format!(
            "postgres://{}:{}@{}:{}/{}",
            var("DB_USER", DEFAULT_DB_USER),
            var("DB_PASSWORD", DEFAULT_DB_PASSWORD),
            var("DB_HOST", DEFAULT_DB_HOST),
            var("DB_PORT", DEFAULT_DB_PORT),
            var("DB_NAME", DEFAULT_DB_NAME),
        )
    }
}
