//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    fmt,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CacheArgs, CacheCommand, CliArgs, Command, RedisOverride, ServeArgs, ServeOverrides, TenantArg,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ticketry";
const ENV_PREFIX: &str = "TICKETRY";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9010;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_NAME: &str = "postgres";
const DEFAULT_DB_SSLMODE: &str = "disable";
const DEFAULT_DB_SCHEMA: &str = "app";
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_MAX_OPEN: u32 = 10;
const DEFAULT_DB_MIN_IDLE: u32 = 5;
const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 300;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_REDIS_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REDIS_COMMAND_TIMEOUT_SECS: u64 = 3;
const DEFAULT_REDIS_HEALTH_INTERVAL_SECS: u64 = 5;
const DEFAULT_REDIS_MAX_BACKOFF_SECS: u64 = 300;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_VERSION: u64 = 100_000;
const DEFAULT_CACHE_INVALIDATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CACHE_SERVICE_NAME: &str = "default";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Connection parameters shared by both endpoints of the dual client.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub user: String,
    pub password: String,
    pub name: String,
    pub sslmode: String,
    pub schema: String,
    pub query: EndpointSettings,
    pub mutation: EndpointSettings,
    pub debug: bool,
    pub pool: PoolSettings,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("sslmode", &self.sslmode)
            .field("schema", &self.schema)
            .field("query", &self.query)
            .field("mutation", &self.mutation)
            .field("debug", &self.debug)
            .field("pool", &self.pool)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub host: String,
    pub port: u16,
}

/// Per-endpoint pool sizing.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_open: NonZeroU32,
    pub min_idle: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub health_check_interval: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub max_version: NonZeroU64,
    pub invalidation_timeout: Duration,
    pub service_name: String,
    pub store: CacheStoreKind,
}

/// Backing store of the distributed cache level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStoreKind {
    Redis,
    Memory,
    None,
}

impl CacheStoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStoreKind::Redis => "redis",
            CacheStoreKind::Memory => "memory",
            CacheStoreKind::None => "none",
        }
    }
}

impl FromStr for CacheStoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheStoreKind::Redis),
            "memory" => Ok(CacheStoreKind::Memory),
            "none" => Ok(CacheStoreKind::None),
            other => Err(format!("unknown cache store `{other}` (expected redis|memory|none)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Cache(args)) => raw.apply_redis_override(&args.redis),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(host) = overrides.database_query_host.as_ref() {
            self.database.query_host = Some(host.clone());
        }
        if let Some(host) = overrides.database_mutation_host.as_ref() {
            self.database.mutation_host = Some(host.clone());
        }
        if let Some(max) = overrides.database_max_open {
            self.database.max_open = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.default_ttl_secs = Some(ttl);
        }
        if let Some(store) = overrides.cache_store.as_ref() {
            self.cache.store = Some(store.clone());
        }

        self.apply_redis_override(&overrides.redis);
    }

    fn apply_redis_override(&mut self, overrides: &RedisOverride) {
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            redis: build_redis_settings(redis)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = positive_secs(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let query = build_endpoint(
        database.query_host,
        database.query_port,
        "database.query_host",
        "database.query_port",
    )?;
    let mutation = build_endpoint(
        database.mutation_host,
        database.mutation_port,
        "database.mutation_host",
        "database.mutation_port",
    )?;

    let max_open = non_zero_u32(
        database.max_open.unwrap_or(DEFAULT_DB_MAX_OPEN).into(),
        "database.max_open",
    )?;
    let min_idle = database.min_idle.unwrap_or(DEFAULT_DB_MIN_IDLE);
    if min_idle > max_open.get() {
        return Err(LoadError::invalid(
            "database.min_idle",
            format!("must not exceed database.max_open ({max_open})"),
        ));
    }

    let pool = PoolSettings {
        max_open,
        min_idle,
        max_lifetime: positive_secs(
            database.max_lifetime_seconds,
            DEFAULT_DB_MAX_LIFETIME_SECS,
            "database.max_lifetime_seconds",
        )?,
        idle_timeout: positive_secs(
            database.idle_timeout_seconds,
            DEFAULT_DB_IDLE_TIMEOUT_SECS,
            "database.idle_timeout_seconds",
        )?,
        acquire_timeout: positive_secs(
            database.acquire_timeout_seconds,
            DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
            "database.acquire_timeout_seconds",
        )?,
    };

    Ok(DatabaseSettings {
        user: non_empty_or(database.user, DEFAULT_DB_USER),
        password: database.password.unwrap_or_default(),
        name: non_empty_or(database.name, DEFAULT_DB_NAME),
        sslmode: non_empty_or(database.sslmode, DEFAULT_DB_SSLMODE),
        schema: non_empty_or(database.schema, DEFAULT_DB_SCHEMA),
        query,
        mutation,
        debug: database.debug.unwrap_or(false),
        pool,
    })
}

fn build_endpoint(
    host: Option<String>,
    port: Option<u16>,
    host_key: &'static str,
    port_key: &'static str,
) -> Result<EndpointSettings, LoadError> {
    let host = non_empty_or(host, DEFAULT_DB_HOST);
    if host.contains(char::is_whitespace) {
        return Err(LoadError::invalid(host_key, "host must not contain whitespace"));
    }
    let port = port.unwrap_or(DEFAULT_DB_PORT);
    if port == 0 {
        return Err(LoadError::invalid(port_key, "port must be greater than zero"));
    }
    Ok(EndpointSettings { host, port })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = non_empty_or(redis.url, DEFAULT_REDIS_URL);
    if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
        return Err(LoadError::invalid(
            "redis.url",
            "expected a redis:// or rediss:// URL",
        ));
    }

    let health_check_interval = positive_secs(
        redis.health_check_interval_seconds,
        DEFAULT_REDIS_HEALTH_INTERVAL_SECS,
        "redis.health_check_interval_seconds",
    )?;
    let max_backoff = positive_secs(
        redis.max_backoff_seconds,
        DEFAULT_REDIS_MAX_BACKOFF_SECS,
        "redis.max_backoff_seconds",
    )?;
    if max_backoff < health_check_interval {
        return Err(LoadError::invalid(
            "redis.max_backoff_seconds",
            "must be at least redis.health_check_interval_seconds",
        ));
    }

    Ok(RedisSettings {
        url,
        connect_timeout: positive_secs(
            redis.connect_timeout_seconds,
            DEFAULT_REDIS_CONNECT_TIMEOUT_SECS,
            "redis.connect_timeout_seconds",
        )?,
        command_timeout: positive_secs(
            redis.command_timeout_seconds,
            DEFAULT_REDIS_COMMAND_TIMEOUT_SECS,
            "redis.command_timeout_seconds",
        )?,
        health_check_interval,
        max_backoff,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    // A zero TTL means "use the default", matching per-call semantics.
    let ttl_secs = match cache.default_ttl_secs {
        Some(0) | None => DEFAULT_CACHE_TTL_SECS,
        Some(secs) => secs,
    };

    let max_version = NonZeroU64::new(cache.max_version.unwrap_or(DEFAULT_CACHE_MAX_VERSION))
        .ok_or_else(|| LoadError::invalid("cache.max_version", "must be greater than zero"))?;

    let store = match cache.store {
        Some(value) => value
            .parse()
            .map_err(|reason: String| LoadError::invalid("cache.store", reason))?,
        None => CacheStoreKind::Redis,
    };

    let service_name = non_empty_or(cache.service_name, DEFAULT_CACHE_SERVICE_NAME);
    if service_name.contains(':') {
        return Err(LoadError::invalid(
            "cache.service_name",
            "must not contain `:`",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl: Duration::from_secs(ttl_secs),
        max_version,
        invalidation_timeout: positive_secs(
            cache.invalidation_timeout_secs,
            DEFAULT_CACHE_INVALIDATION_TIMEOUT_SECS,
            "cache.invalidation_timeout_secs",
        )?,
        service_name,
        store,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
    sslmode: Option<String>,
    schema: Option<String>,
    query_host: Option<String>,
    query_port: Option<u16>,
    mutation_host: Option<String>,
    mutation_port: Option<u16>,
    debug: Option<bool>,
    max_open: Option<u32>,
    min_idle: Option<u32>,
    max_lifetime_seconds: Option<u64>,
    idle_timeout_seconds: Option<u64>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    connect_timeout_seconds: Option<u64>,
    command_timeout_seconds: Option<u64>,
    health_check_interval_seconds: Option<u64>,
    max_backoff_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_secs: Option<u64>,
    max_version: Option<u64>,
    invalidation_timeout_secs: Option<u64>,
    service_name: Option<String>,
    store: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn positive_secs(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
