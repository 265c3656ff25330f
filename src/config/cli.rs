use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the ticketry binary.
#[derive(Debug, Parser)]
#[command(name = "ticketry", version, about = "Ticketry helpdesk core service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TICKETRY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Inspect or bump tenant cache versions.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RedisOverride {
    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub redis: RedisOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the read endpoint host.
    #[arg(long = "database-query-host", value_name = "HOST")]
    pub database_query_host: Option<String>,

    /// Override the write endpoint host.
    #[arg(long = "database-mutation-host", value_name = "HOST")]
    pub database_mutation_host: Option<String>,

    /// Override the per-endpoint pool size.
    #[arg(long = "database-max-open", value_name = "COUNT")]
    pub database_max_open: Option<u32>,

    /// Toggle the query cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default cache entry TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Select the cache store (redis|memory|none).
    #[arg(long = "cache-store", value_name = "KIND")]
    pub cache_store: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub redis: RedisOverride,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Print the current cache version of a tenant.
    Version(TenantArg),
    /// Invalidate every cached entry of a tenant.
    Bump(TenantArg),
}

#[derive(Debug, Args, Clone)]
pub struct TenantArg {
    /// Tenant UUID, or `global`.
    #[arg(long = "tenant", value_name = "ID")]
    pub tenant: String,
}
