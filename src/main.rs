use std::{future::IntoFuture, process, sync::Arc};

use ticketry::{
    application::{dispatch::OperationDispatcher, error::AppError},
    cache::{BumpOutcome, CacheConfig, CacheStack, KeyBuilder, KvStore, MemoryStore, VersionStore},
    config::{self, CacheCommand, CacheStoreKind},
    domain::tenant::TenantScope,
    infra::{
        db::DatabaseLifecycle,
        error::InfraError,
        http::{self, HttpState},
        redis::RedisService,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Cache(args) => run_cache_command(settings, args.command).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let redis = match settings.cache.store {
        CacheStoreKind::Redis => Some(RedisService::start(&settings.redis).await?),
        CacheStoreKind::Memory | CacheStoreKind::None => None,
    };

    let store: Option<Arc<dyn KvStore>> = match (&redis, settings.cache.store) {
        (Some(service), _) => Some(service.store() as Arc<dyn KvStore>),
        (None, CacheStoreKind::Memory) => {
            Some(Arc::new(MemoryStore::new()) as Arc<dyn KvStore>)
        }
        _ => None,
    };
    info!(
        store = settings.cache.store.as_str(),
        enabled = settings.cache.enabled,
        "Cache stack configured"
    );

    let stack = CacheStack::new(CacheConfig::from(&settings.cache), store.clone());
    let database = Arc::new(DatabaseLifecycle::new(settings.database.clone(), stack));

    let result = match database.client().await {
        Ok(_) => {
            let state = HttpState {
                database: database.clone(),
                dispatcher: OperationDispatcher::new(database.cache().policy()),
                cache_store: store,
            };
            serve_http(&settings, state).await
        }
        Err(err) => Err(AppError::from(err)),
    };

    database.close().await;
    if let Some(hook) = database.cache().hook() {
        hook.drain().await;
    }
    if let Some(redis) = redis {
        redis.close().await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "HTTP listener bound");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            info!("HTTP server shutting down");
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out, aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c"),
        () = terminate => info!("Received SIGTERM"),
    }
}

async fn run_cache_command(
    settings: config::Settings,
    command: CacheCommand,
) -> Result<(), AppError> {
    let redis = RedisService::start(&settings.redis).await?;
    if !redis.is_available() {
        redis.close().await;
        return Err(AppError::from(InfraError::cache("redis is unreachable")));
    }

    let store: Arc<dyn KvStore> = redis.store();
    let versions = VersionStore::new(
        store,
        KeyBuilder::new(&settings.cache.service_name),
        settings.cache.max_version.get(),
    );

    let result = execute_cache_command(&versions, command).await;
    redis.close().await;
    result
}

async fn execute_cache_command(
    versions: &VersionStore,
    command: CacheCommand,
) -> Result<(), AppError> {
    match command {
        CacheCommand::Version(args) => {
            let scope: TenantScope = args.tenant.parse()?;
            let version = versions.current(&scope).await?;
            println!("{scope}\t{version}");
        }
        CacheCommand::Bump(args) => {
            let scope: TenantScope = args.tenant.parse()?;
            let outcome = versions
                .bump(&scope)
                .await
                .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;
            match outcome {
                BumpOutcome::Advanced(version) => {
                    info!(scope = %scope, version, "Tenant cache version advanced");
                }
                BumpOutcome::Wrapped { from } => {
                    info!(scope = %scope, from, "Tenant cache version wrapped to zero");
                }
            }
            println!("{scope}\t{}", outcome.version());
        }
    }
    Ok(())
}
