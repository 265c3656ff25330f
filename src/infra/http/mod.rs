//! HTTP surface: health check, tenant boundary and cache inspection.

mod middleware;

pub use middleware::{RequestContext, TENANT_HEADER, TenantContext};

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::warn;

use crate::application::dispatch::OperationDispatcher;
use crate::application::error::ErrorReport;
use crate::cache::{KvStore, OperationContext};
use crate::domain::operation::OperationKind;
use crate::infra::db::DatabaseLifecycle;

#[derive(Clone)]
pub struct HttpState {
    pub database: Arc<DatabaseLifecycle>,
    pub dispatcher: OperationDispatcher,
    /// Store behind the distributed level, if one is configured.
    pub cache_store: Option<Arc<dyn KvStore>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cache/version", get(cache_version))
        .layer(from_fn(middleware::tenant_context))
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthBody {
    database: &'static str,
    cache: &'static str,
}

async fn healthz(State(state): State<HttpState>) -> Response {
    let cache = match state.cache_store.as_ref() {
        None => "disabled",
        Some(store) => match store.ping().await {
            Ok(()) => "ok",
            Err(_) => "degraded",
        },
    };

    let database = match state.database.client().await {
        Ok(client) => client.health_check().await,
        Err(err) => Err(err),
    };

    match database {
        Ok(()) => Json(HealthBody {
            database: "ok",
            cache,
        })
        .into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    database: "unavailable",
                    cache,
                }),
            )
                .into_response();
            ErrorReport::from_error("infra::http::healthz", StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionBody {
    scope: String,
    version: Option<u64>,
    /// Set when the store could not be read; reads fall back to the database.
    degraded: bool,
}

/// Current cache epoch of the calling tenant, through the same dispatch path
/// as a read operation.
async fn cache_version(
    State(state): State<HttpState>,
    Extension(tenant): Extension<TenantContext>,
) -> Json<VersionBody> {
    let dispatch = state.dispatcher.dispatch(
        OperationKind::Read,
        OperationContext::new(tenant.0).with_operation_name("cacheVersion"),
    );
    let scope = dispatch.ctx.scope();

    let (version, degraded) = match state.database.cache().versions() {
        None => (None, false),
        Some(versions) => match versions.current(&scope).await {
            Ok(version) => (Some(version), false),
            Err(err) => {
                warn!(scope = %scope, error = %err, "Cache version unavailable");
                (None, true)
            }
        },
    };

    Json(VersionBody {
        scope: scope.to_string(),
        version,
        degraded,
    })
}
