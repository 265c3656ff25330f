use std::time::Instant;

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{Instrument, error, info_span, warn};
use uuid::Uuid;

use crate::application::error::{AppError, ErrorReport};
use crate::domain::error::DomainError;
use crate::domain::tenant::TenantId;

/// Header carrying the acting tenant, set by the federation gateway.
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tenant resolved at the boundary; `None` for system-level callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantContext(pub Option<TenantId>);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the tenant header; a malformed id is rejected, a missing one is
/// treated as a system-level request.
pub async fn tenant_context(mut request: Request<Body>, next: Next) -> Response {
    let tenant = match request.headers().get(TENANT_HEADER) {
        None => None,
        Some(value) => {
            let parsed = value
                .to_str()
                .map_err(|_| DomainError::validation("tenant header is not valid ASCII"))
                .and_then(str::parse::<TenantId>);
            match parsed {
                Ok(tenant) => Some(tenant),
                Err(err) => return AppError::from(err).into_response(),
            }
        }
    };

    request.extensions_mut().insert(TenantContext(tenant));
    let mut response = next.run(request).await;
    response.extensions_mut().insert(TenantContext(tenant));
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();

    let tenant = response
        .extensions()
        .get::<TenantContext>()
        .and_then(|ctx| ctx.0)
        .map(|id| id.to_string())
        .unwrap_or_default();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target: "ticketry::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                tenant = tenant,
                "request failed",
            );
        } else {
            warn!(
                target: "ticketry::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                tenant = tenant,
                "client request error",
            );
        }
    }

    response
}
