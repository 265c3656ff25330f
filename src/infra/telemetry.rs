use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metrics::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_INVALIDATION,
    METRIC_INVALIDATION_FAILED, METRIC_INVALIDATION_MS, METRIC_VERSION_WRAP,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Query cache hits, labelled by level."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Reads that missed every cache level."
        );
        describe_counter!(
            METRIC_CACHE_ERROR,
            Unit::Count,
            "Cache level failures that fell back to the data source."
        );
        describe_counter!(
            METRIC_INVALIDATION,
            Unit::Count,
            "Tenant epoch bumps after committed mutations."
        );
        describe_counter!(
            METRIC_INVALIDATION_FAILED,
            Unit::Count,
            "Tenant epoch bumps that failed or timed out."
        );
        describe_counter!(
            METRIC_VERSION_WRAP,
            Unit::Count,
            "Tenant epochs reset to zero at the version bound."
        );
        describe_histogram!(
            METRIC_INVALIDATION_MS,
            Unit::Milliseconds,
            "Background invalidation latency in milliseconds."
        );
    });
}
