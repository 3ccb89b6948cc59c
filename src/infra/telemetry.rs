use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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
            "kubinet_markdown_cache_hit_total",
            Unit::Count,
            "Markdown renders served from the rendered-HTML cache."
        );
        describe_counter!(
            "kubinet_markdown_cache_miss_total",
            Unit::Count,
            "Markdown renders that invoked the parser."
        );
        describe_counter!(
            "kubinet_response_cache_hit_total",
            Unit::Count,
            "Public GET responses served from the response cache."
        );
        describe_counter!(
            "kubinet_response_cache_miss_total",
            Unit::Count,
            "Public GET responses rendered by a handler."
        );
        describe_counter!(
            "kubinet_response_cache_evict_total",
            Unit::Count,
            "Response cache evictions due to capacity."
        );
        describe_counter!(
            "kubinet_revalidated_paths_total",
            Unit::Count,
            "Paths evicted through the revalidation endpoint."
        );
        describe_counter!(
            "kubinet_gate_lockout_total",
            Unit::Count,
            "Authoring gate lockouts started."
        );
        describe_histogram!(
            "kubinet_http_request_ms",
            Unit::Milliseconds,
            "Request latency in milliseconds."
        );
    });
}
