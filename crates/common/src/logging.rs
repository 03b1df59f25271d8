use crate::config::Environment;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber for a harness process.
///
/// Use [`crate::TelemetryGuard::init`] instead when spans should also be
/// exported over OTLP; it installs its own subscriber.
pub fn setup_logging(environment: Environment) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(environment))
        .init();
}

/// `RUST_LOG`, or `info` when unset or unparseable.
pub(crate) fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// One JSON object per event in production, pretty coloured output otherwise.
pub(crate) fn fmt_layer<S>(environment: Environment) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .with_current_span(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .with_target(false)
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}
