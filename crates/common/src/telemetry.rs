use crate::Environment;
use crate::logging::{env_filter, fmt_layer};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the OTLP tracer and meter providers for the lifetime of a run.
///
/// Dropping the guard flushes pending spans and metrics. The OTLP exporters
/// are async, so the guard must be created and dropped while a Tokio runtime
/// is alive.
///
/// ```ignore
/// let rt = tokio::runtime::Runtime::new()?;
/// let _telemetry = rt.block_on(async {
///     TelemetryGuard::init("fuzzer", "http://localhost:4317", Environment::Production)
/// })?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Set up OTLP span and metric export and install the tracing subscriber.
    ///
    /// Events are still printed the way [`crate::setup_logging`] prints them.
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        let resource = resource(service_name, environment);

        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_sampler(Sampler::AlwaysOn)
            .with_batch_exporter(
                SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint)
                    .build()?,
            )
            .build();
        global::set_tracer_provider(tracer_provider.clone());

        let reader = PeriodicReader::builder(
            MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?,
        )
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();
        global::set_meter_provider(meter_provider.clone());

        tracing_subscriber::registry()
            .with(env_filter())
            .with(
                tracing_opentelemetry::layer()
                    .with_tracer(global::tracer(service_name.to_string())),
            )
            .with(fmt_layer(environment))
            .init();

        tracing::info!(endpoint, "OTLP export enabled");

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

fn resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {:?}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {:?}", e);
        }
    }
}

/// Enter an info-level span, with optional fields, until the guard drops.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
    ($name:literal, $($field:tt)+) => {
        tracing::info_span!($name, $($field)+).entered()
    };
}

/// Debug-level counterpart of [`span!`].
#[macro_export]
macro_rules! span_debug {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
    ($name:literal, $($field:tt)+) => {
        tracing::debug_span!($name, $($field)+).entered()
    };
}
