use anyhow::Context;
use bridge::HandshakeChannel;
use common::{TelemetryGuard, wait_for_path};
use fuzzer::{
    CoverageTracker, FuzzingDriver, HarnessConfig, InstrumentationConfig, RandomGenerator,
    logging::setup_logging,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let mut config = HarnessConfig::from_env()?;

    // The OTLP exporters are async; the runtime has to outlive the guard.
    let (_telemetry, _runtime) = if let Some(endpoint) = config.otel_endpoint.as_ref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let guard =
            rt.block_on(async { TelemetryGuard::init("fuzzer", endpoint, config.environment) })?;
        (Some(guard), Some(rt))
    } else {
        setup_logging(&config);
        (None, None)
    };

    let instrumentation = match config.instrumentation_config.as_ref() {
        Some(path) => {
            let instrumentation = InstrumentationConfig::from_file(path)?;
            let size = instrumentation.test_size(config.word_size)?;
            instrumentation.validate(size)?;
            config.apply_test_size(size);
            tracing::info!(
                module = %instrumentation.general.module,
                signals = instrumentation.coverage_signal_count(),
                input_size = size.input,
                coverage_size = size.coverage,
                "Instrumentation config loaded"
            );
            Some(instrumentation)
        }
        None => None,
    };
    config.validate()?;

    tracing::info!("Fuzzer starting with config: {:?}", config);

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    wait_for_path(config.inbound_fifo(), config.poll_interval_ms, "DUT transmit FIFO");
    wait_for_path(config.outbound_fifo(), config.poll_interval_ms, "DUT receive FIFO");

    let channel = HandshakeChannel::harness(&config.handshake_dir)
        .context("Failed to open handshake FIFOs")?;

    let generator = RandomGenerator::new(
        config.seed,
        config.inputs_per_test,
        config.max_inputs_per_test,
    );
    let mut tracker = CoverageTracker::new(config.coverage_size, config.coverage_inverted);
    if let Some(instrumentation) = instrumentation.as_ref() {
        tracker = tracker.with_instrumentation(instrumentation);
    }

    let mut driver = FuzzingDriver::new(&config, channel, generator, tracker)?;
    let summary = driver.run(config.iterations, &shutdown)?;
    let coverage = driver.finish()?.summary();

    tracing::info!(
        iterations = summary.iterations,
        tests = summary.tests,
        vectors = summary.vectors,
        interrupted = summary.interrupted,
        cycles = coverage.cycles,
        novel_records = coverage.novel_records,
        covered_bits = coverage.covered_bits,
        covered_signals = ?coverage.covered_signals,
        "Fuzzer stopped"
    );
    Ok(())
}
