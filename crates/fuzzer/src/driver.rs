use crate::config::HarnessConfig;
use crate::coverage::CoverageConsumer;
use anyhow::{Context, Result};
use bridge::{HandshakeChannel, SegmentPool, TestGenerator, TestSession};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Totals for one call to [`FuzzingDriver::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub iterations: u64,
    pub tests: u64,
    pub vectors: u64,
    /// The shutdown flag ended the run before the requested iteration count.
    pub interrupted: bool,
}

struct Metrics {
    iterations: Counter<u64>,
    tests: Counter<u64>,
    exchange: Histogram<f64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0,
    ];
    Metrics {
        iterations: meter
            .u64_counter("fuzzer_iterations_total")
            .with_description("Completed request/coverage exchanges")
            .build(),
        tests: meter
            .u64_counter("fuzzer_tests_total")
            .with_description("Tests whose coverage was decoded")
            .build(),
        exchange: meter
            .f64_histogram("fuzzer_exchange_duration_seconds")
            .with_description("Time the DUT runner held the segments")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
    }
}

/// Sizes and identifiers every iteration is encoded with.
#[derive(Debug, Clone, Copy)]
struct FrameParams {
    tests_left: u16,
    buffer_id: u32,
    input_size: usize,
    coverage_size: usize,
    test_buffer_size: usize,
    coverage_buffer_size: usize,
}

/// Runs iterations against one DUT runner, one at a time.
///
/// The handshake channel and the segment pool live as long as the driver, so
/// the runner sees the same segment ids every iteration.
pub struct FuzzingDriver<G, C> {
    channel: HandshakeChannel,
    pool: SegmentPool,
    generator: G,
    consumer: C,
    params: FrameParams,
    metrics: Metrics,
}

impl<G: TestGenerator, C: CoverageConsumer> FuzzingDriver<G, C> {
    pub fn new(
        config: &HarnessConfig,
        channel: HandshakeChannel,
        generator: G,
        consumer: C,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            channel,
            pool: SegmentPool::new(),
            generator,
            consumer,
            params: FrameParams {
                tests_left: config.tests_left()?,
                buffer_id: config.buffer_id,
                input_size: config.input_size,
                coverage_size: config.coverage_size,
                test_buffer_size: config.test_buffer_size,
                coverage_buffer_size: config.coverage_buffer_size,
            },
            metrics: init_metrics("fuzzer"),
        })
    }

    /// Run up to `iterations` iterations.
    ///
    /// `shutdown` is checked between iterations only; an iteration already
    /// waiting on the runner finishes first. The first error ends the run.
    pub fn run(&mut self, iterations: u64, shutdown: &AtomicBool) -> Result<RunSummary> {
        tracing::info!(
            iterations,
            tests_per_iteration = self.params.tests_left,
            buffer_id = self.params.buffer_id,
            "Fuzzing run starting"
        );

        let mut summary = RunSummary::default();

        for iteration in 0..iterations {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!(iteration, "Shutdown requested, stopping before next iteration");
                summary.interrupted = true;
                break;
            }

            let vectors = self
                .iterate(iteration)
                .with_context(|| format!("Iteration {} failed", iteration))?;

            summary.iterations += 1;
            summary.tests += self.params.tests_left as u64;
            summary.vectors += vectors;

            if summary.iterations.is_multiple_of(100) {
                tracing::info!(
                    iterations = summary.iterations,
                    tests = summary.tests,
                    vectors = summary.vectors,
                    "Fuzzing progress"
                );
            }
        }

        tracing::info!(?summary, "Fuzzing run finished");
        Ok(summary)
    }

    fn iterate(&mut self, iteration: u64) -> Result<u64> {
        let _s = common::span!("iteration", iteration);
        let params = self.params;

        let mut session = TestSession::new(
            &mut self.pool,
            params.test_buffer_size,
            params.coverage_buffer_size,
        )?;

        let vectors = session.encode(
            &mut self.generator,
            params.tests_left,
            params.buffer_id,
            params.input_size,
        )?;

        let started = Instant::now();
        let ack = session.exchange(&mut self.channel)?;
        let elapsed = started.elapsed();
        self.metrics.exchange.record(elapsed.as_secs_f64(), &[]);
        tracing::debug!(
            ack = ?ack,
            elapsed_ms = elapsed.as_millis() as u64,
            "DUT runner handed segments back"
        );

        {
            let _d = common::span_debug!("decode", tests = params.tests_left);
            let records = session.decode(params.tests_left, params.coverage_size)?;
            for (test, record) in records.enumerate() {
                self.consumer.consume(iteration, test, record?)?;
            }
        }

        let attributes = [KeyValue::new("buffer_id", params.buffer_id as i64)];
        self.metrics.iterations.add(1, &attributes);
        self.metrics.tests.add(params.tests_left as u64, &attributes);

        Ok(vectors)
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Release both segments and close the FIFOs, handing back the consumer.
    pub fn finish(mut self) -> Result<C> {
        self.pool
            .release_all()
            .context("Failed to release shared memory segments")?;
        self.channel.close();
        Ok(self.consumer)
    }
}
