use bridge::{SegmentPool, TestGenerator, TestSession, paths::DEFAULT_TEST_BUFFER_SIZE};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

struct Fill(u8);

impl TestGenerator for Fill {
    fn inputs_left(&mut self) -> u64 {
        64
    }

    fn fill_input(&mut self, input: &mut [u8]) {
        input.fill(self.0);
    }
}

/// Benchmark encoding request frames into a pooled segment
fn benchmark_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");
    let mut pool = SegmentPool::new();

    // (tests per frame, input size) pairs that fit the default segment
    let shapes = [(1u16, 16usize, "1x16B"), (16, 40, "16x40B"), (128, 64, "128x64B")];

    for (tests, input_size, label) in shapes {
        let frame_bytes = 16 + tests as u64 * (8 + 64 * input_size as u64);
        group.throughput(Throughput::Bytes(frame_bytes));

        group.bench_with_input(BenchmarkId::new("encode", label), &label, |b, _| {
            b.iter(|| {
                let mut session =
                    TestSession::new(&mut pool, DEFAULT_TEST_BUFFER_SIZE, 4096).unwrap();
                session
                    .encode(Fill(0xA5), black_box(tests), 0, black_box(input_size))
                    .unwrap();
            });
        });
    }

    group.finish();
    pool.release_all().unwrap();
}

criterion_group!(benches, benchmark_request_encode);
criterion_main!(benches);
