use bridge::TestGenerator;

/// Uniformly random test vectors.
///
/// Every test gets `inputs_per_test` vectors, or a random count in
/// `1..=max_inputs_per_test` when `inputs_per_test` is zero.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    rng: fastrand::Rng,
    inputs_per_test: u64,
    max_inputs_per_test: u64,
}

impl RandomGenerator {
    /// A `None` seed draws one from the system.
    pub fn new(seed: Option<u64>, inputs_per_test: u64, max_inputs_per_test: u64) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            rng,
            inputs_per_test,
            max_inputs_per_test: max_inputs_per_test.max(1),
        }
    }
}

impl TestGenerator for RandomGenerator {
    fn inputs_left(&mut self) -> u64 {
        if self.inputs_per_test > 0 {
            self.inputs_per_test
        } else {
            self.rng.u64(1..=self.max_inputs_per_test)
        }
    }

    fn fill_input(&mut self, input: &mut [u8]) {
        self.rng.fill(input);
    }
}
