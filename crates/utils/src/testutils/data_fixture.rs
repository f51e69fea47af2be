use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::data::Data;

/// Deterministic pseudo-random data. Two fixtures with the same seed produce the same bytes,
/// and `get(n)` is a prefix of `get(m)` for `n <= m`.
#[derive(Debug, Clone, Copy)]
pub struct DataFixture {
    seed: u64,
}

impl DataFixture {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn get(&self, size: usize) -> Data {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut res = vec![0; size];
        rng.fill_bytes(&mut res);
        res.into()
    }
}
