#![allow(dead_code)]

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Routes library spans to the test output; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

pub fn slotwise(a: &[i64], b: &[i64], op: impl Fn(i64, i64) -> i64) -> Vec<i64> {
    a.iter().zip(b).map(|(&x, &y)| op(x, y)).collect()
}
