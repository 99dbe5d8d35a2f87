//! Seeded RNG wrapper for reproducible behavior.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Thread-safe seeded random number generator.
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// RNG with optional seed; `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Whether an operation with failure probability `rate` should fail.
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().gen::<f64>() < rate
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}
