//! Seeded Bernoulli downsampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{ReadScanError, Result};

/// Keeps each record independently with a fixed probability.
///
/// A fraction of `0.0` disables sampling entirely: every record is kept and
/// the generator is never advanced, so runs with and without an explicit zero
/// fraction are byte-identical. With the same seed and fraction, the sequence
/// of keep decisions is deterministic.
#[derive(Debug, Clone)]
pub struct Downsampler {
    fraction: f64,
    rng: StdRng,
}

impl Downsampler {
    /// Creates a downsampler that keeps records with probability `fraction`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::InvalidConfiguration`] unless `fraction` is
    /// within `[0.0, 1.0]`.
    pub fn new(fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ReadScanError::InvalidConfiguration {
                reason: format!("downsample fraction must be in [0.0, 1.0], got {fraction}"),
            });
        }
        Ok(Self { fraction, rng: StdRng::seed_from_u64(seed) })
    }

    /// Decides whether to keep the next record.
    pub fn keep(&mut self) -> bool {
        if self.fraction == 0.0 {
            return true;
        }
        self.rng.random::<f64>() < self.fraction
    }

    /// The configured keep fraction.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}
