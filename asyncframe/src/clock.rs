/*!
Sample clock.

Converts bit-time into whole sample counts. Every advance carries its
fractional remainder into the next one, so a long run of advances lands on
the same sample as computing the total directly.
*/

/// Bit-period to sample-count converter with remainder carry
#[derive(Debug, Clone)]
pub struct SampleClock {
    sample_rate: f64,
    samples_per_bit: f64,
    remainder: f64,
}

impl SampleClock {
    /// Clock for `bit_rate` bits/s sampled at `sample_rate` Hz. Both must be non-zero.
    pub fn new(bit_rate: u32, sample_rate: u32) -> Self {
        let sample_rate = f64::from(sample_rate);
        Self {
            sample_rate,
            samples_per_bit: sample_rate / f64::from(bit_rate),
            remainder: 0.0,
        }
    }

    /// Samples in one bit period (not rounded)
    pub fn samples_per_bit(&self) -> f64 {
        self.samples_per_bit
    }

    /// Fraction of a sample owed to the next advance
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    /// Whole samples covering `seconds`
    pub fn advance_by_time(&mut self, seconds: f64) -> u64 {
        self.advance_exact(seconds * self.sample_rate)
    }

    /// Whole samples covering `n` half bit periods. `n` may be fractional.
    pub fn advance_by_half_periods(&mut self, n: f64) -> u64 {
        self.advance_exact(n * self.samples_per_bit / 2.0)
    }

    fn advance_exact(&mut self, exact: f64) -> u64 {
        let wanted = exact + self.remainder;
        let whole = wanted.round().max(0.0);
        self.remainder = wanted - whole;
        whole as u64
    }
}
