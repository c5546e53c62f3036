/*!
Bit-rate estimation from the narrowest pulse of a finished pass.
*/

use tracing::{info, warn};

use crate::error::{DecodeError, Result};
use crate::settings::Settings;

/// Relative difference above which the configured bit rate is replaced
pub const RERUN_THRESHOLD: f64 = 0.1;

/// What the estimator concluded after a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutobaudDecision {
    pub estimated_bit_rate: u32,
    /// Relative difference to the configured bit rate
    pub relative_error: f64,
    pub rerun: bool,
}

/// Compares the shortest pulse of a pass with the configured bit rate
#[derive(Debug, Clone, Copy)]
pub struct AutobaudEstimator {
    sample_rate: u32,
}

impl AutobaudEstimator {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Bit rate implied by `minimum_pulse_width`.
    ///
    /// A pulse width of zero means no complete pulse was seen, which callers
    /// must rule out before asking.
    pub fn estimate(&self, settings: &Settings, minimum_pulse_width: u64) -> Result<u32> {
        if minimum_pulse_width == 0 {
            return Err(DecodeError::invariant("autobaud asked to estimate from a zero-width pulse"));
        }
        let bit_width = minimum_pulse_width * u64::from(settings.line_coding.pulses_per_bit());
        let estimated = (f64::from(self.sample_rate) / bit_width as f64) as u64;
        if estimated > u64::from(self.sample_rate) {
            return Err(DecodeError::invariant(format!(
                "estimated bit rate {} exceeds the sample rate {}",
                estimated, self.sample_rate
            )));
        }
        u32::try_from(estimated).map_err(|_| DecodeError::invariant("estimated bit rate out of range"))
    }

    /// Decide whether to rerun, and update `settings.bit_rate` if so
    pub fn evaluate(&self, settings: &mut Settings, minimum_pulse_width: u64) -> Result<AutobaudDecision> {
        let estimated = self.estimate(settings, minimum_pulse_width)?;
        let configured = settings.bit_rate;
        let relative_error = (f64::from(estimated) - f64::from(configured)).abs() / f64::from(configured);

        let mut decision = AutobaudDecision {
            estimated_bit_rate: estimated,
            relative_error,
            rerun: false,
        };

        if estimated == 0 || estimated > self.sample_rate / 4 {
            warn!(
                "Estimated bit rate {} bit/s is unusable at {} Hz; keeping {} bit/s",
                estimated, self.sample_rate, configured
            );
            return Ok(decision);
        }

        if relative_error > RERUN_THRESHOLD {
            info!(
                "Autobaud: {} bit/s configured, {} bit/s measured ({:.1}% off)",
                configured,
                estimated,
                relative_error * 100.0
            );
            settings.bit_rate = estimated;
            decision.rerun = true;
        }
        Ok(decision)
    }
}
