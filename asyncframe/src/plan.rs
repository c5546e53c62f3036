/*!
Per-configuration sample offsets.

All offsets are absolute sample distances from the leading edge of the start
bit. The plan is computed once per (settings, sample rate) pair and never
changes during a pass.
*/

use crate::clock::SampleClock;
use crate::settings::{Parity, Settings};

/// Where to sample each bit of a frame, relative to the start edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOffsetPlan {
    bit_offsets: Vec<u64>,
    parity_offset: Option<u64>,
    start_of_stop: u64,
    end_of_stop: u64,
    sample_rate: u32,
    bit_rate: u32,
}

impl SampleOffsetPlan {
    /// Build the plan. `settings` must already be validated.
    pub fn compute(settings: &Settings, sample_rate: u32) -> Self {
        let mut clock = SampleClock::new(settings.bit_rate, sample_rate);
        let half_bit = settings.bit_period() / 2.0;

        // centre of the start bit
        let mut position = clock.advance_by_half_periods(1.0).max(1);
        let mut next_centre = |clock: &mut SampleClock| {
            let to_boundary = clock.advance_by_half_periods(1.0);
            let to_centre = clock.advance_by_time(half_bit);
            position += (to_boundary + to_centre).max(1);
            position
        };

        let bit_offsets = (0..settings.frame_bits())
            .map(|_| next_centre(&mut clock))
            .collect();

        let parity_offset = match settings.parity {
            Parity::None => None,
            _ => Some(next_centre(&mut clock)),
        };

        let start_of_stop = next_centre(&mut clock);
        let extra_stop = 2.0 * (settings.stop_bits.bit_periods() - 1.0);
        let end_of_stop = start_of_stop + clock.advance_by_half_periods(extra_stop);

        Self {
            bit_offsets,
            parity_offset,
            start_of_stop,
            end_of_stop,
            sample_rate,
            bit_rate: settings.bit_rate,
        }
    }

    /// Centres of the data bits (and marker bit) in transmission order
    pub fn bit_offsets(&self) -> &[u64] {
        &self.bit_offsets
    }

    pub fn parity_offset(&self) -> Option<u64> {
        self.parity_offset
    }

    /// Centre of the first stop bit
    pub fn start_of_stop(&self) -> u64 {
        self.start_of_stop
    }

    /// Last sample that must still be inside the stop condition
    pub fn end_of_stop(&self) -> u64 {
        self.end_of_stop
    }

    /// Whether this plan was built for the given timing
    pub fn matches(&self, settings: &Settings, sample_rate: u32) -> bool {
        self.sample_rate == sample_rate
            && self.bit_rate == settings.bit_rate
            && self.bit_offsets.len() == settings.frame_bits() as usize
            && self.parity_offset.is_some() == (settings.parity != Parity::None)
    }
}
