/*!
Bi-phase pulse-width classification.

A bi-phase cell is either one full-width pulse (logical 0) or two half-width
pulses (logical 1). The bands below decide which width a measured edge-to-edge
distance is. Bounds are exclusive.
*/

use crate::settings::BandPolicy;
use crate::waveform::EdgeCursor;

/// Width class of a single pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseWidth {
    /// About half a bit period
    Half,
    /// About one bit period
    Full,
    Invalid,
}

/// A classified bi-phase cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Zero,
    One,
    Invalid,
}

/// Half and full pulse bands plus the idle gap that separates packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseBands {
    half_low: u64,
    half_high: u64,
    full_low: u64,
    full_high: u64,
    idle_gap: u64,
}

impl PulseBands {
    /// Sample counts tuned for 2 kbps Qi captured at 100 MHz
    pub const FIXED: PulseBands = PulseBands {
        half_low: 23_000,
        half_high: 27_000,
        full_low: 47_000,
        full_high: 53_000,
        idle_gap: 80_000,
    };

    /// Bands for an arbitrary timing; equal to [`PulseBands::FIXED`] at 50 000 samples per bit.
    ///
    /// Each band keeps at least one sample of margin past the whole-sample
    /// widths a clock can produce, so short bit periods still classify.
    pub fn scaled(samples_per_bit: f64) -> Self {
        let at = |fraction: f64| (samples_per_bit * fraction).round() as u64;
        let half = samples_per_bit / 2.0;
        let full_high = at(1.06).max(samples_per_bit.ceil() as u64 + 1);
        PulseBands {
            half_low: at(0.46).min((half.floor() as u64).saturating_sub(1)),
            half_high: at(0.54).max(half.ceil() as u64 + 1),
            full_low: at(0.94).min((samples_per_bit.floor() as u64).saturating_sub(1)),
            full_high,
            idle_gap: at(1.6).max(full_high),
        }
    }

    pub fn for_policy(policy: BandPolicy, samples_per_bit: f64) -> Self {
        match policy {
            BandPolicy::Fixed => Self::FIXED,
            BandPolicy::Scaled => Self::scaled(samples_per_bit),
        }
    }

    /// Runs longer than this separate packets
    pub fn idle_gap(&self) -> u64 {
        self.idle_gap
    }

    pub fn classify(&self, width: u64) -> PulseWidth {
        if width > self.half_low && width < self.half_high {
            PulseWidth::Half
        } else if width > self.full_low && width < self.full_high {
            PulseWidth::Full
        } else {
            PulseWidth::Invalid
        }
    }

    /// Read one cell starting at the cursor's current edge.
    ///
    /// `on_edge` sees every edge crossed. Returns `None` when the capture ends.
    pub fn read_cell<C, F>(&self, cursor: &mut C, mut on_edge: F) -> Option<Cell>
    where
        C: EdgeCursor,
        F: FnMut(u64),
    {
        let begin = cursor.sample_number();
        let first = cursor.advance_to_next_edge()?;
        on_edge(first);
        match self.classify(first - begin) {
            PulseWidth::Full => Some(Cell::Zero),
            PulseWidth::Invalid => Some(Cell::Invalid),
            PulseWidth::Half => {
                let second = cursor.advance_to_next_edge()?;
                on_edge(second);
                match self.classify(second - first) {
                    PulseWidth::Half => Some(Cell::One),
                    _ => Some(Cell::Invalid),
                }
            }
        }
    }
}
