/*!
Waveform synthesis.

[`WaveformEncoder`] drives a [`WaveformBuilder`] with the same settings the
decoder uses, so anything it writes decodes back to the transfers it was
given. [`simulate`] uses it to fill a capture with a recognisable counting
pattern.
*/

use tracing::debug;

use crate::bits::{BitExtractor, BitLevel};
use crate::clock::SampleClock;
use crate::error::{DecodeError, Result};
use crate::settings::{LineCoding, Mode, Settings, ShiftOrder};
use crate::waveform::{Waveform, WaveformBuilder};

/// Idle time at the start of every capture, in bit periods
pub const LEAD_IN_BITS: u32 = 10;

/// One value to send, and whether it is a multiprocessor address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    pub value: u64,
    pub address: bool,
}

impl Transfer {
    pub fn data(value: u64) -> Self {
        Self { value, address: false }
    }

    pub fn address(value: u64) -> Self {
        Self { value, address: true }
    }
}

impl From<u64> for Transfer {
    fn from(value: u64) -> Self {
        Self::data(value)
    }
}

/// Writes frames onto a fresh channel
#[derive(Debug)]
pub struct WaveformEncoder<'a> {
    settings: &'a Settings,
    clock: SampleClock,
    builder: WaveformBuilder,
}

impl<'a> WaveformEncoder<'a> {
    /// Start a capture with the line idle for [`LEAD_IN_BITS`]
    pub fn new(settings: &'a Settings, sample_rate: u32) -> Result<Self> {
        settings.validate()?;
        if sample_rate == 0 {
            return Err(DecodeError::config("sample rate must be non-zero"));
        }
        let initial = match settings.line_coding {
            LineCoding::Nrz => BitLevel::from(!settings.inverted),
            LineCoding::Biphase => BitLevel::from(settings.inverted),
        };
        let mut encoder = Self {
            settings,
            clock: SampleClock::new(settings.bit_rate, sample_rate),
            builder: WaveformBuilder::new(sample_rate, initial),
        };
        encoder.idle(LEAD_IN_BITS);
        Ok(encoder)
    }

    pub fn current_sample(&self) -> u64 {
        self.builder.current_sample()
    }

    /// Hold the line for `bits` bit periods
    pub fn idle(&mut self, bits: u32) {
        self.advance_half_periods(2.0 * f64::from(bits));
    }

    /// One frame. For bi-phase this is a packet of one transfer.
    pub fn write_transfer(&mut self, transfer: Transfer) {
        self.write_packet(&[transfer]);
    }

    /// Frames back to back. Bi-phase packets get a preamble and a closing edge.
    pub fn write_packet(&mut self, transfers: &[Transfer]) {
        match self.settings.line_coding {
            LineCoding::Nrz => {
                for &transfer in transfers {
                    self.write_nrz_frame(transfer);
                }
            }
            LineCoding::Biphase => self.write_biphase_packet(transfers),
        }
    }

    pub fn finish(self) -> Waveform {
        self.builder.finish()
    }

    fn advance_half_periods(&mut self, n: f64) {
        let samples = self.clock.advance_by_half_periods(n);
        self.builder.advance(samples);
    }

    /// Payload bits in wire order with inversion applied: data, marker, parity
    fn wire_bits(&self, transfer: Transfer) -> Vec<bool> {
        let settings = self.settings;
        let value = transfer.value & settings.value_mask();
        let data = BitExtractor::new(value, settings.shift_order, settings.bits_per_transfer).map(BitLevel::is_high);

        let mut bits = Vec::with_capacity(settings.frame_bits() as usize + 1);
        match (settings.mode.marker_for(transfer.address), settings.shift_order) {
            (Some(marker), ShiftOrder::MsbFirst) => {
                bits.push(marker);
                bits.extend(data);
            }
            (Some(marker), ShiftOrder::LsbFirst) => {
                bits.extend(data);
                bits.push(marker);
            }
            (None, _) => bits.extend(data),
        }
        bits.extend(settings.parity.bit_for(value));

        bits.into_iter().map(|bit| bit != settings.inverted).collect()
    }

    fn write_nrz_frame(&mut self, transfer: Transfer) {
        let idle = BitLevel::from(!self.settings.inverted);

        self.builder.transition_if_needed(idle.toggled());
        self.advance_half_periods(2.0);

        for bit in self.wire_bits(transfer) {
            self.builder.transition_if_needed(BitLevel::from(bit));
            self.advance_half_periods(2.0);
        }

        self.builder.transition_if_needed(idle);
        self.advance_half_periods(2.0 * self.settings.stop_bits.bit_periods());
    }

    fn write_biphase_packet(&mut self, transfers: &[Transfer]) {
        for _ in 0..self.settings.preamble_bits {
            self.write_cell(true);
        }
        for &transfer in transfers {
            self.write_cell(false);
            for bit in self.wire_bits(transfer) {
                self.write_cell(bit);
            }
            for _ in 0..self.settings.stop_bits.cells() {
                self.write_cell(true);
            }
        }
        // ends the last stop cell so its width can be measured
        self.builder.transition();
    }

    fn write_cell(&mut self, one: bool) {
        self.builder.transition();
        if one {
            self.advance_half_periods(1.0);
            self.builder.transition();
            self.advance_half_periods(1.0);
        } else {
            self.advance_half_periods(2.0);
        }
    }
}

/// Fill at least `samples` samples with a counting pattern.
///
/// Normal mode sends one value per frame, or per four-frame packet for
/// bi-phase. Multiprocessor modes alternate between addresses 1 and 2, each
/// followed by four data frames.
pub fn simulate(settings: &Settings, sample_rate: u32, samples: u64) -> Result<Waveform> {
    let mut encoder = WaveformEncoder::new(settings, sample_rate)?;
    let mask = settings.value_mask();
    let mut counter: u64 = 0;
    let mut address: u64 = 1;
    let mut next_value = || {
        let value = counter & mask;
        counter = counter.wrapping_add(1);
        Transfer::data(value)
    };

    while encoder.current_sample() < samples {
        match (settings.mode, settings.line_coding) {
            (Mode::Normal, LineCoding::Nrz) => {
                encoder.write_transfer(next_value());
                encoder.idle(10);
            }
            (Mode::Normal, LineCoding::Biphase) => {
                let packet: Vec<Transfer> = (0..4).map(|_| next_value()).collect();
                encoder.write_packet(&packet);
                encoder.idle(10);
            }
            (_, LineCoding::Nrz) => {
                encoder.write_transfer(Transfer::address(address & mask));
                for _ in 0..4 {
                    encoder.idle(2);
                    encoder.write_transfer(next_value());
                }
                encoder.idle(20);
                address = if address == 1 { 2 } else { 1 };
            }
            (_, LineCoding::Biphase) => {
                let mut packet = vec![Transfer::address(address & mask)];
                packet.extend((0..4).map(|_| next_value()));
                encoder.write_packet(&packet);
                encoder.idle(20);
                address = if address == 1 { 2 } else { 1 };
            }
        }
    }

    let waveform = encoder.finish();
    debug!(
        "Simulated {} samples with {} edges at {} Hz",
        waveform.len(),
        waveform.edges().len(),
        sample_rate
    );
    Ok(waveform)
}
