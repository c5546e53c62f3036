/*!
Decoder settings.

One [`Settings`] value selects everything a pass needs: bit timing, word
layout, parity, polarity, the multiprocessor addressing variant and the line
coding. Settings are validated once, before any pass runs, and are only
mutated between passes (by autobaud).
*/

use serde::{Deserialize, Serialize};

use crate::decoder::MAX_PREAMBLE_CELLS;
use crate::error::{DecodeError, Result};

/// Order in which the bits of a value go out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftOrder {
    LsbFirst,
    MsbFirst,
}

/// Parity bit convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    /// Parity bit that goes with `value` under this convention.
    /// `None` for [`Parity::None`].
    pub fn bit_for(self, value: u64) -> Option<bool> {
        let odd_ones = value.count_ones() % 2 == 1;
        match self {
            Parity::None => None,
            Parity::Even => Some(odd_ones),
            Parity::Odd => Some(!odd_ones),
        }
    }
}

/// Stop bit length. Serialized as the number of bit periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    /// Length in bit periods
    pub fn bit_periods(self) -> f64 {
        match self {
            StopBits::One => 1.0,
            StopBits::OneAndHalf => 1.5,
            StopBits::Two => 2.0,
        }
    }

    /// Number of whole bi-phase cells used for the stop condition
    pub fn cells(self) -> u32 {
        self.bit_periods().ceil() as u32
    }
}

impl TryFrom<f64> for StopBits {
    type Error = String;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(StopBits::One)
        } else if value == 1.5 {
            Ok(StopBits::OneAndHalf)
        } else if value == 2.0 {
            Ok(StopBits::Two)
        } else {
            Err(format!("unsupported stop bit count {value} (expected 1, 1.5 or 2)"))
        }
    }
}

impl From<StopBits> for f64 {
    fn from(value: StopBits) -> Self {
        value.bit_periods()
    }
}

/// Multiprocessor / multidrop addressing variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Normal,
    /// MP mode: an extra MSB of 0 marks an address frame
    MpMsbZeroMeansAddress,
    /// MDB mode: an extra MSB of 1 marks an address frame
    MpMsbOneMeansAddress,
}

impl Mode {
    /// Whether this mode adds a marker bit to every frame
    pub fn has_marker(self) -> bool {
        !matches!(self, Mode::Normal)
    }

    /// Marker bit to send for a frame, `None` in normal mode
    pub fn marker_for(self, is_address: bool) -> Option<bool> {
        match self {
            Mode::Normal => None,
            Mode::MpMsbZeroMeansAddress => Some(!is_address),
            Mode::MpMsbOneMeansAddress => Some(is_address),
        }
    }

    /// Whether a received marker bit marks an address frame
    pub fn is_address(self, marker: bool) -> bool {
        match self {
            Mode::Normal => false,
            Mode::MpMsbZeroMeansAddress => !marker,
            Mode::MpMsbOneMeansAddress => marker,
        }
    }
}

/// How bits are put on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCoding {
    /// Standard async serial: one level per bit, idle high
    Nrz,
    /// Qi bi-phase: a transition at every cell boundary, plus one mid-cell for a 1
    Biphase,
}

impl LineCoding {
    /// Number of narrowest pulses that fit in one bit period
    pub fn pulses_per_bit(self) -> u32 {
        match self {
            LineCoding::Nrz => 1,
            LineCoding::Biphase => 2,
        }
    }
}

/// Where bi-phase pulse-width bands come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandPolicy {
    /// Derived from the sample rate and bit rate
    Scaled,
    /// Absolute sample counts tuned for 100 MHz captures of 2 kbps Qi
    Fixed,
}

/// Complete decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bits per second
    pub bit_rate: u32,
    /// Data bits per transfer, 1 to 64
    pub bits_per_transfer: u32,
    pub shift_order: ShiftOrder,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// Line idles at the opposite level (RS-232 style)
    pub inverted: bool,
    /// Re-run once with an estimated bit rate when the configured one looks wrong
    pub use_autobaud: bool,
    pub mode: Mode,
    pub line_coding: LineCoding,
    pub pulse_bands: BandPolicy,
    /// One-cells sent before each bi-phase packet. Encoder only.
    pub preamble_bits: u32,
}

impl Settings {
    /// Standard async serial defaults: 9600 8N1, LSB first
    pub fn serial() -> Self {
        Self {
            bit_rate: 9600,
            bits_per_transfer: 8,
            shift_order: ShiftOrder::LsbFirst,
            stop_bits: StopBits::One,
            parity: Parity::None,
            inverted: false,
            use_autobaud: false,
            mode: Mode::Normal,
            line_coding: LineCoding::Nrz,
            pulse_bands: BandPolicy::Scaled,
            preamble_bits: 11,
        }
    }

    /// Qi defaults: 2 kbps bi-phase, 8 data bits, LSB first
    pub fn qi() -> Self {
        Self {
            bit_rate: 2000,
            line_coding: LineCoding::Biphase,
            ..Self::serial()
        }
    }

    /// Reject combinations no pass can run with
    pub fn validate(&self) -> Result<()> {
        if self.bit_rate == 0 {
            return Err(DecodeError::config("bit rate must be at least 1 bit/s"));
        }
        if !(1..=64).contains(&self.bits_per_transfer) {
            return Err(DecodeError::config(format!(
                "bits per transfer must be between 1 and 64, got {}",
                self.bits_per_transfer
            )));
        }
        if self.parity != Parity::None && self.mode.has_marker() {
            return Err(DecodeError::config(
                "parity cannot be combined with multiprocessor mode",
            ));
        }
        // the start cell must still fit in the decoder's preamble search
        let longest_preamble = MAX_PREAMBLE_CELLS - 1;
        if self.line_coding == LineCoding::Biphase && !(1..=longest_preamble).contains(&self.preamble_bits) {
            return Err(DecodeError::config(format!(
                "bi-phase preamble must be 1 to {} bits, got {}",
                longest_preamble, self.preamble_bits
            )));
        }
        Ok(())
    }

    /// Bits on the wire between start and parity: data plus the marker bit
    pub fn frame_bits(&self) -> u32 {
        self.bits_per_transfer + u32::from(self.mode.has_marker())
    }

    /// Mask covering `bits_per_transfer` bits
    pub fn value_mask(&self) -> u64 {
        if self.bits_per_transfer >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits_per_transfer) - 1
        }
    }

    /// Lowest sample rate that still gives a few samples per bit
    pub fn minimum_sample_rate(&self) -> u64 {
        u64::from(self.bit_rate) * 4
    }

    /// Bit period in seconds
    pub fn bit_period(&self) -> f64 {
        1.0 / f64::from(self.bit_rate)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::serial()
    }
}
