/*!
Edge-stream waveforms.

A [`Waveform`] stores a single digital channel as its initial level plus the
sample indices where the level flips. Decoders walk it through the
[`EdgeCursor`] trait; the encoder writes one with [`WaveformBuilder`].
*/

use serde::{Deserialize, Serialize};

use crate::bits::BitLevel;
use crate::error::{DecodeError, Result};

/// Forward-only view of a channel, as consumed by the decoder.
///
/// Methods that move the cursor return `None` once the capture is exhausted.
pub trait EdgeCursor {
    /// Level at the current position
    fn level(&self) -> BitLevel;

    /// Current position
    fn sample_number(&self) -> u64;

    /// Move to the next edge and return its sample index
    fn advance_to_next_edge(&mut self) -> Option<u64>;

    /// Sample index of the next edge, without moving
    fn next_edge(&self) -> Option<u64>;

    /// Move forward to `sample` and return how many edges were crossed.
    /// Targets at or behind the current position do not move the cursor.
    fn advance_to(&mut self, sample: u64) -> Option<u32>;

    /// Start recording the narrowest complete pulse crossed from here on
    fn track_minimum_pulse_width(&mut self);

    /// Narrowest pulse seen since tracking began, 0 if none
    fn minimum_pulse_width(&self) -> u64;
}

/// A sampled digital channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaveformData")]
pub struct Waveform {
    sample_rate: u32,
    initial_level: BitLevel,
    edges: Vec<u64>,
    len: u64,
}

/// Unchecked serialized form, validated on the way in
#[derive(Deserialize)]
struct WaveformData {
    sample_rate: u32,
    initial_level: BitLevel,
    edges: Vec<u64>,
    len: u64,
}

impl TryFrom<WaveformData> for Waveform {
    type Error = DecodeError;

    fn try_from(data: WaveformData) -> Result<Self> {
        Waveform::new(data.sample_rate, data.initial_level, data.edges, data.len)
    }
}

impl Waveform {
    /// Validate and wrap an edge list. Edges must be strictly increasing and below `len`.
    pub fn new(sample_rate: u32, initial_level: BitLevel, edges: Vec<u64>, len: u64) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DecodeError::invalid_waveform("sample rate must be non-zero"));
        }
        if let Some(pair) = edges.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(DecodeError::invalid_waveform(format!(
                "edges not strictly increasing: {} then {}",
                pair[0], pair[1]
            )));
        }
        if let Some(&last) = edges.last() {
            if last >= len {
                return Err(DecodeError::invalid_waveform(format!(
                    "edge at sample {} is past the end of a {} sample capture",
                    last, len
                )));
            }
        }
        Ok(Self { sample_rate, initial_level, edges, len })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn initial_level(&self) -> BitLevel {
        self.initial_level
    }

    pub fn edges(&self) -> &[u64] {
        &self.edges
    }

    /// Number of samples in the capture
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Level at an arbitrary sample
    pub fn level_at(&self, sample: u64) -> BitLevel {
        let flips = self.edges.partition_point(|&edge| edge <= sample);
        if flips % 2 == 0 {
            self.initial_level
        } else {
            self.initial_level.toggled()
        }
    }

    /// Fresh cursor at sample 0
    pub fn cursor(&self) -> WaveformCursor<'_> {
        WaveformCursor {
            waveform: self,
            position: 0,
            next: 0,
            level: self.initial_level,
            tracking: false,
            minimum_pulse: 0,
        }
    }
}

/// [`EdgeCursor`] over an in-memory [`Waveform`]
#[derive(Debug, Clone)]
pub struct WaveformCursor<'a> {
    waveform: &'a Waveform,
    position: u64,
    next: usize,
    level: BitLevel,
    tracking: bool,
    minimum_pulse: u64,
}

impl WaveformCursor<'_> {
    fn cross_edge(&mut self) {
        if self.tracking && self.next > 0 {
            let width = self.waveform.edges[self.next] - self.waveform.edges[self.next - 1];
            if self.minimum_pulse == 0 || width < self.minimum_pulse {
                self.minimum_pulse = width;
            }
        }
        self.level = self.level.toggled();
        self.next += 1;
    }
}

impl EdgeCursor for WaveformCursor<'_> {
    fn level(&self) -> BitLevel {
        self.level
    }

    fn sample_number(&self) -> u64 {
        self.position
    }

    fn advance_to_next_edge(&mut self) -> Option<u64> {
        let edge = self.next_edge()?;
        self.cross_edge();
        self.position = edge;
        Some(edge)
    }

    fn next_edge(&self) -> Option<u64> {
        self.waveform.edges.get(self.next).copied()
    }

    fn advance_to(&mut self, sample: u64) -> Option<u32> {
        if sample >= self.waveform.len {
            return None;
        }
        let mut crossed = 0;
        while let Some(edge) = self.next_edge() {
            if edge > sample {
                break;
            }
            self.cross_edge();
            crossed += 1;
        }
        self.position = self.position.max(sample);
        Some(crossed)
    }

    fn track_minimum_pulse_width(&mut self) {
        self.tracking = true;
        self.minimum_pulse = 0;
    }

    fn minimum_pulse_width(&self) -> u64 {
        self.minimum_pulse
    }
}

/// Writes a channel edge by edge, the way a simulator drives a line
#[derive(Debug, Clone)]
pub struct WaveformBuilder {
    sample_rate: u32,
    initial_level: BitLevel,
    level: BitLevel,
    position: u64,
    edges: Vec<u64>,
}

impl WaveformBuilder {
    pub fn new(sample_rate: u32, initial_level: BitLevel) -> Self {
        Self {
            sample_rate,
            initial_level,
            level: initial_level,
            position: 0,
            edges: Vec::new(),
        }
    }

    pub fn level(&self) -> BitLevel {
        self.level
    }

    pub fn current_sample(&self) -> u64 {
        self.position
    }

    /// Flip the line at the current sample
    pub fn transition(&mut self) {
        // two flips on one sample cancel out
        if self.edges.last() == Some(&self.position) {
            self.edges.pop();
        } else {
            self.edges.push(self.position);
        }
        self.level = self.level.toggled();
    }

    /// Flip only if the line is not already at `level`
    pub fn transition_if_needed(&mut self, level: BitLevel) {
        if self.level != level {
            self.transition();
        }
    }

    pub fn advance(&mut self, samples: u64) {
        self.position += samples;
    }

    /// Close the capture one sample past the current position
    pub fn finish(self) -> Waveform {
        Waveform {
            sample_rate: self.sample_rate,
            initial_level: self.initial_level,
            edges: self.edges,
            len: self.position + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Waveform {
        Waveform::new(1_000, BitLevel::High, vec![10, 20, 25, 40], 100).unwrap()
    }

    #[test]
    fn test_rejects_bad_edges() {
        assert!(Waveform::new(1_000, BitLevel::Low, vec![5, 5], 10).is_err());
        assert!(Waveform::new(1_000, BitLevel::Low, vec![5, 3], 10).is_err());
        assert!(Waveform::new(1_000, BitLevel::Low, vec![10], 10).is_err());
        assert!(Waveform::new(0, BitLevel::Low, vec![], 10).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let waveform: Waveform =
            serde_json::from_str(r#"{"sample_rate":1000,"initial_level":"high","edges":[10,20,25,40],"len":100}"#)
                .unwrap();
        assert_eq!(waveform, square());

        let unordered = r#"{"sample_rate":1000,"initial_level":"low","edges":[20,10],"len":100}"#;
        assert!(serde_json::from_str::<Waveform>(unordered).is_err());
    }

    #[test]
    fn test_level_at() {
        let waveform = square();
        assert_eq!(waveform.level_at(0), BitLevel::High);
        assert_eq!(waveform.level_at(10), BitLevel::Low);
        assert_eq!(waveform.level_at(22), BitLevel::High);
        assert_eq!(waveform.level_at(99), BitLevel::Low);
    }

    #[test]
    fn test_cursor_walks_edges() {
        let waveform = square();
        let mut cursor = waveform.cursor();
        assert_eq!(cursor.level(), BitLevel::High);
        assert_eq!(cursor.next_edge(), Some(10));
        assert_eq!(cursor.advance_to_next_edge(), Some(10));
        assert_eq!(cursor.level(), BitLevel::Low);
        assert_eq!(cursor.sample_number(), 10);

        assert_eq!(cursor.advance_to(30), Some(2));
        assert_eq!(cursor.level(), BitLevel::Low);
        assert_eq!(cursor.sample_number(), 30);
        assert_eq!(cursor.advance_to(35), Some(0));

        assert_eq!(cursor.advance_to_next_edge(), Some(40));
        assert_eq!(cursor.advance_to_next_edge(), None);
        assert_eq!(cursor.advance_to(100), None);
    }

    #[test]
    fn test_minimum_pulse_tracking() {
        let waveform = square();
        let mut cursor = waveform.cursor();
        cursor.track_minimum_pulse_width();
        assert_eq!(cursor.minimum_pulse_width(), 0);
        cursor.advance_to_next_edge();
        // the run before the first edge is not a complete pulse
        assert_eq!(cursor.minimum_pulse_width(), 0);
        cursor.advance_to_next_edge();
        assert_eq!(cursor.minimum_pulse_width(), 10);
        cursor.advance_to(99);
        assert_eq!(cursor.minimum_pulse_width(), 5);
    }

    #[test]
    fn test_builder_cancels_zero_width_glitch() {
        let mut builder = WaveformBuilder::new(1_000, BitLevel::High);
        builder.advance(5);
        builder.transition();
        builder.transition();
        builder.advance(5);
        builder.transition_if_needed(BitLevel::Low);
        builder.transition_if_needed(BitLevel::Low);
        builder.advance(3);
        let waveform = builder.finish();
        assert_eq!(waveform.edges(), &[10]);
        assert_eq!(waveform.len(), 14);
        assert_eq!(waveform.level_at(13), BitLevel::Low);
    }
}
