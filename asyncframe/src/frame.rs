/*!
Decoded frames and the results sink they are written to.

The decoder never owns its output. It pushes each [`Frame`] into a
[`FrameSink`] supplied by the host; [`FrameLog`] is the in-memory sink used by
the analyzer driver, the CLI and the tests.
*/

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status bits attached to a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFlags {
    /// Stop condition missing, or a cell of the frame could not be classified
    pub framing_error: bool,
    pub parity_error: bool,
    /// Multiprocessor marker says this is an address frame
    pub address: bool,
}

impl FrameFlags {
    /// True when the frame should be shown as an error
    pub fn is_error(&self) -> bool {
        self.framing_error || self.parity_error
    }
}

/// One decoded transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Leading edge of the start bit
    pub start_sample: u64,
    /// Last sample belonging to the frame
    pub end_sample: u64,
    /// Data bits, with inversion undone and the marker bit removed
    pub value: u64,
    pub flags: FrameFlags,
}

impl Frame {
    pub fn is_address(&self) -> bool {
        self.flags.address
    }

    pub fn has_error(&self) -> bool {
        self.flags.is_error()
    }
}

/// Kind of visual marker placed on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// A bit was sampled or a pulse was measured here
    Dot,
    /// Start of a frame
    Start,
    /// Where a parity or framing check failed
    ErrorX,
}

/// A marker at a sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub sample: u64,
    pub kind: MarkerKind,
}

/// Destination for decoder output. Decoding never depends on markers.
pub trait FrameSink {
    fn append_frame(&mut self, frame: Frame);

    /// Make everything appended so far visible to readers
    fn commit(&mut self);

    fn report_progress(&mut self, sample: u64);

    fn add_marker(&mut self, _sample: u64, _kind: MarkerKind) {}

    /// An address frame begins a new packet in multiprocessor modes
    fn start_packet(&mut self) {}
}

/// In-memory results: frames, markers and packet boundaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameLog {
    frames: Vec<Frame>,
    markers: Vec<Marker>,
    /// Index of the first frame of each packet
    packet_starts: Vec<usize>,
    committed: usize,
    progress: u64,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed frames
    pub fn frames(&self) -> &[Frame] {
        &self.frames[..self.committed]
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Packets of committed frames; frames before the first address frame form their own packet
    pub fn packets(&self) -> Vec<&[Frame]> {
        let frames = self.frames();
        let mut packets: Vec<&[Frame]> = Vec::new();
        let mut first = 0;
        for &start in &self.packet_starts {
            let start = start.min(frames.len());
            if start > first {
                packets.push(&frames[first..start]);
            }
            first = start;
        }
        if first < frames.len() {
            packets.push(&frames[first..]);
        }
        packets
    }

    /// Highest sample reported as processed
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Committed frames carrying a parity or framing error
    pub fn error_count(&self) -> usize {
        self.frames().iter().filter(|frame| frame.has_error()).count()
    }

    pub fn into_frames(mut self) -> Vec<Frame> {
        self.frames.truncate(self.committed);
        self.frames
    }
}

impl FrameSink for FrameLog {
    fn append_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn commit(&mut self) {
        self.committed = self.frames.len();
    }

    fn report_progress(&mut self, sample: u64) {
        self.progress = self.progress.max(sample);
    }

    fn add_marker(&mut self, sample: u64, kind: MarkerKind) {
        self.markers.push(Marker { sample, kind });
    }

    fn start_packet(&mut self) {
        self.packet_starts.push(self.frames.len());
    }
}

/// Cooperative stop signal shared between a host and running passes
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every pass holding this token to stop after its current frame
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(start: u64, value: u64, address: bool) -> Frame {
        Frame {
            start_sample: start,
            end_sample: start + 9,
            value,
            flags: FrameFlags { address, ..FrameFlags::default() },
        }
    }

    #[test]
    fn test_uncommitted_frames_hidden() {
        let mut log = FrameLog::new();
        log.append_frame(frame(0, 1, false));
        assert!(log.frames().is_empty());
        log.commit();
        assert_eq!(log.frames().len(), 1);
        log.append_frame(frame(10, 2, false));
        assert_eq!(log.into_frames().len(), 1);
    }

    #[test]
    fn test_packets_split_on_address_frames() {
        let mut log = FrameLog::new();
        log.append_frame(frame(0, 0x10, false));
        log.start_packet();
        log.append_frame(frame(10, 1, true));
        log.append_frame(frame(20, 0x11, false));
        log.start_packet();
        log.append_frame(frame(30, 2, true));
        log.commit();

        let packets = log.packets();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].len(), 1);
        assert_eq!(packets[1].len(), 2);
        assert!(packets[2][0].is_address());
    }

    #[test]
    fn test_progress_and_errors() {
        let mut log = FrameLog::new();
        log.report_progress(50);
        log.report_progress(20);
        assert_eq!(log.progress(), 50);

        let mut bad = frame(0, 0, false);
        bad.flags.parity_error = true;
        log.append_frame(bad);
        log.append_frame(frame(10, 0, false));
        log.commit();
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
