/*!
Waveform-to-frame decoding.

A pass walks one channel from start to end (or until cancelled) and emits a
[`Frame`] per transfer. Two line codings are supported:

- **NRZ** (standard async serial): wait for the line to idle, take the next
  edge as the start bit, then sample every bit at the centres precomputed in
  the [`SampleOffsetPlan`].
- **Bi-phase** (Qi): find an idle gap, lock onto the preamble by pulse width,
  then read every bit as a classified cell. Back-to-back transfers keep the
  stream locked so only the first one of a packet needs a preamble.

Parity, framing and pulse-width problems are flagged on the frame; they
never stop the pass.
*/

use tracing::{debug, info};

use crate::bits::{BitAssembler, BitLevel};
use crate::error::{DecodeError, Result};
use crate::frame::{CancelToken, Frame, FrameFlags, FrameSink, MarkerKind};
use crate::plan::SampleOffsetPlan;
use crate::pulse::{Cell, PulseBands};
use crate::settings::{LineCoding, Settings, ShiftOrder};
use crate::waveform::EdgeCursor;

/// Preamble cells read before giving up on a packet
pub const MAX_PREAMBLE_CELLS: u32 = 25;

/// Where a pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    SearchIdle,
    SyncGap,
    Preamble,
    DataBits,
    Parity,
    StopBit,
    Emit,
}

/// Transient state of one pass. Never shared between passes.
#[derive(Debug, Clone, Default)]
pub struct DecodePassState {
    pub phase: Phase,
    /// One-cells seen in the current preamble
    pub preamble_count: u32,
    /// The next bi-phase frame already had its start bit consumed
    pub stream_locked: bool,
    /// Start sample of the frame whose start bit the lock consumed
    pub locked_start: Option<u64>,
    /// Narrowest pulse crossed so far, 0 if none
    pub minimum_pulse_width: u64,
    pub frames_emitted: u64,
    /// Packets dropped during sync or preamble
    pub frames_abandoned: u64,
}

impl DecodePassState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Outcome of a pass, as seen by the autobaud estimator and the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    pub frames_emitted: u64,
    pub frames_abandoned: u64,
    pub minimum_pulse_width: u64,
    pub cancelled: bool,
}

enum PreambleOutcome {
    Start(u64),
    Abandoned,
}

/// Collects payload bits in wire order, diverting the marker bit
struct Payload {
    assembler: BitAssembler,
    marker_index: Option<u32>,
    marker: bool,
    received: u32,
}

impl Payload {
    fn new(settings: &Settings) -> Self {
        let marker_index = settings.mode.has_marker().then(|| match settings.shift_order {
            ShiftOrder::LsbFirst => settings.bits_per_transfer,
            ShiftOrder::MsbFirst => 0,
        });
        Self {
            assembler: BitAssembler::new(settings.shift_order, settings.bits_per_transfer),
            marker_index,
            marker: false,
            received: 0,
        }
    }

    fn push(&mut self, bit: bool) {
        if self.marker_index == Some(self.received) {
            self.marker = bit;
        } else {
            self.assembler.push(BitLevel::from(bit));
        }
        self.received += 1;
    }
}

/// Decodes frames from an edge cursor under fixed settings
#[derive(Debug)]
pub struct FrameDecoder<'a> {
    settings: &'a Settings,
    plan: &'a SampleOffsetPlan,
    bands: PulseBands,
}

impl<'a> FrameDecoder<'a> {
    /// `plan` must have been computed for these settings at `sample_rate`
    pub fn new(settings: &'a Settings, plan: &'a SampleOffsetPlan, sample_rate: u32) -> Result<Self> {
        settings.validate()?;
        if !plan.matches(settings, sample_rate) {
            return Err(DecodeError::invariant(
                "sample offset plan does not match the current settings",
            ));
        }
        let samples_per_bit = f64::from(sample_rate) / f64::from(settings.bit_rate);
        Ok(Self {
            settings,
            plan,
            bands: PulseBands::for_policy(settings.pulse_bands, samples_per_bit),
        })
    }

    pub fn bands(&self) -> &PulseBands {
        &self.bands
    }

    /// Run a full pass with fresh state
    pub fn run<C, S>(&self, cursor: &mut C, sink: &mut S, cancel: &CancelToken) -> PassReport
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        let mut state = DecodePassState::new();
        self.decode(cursor, sink, cancel, &mut state)
    }

    /// Run a full pass, leaving the final state in `state` for inspection
    pub fn decode<C, S>(
        &self,
        cursor: &mut C,
        sink: &mut S,
        cancel: &CancelToken,
        state: &mut DecodePassState,
    ) -> PassReport
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        cursor.track_minimum_pulse_width();

        let cancelled = match self.settings.line_coding {
            LineCoding::Nrz => self.run_nrz(cursor, sink, cancel, state),
            LineCoding::Biphase => self.run_biphase(cursor, sink, cancel, state),
        };
        state.minimum_pulse_width = cursor.minimum_pulse_width();

        info!(
            "Pass finished: {} frames, {} abandoned, shortest pulse {} samples{}",
            state.frames_emitted,
            state.frames_abandoned,
            state.minimum_pulse_width,
            if cancelled { " (cancelled)" } else { "" }
        );

        PassReport {
            frames_emitted: state.frames_emitted,
            frames_abandoned: state.frames_abandoned,
            minimum_pulse_width: state.minimum_pulse_width,
            cancelled,
        }
    }

    /// Undo polarity inversion of a payload bit
    fn logical(&self, bit: bool) -> bool {
        bit != self.settings.inverted
    }

    fn finish_value(&self, payload: Payload, flags: &mut FrameFlags) -> u64 {
        if payload.marker_index.is_some() {
            flags.address = self.settings.mode.is_address(payload.marker);
        }
        payload.assembler.value()
    }

    fn check_parity(&self, value: u64, received: bool, flags: &mut FrameFlags) {
        if self.settings.parity.bit_for(value) != Some(received) {
            flags.parity_error = true;
        }
    }

    fn emit<C: EdgeCursor, S: FrameSink>(
        &self,
        frame: Frame,
        cursor: &C,
        sink: &mut S,
        state: &mut DecodePassState,
    ) {
        state.phase = Phase::Emit;
        if frame.flags.address {
            sink.start_packet();
        }
        sink.append_frame(frame);
        sink.commit();
        sink.report_progress(frame.end_sample);
        state.frames_emitted += 1;
        state.minimum_pulse_width = cursor.minimum_pulse_width();
    }

    // ---- NRZ ----------------------------------------------------------

    fn run_nrz<C, S>(&self, cursor: &mut C, sink: &mut S, cancel: &CancelToken, state: &mut DecodePassState) -> bool
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        let idle = BitLevel::from(!self.settings.inverted);
        loop {
            state.phase = Phase::SearchIdle;
            if cursor.level() != idle && cursor.advance_to_next_edge().is_none() {
                return false;
            }

            // the first edge out of idle is the start bit
            state.phase = Phase::SyncGap;
            let Some(start) = cursor.advance_to_next_edge() else {
                return false;
            };
            sink.add_marker(start, MarkerKind::Start);

            let Some(frame) = self.read_nrz_frame(start, cursor, sink, state) else {
                return false;
            };
            self.emit(frame, cursor, sink, state);

            if cancel.is_cancelled() {
                return true;
            }
        }
    }

    fn read_nrz_frame<C, S>(&self, start: u64, cursor: &mut C, sink: &mut S, state: &mut DecodePassState) -> Option<Frame>
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        state.phase = Phase::DataBits;
        let mut payload = Payload::new(self.settings);
        for &offset in self.plan.bit_offsets() {
            cursor.advance_to(start + offset)?;
            sink.add_marker(start + offset, MarkerKind::Dot);
            payload.push(self.logical(cursor.level().is_high()));
        }

        let mut flags = FrameFlags::default();
        let value = self.finish_value(payload, &mut flags);

        if let Some(offset) = self.plan.parity_offset() {
            state.phase = Phase::Parity;
            cursor.advance_to(start + offset)?;
            self.check_parity(value, self.logical(cursor.level().is_high()), &mut flags);
            let kind = if flags.parity_error { MarkerKind::ErrorX } else { MarkerKind::Dot };
            sink.add_marker(start + offset, kind);
        }

        // stop bit must be idle at its centre and stay idle to the end
        state.phase = Phase::StopBit;
        cursor.advance_to(start + self.plan.start_of_stop())?;
        if !self.logical(cursor.level().is_high()) {
            flags.framing_error = true;
        } else if cursor.advance_to(start + self.plan.end_of_stop())? != 0 {
            flags.framing_error = true;
        }
        if flags.framing_error {
            sink.add_marker(cursor.sample_number(), MarkerKind::ErrorX);
        }

        Some(Frame {
            start_sample: start,
            end_sample: cursor.sample_number(),
            value,
            flags,
        })
    }

    // ---- Bi-phase -----------------------------------------------------

    fn run_biphase<C, S>(&self, cursor: &mut C, sink: &mut S, cancel: &CancelToken, state: &mut DecodePassState) -> bool
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        state.stream_locked = false;
        loop {
            let locked_start = if state.stream_locked { state.locked_start.take() } else { None };
            let start = match locked_start {
                Some(start) => start,
                None => {
                    if self.find_idle_gap(cursor, state).is_none() {
                        return false;
                    }
                    match self.read_preamble(cursor, sink, state) {
                        None => return false,
                        Some(PreambleOutcome::Abandoned) => {
                            debug!(
                                "Abandoned packet at sample {} after {} preamble cells",
                                cursor.sample_number(),
                                state.preamble_count
                            );
                            state.frames_abandoned += 1;
                            continue;
                        }
                        Some(PreambleOutcome::Start(start)) => start,
                    }
                }
            };
            sink.add_marker(start, MarkerKind::Start);

            let Some(frame) = self.read_biphase_frame(start, cursor, sink, state) else {
                return false;
            };
            self.emit(frame, cursor, sink, state);

            if cancel.is_cancelled() {
                return true;
            }
        }
    }

    /// SearchIdle and SyncGap: skip edges until a run longer than the idle gap ends.
    /// Returns the edge that ends it.
    fn find_idle_gap<C: EdgeCursor>(&self, cursor: &mut C, state: &mut DecodePassState) -> Option<u64> {
        state.phase = Phase::SearchIdle;
        let mut idle_from = cursor.sample_number();

        state.phase = Phase::SyncGap;
        loop {
            let edge = cursor.advance_to_next_edge()?;
            if edge - idle_from > self.bands.idle_gap() {
                debug!("Idle gap of {} samples ends at {}", edge - idle_from, edge);
                return Some(edge);
            }
            idle_from = edge;
        }
    }

    fn read_preamble<C, S>(&self, cursor: &mut C, sink: &mut S, state: &mut DecodePassState) -> Option<PreambleOutcome>
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        state.phase = Phase::Preamble;
        state.preamble_count = 0;
        for _ in 0..MAX_PREAMBLE_CELLS {
            let cell_start = cursor.sample_number();
            match self.bands.read_cell(cursor, |edge| sink.add_marker(edge, MarkerKind::Dot))? {
                Cell::One => state.preamble_count += 1,
                Cell::Zero => return Some(PreambleOutcome::Start(cell_start)),
                Cell::Invalid => return Some(PreambleOutcome::Abandoned),
            }
        }
        Some(PreambleOutcome::Abandoned)
    }

    fn read_biphase_frame<C, S>(&self, start: u64, cursor: &mut C, sink: &mut S, state: &mut DecodePassState) -> Option<Frame>
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        let mut flags = FrameFlags::default();
        let mut broken = false;

        state.phase = Phase::DataBits;
        let mut payload = Payload::new(self.settings);
        for _ in 0..self.settings.frame_bits() {
            match self.bands.read_cell(cursor, |edge| sink.add_marker(edge, MarkerKind::Dot))? {
                Cell::Invalid => {
                    broken = true;
                    break;
                }
                cell => payload.push(self.logical(cell == Cell::One)),
            }
        }
        let value = self.finish_value(payload, &mut flags);

        if !broken && self.plan.parity_offset().is_some() {
            state.phase = Phase::Parity;
            match self.bands.read_cell(cursor, |edge| sink.add_marker(edge, MarkerKind::Dot))? {
                Cell::Invalid => broken = true,
                cell => self.check_parity(value, self.logical(cell == Cell::One), &mut flags),
            }
        }

        if !broken {
            state.phase = Phase::StopBit;
            for _ in 0..self.settings.stop_bits.cells() {
                match self.bands.read_cell(cursor, |edge| sink.add_marker(edge, MarkerKind::Dot))? {
                    Cell::One => {}
                    Cell::Zero => flags.framing_error = true,
                    Cell::Invalid => {
                        broken = true;
                        break;
                    }
                }
            }
        }

        if broken {
            flags.framing_error = true;
        }
        if flags.is_error() {
            sink.add_marker(cursor.sample_number(), MarkerKind::ErrorX);
        }
        let end_sample = cursor.sample_number().saturating_sub(1).max(start);

        let locked = !broken && self.lock_next_frame(cursor, sink, state);
        state.stream_locked = locked;
        if !state.stream_locked {
            debug!("Stream desynchronized after frame ending at sample {}", end_sample);
        }

        Some(Frame { start_sample: start, end_sample, value, flags })
    }

    /// Consume the next frame's start bit when it follows without an idle gap
    fn lock_next_frame<C, S>(&self, cursor: &mut C, sink: &mut S, state: &mut DecodePassState) -> bool
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        let here = cursor.sample_number();
        match cursor.next_edge() {
            Some(next) if next - here <= self.bands.idle_gap() => {
                let cell = self.bands.read_cell(cursor, |edge| sink.add_marker(edge, MarkerKind::Dot));
                if cell == Some(Cell::Zero) {
                    state.locked_start = Some(here);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}
