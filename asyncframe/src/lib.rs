/*!
# Asynchronous Frame Decoding

Decodes edge-sampled digital captures into asynchronous serial frames and
synthesizes captures from frame values.

Two line codings are supported: standard NRZ async serial (with optional
multiprocessor addressing) and the bi-phase coding used by Qi wireless power.

## Core Types

- [`Settings`] - Bit timing, word layout and line coding
- [`Waveform`] - A single channel as an initial level plus edge positions
- [`Frame`] - One decoded transfer with its status flags
- [`AsyncSerialAnalyzer`] - Plans, decodes, simulates and runs autobaud

## Modules

- [`settings`] - Decoder configuration and validation
- [`waveform`] - Edge-list channels, cursors and builders
- [`clock`] - Bit time to sample count conversion
- [`bits`] - Bit packing in transmission order
- [`plan`] - Per-configuration sampling offsets
- [`pulse`] - Bi-phase pulse classification
- [`decoder`] - The frame decoding state machine
- [`autobaud`] - Bit-rate estimation
- [`encoder`] - Waveform synthesis
- [`analyzer`] - The analyzer capability set and driver
- [`frame`] - Frames, sinks and cancellation
- [`error`] - Common error types
*/

pub mod analyzer;
pub mod autobaud;
pub mod bits;
pub mod clock;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod plan;
pub mod pulse;
pub mod settings;
pub mod waveform;

// Re-export commonly used types
pub use analyzer::{Analysis, Analyzer, AsyncSerialAnalyzer};
pub use autobaud::{AutobaudDecision, AutobaudEstimator};
pub use bits::{BitAssembler, BitExtractor, BitLevel};
pub use clock::SampleClock;
pub use decoder::{DecodePassState, FrameDecoder, PassReport, Phase};
pub use encoder::{simulate, Transfer, WaveformEncoder};
pub use error::{DecodeError, Result};
pub use frame::{CancelToken, Frame, FrameFlags, FrameLog, FrameSink, Marker, MarkerKind};
pub use plan::SampleOffsetPlan;
pub use pulse::{Cell, PulseBands, PulseWidth};
pub use settings::{BandPolicy, LineCoding, Mode, Parity, Settings, ShiftOrder, StopBits};
pub use waveform::{EdgeCursor, Waveform, WaveformBuilder, WaveformCursor};

/// Version information for the decoding library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
