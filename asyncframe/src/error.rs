/*!
Common error types for the frame decoding core.
*/

use thiserror::Error;

/// Common result type used throughout the decoding core
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors that stop an operation outright.
///
/// Per-frame anomalies (parity, framing, bad pulse widths) are never errors;
/// they travel as flags on the emitted [`Frame`](crate::frame::Frame).
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Settings rejected before a pass starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Edge list that cannot be a waveform
    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    /// Internal invariant broken; not user-correctable
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl DecodeError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid waveform error
    pub fn invalid_waveform(msg: impl Into<String>) -> Self {
        Self::InvalidWaveform(msg.into())
    }

    /// Create a new invariant error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// True for failures that indicate a defect rather than bad input
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
