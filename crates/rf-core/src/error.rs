//! Error types for ReelForge oversampling

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RfError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Requested oversampling order outside the configured range.
    /// The configuration is left unchanged.
    #[error("Oversampling order {order} outside {min}..={max}")]
    OrderOutOfRange { order: usize, min: usize, max: usize },

    /// Programmer error. Never recoverable, never silently truncated.
    #[error("Contract violation: {0}")]
    Contract(ContractViolation),

    #[error("FFT length mismatch")]
    Fft,
}

impl RfError {
    /// True for the non-recoverable category (caller bug).
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}

/// Misuse of a processing call: undersized buffers, channel mismatches,
/// out-of-range orders handed to the real-time path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("buffer holds {available} samples, {needed} required")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("{got} channels passed, {max} configured")]
    TooManyChannels { got: usize, max: usize },

    #[error("block of {got} samples exceeds configured maximum {max}")]
    BlockTooLarge { got: usize, max: usize },

    #[error("{samples} samples not divisible by factor {factor}")]
    IndivisibleBlock { samples: usize, factor: usize },

    #[error("channels produced diverging sample counts ({first} vs {other})")]
    ChannelLengthMismatch { first: usize, other: usize },

    #[error("carry-over needs {needed} samples, capacity is {capacity}")]
    CarryOverflow { needed: usize, capacity: usize },

    #[error("order {order} exceeds {max} designed stages")]
    OrderOutOfRange { order: usize, max: usize },

    #[error("exact-length conversion called without a required sample count")]
    MissingRequiredSamples,

    #[error("{required} samples requested, conversion yields {produced}")]
    RequiredMismatch { required: usize, produced: usize },
}

/// Raise a contract violation: fatal in debug builds, a typed error otherwise.
#[cold]
#[track_caller]
pub fn contract_violation(violation: ContractViolation) -> RfError {
    if cfg!(debug_assertions) {
        panic!("contract violation: {violation}");
    }
    RfError::Contract(violation)
}

/// Result type alias
pub type RfResult<T> = Result<T, RfError>;
