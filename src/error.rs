//! Error types shared by the decoder, the quantity codec and the endpoint model.

use thiserror::Error;

/// Structural failure while reading a DXB stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {offset}: needed {needed} more byte(s)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("No parent scope to go to")]
    NoParentScope { offset: usize },

    #[error("Invalid DATEX Header")]
    InvalidHeader { offset: usize },

    #[error("invalid UTF-8 text at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("nested program of {len} bytes at byte {offset} exceeds the input")]
    NestedOutOfBounds { offset: usize, len: usize },

    #[error("scopes nested deeper than {limit} levels at byte {offset}")]
    TooDeep { offset: usize, limit: usize },
}

impl DecodeError {
    /// Byte offset at which the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnexpectedEof { offset, .. }
            | DecodeError::NoParentScope { offset }
            | DecodeError::InvalidHeader { offset }
            | DecodeError::InvalidUtf8 { offset }
            | DecodeError::NestedOutOfBounds { offset, .. }
            | DecodeError::TooDeep { offset, .. } => *offset,
        }
    }
}

/// Value error raised when constructing an endpoint from invalid parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint name cannot be empty")]
    EmptyName,

    #[error("endpoint name is not valid UTF-8")]
    NonUtf8Name,

    #[error("endpoint name `{0}` contains a reserved character")]
    ReservedCharacter(String),

    #[error("endpoint name `{0}` must not contain `.`")]
    DotInName(String),

    #[error("endpoint name is {len} bytes, maximum is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("endpoint instance is {len} bytes, maximum is {max}")]
    InstanceTooLong { len: usize, max: usize },

    #[error("malformed endpoint instance `{0}`")]
    MalformedInstance(String),

    #[error("malformed id endpoint `{0}`")]
    MalformedId(String),

    #[error("unknown endpoint prefix in `{0}`")]
    UnknownPrefix(String),
}

/// Failure while decoding or constructing a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity denominator is zero")]
    ZeroDenominator,

    #[error("unknown unit code 0x{0:02x}")]
    UnknownUnit(u8),

    #[error("quantity magnitude of {bytes} bytes exceeds {max}")]
    TooLarge { bytes: usize, max: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure surfaced by the network trace utility.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    #[error("trace to {endpoint} timed out after {timeout_ms} ms")]
    TraceTimeout { endpoint: String, timeout_ms: u64 },

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Failure while reading an endpoint record from a DXB stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Value(#[from] EndpointError),
}
