//! Error types that can be emitted from this library
//!

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// an argument failed validation
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgumentError),

    /// the pool refused to hand out memory
    #[error("out of memory")]
    OutOfMemory,

    /// the resource violates the message table layout
    #[error("corrupt message table resource: {0}")]
    CorruptData(#[from] CorruptDataError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when an argument is rejected
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidArgumentError {
    /// the text view has no backing buffer
    #[error("the text view has no backing buffer")]
    NullBuffer,

    /// the resource buffer is empty
    #[error("the resource buffer is empty")]
    EmptyBuffer,

    /// the text has a length of zero
    #[error("the text has a length of zero")]
    ZeroLength,

    /// the text has a capacity of zero
    #[error("the text has a capacity of zero")]
    ZeroCapacity,

    /// length {length} exceeds capacity {capacity}
    #[error("length {length} exceeds capacity {capacity}")]
    LengthExceedsCapacity { length: usize, capacity: usize },

    /// length {length} exceeds the {available} bytes backing the view
    #[error("length {length} exceeds the {available} bytes backing the view")]
    LengthExceedsBuffer { length: usize, available: usize },

    /// wide text length {0} is not a multiple of two
    #[error("wide text length {0} is not a multiple of two")]
    OddLength(usize),

    /// wide text capacity {0} is not a multiple of two
    #[error("wide text capacity {0} is not a multiple of two")]
    OddCapacity(usize),
}

/// Error type to provide further information when a resource is malformed
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptDataError {
    /// the resource is too small to hold its header
    #[error("the resource is too small to hold its header")]
    TruncatedHeader,

    /// {count} blocks do not fit in the resource
    #[error("{count} blocks do not fit in the resource")]
    TooManyBlocks { count: u32 },

    /// block {block} points outside the resource at {offset:#x}
    #[error("block {block} points outside the resource at {offset:#x}")]
    BlockOutOfBounds { block: u32, offset: u32 },

    /// record for id {id} at {offset:#x} is cut short
    #[error("record for id {id} at {offset:#x} is cut short")]
    TruncatedRecord { id: u32, offset: usize },

    /// record for id {id} declares length {length}, smaller than its header
    #[error("record for id {id} declares length {length}, smaller than its header")]
    RecordTooShort { id: u32, length: u16 },

    /// record for id {id} at {offset:#x} with length {length} runs past the resource
    #[error("record for id {id} at {offset:#x} with length {length} runs past the resource")]
    RecordOutOfBounds { id: u32, offset: usize, length: u16 },

    /// record for id {id} has unknown encoding flags {flags:#x}
    #[error("record for id {id} has unknown encoding flags {flags:#x}")]
    UnknownEncoding { id: u32, flags: u16 },

    /// text for id {id} is not terminated within its record
    #[error("text for id {id} is not terminated within its record")]
    UnterminatedText { id: u32 },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
