//! Error type shared by all stream implementations.

use thiserror::Error;

/// Errors surfaced by [`SparseStream`][crate::SparseStream] implementations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A seek computed an absolute position before offset zero.
    #[error("attempted to move before the beginning of the stream")]
    PositionBeforeBeginning,

    /// `set_length` tried to shrink a composed stream past the start of its
    /// final component.
    #[error("unable to reduce stream length to less than {0}")]
    ReduceLengthBelow(u64),

    /// The stream has been disposed; no further operations are possible.
    #[error("the stream has been disposed")]
    Disposed,

    /// Read on a stream without read support.
    #[error("the stream does not support reading")]
    NotReadable,

    /// Write on a read-only stream.
    #[error("the stream does not support writing")]
    NotWritable,

    /// Seek on a non-seekable stream.
    #[error("the stream does not support seeking")]
    NotSeekable,

    /// A write would extend past the end of a fixed-size window.
    #[error("attempted to write beyond the end of the stream window")]
    WriteBeyondEnd,

    /// The operation is not available on this stream type.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// A constructor or method was called with an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// `read_exact` hit end-of-stream before filling the buffer.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// An underlying I/O error from a file-backed stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
