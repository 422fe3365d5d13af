//! Sparse stream abstractions.
//!
//! Everything in this crate revolves around the [`SparseStream`] trait: a
//! seekable byte stream that also reports which ranges hold real data.
//! Composed views ([`ConcatStream`], [`SubStream`]) and in-memory or
//! file-backed building blocks all implement the same contract, so higher
//! layers can treat a partition, a spanned volume or a plain image file as
//! one flat address space.

#![forbid(unsafe_code)]

pub mod concat;
pub mod error;
pub mod extent;
pub mod file;
pub mod memory;
pub mod sparse;
pub mod sparse_memory;
pub mod sub;
pub mod zero;

pub use concat::ConcatStream;
pub use error::StreamError;
pub use extent::StreamExtent;
pub use file::FileStream;
pub use memory::MemoryStream;
pub use sparse::{ExtentIter, Ownership, SharedStream, SparseStream, StreamId, shared};
pub use sparse_memory::SparseMemoryStream;
pub use sub::SubStream;
pub use zero::ZeroStream;

/// Stream result type
pub type Result<T> = std::result::Result<T, StreamError>;
