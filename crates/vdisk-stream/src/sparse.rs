//! The [`SparseStream`] contract.

use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{Result, StreamError, StreamExtent};

/// Lazy sequence of populated extents, in ascending order of start offset.
pub type ExtentIter<'a> = Box<dyn Iterator<Item = StreamExtent> + 'a>;

/// A shared handle to a stream whose cursor is used by more than one view.
///
/// The mutex provides per-call exclusion only; interleaving operations from
/// multiple threads on views over the same handle is not supported, since the
/// underlying cursor is a shared mutable resource.
pub type SharedStream = Arc<Mutex<dyn SparseStream>>;

/// Wraps a stream into a [`SharedStream`] handle.
pub fn shared<S: SparseStream + 'static>(stream: S) -> SharedStream {
    Arc::new(Mutex::new(stream))
}

/// Opaque per-instance stream identity.
///
/// Views hold these tokens to answer [`SparseStream::position_in_base_stream`]
/// queries; unlike pointer comparison, a token stays valid across `Arc` and
/// `Box` moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Mints a fresh identity.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        StreamId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whether a container releases its children when it is itself released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ownership {
    /// The caller retains lifetime responsibility for the child stream.
    #[default]
    None,
    /// The container disposes the child stream when disposed itself.
    Dispose,
}

/// A seekable byte stream that also reports which ranges hold real data.
///
/// Reads outside the reported extents return zeroes; reads past the end of
/// the stream return short counts. Implementations keep a mutable cursor, so
/// a single instance must not be driven from multiple threads.
pub trait SparseStream {
    /// This stream's identity token.
    fn id(&self) -> StreamId;

    fn can_read(&self) -> bool;
    fn can_write(&self) -> bool;
    fn can_seek(&self) -> bool;

    /// Current stream length in bytes.
    fn length(&self) -> Result<u64>;

    /// Changes the stream length. Extension support is implementation
    /// defined.
    fn set_length(&mut self, value: u64) -> Result<()>;

    /// Current cursor position. May point past the end of the stream.
    fn position(&self) -> Result<u64>;

    fn set_position(&mut self, value: u64) -> Result<()>;

    /// Reads up to `buf.len()` bytes at the cursor, advancing it. Returns the
    /// number of bytes read; zero only at end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `buf` at the cursor, advancing it. Writing into a hole
    /// materialises it.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Translates `(origin, offset)` into an absolute cursor position.
    /// Seeking past the end is permitted; seeking before offset zero fails.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    fn flush(&mut self) -> Result<()>;

    /// The regions of this stream holding explicit data. The complement is
    /// an implicit zero.
    fn extents(&self) -> Result<ExtentIter<'_>>;

    /// Maps `position` in this view onto an offset within the stream
    /// identified by `base`, if a direct mapping exists.
    fn position_in_base_stream(&self, base: StreamId, position: u64) -> Result<Option<u64>> {
        Ok((base == self.id()).then_some(position))
    }

    /// Releases the stream and any owned children. Idempotent; all other
    /// operations fail with [`StreamError::Disposed`] afterwards.
    fn dispose(&mut self) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, failing if the stream ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read(&mut buf[total..])?;
            if n == 0 {
                return Err(StreamError::UnexpectedEndOfStream);
            }
            total += n;
        }
        Ok(())
    }
}

/// Resolves a `SeekFrom` against a stream's position and length.
///
/// Shared by the seekable implementations in this crate; fails with
/// [`StreamError::PositionBeforeBeginning`] when the absolute target is
/// negative.
pub(crate) fn resolve_seek(pos: SeekFrom, position: u64, length: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => offset as i128,
        SeekFrom::Current(offset) => position as i128 + offset as i128,
        SeekFrom::End(offset) => length as i128 + offset as i128,
    };
    if target < 0 {
        return Err(StreamError::PositionBeforeBeginning);
    }
    Ok(target as u64)
}
