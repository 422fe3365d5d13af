//! In-memory stream with real holes.

use std::collections::BTreeMap;
use std::io::SeekFrom;

use crate::sparse::resolve_seek;
use crate::{ExtentIter, Result, SparseStream, StreamError, StreamExtent, StreamId};

const DEFAULT_GRANULARITY: u64 = 4096;

/// An in-memory stream storing data as fixed-granularity chunks.
///
/// Only chunks that have been written exist; reads over missing chunks
/// produce zeroes, and `extents` reports the coalesced chunk runs. Useful as
/// a stand-in for sparse image formats.
pub struct SparseMemoryStream {
    id: StreamId,
    chunks: BTreeMap<u64, Vec<u8>>,
    granularity: u64,
    length: u64,
    position: u64,
    disposed: bool,
}

impl SparseMemoryStream {
    pub fn new() -> Self {
        Self::with_granularity(DEFAULT_GRANULARITY)
    }

    /// Creates a stream with a specific chunk granularity in bytes.
    pub fn with_granularity(granularity: u64) -> Self {
        assert!(granularity > 0, "chunk granularity must be non-zero");
        Self {
            id: StreamId::next(),
            chunks: BTreeMap::new(),
            granularity,
            length: 0,
            position: 0,
            disposed: false,
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.disposed {
            return Err(StreamError::Disposed);
        }
        Ok(())
    }

    fn chunk_index(&self, offset: u64) -> u64 {
        offset / self.granularity
    }
}

impl Default for SparseMemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseStream for SparseMemoryStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn length(&self) -> Result<u64> {
        self.check_live()?;
        Ok(self.length)
    }

    fn set_length(&mut self, value: u64) -> Result<()> {
        self.check_live()?;
        if value < self.length {
            let first_dead = self.chunk_index(value.saturating_add(self.granularity - 1));
            self.chunks.retain(|&index, _| index < first_dead);
            // Zero the tail of a straddling chunk so growing the stream again
            // cannot resurrect stale bytes.
            if value % self.granularity != 0 {
                if let Some(chunk) = self.chunks.get_mut(&self.chunk_index(value)) {
                    for byte in &mut chunk[(value % self.granularity) as usize..] {
                        *byte = 0;
                    }
                }
            }
        }
        self.length = value;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        self.check_live()?;
        Ok(self.position)
    }

    fn set_position(&mut self, value: u64) -> Result<()> {
        self.check_live()?;
        self.position = value;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_live()?;
        if self.position >= self.length {
            return Ok(0);
        }
        let n = buf.len().min((self.length - self.position) as usize);
        for i in 0..n {
            let offset = self.position + i as u64;
            let in_chunk = (offset % self.granularity) as usize;
            buf[i] = match self.chunks.get(&self.chunk_index(offset)) {
                Some(chunk) => chunk[in_chunk],
                None => 0,
            };
        }
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_live()?;
        for (i, &byte) in buf.iter().enumerate() {
            let offset = self.position + i as u64;
            let index = self.chunk_index(offset);
            let in_chunk = (offset % self.granularity) as usize;
            let granularity = self.granularity as usize;
            let chunk = self
                .chunks
                .entry(index)
                .or_insert_with(|| vec![0; granularity]);
            chunk[in_chunk] = byte;
        }
        self.position += buf.len() as u64;
        self.length = self.length.max(self.position);
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_live()?;
        self.position = resolve_seek(pos, self.position, self.length)?;
        Ok(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        self.check_live()
    }

    fn extents(&self) -> Result<ExtentIter<'_>> {
        self.check_live()?;
        let chunk_extents: Vec<StreamExtent> = self
            .chunks
            .keys()
            .map(|&index| StreamExtent::new(index * self.granularity, self.granularity))
            .collect();
        // Clip chunk-aligned runs to the logical stream length.
        let clipped = StreamExtent::intersect(
            &StreamExtent::normalize(chunk_extents),
            &[StreamExtent::new(0, self.length)],
        );
        Ok(Box::new(clipped.into_iter()))
    }

    fn dispose(&mut self) -> Result<()> {
        self.disposed = true;
        Ok(())
    }
}
