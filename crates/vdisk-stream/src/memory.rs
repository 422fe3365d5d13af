//! Growable in-memory stream.

use std::io::SeekFrom;

use crate::sparse::resolve_seek;
use crate::{ExtentIter, Result, SparseStream, StreamError, StreamExtent, StreamId};

/// A dense in-memory stream backed by a `Vec<u8>`.
///
/// Writable instances grow on writes past the end. The whole buffer counts
/// as one populated extent.
pub struct MemoryStream {
    id: StreamId,
    buffer: Vec<u8>,
    position: u64,
    writable: bool,
    disposed: bool,
}

impl MemoryStream {
    /// An empty, writable stream.
    pub fn new() -> Self {
        Self::writable(Vec::new())
    }

    /// A writable stream over existing contents.
    pub fn writable(buffer: Vec<u8>) -> Self {
        Self {
            id: StreamId::next(),
            buffer,
            position: 0,
            writable: true,
            disposed: false,
        }
    }

    /// A read-only stream over existing contents.
    pub fn read_only(buffer: Vec<u8>) -> Self {
        Self {
            writable: false,
            ..Self::writable(buffer)
        }
    }

    /// Borrows the underlying buffer.
    pub fn content(&self) -> &[u8] {
        &self.buffer
    }

    fn check_live(&self) -> Result<()> {
        if self.disposed {
            return Err(StreamError::Disposed);
        }
        Ok(())
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseStream for MemoryStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn length(&self) -> Result<u64> {
        self.check_live()?;
        Ok(self.buffer.len() as u64)
    }

    fn set_length(&mut self, value: u64) -> Result<()> {
        self.check_live()?;
        if !self.writable {
            return Err(StreamError::NotWritable);
        }
        self.buffer.resize(value as usize, 0);
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
        if self.position >= self.buffer.len() as u64 {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(self.buffer.len() - start);
        buf[..n].copy_from_slice(&self.buffer[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_live()?;
        if !self.writable {
            return Err(StreamError::NotWritable);
        }
        let end = self.position as usize + buf.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        let start = self.position as usize;
        self.buffer[start..end].copy_from_slice(buf);
        self.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_live()?;
        self.position = resolve_seek(pos, self.position, self.buffer.len() as u64)?;
        Ok(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        self.check_live()
    }

    fn extents(&self) -> Result<ExtentIter<'_>> {
        self.check_live()?;
        let extent = (!self.buffer.is_empty())
            .then(|| StreamExtent::new(0, self.buffer.len() as u64));
        Ok(Box::new(extent.into_iter()))
    }

    fn dispose(&mut self) -> Result<()> {
        self.disposed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trip() {
        let mut stream = MemoryStream::new();
        stream.write(b"hello world").unwrap();
        stream.set_position(6).unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn test_write_past_end_grows_with_zero_gap() {
        let mut stream = MemoryStream::new();
        stream.set_position(4).unwrap();
        stream.write(b"ab").unwrap();

        assert_eq!(stream.length().unwrap(), 6);
        assert_eq!(stream.content(), b"\0\0\0\0ab");
    }

    #[test]
    fn test_read_only_rejects_write() {
        let mut stream = MemoryStream::read_only(vec![1, 2, 3]);
        assert!(!stream.can_write());
        assert!(matches!(stream.write(b"x"), Err(StreamError::NotWritable)));
    }

    #[test]
    fn test_read_past_end_is_short() {
        let mut stream = MemoryStream::writable(vec![9; 4]);
        stream.set_position(2).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_extents_cover_whole_buffer() {
        let stream = MemoryStream::writable(vec![0; 16]);
        let extents: Vec<_> = stream.extents().unwrap().collect();
        assert_eq!(extents, vec![StreamExtent::new(0, 16)]);

        let empty = MemoryStream::new();
        assert_eq!(empty.extents().unwrap().count(), 0);
    }

    #[test]
    fn test_disposed_stream_fails() {
        let mut stream = MemoryStream::new();
        stream.dispose().unwrap();
        stream.dispose().unwrap(); // idempotent
        assert!(matches!(stream.length(), Err(StreamError::Disposed)));
        assert!(matches!(stream.read(&mut [0]), Err(StreamError::Disposed)));
    }
}
