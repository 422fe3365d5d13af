//! Fixed-length stream of zeroes.

use std::io::SeekFrom;

use crate::sparse::resolve_seek;
use crate::{ExtentIter, Result, SparseStream, StreamError, StreamId};

/// A read-only stream of a fixed length whose every byte is zero.
///
/// Reports no populated extents; the entire stream is one hole.
pub struct ZeroStream {
    id: StreamId,
    length: u64,
    position: u64,
    disposed: bool,
}

impl ZeroStream {
    pub fn new(length: u64) -> Self {
        Self {
            id: StreamId::next(),
            length,
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
}

impl SparseStream for ZeroStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        false
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn length(&self) -> Result<u64> {
        self.check_live()?;
        Ok(self.length)
    }

    fn set_length(&mut self, _value: u64) -> Result<()> {
        self.check_live()?;
        Err(StreamError::Unsupported("cannot change the length of a zero stream"))
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
        buf[..n].fill(0);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<()> {
        self.check_live()?;
        Err(StreamError::NotWritable)
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
        Ok(Box::new(std::iter::empty()))
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
    fn test_reads_zeroes_and_stops_at_end() {
        let mut stream = ZeroStream::new(6);
        let mut buf = [0xAAu8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], &[0; 6]);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_no_extents() {
        let stream = ZeroStream::new(1024);
        assert_eq!(stream.extents().unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_write() {
        let mut stream = ZeroStream::new(4);
        assert!(matches!(stream.write(&[1]), Err(StreamError::NotWritable)));
    }
}
