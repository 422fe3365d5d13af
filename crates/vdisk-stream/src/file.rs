//! File-backed stream.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::sparse::resolve_seek;
use crate::{ExtentIter, Result, SparseStream, StreamError, StreamExtent, StreamId};

/// A sparse stream over a file on disk — the usual entry point for reading a
/// disk image.
///
/// The file is treated as fully populated: one extent covering the whole
/// length. Sparse image formats layer their own extent logic on top.
pub struct FileStream {
    id: StreamId,
    file: File,
    writable: bool,
    position: u64,
    disposed: bool,
}

impl FileStream {
    /// Opens a file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        log::debug!("opening {} read-only", path.as_ref().display());
        let file = File::open(path)?;
        Ok(Self::from_file(file, false))
    }

    /// Opens a file for reading and writing.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        log::debug!("opening {} read-write", path.as_ref().display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_file(file, true))
    }

    /// Wraps an already-open file handle.
    pub fn from_file(file: File, writable: bool) -> Self {
        Self {
            id: StreamId::next(),
            file,
            writable,
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

impl SparseStream for FileStream {
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
        Ok(self.file.metadata()?.len())
    }

    fn set_length(&mut self, value: u64) -> Result<()> {
        self.check_live()?;
        if !self.writable {
            return Err(StreamError::NotWritable);
        }
        self.file.set_len(value)?;
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
        self.file.seek(SeekFrom::Start(self.position))?;
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_live()?;
        if !self.writable {
            return Err(StreamError::NotWritable);
        }
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_live()?;
        self.position = resolve_seek(pos, self.position, self.length()?)?;
        Ok(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        self.check_live()?;
        self.file.flush()?;
        Ok(())
    }

    fn extents(&self) -> Result<ExtentIter<'_>> {
        self.check_live()?;
        let length = self.length()?;
        let extent = (length > 0).then(|| StreamExtent::new(0, length));
        Ok(Box::new(extent.into_iter()))
    }

    fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        if self.writable {
            self.file.flush()?;
        }
        self.disposed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn scratch_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_round_trip() {
        let file = scratch_file(b"0123456789");
        let mut stream = FileStream::open(file.path()).unwrap();
        assert_eq!(stream.length().unwrap(), 10);

        stream.set_position(4).unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");
    }

    #[test]
    fn test_read_only_rejects_write() {
        let file = scratch_file(b"data");
        let mut stream = FileStream::open(file.path()).unwrap();
        assert!(matches!(stream.write(b"x"), Err(StreamError::NotWritable)));
    }

    #[test]
    fn test_write_and_extend() {
        let file = scratch_file(b"aaaa");
        let mut stream = FileStream::open_rw(file.path()).unwrap();

        stream.set_position(4).unwrap();
        stream.write(b"bbbb").unwrap();
        assert_eq!(stream.length().unwrap(), 8);

        stream.set_position(0).unwrap();
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aaaabbbb");
    }

    #[test]
    fn test_extents_cover_file() {
        let file = scratch_file(&[0u8; 128]);
        let stream = FileStream::open(file.path()).unwrap();
        let extents: Vec<_> = stream.extents().unwrap().collect();
        assert_eq!(extents, vec![StreamExtent::new(0, 128)]);
    }
}
