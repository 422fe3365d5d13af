//! [`SubStream`]: a window over a byte range of a parent stream.

use std::io::SeekFrom;

use crate::sparse::resolve_seek;
use crate::{
    ExtentIter, Ownership, Result, SharedStream, SparseStream, StreamError, StreamExtent, StreamId,
};

/// A sparse stream view over `[first, first + length)` of a parent stream.
///
/// Reads clip at the window end; writes must stay inside the window. The
/// volume layer uses this to present a partition as a stream.
pub struct SubStream {
    id: StreamId,
    parent: SharedStream,
    ownership: Ownership,
    first: u64,
    length: u64,
    position: u64,
    disposed: bool,
}

impl SubStream {
    /// Creates a window over `parent`. The range must lie within the parent.
    pub fn new(
        parent: SharedStream,
        ownership: Ownership,
        first: u64,
        length: u64,
    ) -> Result<Self> {
        let parent_length = parent.lock().length()?;
        if first + length > parent_length {
            return Err(StreamError::InvalidArgument(
                "sub-stream extends beyond the end of the parent stream",
            ));
        }
        Ok(Self {
            id: StreamId::next(),
            parent,
            ownership,
            first,
            length,
            position: 0,
            disposed: false,
        })
    }

    /// The window's start offset within the parent stream.
    pub fn first(&self) -> u64 {
        self.first
    }

    fn check_live(&self) -> Result<()> {
        if self.disposed {
            return Err(StreamError::Disposed);
        }
        Ok(())
    }
}

impl SparseStream for SubStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn can_read(&self) -> bool {
        !self.disposed && self.parent.lock().can_read()
    }

    fn can_write(&self) -> bool {
        !self.disposed && self.parent.lock().can_write()
    }

    fn can_seek(&self) -> bool {
        !self.disposed
    }

    fn length(&self) -> Result<u64> {
        self.check_live()?;
        Ok(self.length)
    }

    fn set_length(&mut self, _value: u64) -> Result<()> {
        self.check_live()?;
        Err(StreamError::Unsupported(
            "cannot change the length of a sub-stream",
        ))
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

        let mut parent = self.parent.lock();
        parent.set_position(self.first + self.position)?;
        let read = parent.read(&mut buf[..n])?;
        drop(parent);

        self.position += read as u64;
        Ok(read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_live()?;
        if self.position + buf.len() as u64 > self.length {
            return Err(StreamError::WriteBeyondEnd);
        }

        let mut parent = self.parent.lock();
        parent.set_position(self.first + self.position)?;
        parent.write(buf)?;
        drop(parent);

        self.position += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_live()?;
        self.position = resolve_seek(pos, self.position, self.length)?;
        Ok(self.position)
    }

    fn flush(&mut self) -> Result<()> {
        self.check_live()?;
        self.parent.lock().flush()
    }

    fn extents(&self) -> Result<ExtentIter<'_>> {
        self.check_live()?;
        let window = [StreamExtent::new(self.first, self.length)];
        let parent_extents: Vec<StreamExtent> = self.parent.lock().extents()?.collect();
        let first = self.first;
        let clipped = StreamExtent::intersect(&parent_extents, &window)
            .into_iter()
            .map(move |e| StreamExtent::new(e.start - first, e.length));
        Ok(Box::new(clipped))
    }

    fn position_in_base_stream(&self, base: StreamId, position: u64) -> Result<Option<u64>> {
        self.check_live()?;
        if base == self.id {
            return Ok(Some(position));
        }
        self.parent
            .lock()
            .position_in_base_stream(base, self.first + position)
    }

    fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        if self.ownership == Ownership::Dispose {
            self.parent.lock().dispose()?;
        }
        Ok(())
    }
}

impl Drop for SubStream {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}
