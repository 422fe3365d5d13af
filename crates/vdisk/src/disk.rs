//! Disk handles.

use vdisk_part::{PartitionTable, get_partition_tables, is_partitioned};
use vdisk_stream::{SharedStream, SparseStream, shared};

/// A handle to one disk: its content stream plus geometry.
///
/// Cloning the handle shares the underlying content stream; per the stream
/// concurrency model, clones must not be driven from multiple threads at
/// once.
#[derive(Clone)]
pub struct Disk {
    content: SharedStream,
    sector_size: u32,
}

impl Disk {
    pub const DEFAULT_SECTOR_SIZE: u32 = 512;

    /// Wraps an already-shared content stream.
    pub fn new(content: SharedStream) -> Self {
        Self::with_sector_size(content, Self::DEFAULT_SECTOR_SIZE)
    }

    /// Takes ownership of a stream and treats it as disk content.
    pub fn from_stream<S: SparseStream + 'static>(stream: S) -> Self {
        Self::new(shared(stream))
    }

    pub fn with_sector_size(content: SharedStream, sector_size: u32) -> Self {
        assert!(sector_size > 0, "disk sector size must be non-zero");
        Self {
            content,
            sector_size,
        }
    }

    /// The raw content stream.
    pub fn content(&self) -> &SharedStream {
        &self.content
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Disk capacity in bytes.
    pub fn capacity(&self) -> crate::Result<u64> {
        Ok(self.content.lock().length()?)
    }

    /// Whether the content carries any recognised partition table.
    pub fn is_partitioned(&self) -> bool {
        is_partitioned(&self.content, self.sector_size)
    }

    /// Decodes the disk's partition tables.
    pub fn partition_tables(&self) -> crate::Result<Vec<Box<dyn PartitionTable>>> {
        Ok(get_partition_tables(&self.content, self.sector_size)?)
    }
}
