//! Common partition-table surface shared by the MBR and GPT decoders.

use crate::{BiosPartitionTable, Guid, GuidPartitionTable, Result};
use vdisk_stream::{Ownership, SharedStream, SubStream};

/// A single partition, normalised across table formats.
#[derive(Clone, Debug)]
pub struct PartitionInfo {
    /// Slot index within the owning table; stable for a given disk.
    pub index: usize,
    /// BIOS partition type byte; zero for GPT partitions.
    pub bios_type: u8,
    /// GPT partition type, when the table is GPT.
    pub type_guid: Option<Guid>,
    /// GPT per-partition unique identifier, when the table is GPT.
    pub unique_guid: Option<Guid>,
    /// First sector of the partition, in disk sectors.
    pub first_sector: u64,
    /// Length of the partition, in disk sectors.
    pub sector_count: u64,
    /// Sector size of the owning disk, in bytes.
    pub sector_size: u32,
}

impl PartitionInfo {
    /// Byte offset of the partition on the disk.
    pub fn byte_start(&self) -> u64 {
        self.first_sector * u64::from(self.sector_size)
    }

    /// Partition length in bytes.
    pub fn byte_length(&self) -> u64 {
        self.sector_count * u64::from(self.sector_size)
    }

    /// Opens the partition contents as a stream window over the disk.
    pub fn open(&self, disk_content: &SharedStream) -> vdisk_stream::Result<SubStream> {
        SubStream::new(
            disk_content.clone(),
            Ownership::None,
            self.byte_start(),
            self.byte_length(),
        )
    }
}

/// A decoded partition table.
pub trait PartitionTable {
    /// Short format tag, `"MBR"` or `"GPT"`.
    fn table_type(&self) -> &'static str;

    /// The GPT disk GUID, when the table is GPT.
    fn disk_guid(&self) -> Option<Guid> {
        None
    }

    /// The 32-bit MBR disk signature, when the table is an MBR.
    fn disk_signature(&self) -> Option<u32> {
        None
    }

    /// Partitions in table order.
    fn partitions(&self) -> &[PartitionInfo];
}

/// Decodes the partition tables present on a disk.
///
/// GPT is probed first: a valid GPT claims the disk, and its protective MBR
/// is not surfaced as a second table. Returns an empty list for an
/// unpartitioned disk.
pub fn get_partition_tables(
    stream: &SharedStream,
    sector_size: u32,
) -> Result<Vec<Box<dyn PartitionTable>>> {
    if let Some(gpt) = GuidPartitionTable::open(stream, sector_size)? {
        return Ok(vec![Box::new(gpt)]);
    }
    if let Some(mbr) = BiosPartitionTable::open(stream, sector_size)? {
        return Ok(vec![Box::new(mbr)]);
    }
    Ok(Vec::new())
}

/// Returns `true` when the disk content carries any recognised partition
/// table. Probe failures (too-small or unreadable disks) count as "not
/// partitioned"; they are normal control flow here.
pub fn is_partitioned(stream: &SharedStream, sector_size: u32) -> bool {
    GuidPartitionTable::detect(stream, sector_size) || BiosPartitionTable::detect(stream)
}
