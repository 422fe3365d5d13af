//! Master Boot Record partition tables.

use std::io::Cursor;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::table::{PartitionInfo, PartitionTable};
use crate::{PartitionError, Result};
use vdisk_stream::{SharedStream, SparseStream, StreamError};

/// Boot sector trailer, `0xAA55`.
pub const BOOT_SIGNATURE: u16 = 0xAA55;

/// The MBR structure always occupies the first 512 bytes, independent of the
/// disk's sector size.
pub const MBR_SIZE: usize = 512;

/// Byte offset of the 32-bit disk signature within the boot sector.
pub const DISK_SIGNATURE_OFFSET: u64 = 0x1B8;

/// Upper bound on EBR chain length, to terminate on corrupt links.
const MAX_EBR_LINKS: usize = 128;

/// Partition status byte. Bit 7 marks the active (bootable) partition.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionStatus {
    #[skip]
    __: B7,
    pub active: bool,
}

impl PartitionStatus {
    /// Valid status bytes only use the active bit.
    pub fn is_valid(&self) -> bool {
        self.into_bytes()[0] & 0x7F == 0
    }
}

/// One of the four primary partition entries in a boot sector.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MbrPartitionEntry {
    #[br(map = |b: u8| PartitionStatus::from_bytes([b]))]
    #[bw(map = |s: &PartitionStatus| s.into_bytes()[0])]
    pub status: PartitionStatus,
    pub chs_first: [u8; 3],
    pub partition_type: u8,
    pub chs_last: [u8; 3],
    /// First sector, relative to the sector holding this entry's table.
    pub first_lba: u32,
    pub sector_count: u32,
}

impl MbrPartitionEntry {
    pub const UNUSED: Self = Self {
        status: PartitionStatus::new(),
        chs_first: [0; 3],
        partition_type: 0,
        chs_last: [0; 3],
        first_lba: 0,
        sector_count: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.partition_type == 0x00 || self.sector_count == 0
    }

    /// Extended partition container (CHS or LBA variant).
    pub fn is_extended(&self) -> bool {
        matches!(self.partition_type, 0x05 | 0x0F)
    }

    /// Protective entry covering a GPT disk.
    pub fn is_gpt_protective(&self) -> bool {
        self.partition_type == 0xEE
    }
}

/// The 512-byte boot sector: bootstrap code, disk signature, four partition
/// entries and the `0xAA55` trailer. EBRs share the same layout.
#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootSector {
    pub bootstrap: [u8; 440],
    pub disk_signature: u32,
    pub reserved: u16,
    pub entries: [MbrPartitionEntry; 4],
    pub signature: u16,
}

impl BootSector {
    /// An empty, correctly-signed boot sector.
    pub fn empty() -> Self {
        Self {
            bootstrap: [0; 440],
            disk_signature: 0,
            reserved: 0,
            entries: [MbrPartitionEntry::UNUSED; 4],
            signature: BOOT_SIGNATURE,
        }
    }

    /// Structural validity: correct trailer and plausible entry status
    /// bytes. A valid-but-empty sector is still "valid".
    pub fn is_valid(&self) -> bool {
        self.signature == BOOT_SIGNATURE && self.entries.iter().all(|e| e.status.is_valid())
    }

    pub fn has_partitions(&self) -> bool {
        self.entries.iter().any(|e| !e.is_empty())
    }

    /// Reads and decodes 512 bytes at `offset` in `stream`.
    ///
    /// Returns `Ok(None)` when the stream ends before a full sector — a disk
    /// that small cannot be partitioned.
    pub fn read_at(stream: &SharedStream, offset: u64) -> Result<Option<Self>> {
        let mut sector = [0u8; MBR_SIZE];
        let mut guard = stream.lock();
        guard.set_position(offset)?;
        match guard.read_exact(&mut sector) {
            Ok(()) => {}
            Err(StreamError::UnexpectedEndOfStream) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        drop(guard);

        let sector = BootSector::read_le(&mut Cursor::new(&sector[..]))?;
        Ok(Some(sector))
    }
}

/// A decoded MBR partition table, with logical partitions from any extended
/// partition chain flattened in.
pub struct BiosPartitionTable {
    disk_signature: u32,
    partitions: Vec<PartitionInfo>,
}

impl BiosPartitionTable {
    /// Returns `true` if `stream` starts with a valid, populated MBR.
    pub fn detect(stream: &SharedStream) -> bool {
        matches!(
            BootSector::read_at(stream, 0),
            Ok(Some(sector)) if sector.is_valid() && sector.has_partitions()
        )
    }

    /// Decodes the table, or `None` when the disk has no valid MBR.
    ///
    /// Primary partitions keep their slot index (0-3); logical partitions
    /// found in the EBR chain are numbered from 4 in chain order.
    pub fn open(stream: &SharedStream, sector_size: u32) -> Result<Option<Self>> {
        let Some(sector) = BootSector::read_at(stream, 0)? else {
            return Ok(None);
        };
        if !sector.is_valid() || !sector.has_partitions() {
            return Ok(None);
        }

        let mut partitions = Vec::new();
        let mut logical_index = 4;
        for (slot, entry) in sector.entries.iter().enumerate() {
            if entry.is_empty() {
                continue;
            }
            if entry.is_extended() {
                let chain = Self::read_ebr_chain(
                    stream,
                    sector_size,
                    u64::from(entry.first_lba),
                    &mut logical_index,
                )?;
                partitions.extend(chain);
            } else {
                partitions.push(PartitionInfo {
                    index: slot,
                    bios_type: entry.partition_type,
                    type_guid: None,
                    unique_guid: None,
                    first_sector: u64::from(entry.first_lba),
                    sector_count: u64::from(entry.sector_count),
                    sector_size,
                });
            }
        }

        log::debug!(
            "opened MBR table: signature {:08X}, {} partition(s)",
            sector.disk_signature,
            partitions.len()
        );
        Ok(Some(Self {
            disk_signature: sector.disk_signature,
            partitions,
        }))
    }

    /// Walks the chain of Extended Boot Records rooted at `extended_start`.
    ///
    /// Entry 0 of each EBR addresses a logical partition relative to that
    /// EBR; entry 1 links to the next EBR relative to the extended
    /// partition's start.
    fn read_ebr_chain(
        stream: &SharedStream,
        sector_size: u32,
        extended_start: u64,
        logical_index: &mut usize,
    ) -> Result<Vec<PartitionInfo>> {
        let mut partitions = Vec::new();
        let mut ebr_lba = extended_start;

        for _ in 0..MAX_EBR_LINKS {
            let offset = ebr_lba * u64::from(sector_size);
            let Some(ebr) = BootSector::read_at(stream, offset)? else {
                return Err(PartitionError::InvalidData(format!(
                    "extended boot record at sector {ebr_lba} lies beyond the disk"
                )));
            };
            if ebr.signature != BOOT_SIGNATURE {
                return Err(PartitionError::InvalidData(format!(
                    "extended boot record at sector {ebr_lba} has a bad signature"
                )));
            }

            let logical = &ebr.entries[0];
            if !logical.is_empty() {
                partitions.push(PartitionInfo {
                    index: *logical_index,
                    bios_type: logical.partition_type,
                    type_guid: None,
                    unique_guid: None,
                    first_sector: ebr_lba + u64::from(logical.first_lba),
                    sector_count: u64::from(logical.sector_count),
                    sector_size,
                });
                *logical_index += 1;
            }

            let link = &ebr.entries[1];
            if link.is_empty() || !link.is_extended() {
                return Ok(partitions);
            }
            ebr_lba = extended_start + u64::from(link.first_lba);
        }

        Err(PartitionError::InvalidData(
            "extended boot record chain exceeds the link limit".into(),
        ))
    }

    pub fn disk_signature_value(&self) -> u32 {
        self.disk_signature
    }
}

impl PartitionTable for BiosPartitionTable {
    fn table_type(&self) -> &'static str {
        "MBR"
    }

    fn disk_signature(&self) -> Option<u32> {
        Some(self.disk_signature)
    }

    fn partitions(&self) -> &[PartitionInfo] {
        &self.partitions
    }
}
