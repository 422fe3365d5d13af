//! GUID Partition Tables.

use std::io::Cursor;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::table::{PartitionInfo, PartitionTable};
use crate::{Guid, PartitionError, Result};
use vdisk_stream::{SharedStream, SparseStream, StreamError};

/// Minimum GPT header size defined by UEFI.
pub const GPT_HEADER_MIN_SIZE: u32 = 92;

/// Minimum partition entry size defined by UEFI.
pub const GPT_ENTRY_MIN_SIZE: u32 = 128;

/// Ceiling on the entry array size we are willing to load; a header asking
/// for more is treated as corrupt.
const MAX_ENTRY_ARRAY_BYTES: u64 = 16 * 1024 * 1024;

/// Byte offset of the CRC field within the header.
const HEADER_CRC_OFFSET: usize = 16;

/// GPT partition attribute flags (UEFI 5.3.3).
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GptPartitionAttributes {
    /// Required by the platform to function.
    pub required_partition: bool,
    /// Firmware must not produce an EFI block-IO protocol device for it.
    pub no_block_io_protocol: bool,
    /// Bootable by legacy BIOS firmware.
    pub legacy_bios_bootable: bool,
    #[skip]
    __: B45,
    /// Interpretation defined by the partition type's owner.
    pub type_specific: B16,
}

/// The GPT header stored at LBA 1 (and mirrored at the last LBA).
#[binrw]
#[brw(little, magic = b"EFI PART")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc: u32,
    pub reserved: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub entry_array_lba: u64,
    pub entry_count: u32,
    pub entry_size: u32,
    pub entries_crc: u32,
}

impl GptHeader {
    /// On-disk revision 1.0.
    pub const REVISION_1: u32 = 0x0001_0000;

    /// Computes the header CRC over `header_size` bytes of `sector` with the
    /// stored CRC field zeroed, per UEFI.
    pub fn compute_crc(sector: &[u8], header_size: u32) -> u32 {
        let mut bytes = sector[..header_size as usize].to_vec();
        bytes[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].fill(0);
        crc32fast::hash(&bytes)
    }
}

/// One slot in the GPT partition entry array.
#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub first_lba: u64,
    pub last_lba: u64,
    #[br(map = |v: u64| GptPartitionAttributes::from_bytes(v.to_le_bytes()))]
    #[bw(map = |a: &GptPartitionAttributes| u64::from_le_bytes(a.into_bytes()))]
    pub attributes: GptPartitionAttributes,
    pub name_utf16: [u16; 36],
}

impl GptEntry {
    /// A slot is used when its type GUID is non-zero.
    pub fn is_used(&self) -> bool {
        !self.type_guid.is_zero()
    }

    /// Sector count of the addressed range (`last_lba` is inclusive).
    pub fn sector_count(&self) -> u64 {
        self.last_lba - self.first_lba + 1
    }

    /// The partition name, decoded from UTF-16 and trimmed at the first NUL.
    pub fn name(&self) -> String {
        let end = self
            .name_utf16
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name_utf16.len());
        String::from_utf16_lossy(&self.name_utf16[..end])
    }

    /// Encodes a name into the fixed UTF-16 field, truncating to fit.
    pub fn encode_name(name: &str) -> [u16; 36] {
        let mut buf = [0u16; 36];
        for (slot, unit) in buf.iter_mut().zip(name.encode_utf16()) {
            *slot = unit;
        }
        buf
    }
}

/// Well-known partition type GUIDs.
pub mod partition_types {
    use crate::Guid;

    /// EFI System Partition.
    pub const EFI_SYSTEM: Guid = Guid::new(
        0xC12A7328,
        0xF81F,
        0x11D2,
        [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    );

    /// Microsoft Basic Data.
    pub const BASIC_DATA: Guid = Guid::new(
        0xEBD0A0A2,
        0xB9E5,
        0x4433,
        [0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
    );

    /// Linux filesystem data.
    pub const LINUX_FILESYSTEM: Guid = Guid::new(
        0x0FC63DAF,
        0x8483,
        0x4772,
        [0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D, 0xE4],
    );
}

/// A decoded and checksum-verified GUID partition table.
pub struct GuidPartitionTable {
    disk_guid: Guid,
    header: GptHeader,
    partitions: Vec<PartitionInfo>,
}

impl GuidPartitionTable {
    /// Returns `true` if `stream` carries a GPT that decodes and verifies.
    pub fn detect(stream: &SharedStream, sector_size: u32) -> bool {
        matches!(Self::open(stream, sector_size), Ok(Some(_)))
    }

    /// Decodes the primary table.
    ///
    /// `Ok(None)` means the disk is simply not GPT-partitioned; a GPT whose
    /// checksums or geometry do not verify is an
    /// [`InvalidData`][PartitionError::InvalidData] error instead.
    pub fn open(stream: &SharedStream, sector_size: u32) -> Result<Option<Self>> {
        let mut sector = vec![0u8; sector_size as usize];
        {
            let mut guard = stream.lock();
            guard.set_position(u64::from(sector_size))?;
            match guard.read_exact(&mut sector) {
                Ok(()) => {}
                Err(StreamError::UnexpectedEndOfStream) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        let header = match GptHeader::read_le(&mut Cursor::new(&sector[..])) {
            Ok(header) => header,
            Err(binrw::Error::BadMagic { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if header.header_size < GPT_HEADER_MIN_SIZE || header.header_size > sector_size {
            return Err(PartitionError::InvalidData(format!(
                "implausible GPT header size {}",
                header.header_size
            )));
        }
        let computed = GptHeader::compute_crc(&sector, header.header_size);
        if computed != header.header_crc {
            return Err(PartitionError::InvalidData(format!(
                "GPT header CRC mismatch: stored {:08x}, computed {computed:08x}",
                header.header_crc
            )));
        }

        if header.entry_size < GPT_ENTRY_MIN_SIZE {
            return Err(PartitionError::InvalidData(format!(
                "implausible GPT entry size {}",
                header.entry_size
            )));
        }
        let array_bytes = u64::from(header.entry_count) * u64::from(header.entry_size);
        if array_bytes > MAX_ENTRY_ARRAY_BYTES {
            return Err(PartitionError::InvalidData(format!(
                "GPT entry array of {array_bytes} bytes exceeds the load limit"
            )));
        }

        let mut array = vec![0u8; array_bytes as usize];
        {
            let mut guard = stream.lock();
            guard.set_position(header.entry_array_lba * u64::from(sector_size))?;
            guard.read_exact(&mut array)?;
        }
        let computed = crc32fast::hash(&array);
        if computed != header.entries_crc {
            return Err(PartitionError::InvalidData(format!(
                "GPT entry array CRC mismatch: stored {:08x}, computed {computed:08x}",
                header.entries_crc
            )));
        }

        let mut partitions = Vec::new();
        for slot in 0..header.entry_count {
            let offset = (slot * header.entry_size) as u64;
            let mut cursor = Cursor::new(&array[..]);
            cursor.set_position(offset);
            let entry = GptEntry::read_le(&mut cursor)?;
            if !entry.is_used() {
                continue;
            }
            if entry.last_lba < entry.first_lba {
                return Err(PartitionError::InvalidData(format!(
                    "GPT entry {slot} has an inverted sector range"
                )));
            }
            partitions.push(PartitionInfo {
                index: slot as usize,
                bios_type: 0,
                type_guid: Some(entry.type_guid),
                unique_guid: Some(entry.unique_guid),
                first_sector: entry.first_lba,
                sector_count: entry.sector_count(),
                sector_size,
            });
        }

        log::debug!(
            "opened GPT table: disk {}, {} partition(s)",
            header.disk_guid,
            partitions.len()
        );
        Ok(Some(Self {
            disk_guid: header.disk_guid,
            header,
            partitions,
        }))
    }

    pub fn header(&self) -> &GptHeader {
        &self.header
    }

    pub fn disk_guid_value(&self) -> Guid {
        self.disk_guid
    }
}

impl PartitionTable for GuidPartitionTable {
    fn table_type(&self) -> &'static str {
        "GPT"
    }

    fn disk_guid(&self) -> Option<Guid> {
        Some(self.disk_guid)
    }

    fn partitions(&self) -> &[PartitionInfo] {
        &self.partitions
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use super::*;
    use binrw::BinWrite;

    /// Builds a minimal valid GPT disk image: protective MBR, primary header
    /// at LBA 1, entry array at LBA 2.
    pub fn build_gpt_image(
        disk_guid: Guid,
        entries: &[GptEntry],
        total_sectors: u64,
    ) -> Vec<u8> {
        const ENTRY_COUNT: u32 = 16;

        let mut image = vec![0u8; (total_sectors * 512) as usize];

        // Protective MBR covering the whole disk.
        let mut mbr = crate::mbr::BootSector::empty();
        mbr.entries[0] = crate::mbr::MbrPartitionEntry {
            status: crate::mbr::PartitionStatus::new(),
            chs_first: [0, 2, 0],
            partition_type: 0xEE,
            chs_last: [0xFF, 0xFF, 0xFF],
            first_lba: 1,
            sector_count: (total_sectors - 1) as u32,
        };
        mbr.write_le(&mut Cursor::new(&mut image[..512])).unwrap();

        // Entry array at LBA 2.
        let mut array = vec![0u8; (ENTRY_COUNT * 128) as usize];
        for (slot, entry) in entries.iter().enumerate() {
            let mut cursor = Cursor::new(&mut array[slot * 128..(slot + 1) * 128]);
            entry.write_le(&mut cursor).unwrap();
        }
        let entries_crc = crc32fast::hash(&array);
        image[1024..1024 + array.len()].copy_from_slice(&array);

        let mut header = GptHeader {
            revision: GptHeader::REVISION_1,
            header_size: GPT_HEADER_MIN_SIZE,
            header_crc: 0,
            reserved: 0,
            current_lba: 1,
            backup_lba: total_sectors - 1,
            first_usable_lba: 2 + u64::from(ENTRY_COUNT * 128 / 512),
            last_usable_lba: total_sectors - 2,
            disk_guid,
            entry_array_lba: 2,
            entry_count: ENTRY_COUNT,
            entry_size: 128,
            entries_crc,
        };

        let mut sector = vec![0u8; 512];
        header.write_le(&mut Cursor::new(&mut sector[..])).unwrap();
        header.header_crc = GptHeader::compute_crc(&sector, header.header_size);
        header.write_le(&mut Cursor::new(&mut image[512..1024])).unwrap();

        image
    }

    pub fn entry(type_guid: Guid, first_lba: u64, last_lba: u64, name: &str) -> GptEntry {
        GptEntry {
            type_guid,
            unique_guid: Guid::generate(),
            first_lba,
            last_lba,
            attributes: GptPartitionAttributes::new(),
            name_utf16: GptEntry::encode_name(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::{build_gpt_image, entry};
    use super::*;
    use vdisk_stream::{MemoryStream, shared};

    #[test]
    fn test_open_round_trip() {
        let disk_guid = Guid::generate();
        let esp = entry(partition_types::EFI_SYSTEM, 64, 127, "EFI system");
        let data = entry(partition_types::BASIC_DATA, 128, 511, "data");
        let image = build_gpt_image(disk_guid, &[esp.clone(), data.clone()], 1024);

        let stream = shared(MemoryStream::read_only(image));
        let table = GuidPartitionTable::open(&stream, 512).unwrap().unwrap();

        assert_eq!(table.disk_guid_value(), disk_guid);
        let parts = table.partitions();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].type_guid, Some(partition_types::EFI_SYSTEM));
        assert_eq!(parts[0].unique_guid, Some(esp.unique_guid));
        assert_eq!(parts[0].first_sector, 64);
        assert_eq!(parts[0].sector_count, 64);
        assert_eq!(parts[1].first_sector, 128);
        assert_eq!(parts[1].sector_count, 384);
    }

    #[test]
    fn test_non_gpt_disk_is_none() {
        let stream = shared(MemoryStream::read_only(vec![0u8; 4096]));
        assert!(GuidPartitionTable::open(&stream, 512).unwrap().is_none());
        assert!(!GuidPartitionTable::detect(&stream, 512));
    }

    #[test]
    fn test_corrupt_header_crc_is_invalid_data() {
        let image = build_gpt_image(
            Guid::generate(),
            &[entry(partition_types::BASIC_DATA, 64, 127, "p")],
            1024,
        );
        let mut corrupted = image.clone();
        corrupted[512 + 40] ^= 0xFF; // flip a byte inside the header

        let stream = shared(MemoryStream::read_only(corrupted));
        assert!(matches!(
            GuidPartitionTable::open(&stream, 512),
            Err(PartitionError::InvalidData(_))
        ));
    }

    #[test]
    fn test_corrupt_entry_array_is_invalid_data() {
        let mut image = build_gpt_image(
            Guid::generate(),
            &[entry(partition_types::BASIC_DATA, 64, 127, "p")],
            1024,
        );
        image[1024] ^= 0xFF; // flip a byte inside the first entry

        let stream = shared(MemoryStream::read_only(image));
        assert!(matches!(
            GuidPartitionTable::open(&stream, 512),
            Err(PartitionError::InvalidData(_))
        ));
    }

    #[test]
    fn test_entry_name_codec() {
        let name_utf16 = GptEntry::encode_name("boot");
        let e = GptEntry {
            type_guid: partition_types::LINUX_FILESYSTEM,
            unique_guid: Guid::ZERO,
            first_lba: 1,
            last_lba: 1,
            attributes: GptPartitionAttributes::new(),
            name_utf16,
        };
        assert_eq!(e.name(), "boot");
    }

    #[test]
    fn test_attribute_bits_round_trip() {
        let attrs = GptPartitionAttributes::new()
            .with_required_partition(true)
            .with_legacy_bios_bootable(true);
        let raw = u64::from_le_bytes(attrs.into_bytes());
        assert_eq!(raw, 0b101);
        assert_eq!(GptPartitionAttributes::from_bytes(raw.to_le_bytes()), attrs);
    }
}
