//! The volume manager.

use indexmap::IndexMap;

use crate::factory::registered_factories;
use crate::{Disk, LogicalVolumeInfo, PhysicalVolumeInfo, VolumeInfo};
use vdisk_part::{BootSector, GuidPartitionTable};

/// Discovers physical volumes on registered disks and aggregates them into
/// logical volumes.
///
/// Disks can be added at any time; the next query after a change re-runs the
/// scan exactly once and swaps both volume maps in whole.
#[derive(Default)]
pub struct VolumeManager {
    disks: Vec<DiskRecord>,
    physical: IndexMap<String, PhysicalVolumeInfo>,
    logical: IndexMap<String, LogicalVolumeInfo>,
    needs_scan: bool,
}

struct DiskRecord {
    disk: Disk,
    identity: String,
}

impl VolumeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a disk and returns its stable identity.
    ///
    /// The identity is derived from the GPT disk GUID when present, else
    /// from a valid boot sector's nonzero 32-bit signature, else from the
    /// disk's insertion ordinal.
    pub fn add_disk(&mut self, disk: Disk) -> crate::Result<String> {
        let identity = derive_disk_identity(&disk, self.disks.len())?;
        log::debug!("added disk {identity}");
        self.disks.push(DiskRecord {
            disk,
            identity: identity.clone(),
        });
        self.needs_scan = true;
        Ok(identity)
    }

    /// All physical volumes across the registered disks, in discovery order.
    pub fn get_physical_volumes(&mut self) -> crate::Result<Vec<PhysicalVolumeInfo>> {
        self.ensure_scanned()?;
        Ok(self.physical.values().cloned().collect())
    }

    /// All logical volumes, in discovery order.
    pub fn get_logical_volumes(&mut self) -> crate::Result<Vec<LogicalVolumeInfo>> {
        self.ensure_scanned()?;
        Ok(self.logical.values().cloned().collect())
    }

    /// Looks a volume up by identity, preferring the logical map.
    pub fn get_volume(&mut self, identity: &str) -> crate::Result<Option<VolumeInfo>> {
        self.ensure_scanned()?;
        if let Some(volume) = self.logical.get(identity) {
            return Ok(Some(VolumeInfo::Logical(volume.clone())));
        }
        Ok(self
            .physical
            .get(identity)
            .map(|volume| VolumeInfo::Physical(volume.clone())))
    }

    /// Convenience: the physical volumes of a single disk.
    pub fn physical_volumes_of(disk: Disk) -> crate::Result<Vec<PhysicalVolumeInfo>> {
        let mut manager = Self::new();
        manager.add_disk(disk)?;
        manager.get_physical_volumes()
    }

    fn ensure_scanned(&mut self) -> crate::Result<()> {
        if !self.needs_scan {
            return Ok(());
        }
        let (physical, logical) = self.scan()?;
        // Swap both maps in whole; a failed scan leaves the old state.
        self.physical = physical;
        self.logical = logical;
        self.needs_scan = false;
        Ok(())
    }

    /// Phase 1 walks partition tables into physical volumes; phase 2 lets
    /// factories claim members and inject composites, wrapping the rest
    /// one-to-one.
    #[allow(clippy::type_complexity)]
    fn scan(
        &self,
    ) -> crate::Result<(
        IndexMap<String, PhysicalVolumeInfo>,
        IndexMap<String, LogicalVolumeInfo>,
    )> {
        let mut physical = IndexMap::new();
        for record in &self.disks {
            let tables = record.disk.partition_tables()?;
            if tables.is_empty() {
                log::trace!("disk {} is not partitioned", record.identity);
                let volume = PhysicalVolumeInfo::whole_disk(&record.disk, &record.identity)?;
                insert_unique(&mut physical, volume.identity().to_string(), volume);
                continue;
            }
            for table in tables {
                for partition in table.partitions() {
                    let volume = PhysicalVolumeInfo::from_partition(
                        &record.disk,
                        &record.identity,
                        partition.clone(),
                    );
                    insert_unique(&mut physical, volume.identity().to_string(), volume);
                }
            }
        }
        log::debug!("physical scan found {} volume(s)", physical.len());

        let factories = registered_factories();
        let mut logical = IndexMap::new();
        for volume in physical.values() {
            // The first factory claiming the volume wins; claimed volumes
            // surface through that factory's map_disks instead.
            let claimed = factories
                .iter()
                .find(|f| f.handles_physical_volume(volume));
            if let Some(factory) = claimed {
                log::trace!(
                    "physical volume {} claimed by factory {:?}",
                    volume.identity(),
                    factory.name()
                );
                continue;
            }
            let wrapped = LogicalVolumeInfo::passthrough(volume);
            insert_unique(&mut logical, wrapped.identity().to_string(), wrapped);
        }

        let disks: Vec<Disk> = self.disks.iter().map(|r| r.disk.clone()).collect();
        for factory in factories.iter() {
            factory.map_disks(&disks, &mut logical);
        }
        log::debug!("logical scan produced {} volume(s)", logical.len());

        Ok((physical, logical))
    }
}

fn insert_unique<V>(map: &mut IndexMap<String, V>, identity: String, value: V) {
    let previous = map.insert(identity.clone(), value);
    assert!(
        previous.is_none(),
        "duplicate volume identity {identity:?} during scan"
    );
}

/// Derives a disk's stable string identity.
fn derive_disk_identity(disk: &Disk, ordinal: usize) -> crate::Result<String> {
    if let Some(gpt) = GuidPartitionTable::open(disk.content(), disk.sector_size())? {
        let guid = gpt.disk_guid_value();
        if !guid.is_zero() {
            return Ok(format!("DG{guid}"));
        }
    }
    if let Some(sector) = BootSector::read_at(disk.content(), 0)? {
        if sector.is_valid() && sector.disk_signature != 0 {
            return Ok(format!("DS{:08X}", sector.disk_signature));
        }
    }
    Ok(format!("DO{ordinal}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volumes::{LogicalVolumeStatus, PhysicalVolumeType, VolumeOpener};
    use crate::{ConcatStream, MemoryStream, Ownership, SparseStream, shared};
    use binrw::BinWrite;
    use std::io::Cursor;
    use std::sync::Arc;
    use vdisk_part::mbr::{BootSector, MbrPartitionEntry, PartitionStatus};

    fn entry(partition_type: u8, first_lba: u32, sector_count: u32) -> MbrPartitionEntry {
        MbrPartitionEntry {
            status: PartitionStatus::new(),
            chs_first: [0; 3],
            partition_type,
            chs_last: [0; 3],
            first_lba,
            sector_count,
        }
    }

    fn mbr_disk(signature: u32, entries: &[MbrPartitionEntry], total_sectors: u64) -> Disk {
        let mut sector = BootSector::empty();
        sector.disk_signature = signature;
        sector.entries[..entries.len()].copy_from_slice(entries);

        let mut image = vec![0u8; (total_sectors * 512) as usize];
        sector.write_le(&mut Cursor::new(&mut image[..512])).unwrap();
        Disk::from_stream(MemoryStream::writable(image))
    }

    #[test_log::test]
    fn test_disk_identity_from_mbr_signature() {
        let mut manager = VolumeManager::new();
        let disk = mbr_disk(0xDEADBEEF, &[entry(0x83, 2048, 4096)], 8192);
        assert_eq!(manager.add_disk(disk).unwrap(), "DSDEADBEEF");
    }

    #[test_log::test]
    fn test_disk_identity_ordinal_fallback() {
        let mut manager = VolumeManager::new();
        let first = manager
            .add_disk(Disk::from_stream(MemoryStream::writable(vec![0; 4096])))
            .unwrap();
        let second = manager
            .add_disk(Disk::from_stream(MemoryStream::writable(vec![0; 4096])))
            .unwrap();
        assert_eq!(first, "DO0");
        assert_eq!(second, "DO1");
    }

    #[test_log::test]
    fn test_unsigned_mbr_falls_back_to_ordinal() {
        let mut manager = VolumeManager::new();
        let disk = mbr_disk(0, &[entry(0x83, 64, 64)], 256);
        assert_eq!(manager.add_disk(disk).unwrap(), "DO0");
    }

    #[test_log::test]
    fn test_whole_disk_passthrough() {
        let mut manager = VolumeManager::new();
        let id = manager
            .add_disk(Disk::from_stream(MemoryStream::writable(vec![0; 1 << 20])))
            .unwrap();

        let physical = manager.get_physical_volumes().unwrap();
        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].identity(), format!("VPD:{id}"));
        assert_eq!(physical[0].volume_type(), PhysicalVolumeType::EntireDisk);
        assert_eq!(physical[0].length(), 1 << 20);

        let logical = manager.get_logical_volumes().unwrap();
        assert_eq!(logical.len(), 1);
        assert_eq!(logical[0].identity(), physical[0].identity());
        assert_eq!(logical[0].length(), physical[0].length());
        assert_eq!(logical[0].status(), LogicalVolumeStatus::Healthy);
    }

    #[test_log::test]
    fn test_partitioned_disk_volumes() {
        let mut manager = VolumeManager::new();
        let disk = mbr_disk(
            0x0BADF00D,
            &[entry(0x83, 64, 64), entry(0x07, 128, 32)],
            256,
        );
        manager.add_disk(disk).unwrap();

        let physical = manager.get_physical_volumes().unwrap();
        assert_eq!(physical.len(), 2);
        assert_eq!(physical[0].identity(), "VPD:DS0BADF00D:0");
        assert_eq!(physical[1].identity(), "VPD:DS0BADF00D:1");
        assert_eq!(physical[0].bios_type(), 0x83);
        assert_eq!(physical[0].length(), 64 * 512);

        let mut volume = physical[0].open().unwrap();
        assert_eq!(volume.length().unwrap(), 64 * 512);
        // The window maps back onto the disk at the partition offset.
        let disk_id = manager.disks[0].disk.content().lock().id();
        assert_eq!(
            volume.position_in_base_stream(disk_id, 0).unwrap(),
            Some(64 * 512)
        );
    }

    #[test_log::test]
    fn test_repeated_queries_are_stable_and_dirty_tracking_rescans() {
        let mut manager = VolumeManager::new();
        manager
            .add_disk(mbr_disk(0x11111111, &[entry(0x83, 64, 64)], 256))
            .unwrap();

        let first: Vec<String> = manager
            .get_physical_volumes()
            .unwrap()
            .iter()
            .map(|v| v.identity().to_string())
            .collect();
        let second: Vec<String> = manager
            .get_physical_volumes()
            .unwrap()
            .iter()
            .map(|v| v.identity().to_string())
            .collect();
        assert_eq!(first, second);

        // Adding a disk marks the scan dirty; the next query sees it.
        manager
            .add_disk(Disk::from_stream(MemoryStream::writable(vec![0; 4096])))
            .unwrap();
        assert_eq!(manager.get_physical_volumes().unwrap().len(), 2);
    }

    #[test_log::test]
    fn test_get_volume_lookup() {
        let mut manager = VolumeManager::new();
        manager
            .add_disk(mbr_disk(0x22222222, &[entry(0x83, 64, 64)], 256))
            .unwrap();

        let volume = manager.get_volume("VPD:DS22222222:0").unwrap().unwrap();
        assert!(matches!(volume, VolumeInfo::Logical(_)));
        assert_eq!(volume.length(), 64 * 512);

        assert!(manager.get_volume("VPD:missing").unwrap().is_none());
    }

    #[test_log::test]
    fn test_static_convenience_scan() {
        let disk = mbr_disk(0x33333333, &[entry(0x83, 64, 64)], 256);
        let volumes = VolumeManager::physical_volumes_of(disk).unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].identity(), "VPD:DS33333333:0");
    }

    /// Marker type used by the spanned-volume test factory below.
    const SPAN_TYPE: u8 = 0x42;

    struct SpannedFactory;

    impl crate::LogicalVolumeFactory for SpannedFactory {
        fn name(&self) -> &'static str {
            "test-spanned"
        }

        fn handles_physical_volume(&self, volume: &PhysicalVolumeInfo) -> bool {
            volume.bios_type() == SPAN_TYPE
        }

        fn map_disks(
            &self,
            disks: &[Disk],
            volumes: &mut IndexMap<String, LogicalVolumeInfo>,
        ) {
            // Concatenate every SPAN_TYPE partition, in disk order, into one
            // spanned volume.
            let mut members = Vec::new();
            let mut total = 0u64;
            for disk in disks {
                let Ok(tables) = disk.partition_tables() else {
                    continue;
                };
                for table in tables {
                    for partition in table.partitions() {
                        if partition.bios_type == SPAN_TYPE {
                            total += partition.byte_length();
                            members.push((disk.clone(), partition.clone()));
                        }
                    }
                }
            }
            if members.is_empty() {
                return;
            }

            let opener: VolumeOpener = Arc::new(move || {
                let mut parts = Vec::new();
                for (disk, partition) in &members {
                    parts.push(shared(partition.open(disk.content())?));
                }
                let concat = ConcatStream::new(parts, Ownership::Dispose)?;
                Ok(Box::new(concat) as Box<dyn SparseStream>)
            });
            let volume = LogicalVolumeInfo::new(
                "VLS:test-spanned:0".to_string(),
                total,
                SPAN_TYPE,
                LogicalVolumeStatus::Healthy,
                opener,
            );
            volumes.insert(volume.identity().to_string(), volume);
        }
    }

    #[test_log::test]
    fn test_spanned_factory_claims_and_maps() {
        crate::register_logical_volume_factory(Arc::new(SpannedFactory));

        let disk_a = mbr_disk(0x44440001, &[entry(SPAN_TYPE, 64, 16)], 128);
        let disk_b = mbr_disk(0x44440002, &[entry(SPAN_TYPE, 64, 32)], 128);

        // Put recognisable bytes at the start of each member partition.
        disk_a.content().lock().set_position(64 * 512).unwrap();
        disk_a.content().lock().write(b"AAAA").unwrap();
        disk_b.content().lock().set_position(64 * 512).unwrap();
        disk_b.content().lock().write(b"BBBB").unwrap();

        let mut manager = VolumeManager::new();
        manager.add_disk(disk_a).unwrap();
        manager.add_disk(disk_b).unwrap();

        // Both members are claimed: no passthrough wrapping, only the
        // factory's composite volume.
        let logical = manager.get_logical_volumes().unwrap();
        assert_eq!(logical.len(), 1);
        let spanned = &logical[0];
        assert_eq!(spanned.identity(), "VLS:test-spanned:0");
        assert_eq!(spanned.length(), (16 + 32) * 512);

        // The physical members are still visible in the physical map.
        assert_eq!(manager.get_physical_volumes().unwrap().len(), 2);

        // The composite stream is a concat of the member windows.
        let mut stream = spanned.open().unwrap();
        assert_eq!(stream.length().unwrap(), (16 + 32) * 512);

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AAAA");

        stream.set_position(16 * 512).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"BBBB");
    }
}
