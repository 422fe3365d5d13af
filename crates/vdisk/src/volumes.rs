//! Physical and logical volume records.

use std::fmt;
use std::sync::Arc;

use crate::Disk;
use vdisk_part::PartitionInfo;
use vdisk_stream::{Ownership, SparseStream, SubStream};

/// Produces a fresh stream over a volume's contents on each call.
pub type VolumeOpener = Arc<dyn Fn() -> crate::Result<Box<dyn SparseStream>>>;

/// How a physical volume was discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalVolumeType {
    /// A partition from a GUID partition table.
    GptPartition,
    /// A partition from an MBR partition table.
    BiosPartition,
    /// A disk with no recognised partition table, taken whole.
    EntireDisk,
}

/// A disk region (or whole disk) that could hold a file system.
#[derive(Clone)]
pub struct PhysicalVolumeInfo {
    identity: String,
    disk_identity: String,
    volume_type: PhysicalVolumeType,
    disk: Disk,
    partition: Option<PartitionInfo>,
    length: u64,
}

impl PhysicalVolumeInfo {
    /// Wraps one partition of a scanned disk.
    ///
    /// GPT partitions are identified by their unique partition GUID, MBR
    /// partitions by their table slot; both are stable across scans.
    pub(crate) fn from_partition(
        disk: &Disk,
        disk_identity: &str,
        partition: PartitionInfo,
    ) -> Self {
        let (volume_type, identity) = match partition.unique_guid {
            Some(guid) => (
                PhysicalVolumeType::GptPartition,
                format!("VPD:{disk_identity}:{guid}"),
            ),
            None => (
                PhysicalVolumeType::BiosPartition,
                format!("VPD:{disk_identity}:{}", partition.index),
            ),
        };
        let length = partition.byte_length();
        Self {
            identity,
            disk_identity: disk_identity.to_string(),
            volume_type,
            disk: disk.clone(),
            partition: Some(partition),
            length,
        }
    }

    /// Wraps an unpartitioned disk whole.
    pub(crate) fn whole_disk(disk: &Disk, disk_identity: &str) -> crate::Result<Self> {
        Ok(Self {
            identity: format!("VPD:{disk_identity}"),
            disk_identity: disk_identity.to_string(),
            volume_type: PhysicalVolumeType::EntireDisk,
            disk: disk.clone(),
            partition: None,
            length: disk.capacity()?,
        })
    }

    /// Globally unique, stable volume identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Identity of the disk this volume lives on.
    pub fn disk_identity(&self) -> &str {
        &self.disk_identity
    }

    pub fn volume_type(&self) -> PhysicalVolumeType {
        self.volume_type
    }

    /// Volume length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// BIOS partition type byte; zero for GPT partitions and whole disks.
    pub fn bios_type(&self) -> u8 {
        self.partition.as_ref().map_or(0, |p| p.bios_type)
    }

    /// The underlying partition record, when the volume is one.
    pub fn partition(&self) -> Option<&PartitionInfo> {
        self.partition.as_ref()
    }

    /// Opens the volume contents as a stream window over the disk.
    pub fn open(&self) -> crate::Result<Box<dyn SparseStream>> {
        let window = match &self.partition {
            Some(partition) => partition.open(self.disk.content())?,
            None => SubStream::new(
                self.disk.content().clone(),
                Ownership::None,
                0,
                self.length,
            )?,
        };
        Ok(Box::new(window))
    }
}

impl fmt::Debug for PhysicalVolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalVolumeInfo")
            .field("identity", &self.identity)
            .field("volume_type", &self.volume_type)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Health of a logical volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogicalVolumeStatus {
    #[default]
    Healthy,
    /// Usable, but one or more redundant members are missing.
    FailedRedundancy,
    Failed,
}

/// A file-system-visible volume, possibly spanning several physical volumes.
#[derive(Clone)]
pub struct LogicalVolumeInfo {
    identity: String,
    length: u64,
    bios_type: u8,
    status: LogicalVolumeStatus,
    opener: VolumeOpener,
}

impl LogicalVolumeInfo {
    /// Creates a logical volume record. Used by
    /// [`LogicalVolumeFactory`][crate::LogicalVolumeFactory] implementations
    /// to publish composite volumes.
    pub fn new(
        identity: String,
        length: u64,
        bios_type: u8,
        status: LogicalVolumeStatus,
        opener: VolumeOpener,
    ) -> Self {
        Self {
            identity,
            length,
            bios_type,
            status,
            opener,
        }
    }

    /// Wraps a physical volume one-to-one, reusing its identity.
    pub(crate) fn passthrough(volume: &PhysicalVolumeInfo) -> Self {
        let source = volume.clone();
        Self {
            identity: volume.identity().to_string(),
            length: volume.length(),
            bios_type: volume.bios_type(),
            status: LogicalVolumeStatus::Healthy,
            opener: Arc::new(move || source.open()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Volume length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn bios_type(&self) -> u8 {
        self.bios_type
    }

    pub fn status(&self) -> LogicalVolumeStatus {
        self.status
    }

    /// Opens the volume contents.
    pub fn open(&self) -> crate::Result<Box<dyn SparseStream>> {
        (self.opener)()
    }
}

impl fmt::Debug for LogicalVolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalVolumeInfo")
            .field("identity", &self.identity)
            .field("status", &self.status)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Either kind of volume, as returned by identity lookup.
#[derive(Clone, Debug)]
pub enum VolumeInfo {
    Physical(PhysicalVolumeInfo),
    Logical(LogicalVolumeInfo),
}

impl VolumeInfo {
    pub fn identity(&self) -> &str {
        match self {
            VolumeInfo::Physical(v) => v.identity(),
            VolumeInfo::Logical(v) => v.identity(),
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            VolumeInfo::Physical(v) => v.length(),
            VolumeInfo::Logical(v) => v.length(),
        }
    }

    pub fn open(&self) -> crate::Result<Box<dyn SparseStream>> {
        match self {
            VolumeInfo::Physical(v) => v.open(),
            VolumeInfo::Logical(v) => v.open(),
        }
    }
}
