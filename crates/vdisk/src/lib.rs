//! Disk, partition and logical-volume discovery.
//!
//! [`VolumeManager`] takes one or more disk streams, scans partition tables
//! and registered [`LogicalVolumeFactory`] implementations, and hands back
//! volume records whose `open` methods produce flat
//! [`SparseStream`][vdisk_stream::SparseStream] views for file-system code.

#![forbid(unsafe_code)]

pub mod disk;
pub mod error;
pub mod factory;
pub mod volmgr;
pub mod volumes;

pub use disk::Disk;
pub use error::Error;
pub use factory::{LogicalVolumeFactory, register_logical_volume_factory};
pub use volmgr::VolumeManager;
pub use volumes::{
    LogicalVolumeInfo, LogicalVolumeStatus, PhysicalVolumeInfo, PhysicalVolumeType, VolumeInfo,
    VolumeOpener,
};

pub use vdisk_part as part;
pub use vdisk_part::{Guid, PartitionInfo, PartitionTable};
pub use vdisk_stream::*;

/// Volume result type
pub type Result<T> = std::result::Result<T, Error>;
