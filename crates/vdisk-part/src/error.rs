//! Partition-layer error type.

use thiserror::Error;
use vdisk_stream::StreamError;

/// Errors raised while probing or decoding partition tables.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// On-disk data is structurally malformed (bad checksum, impossible
    /// geometry). Not raised for data that simply is not a partition table.
    #[error("invalid partition table data: {0}")]
    InvalidData(String),

    /// A binrw-level decoding failure.
    #[error("malformed structure: {0}")]
    Format(#[from] binrw::Error),

    /// The underlying stream failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}
