//! Top-level error type.

use thiserror::Error;
use vdisk_part::PartitionError;
use vdisk_stream::StreamError;

/// Errors surfaced by disk and volume discovery.
#[derive(Debug, Error)]
pub enum Error {
    /// A stream operation failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A partition table failed to decode.
    #[error(transparent)]
    Partition(#[from] PartitionError),
}
