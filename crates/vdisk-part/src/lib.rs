//! Partition table parsing: MBR (BIOS) and GPT.
//!
//! The probing entry points ([`get_partition_tables`], [`is_partitioned`])
//! try GPT first; a valid GPT claims the disk and its protective MBR is not
//! reported as a second table.

#![forbid(unsafe_code)]

pub mod error;
pub mod gpt;
pub mod guid;
pub mod mbr;
pub mod table;

pub use error::PartitionError;
pub use gpt::{GptEntry, GptHeader, GptPartitionAttributes, GuidPartitionTable};
pub use guid::Guid;
pub use mbr::{BiosPartitionTable, BootSector, MbrPartitionEntry, PartitionStatus};
pub use table::{PartitionInfo, PartitionTable, get_partition_tables, is_partitioned};

/// Partition result type
pub type Result<T> = std::result::Result<T, PartitionError>;
