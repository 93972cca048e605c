//! Version Management for tracking active SSTable files.
//!
//! The version system provides:
//! - **FileMetadata**: Information about each SSTable file
//! - **EstimateSource**: How a new file's lifetime estimate is derived
//! - **VersionEdit**: Delta/changes to apply to a Version
//! - **Version**: Immutable snapshot of all files organized by level
//! - **VersionSet**: Serializes edits into the edit log and the current Version
//!
//! # LSM-Tree File Organization
//!
//! ```text
//! Level 0:  [SST-1] [SST-2] [SST-3]  (overlapping keys, newest first)
//! Level 1:  [SST-4][SST-5][SST-6]    (non-overlapping, sorted)
//! Level 2:  [SST-7][SST-8][SST-9][SST-10]  (non-overlapping, sorted)
//! ...
//! ```

mod file_metadata;
mod lifetime;
mod version;
mod version_edit;
mod version_set;

pub use file_metadata::FileMetadata;
pub use lifetime::{fuse_lifetime_estimates, EstimateSource};
pub use version::Version;
pub use version_edit::{RemovedFile, VersionEdit};
pub use version_set::{EditLog, MemoryEditLog, RetiredFile, VersionBuilder, VersionSet};

/// Tag values for encoding VersionEdit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EditTag {
    /// Comparator name.
    Comparator = 1,
    /// Log number.
    LogNumber = 2,
    /// Next file number.
    NextFileNumber = 3,
    /// Last sequence number.
    LastSequence = 4,
    /// Compaction pointer for a level.
    CompactPointer = 5,
    /// Deleted file (level, file_number).
    DeletedFile = 6,
    /// New file (level, file_number, size, smallest, largest, lifetime fields).
    NewFile = 7,
    /// Previous log number.
    PrevLogNumber = 9,
    /// Deleted file carrying removal annotations.
    AnnotatedDeletedFile = 10,
    /// Edit moves a single file between levels unchanged.
    TrivialMove = 11,
}

impl EditTag {
    /// Create from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(EditTag::Comparator),
            2 => Some(EditTag::LogNumber),
            3 => Some(EditTag::NextFileNumber),
            4 => Some(EditTag::LastSequence),
            5 => Some(EditTag::CompactPointer),
            6 => Some(EditTag::DeletedFile),
            7 => Some(EditTag::NewFile),
            9 => Some(EditTag::PrevLogNumber),
            10 => Some(EditTag::AnnotatedDeletedFile),
            11 => Some(EditTag::TrivialMove),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}
