//! # rustdb-catalog
//!
//! The file catalog of the rustdb LSM-tree: which table files exist at
//! which level, and the deltas that move it from one state to the next.
//!
//! ## Features
//!
//! - **Version edits**: Staged deltas with a stable, tagged binary encoding
//! - **File metadata**: Key range, seek budget, reference count and lifetime
//!   estimates per file
//! - **Lifetime fusion**: Reconciles a model estimate with a running average
//! - **Snapshots**: Readers hold an immutable [`Version`] while edits apply
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rustdb_catalog::{EstimateSource, InternalKey, MemoryEditLog, Options, VersionEdit, VersionSet};
//! use std::sync::Arc;
//!
//! let versions = VersionSet::new(Arc::new(Options::default()), MemoryEditLog::new())?;
//!
//! let mut edit = VersionEdit::new();
//! edit.add_file(
//!     0,
//!     versions.new_file_number(),
//!     4096,
//!     InternalKey::for_value(&b"apple"[..], 10),
//!     InternalKey::for_value(&b"mango"[..], 3),
//!     EstimateSource::Seed(3_600),
//! );
//! versions.log_and_apply(&mut edit)?;
//!
//! assert_eq!(versions.current().num_files(0), 1);
//! ```

// Public modules
pub mod error;
pub mod options;
pub mod types;
pub mod version;

// Internal modules
mod util;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{Options, OptionsBuilder, MAX_LEVELS};
pub use types::{InternalKey, ValueType};

// Catalog
pub use version::{
    fuse_lifetime_estimates, EditLog, EstimateSource, FileMetadata, MemoryEditLog, RemovedFile,
    RetiredFile, Version, VersionBuilder, VersionEdit, VersionSet,
};
