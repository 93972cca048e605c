//! Version - immutable snapshot of active SSTable files.

use std::sync::{Arc, OnceLock};

use crate::options::MAX_LEVELS;
use crate::types::InternalKey;

use super::FileMetadata;

/// An immutable snapshot of all SSTable files at a point in time.
///
/// Every file in a snapshot holds one reference for as long as the snapshot
/// lives. When the last snapshot containing a file is dropped the file's
/// count reaches zero and its bytes may be reclaimed.
#[derive(Debug)]
pub struct Version {
    /// Files at each level (0 to MAX_LEVELS-1).
    /// Level 0 files may overlap; higher levels are sorted and non-overlapping.
    files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],

    /// Where the next compaction of each level starts.
    compact_pointers: [Option<InternalKey>; MAX_LEVELS],

    /// Compaction score for this version.
    /// 1.0 or more means compaction is needed.
    compaction_score: f64,

    /// Level that should be compacted next.
    compaction_level: usize,

    /// Total file size at each level.
    level_sizes: [u64; MAX_LEVELS],

    /// Whether lookups are charged against allowed seeks.
    seek_compaction: bool,

    /// First file whose seek budget ran out, as (level, file_number).
    seek_candidate: OnceLock<(usize, u64)>,
}

impl Version {
    /// Create an empty version.
    pub fn new() -> Self {
        Self::with_files(Default::default(), Default::default())
    }

    /// Create a version with the given files, taking a reference on each.
    pub fn with_files(
        files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],
        compact_pointers: [Option<InternalKey>; MAX_LEVELS],
    ) -> Self {
        let mut level_sizes = [0u64; MAX_LEVELS];
        for (level, level_files) in files.iter().enumerate() {
            for file in level_files {
                file.add_ref();
            }
            level_sizes[level] = level_files.iter().map(|f| f.file_size()).sum();
        }

        Self {
            files,
            compact_pointers,
            compaction_score: 0.0,
            compaction_level: 0,
            level_sizes,
            seek_compaction: true,
            seek_candidate: OnceLock::new(),
        }
    }

    /// Get files at a specific level.
    pub fn files(&self, level: usize) -> &[Arc<FileMetadata>] {
        &self.files[level]
    }

    /// Get number of files at a level.
    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// Get total number of files across all levels.
    pub fn total_files(&self) -> usize {
        self.files.iter().map(|f| f.len()).sum()
    }

    /// Get total size at a level.
    pub fn level_size(&self, level: usize) -> u64 {
        self.level_sizes[level]
    }

    /// Get the compaction pointer for a level.
    pub fn compact_pointer(&self, level: usize) -> Option<&InternalKey> {
        self.compact_pointers[level].as_ref()
    }

    pub(crate) fn compact_pointers(&self) -> &[Option<InternalKey>; MAX_LEVELS] {
        &self.compact_pointers
    }

    /// Get the compaction score.
    pub fn compaction_score(&self) -> f64 {
        self.compaction_score
    }

    /// Get the level that should be compacted next.
    pub fn compaction_level(&self) -> usize {
        self.compaction_level
    }

    /// Check if compaction is needed.
    pub fn needs_compaction(&self) -> bool {
        self.compaction_score >= 1.0 || self.seek_candidate.get().is_some()
    }

    pub(crate) fn set_compaction_info(&mut self, score: f64, level: usize) {
        self.compaction_score = score;
        self.compaction_level = level;
    }

    pub(crate) fn set_seek_compaction(&mut self, enabled: bool) {
        self.seek_compaction = enabled;
    }

    /// Find a file by number.
    pub fn find_file(&self, file_number: u64) -> Option<(usize, &Arc<FileMetadata>)> {
        self.all_files().find(|(_, f)| f.file_number() == file_number)
    }

    /// Charge a lookup that had to read `file` at `level`.
    ///
    /// Returns true if this exhausted the file's budget and made it the
    /// snapshot's seek-compaction candidate.
    pub fn record_seek(&self, level: usize, file: &FileMetadata) -> bool {
        if !self.seek_compaction || !file.record_seek() {
            return false;
        }
        self.seek_candidate.set((level, file.file_number())).is_ok()
    }

    /// File picked for seek-triggered compaction, as (level, file_number).
    pub fn seek_candidate(&self) -> Option<(usize, u64)> {
        self.seek_candidate.get().copied()
    }

    /// Find files that overlap with a user-key range at a given level.
    pub fn get_overlapping_files(
        &self,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> Vec<Arc<FileMetadata>> {
        if level == 0 {
            // Level 0 files may overlap, check all
            return self.files[0]
                .iter()
                .filter(|f| f.overlaps(smallest, largest))
                .cloned()
                .collect();
        }

        // Higher levels are sorted, use binary search
        let files = &self.files[level];
        let start_idx = files.partition_point(|f| f.largest().user_key() < smallest);

        files[start_idx..]
            .iter()
            .take_while(|f| f.smallest().user_key() <= largest)
            .cloned()
            .collect()
    }

    /// Get an iterator over all files at all levels.
    pub fn all_files(&self) -> impl Iterator<Item = (usize, &Arc<FileMetadata>)> {
        self.files
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.iter().map(move |f| (level, f)))
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Version {
    fn drop(&mut self) {
        for (level, file) in self.all_files() {
            if file.release_ref() == 0 {
                log::debug!(
                    "File {} at L{} is no longer referenced by any version",
                    file.file_number(),
                    level
                );
            }
        }
    }
}
