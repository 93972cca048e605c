//! File metadata for SSTable files.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering as AtomicOrdering};

use crate::options::{BYTES_PER_SEEK, DEFAULT_ALLOWED_SEEKS, MIN_ALLOWED_SEEKS};
use crate::types::InternalKey;

/// Metadata about an SSTable file.
///
/// The identity and key range are fixed at construction. Everything else is
/// bookkeeping owned by the catalog: reference counts and seek budgets are
/// atomics because one record is shared by every snapshot that contains the
/// file, and the lifetime fields are written by the edit that adds or
/// retires the file.
#[derive(Debug)]
pub struct FileMetadata {
    /// Number of live snapshots referencing this file.
    refs: AtomicU32,
    /// Remaining lookups before a seek-triggered compaction.
    allowed_seeks: AtomicI64,

    file_number: u64,
    file_size: u64,
    smallest: InternalKey,
    largest: InternalKey,

    /// Epoch seconds.
    create_time: u64,
    delete_time: u64,
    real_lifetime: u64,

    avg_estimate: u64,
    calc_estimate: u64,
    fused_estimate: u64,

    creating_compaction_id: u64,
    deleting_compaction_id: u64,

    is_size_triggered: bool,
    is_passive_removal: bool,
    is_delete_tombstone: bool,
}

impl FileMetadata {
    /// Create new file metadata with default bookkeeping.
    ///
    /// # Panics
    ///
    /// Panics if `smallest` orders after `largest`.
    pub fn new(
        file_number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) -> Self {
        assert!(
            smallest <= largest,
            "file {file_number}: smallest key {smallest:?} orders after largest key {largest:?}"
        );

        Self {
            refs: AtomicU32::new(0),
            allowed_seeks: AtomicI64::new(DEFAULT_ALLOWED_SEEKS),
            file_number,
            file_size,
            smallest,
            largest,
            create_time: 0,
            delete_time: 0,
            real_lifetime: 0,
            avg_estimate: 0,
            calc_estimate: 0,
            fused_estimate: 0,
            creating_compaction_id: 0,
            deleting_compaction_id: 0,
            is_size_triggered: false,
            is_passive_removal: false,
            is_delete_tombstone: false,
        }
    }

    /// Get the file number.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Get the file size.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Get the smallest key.
    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    /// Get the largest key.
    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    /// Number of snapshots currently referencing this file.
    pub fn refs(&self) -> u32 {
        self.refs.load(AtomicOrdering::Acquire)
    }

    /// Get allowed seeks remaining.
    pub fn allowed_seeks(&self) -> i64 {
        self.allowed_seeks.load(AtomicOrdering::Relaxed)
    }

    pub fn create_time(&self) -> u64 {
        self.create_time
    }

    pub fn delete_time(&self) -> u64 {
        self.delete_time
    }

    /// Observed lifetime, known once the file has been retired.
    pub fn real_lifetime(&self) -> u64 {
        self.real_lifetime
    }

    /// Historical running-average lifetime estimate.
    pub fn avg_estimate(&self) -> u64 {
        self.avg_estimate
    }

    /// Model-based lifetime estimate.
    pub fn calc_estimate(&self) -> u64 {
        self.calc_estimate
    }

    /// Reconciled lifetime estimate.
    pub fn fused_estimate(&self) -> u64 {
        self.fused_estimate
    }

    pub fn creating_compaction_id(&self) -> u64 {
        self.creating_compaction_id
    }

    pub fn deleting_compaction_id(&self) -> u64 {
        self.deleting_compaction_id
    }

    pub fn is_size_triggered(&self) -> bool {
        self.is_size_triggered
    }

    pub fn is_passive_removal(&self) -> bool {
        self.is_passive_removal
    }

    pub fn is_delete_tombstone(&self) -> bool {
        self.is_delete_tombstone
    }

    /// Check if the file's key range overlaps with the given user-key range.
    pub fn overlaps(&self, smallest: &[u8], largest: &[u8]) -> bool {
        self.largest.user_key() >= smallest && self.smallest.user_key() <= largest
    }

    /// Check if a user key might be in this file.
    pub fn may_contain_key(&self, user_key: &[u8]) -> bool {
        user_key >= self.smallest.user_key() && user_key <= self.largest.user_key()
    }

    /// Charge one seek. Returns true once the budget is exhausted.
    ///
    /// Lookups go through [`Version::record_seek`](super::Version::record_seek).
    pub(crate) fn record_seek(&self) -> bool {
        self.allowed_seeks.fetch_sub(1, AtomicOrdering::Relaxed) <= 1
    }

    pub(crate) fn set_estimates(
        &mut self,
        avg_estimate: u64,
        calc_estimate: u64,
        fused_estimate: u64,
        creating_compaction_id: u64,
    ) {
        self.avg_estimate = avg_estimate;
        self.calc_estimate = calc_estimate;
        self.fused_estimate = fused_estimate;
        self.creating_compaction_id = creating_compaction_id;
    }

    pub(crate) fn set_create_time(&mut self, create_time: u64) {
        self.create_time = create_time;
    }

    /// Record that the file left the catalog at `now`.
    pub(crate) fn retire(&mut self, now: u64, removal: Option<&super::RemovedFile>) {
        self.delete_time = now;
        self.real_lifetime = now.saturating_sub(self.create_time);
        if let Some(removal) = removal {
            self.deleting_compaction_id = removal.deleting_compaction_id;
            self.is_size_triggered = removal.is_size_triggered;
            self.is_passive_removal = removal.is_passive_removal;
            self.is_delete_tombstone = removal.is_delete_tombstone;
        }
    }

    /// Seek budget scales with file size: one seek costs about as much as
    /// compacting `BYTES_PER_SEEK` bytes.
    pub(crate) fn reset_allowed_seeks(&self) {
        let seeks = std::cmp::max(MIN_ALLOWED_SEEKS, (self.file_size / BYTES_PER_SEEK) as i64);
        self.allowed_seeks.store(seeks, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_ref(&self) {
        self.refs.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Drop one reference and return how many remain.
    pub(crate) fn release_ref(&self) -> u32 {
        let prev = self.refs.fetch_sub(1, AtomicOrdering::AcqRel);
        assert!(prev > 0, "file {} released more often than referenced", self.file_number);
        prev - 1
    }

    /// Same staged content, ignoring reference counts and seek budget.
    pub(crate) fn same_content(&self, other: &Self) -> bool {
        self.file_number == other.file_number
            && self.file_size == other.file_size
            && self.smallest == other.smallest
            && self.largest == other.largest
            && self.create_time == other.create_time
            && self.avg_estimate == other.avg_estimate
            && self.calc_estimate == other.calc_estimate
            && self.fused_estimate == other.fused_estimate
            && self.creating_compaction_id == other.creating_compaction_id
    }
}

impl Clone for FileMetadata {
    /// Cloned records start unreferenced; the seek budget is carried over.
    fn clone(&self) -> Self {
        Self {
            refs: AtomicU32::new(0),
            allowed_seeks: AtomicI64::new(self.allowed_seeks()),
            file_number: self.file_number,
            file_size: self.file_size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            create_time: self.create_time,
            delete_time: self.delete_time,
            real_lifetime: self.real_lifetime,
            avg_estimate: self.avg_estimate,
            calc_estimate: self.calc_estimate,
            fused_estimate: self.fused_estimate,
            creating_compaction_id: self.creating_compaction_id,
            deleting_compaction_id: self.deleting_compaction_id,
            is_size_triggered: self.is_size_triggered,
            is_passive_removal: self.is_passive_removal,
            is_delete_tombstone: self.is_delete_tombstone,
        }
    }
}

impl PartialEq for FileMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.file_number == other.file_number
    }
}

impl Eq for FileMetadata {}

impl PartialOrd for FileMetadata {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileMetadata {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sort by smallest key first, then by file number for stability
        match self.smallest.cmp(&other.smallest) {
            Ordering::Equal => self.file_number.cmp(&other.file_number),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;
    use bytes::Bytes;

    fn make_key(user_key: &[u8], seq: u64) -> InternalKey {
        InternalKey::new(Bytes::copy_from_slice(user_key), seq, ValueType::Value)
    }

    #[test]
    fn test_file_metadata_defaults() {
        let meta = FileMetadata::new(1, 1024, make_key(b"aaa", 1), make_key(b"zzz", 100));

        assert_eq!(meta.file_number(), 1);
        assert_eq!(meta.file_size(), 1024);
        assert_eq!(meta.smallest().user_key(), b"aaa");
        assert_eq!(meta.largest().user_key(), b"zzz");

        assert_eq!(meta.refs(), 0);
        assert_eq!(meta.allowed_seeks(), 1 << 30);
        assert_eq!(meta.create_time(), 0);
        assert_eq!(meta.delete_time(), 0);
        assert_eq!(meta.real_lifetime(), 0);
        assert_eq!(meta.avg_estimate(), 0);
        assert_eq!(meta.calc_estimate(), 0);
        assert_eq!(meta.fused_estimate(), 0);
        assert_eq!(meta.creating_compaction_id(), 0);
        assert_eq!(meta.deleting_compaction_id(), 0);
        assert!(!meta.is_size_triggered());
        assert!(!meta.is_passive_removal());
        assert!(!meta.is_delete_tombstone());
    }

    #[test]
    fn test_single_key_file() {
        let key = make_key(b"only", 9);
        let meta = FileMetadata::new(5, 10, key.clone(), key);
        assert!(meta.may_contain_key(b"only"));
    }

    #[test]
    #[should_panic(expected = "orders after largest key")]
    fn test_inverted_range_panics() {
        let _ = FileMetadata::new(1, 10, make_key(b"b", 5), make_key(b"a", 10));
    }

    #[test]
    #[should_panic(expected = "orders after largest key")]
    fn test_inverted_sequence_panics() {
        // Same user key: the older entry sorts later.
        let _ = FileMetadata::new(1, 10, make_key(b"k", 1), make_key(b"k", 2));
    }

    #[test]
    fn test_file_metadata_overlaps() {
        let meta = FileMetadata::new(1, 1024, make_key(b"bbb", 1), make_key(b"ddd", 100));

        assert!(meta.overlaps(b"aaa", b"ccc")); // Left overlap
        assert!(meta.overlaps(b"ccc", b"eee")); // Right overlap
        assert!(meta.overlaps(b"aaa", b"eee")); // Contains file
        assert!(meta.overlaps(b"bbb", b"ddd")); // Exact match

        assert!(!meta.overlaps(b"aaa", b"aaz")); // Before
        assert!(!meta.overlaps(b"eee", b"zzz")); // After
    }

    #[test]
    fn test_file_metadata_may_contain() {
        let meta = FileMetadata::new(1, 1024, make_key(b"bbb", 1), make_key(b"ddd", 100));

        assert!(meta.may_contain_key(b"bbb"));
        assert!(meta.may_contain_key(b"ccc"));
        assert!(meta.may_contain_key(b"ddd"));
        assert!(!meta.may_contain_key(b"aaa"));
        assert!(!meta.may_contain_key(b"eee"));
    }

    #[test]
    fn test_file_metadata_ordering() {
        let meta1 = FileMetadata::new(1, 100, make_key(b"aaa", 1), make_key(b"bbb", 1));
        let meta2 = FileMetadata::new(2, 100, make_key(b"ccc", 1), make_key(b"ddd", 1));
        let meta3 = FileMetadata::new(3, 100, make_key(b"aaa", 1), make_key(b"ccc", 1));

        assert!(meta1 < meta2);
        assert!(meta1 < meta3); // Same smallest, file_number 1 < 3
        assert!(meta3 < meta2);
    }

    #[test]
    fn test_allowed_seeks() {
        let meta = FileMetadata::new(1, 100 * BYTES_PER_SEEK + 5, make_key(b"a", 1), make_key(b"z", 1));
        meta.reset_allowed_seeks();
        assert_eq!(meta.allowed_seeks(), 100);

        let big = FileMetadata::new(2, 1000 * BYTES_PER_SEEK, make_key(b"a", 1), make_key(b"z", 1));
        big.reset_allowed_seeks();
        assert_eq!(big.allowed_seeks(), 1000);

        for _ in 0..99 {
            assert!(!meta.record_seek());
        }
        assert!(meta.record_seek());
        assert_eq!(meta.allowed_seeks(), 0);
    }

    #[test]
    fn test_refs() {
        let meta = FileMetadata::new(1, 10, make_key(b"a", 1), make_key(b"b", 1));
        meta.add_ref();
        meta.add_ref();
        assert_eq!(meta.refs(), 2);
        assert_eq!(meta.release_ref(), 1);
        assert_eq!(meta.release_ref(), 0);

        // Clones do not inherit references.
        meta.add_ref();
        assert_eq!(meta.clone().refs(), 0);
    }

    #[test]
    fn test_retire_records_lifetime() {
        let mut meta = FileMetadata::new(1, 10, make_key(b"a", 1), make_key(b"b", 1));
        meta.set_create_time(1_000);

        let removal = super::super::RemovedFile {
            file_number: 1,
            deleting_compaction_id: 42,
            is_size_triggered: true,
            is_passive_removal: false,
            is_delete_tombstone: true,
        };
        meta.retire(1_600, Some(&removal));

        assert_eq!(meta.delete_time(), 1_600);
        assert_eq!(meta.real_lifetime(), 600);
        assert_eq!(meta.deleting_compaction_id(), 42);
        assert!(meta.is_size_triggered());
        assert!(!meta.is_passive_removal());
        assert!(meta.is_delete_tombstone());
    }
}
