//! VersionSet - Manages current Version with atomic updates.
//!
//! The VersionSet is responsible for:
//! - Tracking the current Version
//! - Appending each VersionEdit to the edit log and applying it, in one
//!   total order
//! - Managing file number allocation
//! - Tracking sequence numbers
//!
//! Physical storage of the edit log lives behind the [`EditLog`] trait.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::options::{Options, MAX_LEVELS};
use crate::types::InternalKey;
use crate::{Error, Result};

use super::{FileMetadata, RemovedFile, Version, VersionEdit};

/// Append-only, durable sink for encoded edits.
pub trait EditLog: Send {
    /// Append one encoded edit as a single record.
    fn append(&mut self, record: &[u8]) -> Result<()>;

    /// Make every appended record durable.
    fn sync(&mut self) -> Result<()>;
}

/// In-memory [`EditLog`], used in tests and for throwaway catalogs.
#[derive(Debug, Default)]
pub struct MemoryEditLog {
    records: Vec<Bytes>,
    synced: usize,
    fail_appends: bool,
}

impl MemoryEditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended so far.
    pub fn records(&self) -> &[Bytes] {
        &self.records
    }

    /// Number of records covered by the last sync.
    pub fn synced(&self) -> usize {
        self.synced
    }

    /// Make subsequent appends fail, simulating a full or broken device.
    pub fn set_fail_appends(&mut self, fail: bool) {
        self.fail_appends = fail;
    }
}

impl EditLog for MemoryEditLog {
    fn append(&mut self, record: &[u8]) -> Result<()> {
        if self.fail_appends {
            return Err(Error::manifest("append rejected"));
        }
        self.records.push(Bytes::copy_from_slice(record));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.synced = self.records.len();
        Ok(())
    }
}

/// A file that left the catalog, with its lifetime filled in.
#[derive(Debug, Clone)]
pub struct RetiredFile {
    pub level: usize,
    pub file: FileMetadata,
}

#[derive(Debug, Default)]
struct LevelState {
    deleted: HashSet<u64>,
    added: BTreeMap<u64, Arc<FileMetadata>>,
}

/// Builder for creating a new Version from a base Version and edits.
pub struct VersionBuilder<'a> {
    base: &'a Version,
    levels: [LevelState; MAX_LEVELS],
    compact_pointers: [Option<InternalKey>; MAX_LEVELS],
    retired: Vec<RetiredFile>,
}

impl<'a> VersionBuilder<'a> {
    /// Create a builder on top of `base`.
    pub fn new(base: &'a Version) -> Self {
        Self {
            base,
            levels: Default::default(),
            compact_pointers: base.compact_pointers().clone(),
            retired: Vec::new(),
        }
    }

    /// Apply a VersionEdit to this builder. `now` is in epoch seconds.
    ///
    /// # Panics
    ///
    /// Panics if the edit adds a file number that is still live.
    pub fn apply(&mut self, edit: &VersionEdit, now: u64) {
        if let Err(err) = self.try_apply(edit, now) {
            panic!("{}", err);
        }
    }

    /// Apply an edit that came from outside the process, such as a log record.
    ///
    /// Adding a file number that is still live is reported as corruption.
    /// After an error the builder is partially updated and must be dropped.
    pub fn try_apply(&mut self, edit: &VersionEdit, now: u64) -> Result<()> {
        for (level, key) in edit.compact_pointers() {
            self.compact_pointers[*level] = Some(key.clone());
        }

        // Annotated removals first so their annotations win over a plain
        // removal of the same file.
        for (level, removal) in edit.annotated_removals() {
            self.remove(*level, removal.file_number, Some(removal), now);
        }
        for &(level, file_number) in edit.deleted_files() {
            self.remove(level, file_number, None, now);
        }

        for (level, file) in edit.new_files() {
            let number = file.file_number();
            let moved = if edit.is_trivial_move() {
                self.base.find_file(number).map(|(_, f)| Arc::clone(f))
            } else {
                None
            };

            let record = match moved {
                Some(existing) => {
                    self.retired.retain(|r| r.file.file_number() != number);
                    existing
                }
                None => {
                    if self.is_live(number) {
                        return Err(Error::corruption(format!(
                            "file number {} reused while still referenced",
                            number
                        )));
                    }
                    let mut fresh = file.clone();
                    if fresh.create_time() == 0 {
                        fresh.set_create_time(now);
                    }
                    fresh.reset_allowed_seeks();
                    Arc::new(fresh)
                }
            };

            let state = &mut self.levels[*level];
            state.deleted.remove(&number);
            state.added.insert(number, record);
        }

        Ok(())
    }

    fn is_live(&self, file_number: u64) -> bool {
        let in_base = self.base.all_files().any(|(level, f)| {
            f.file_number() == file_number && !self.levels[level].deleted.contains(&file_number)
        });
        in_base
            || self
                .levels
                .iter()
                .any(|s| s.added.contains_key(&file_number) && !s.deleted.contains(&file_number))
    }

    fn remove(&mut self, level: usize, file_number: u64, removal: Option<&RemovedFile>, now: u64) {
        let state = &mut self.levels[level];
        if !state.deleted.insert(file_number) {
            return;
        }

        let existing = state.added.get(&file_number).cloned().or_else(|| {
            self.base
                .files(level)
                .iter()
                .find(|f| f.file_number() == file_number)
                .cloned()
        });

        match existing {
            Some(file) => {
                let mut file = FileMetadata::clone(&file);
                file.retire(now, removal);
                self.retired.push(RetiredFile { level, file });
            }
            None => log::debug!(
                "Removal of unknown file {} at L{} ignored",
                file_number,
                level
            ),
        }
    }

    /// Build the final Version and return it with the files it retired.
    pub fn build(self, options: &Options) -> (Version, Vec<RetiredFile>) {
        let mut files: [Vec<Arc<FileMetadata>>; MAX_LEVELS] = Default::default();

        for (level, state) in self.levels.into_iter().enumerate() {
            let level_files = &mut files[level];
            level_files.extend(
                self.base
                    .files(level)
                    .iter()
                    .filter(|f| !state.deleted.contains(&f.file_number()))
                    .cloned(),
            );
            level_files.extend(
                state
                    .added
                    .into_values()
                    .filter(|f| !state.deleted.contains(&f.file_number())),
            );

            if level == 0 {
                // L0: Sort by file number (newest first)
                level_files.sort_by(|a, b| b.file_number().cmp(&a.file_number()));
            } else {
                level_files.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
                debug_assert!(
                    level_files
                        .windows(2)
                        .all(|w| w[0].largest() < w[1].smallest()),
                    "overlapping files in L{}",
                    level
                );
            }
        }

        let mut version = Version::with_files(files, self.compact_pointers);
        version.set_seek_compaction(options.seek_compaction);

        let (score, level) = compute_compaction_score(options, &version);
        version.set_compaction_info(score, level);

        (version, self.retired)
    }
}

/// Compute the compaction score for a version.
fn compute_compaction_score(options: &Options, version: &Version) -> (f64, usize) {
    // L0 compaction triggered by file count
    let mut best_score = version.num_files(0) as f64 / options.l0_compaction_trigger as f64;
    let mut best_level = 0;

    // Other levels: compaction triggered by size
    for level in 1..MAX_LEVELS - 1 {
        let score = version.level_size(level) as f64 / options.max_bytes_for_level(level) as f64;
        if score > best_score {
            best_score = score;
            best_level = level;
        }
    }

    (best_score, best_level)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Counters that advance only together with edit application.
struct State<L> {
    log: L,
    next_file_number: u64,
    last_sequence: u64,
    log_number: u64,
    prev_log_number: u64,
    comparator_logged: bool,
}

impl<L> State<L> {
    fn absorb(&mut self, edit: &VersionEdit) {
        if let Some(num) = edit.log_number() {
            self.log_number = num;
        }
        if let Some(num) = edit.prev_log_number() {
            self.prev_log_number = num;
        }
        if let Some(num) = edit.next_file_number() {
            self.next_file_number = self.next_file_number.max(num);
        }
        if let Some(seq) = edit.last_sequence() {
            self.last_sequence = self.last_sequence.max(seq);
        }
        if edit.comparator().is_some() {
            self.comparator_logged = true;
        }
    }
}

/// Manages the set of versions and file metadata.
///
/// All edits pass through one mutex, which also guards the file-number
/// counter, so the log order, the apply order and number allocation agree.
/// Readers load the current Version without locking.
pub struct VersionSet<L: EditLog> {
    options: Arc<Options>,
    current: ArcSwap<Version>,
    state: Mutex<State<L>>,
}

impl<L: EditLog> VersionSet<L> {
    /// Create a new VersionSet writing edits to `log`.
    pub fn new(options: Arc<Options>, log: L) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            options,
            current: ArcSwap::from_pointee(Version::new()),
            state: Mutex::new(State {
                log,
                next_file_number: 2, // 1 is reserved for the edit log itself
                last_sequence: 0,
                log_number: 0,
                prev_log_number: 0,
                comparator_logged: false,
            }),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get the current version.
    pub fn current(&self) -> Arc<Version> {
        self.current.load_full()
    }

    /// Get next file number and increment.
    pub fn new_file_number(&self) -> u64 {
        let mut state = self.state.lock();
        let num = state.next_file_number;
        state.next_file_number += 1;
        num
    }

    /// Get current next file number without incrementing.
    pub fn next_file_number(&self) -> u64 {
        self.state.lock().next_file_number
    }

    /// Mark a file number as used.
    pub fn mark_file_number_used(&self, num: u64) {
        let mut state = self.state.lock();
        if num >= state.next_file_number {
            state.next_file_number = num + 1;
        }
    }

    /// Get the last sequence number.
    pub fn last_sequence(&self) -> u64 {
        self.state.lock().last_sequence
    }

    /// Set the last sequence number. Sequence numbers never move backwards.
    pub fn set_last_sequence(&self, seq: u64) {
        let mut state = self.state.lock();
        assert!(
            seq >= state.last_sequence,
            "last sequence moved backwards: {} -> {}",
            state.last_sequence,
            seq
        );
        state.last_sequence = seq;
    }

    pub fn log_number(&self) -> u64 {
        self.state.lock().log_number
    }

    pub fn prev_log_number(&self) -> u64 {
        self.state.lock().prev_log_number
    }

    /// Get compact pointer for a level.
    pub fn compact_pointer(&self, level: usize) -> Option<InternalKey> {
        self.current().compact_pointer(level).cloned()
    }

    /// Access the edit log. Edits cannot be applied while the guard is held.
    pub fn edit_log(&self) -> MappedMutexGuard<'_, L> {
        MutexGuard::map(self.state.lock(), |state| &mut state.log)
    }

    /// Log a VersionEdit and apply it to create a new Version.
    ///
    /// Absent log numbers, next file number and last sequence are filled in
    /// from the current state (and the comparator on the first edit). New
    /// files without a creation time get the current time, so the logged
    /// record carries it. The edit is sealed, applied, and only then logged.
    /// If the log rejects the record the current Version is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the edit adds a file number that is still live. Nothing is
    /// logged in that case.
    ///
    /// Returns the files this edit retired, for lifetime calibration.
    pub fn log_and_apply(&self, edit: &mut VersionEdit) -> Result<Vec<RetiredFile>> {
        let mut state = self.state.lock();

        if !state.comparator_logged && edit.comparator().is_none() {
            edit.set_comparator(self.options.comparator_name.as_str());
        }
        if edit.log_number().is_none() {
            edit.set_log_number(state.log_number);
        }
        if edit.prev_log_number().is_none() {
            edit.set_prev_log_number(state.prev_log_number);
        }
        if edit.next_file_number().is_none() {
            edit.set_next_file_number(state.next_file_number);
        }
        if edit.last_sequence().is_none() {
            edit.set_last_sequence(state.last_sequence);
        }

        let now = unix_now();
        edit.stamp_create_time(now);
        edit.seal();

        // An edit the builder refuses must never reach the log.
        let current = self.current();
        let mut builder = VersionBuilder::new(&current);
        builder.apply(edit, now);
        let (version, retired) = builder.build(&self.options);

        let record = edit.encode();
        state.log.append(&record)?;
        state.log.sync()?;

        self.current.store(Arc::new(version));
        state.absorb(edit);

        log::debug!(
            "Applied version edit ({} bytes): +{} files, -{} files",
            record.len(),
            edit.new_files().len(),
            retired.len()
        );

        Ok(retired)
    }

    /// Apply an already encoded edit without logging it again.
    ///
    /// Used by the owner of the edit log when feeding records back into a
    /// catalog. A record that fails to decode, or that cannot be applied to
    /// the current Version, is reported as corruption and leaves the catalog
    /// untouched.
    pub fn apply_encoded(&self, record: &[u8]) -> Result<Vec<RetiredFile>> {
        let edit = VersionEdit::decode(record).map_err(|e| {
            log::warn!("Rejected version edit record of {} bytes: {}", record.len(), e);
            e
        })?;
        edit.seal();

        let mut state = self.state.lock();

        let current = self.current();
        let mut builder = VersionBuilder::new(&current);
        if let Err(e) = builder.try_apply(&edit, unix_now()) {
            log::warn!("Rejected version edit record: {}", e);
            return Err(e);
        }
        let (version, retired) = builder.build(&self.options);

        self.current.store(Arc::new(version));
        state.absorb(&edit);

        Ok(retired)
    }

    /// Get a summary of the version set.
    pub fn summary(&self) -> String {
        let current = self.current();
        let mut summary = String::new();
        for level in 0..MAX_LEVELS {
            let num_files = current.num_files(level);
            if num_files > 0 {
                let size = current.level_size(level);
                summary.push_str(&format!(
                    "L{}: {} files ({:.2} MB)\n",
                    level,
                    num_files,
                    size as f64 / (1024.0 * 1024.0)
                ));
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;
    use crate::version::EstimateSource;

    fn make_key(user_key: &[u8], seq: u64) -> InternalKey {
        InternalKey::new(Bytes::copy_from_slice(user_key), seq, ValueType::Value)
    }

    fn add(edit: &mut VersionEdit, level: usize, num: u64, lo: &[u8], hi: &[u8]) {
        edit.add_file(level, num, 1024, make_key(lo, 100), make_key(hi, 1), EstimateSource::None);
    }

    fn new_set() -> VersionSet<MemoryEditLog> {
        VersionSet::new(Arc::new(Options::default()), MemoryEditLog::new()).unwrap()
    }

    #[test]
    fn test_version_builder_empty() {
        let base = Version::new();
        let (version, retired) = VersionBuilder::new(&base).build(&Options::default());

        assert_eq!(version.total_files(), 0);
        assert!(retired.is_empty());
    }

    #[test]
    fn test_version_builder_add_files() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 1, b"a", b"z");
        add(&mut edit, 0, 2, b"b", b"y");
        add(&mut edit, 1, 3, b"c", b"x");

        builder.apply(&edit, 1_000);
        let (version, _) = builder.build(&Options::default());

        assert_eq!(version.num_files(0), 2);
        assert_eq!(version.num_files(1), 1);
        assert_eq!(version.total_files(), 3);

        // L0 newest first
        assert_eq!(version.files(0)[0].file_number(), 2);

        let file = &version.files(1)[0];
        assert_eq!(file.refs(), 1);
        assert_eq!(file.create_time(), 1_000);
        assert_eq!(file.allowed_seeks(), 100);
    }

    #[test]
    fn test_version_builder_sorts_levels_by_key() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit = VersionEdit::new();
        add(&mut edit, 2, 10, b"m", b"p");
        add(&mut edit, 2, 11, b"a", b"c");
        add(&mut edit, 2, 12, b"x", b"z");
        builder.apply(&edit, 0);

        let (version, _) = builder.build(&Options::default());
        let order: Vec<u64> = version.files(2).iter().map(|f| f.file_number()).collect();
        assert_eq!(order, vec![11, 10, 12]);
    }

    #[test]
    fn test_version_builder_delete_files() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit1 = VersionEdit::new();
        add(&mut edit1, 0, 1, b"a", b"z");
        add(&mut edit1, 0, 2, b"b", b"y");
        builder.apply(&edit1, 100);

        let mut edit2 = VersionEdit::new();
        edit2.remove_file(0, 1);
        builder.apply(&edit2, 250);

        let (version, retired) = builder.build(&Options::default());
        assert_eq!(version.num_files(0), 1);
        assert_eq!(version.files(0)[0].file_number(), 2);

        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].level, 0);
        assert_eq!(retired[0].file.file_number(), 1);
        assert_eq!(retired[0].file.real_lifetime(), 150);
    }

    #[test]
    fn test_annotated_removal_feeds_retired_record() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 5, b"a", b"f");
        set.log_and_apply(&mut edit).unwrap();

        let mut edit = VersionEdit::new();
        edit.remove_file(1, 5);
        edit.remove_file_annotated(1, 5, true, false, 77);
        let retired = set.log_and_apply(&mut edit).unwrap();

        assert_eq!(retired.len(), 1);
        let file = &retired[0].file;
        assert_eq!(file.deleting_compaction_id(), 77);
        assert!(file.is_size_triggered());
        assert!(!file.is_passive_removal());
        assert!(file.delete_time() >= file.create_time());
        assert_eq!(set.current().total_files(), 0);
    }

    #[test]
    #[should_panic(expected = "reused while still referenced")]
    fn test_live_file_number_reuse_panics() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 4, b"a", b"b");
        builder.apply(&edit, 0);

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 4, b"c", b"d");
        builder.apply(&edit, 0);
    }

    #[test]
    fn test_removed_file_number_can_return() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 4, b"a", b"b");
        builder.apply(&edit, 0);

        let mut edit = VersionEdit::new();
        edit.remove_file(0, 4);
        add(&mut edit, 1, 4, b"a", b"b");
        builder.apply(&edit, 0);

        let (version, retired) = builder.build(&Options::default());
        assert_eq!(version.num_files(0), 0);
        assert_eq!(version.num_files(1), 1);
        assert_eq!(retired.len(), 1);
    }

    #[test]
    fn test_compact_pointers_last_write_wins() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        edit.advance_compact_pointer(1, make_key(b"first", 5));
        edit.advance_compact_pointer(2, make_key(b"other", 5));
        edit.advance_compact_pointer(1, make_key(b"second", 5));
        set.log_and_apply(&mut edit).unwrap();

        assert_eq!(set.compact_pointer(1).unwrap().user_key(), b"second");
        assert_eq!(set.compact_pointer(2).unwrap().user_key(), b"other");
        assert!(set.compact_pointer(3).is_none());

        // Pointers survive later edits that do not touch them.
        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 9, b"a", b"b");
        set.log_and_apply(&mut edit).unwrap();
        assert_eq!(set.compact_pointer(1).unwrap().user_key(), b"second");
    }

    #[test]
    fn test_trivial_move_keeps_record() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 7, b"a", b"m");
        set.log_and_apply(&mut edit).unwrap();

        let before = set.current();
        let original = Arc::clone(&before.files(1)[0]);
        original.record_seek();
        let seeks = original.allowed_seeks();

        let mut edit = VersionEdit::new();
        edit.remove_file(1, 7);
        add(&mut edit, 2, 7, b"a", b"m");
        edit.mark_trivial_move();
        let retired = set.log_and_apply(&mut edit).unwrap();

        assert!(retired.is_empty());
        let after = set.current();
        assert_eq!(after.num_files(1), 0);
        assert!(Arc::ptr_eq(&after.files(2)[0], &original));
        assert_eq!(after.files(2)[0].allowed_seeks(), seeks);

        // Held by both snapshots.
        assert_eq!(original.refs(), 2);
        drop(before);
        assert_eq!(original.refs(), 1);
    }

    #[test_log::test]
    fn test_refs_follow_snapshots() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 3, b"a", b"b");
        set.log_and_apply(&mut edit).unwrap();

        let snapshot = set.current();
        let file = Arc::clone(&snapshot.files(0)[0]);
        assert_eq!(file.refs(), 1);

        let mut edit = VersionEdit::new();
        edit.remove_file(0, 3);
        set.log_and_apply(&mut edit).unwrap();

        // Only the reader's snapshot still references the file.
        assert_eq!(file.refs(), 1);
        drop(snapshot);
        assert_eq!(file.refs(), 0);
    }

    #[test]
    fn test_file_numbers() {
        let set = new_set();

        assert_eq!(set.new_file_number(), 2);
        assert_eq!(set.new_file_number(), 3);
        assert_eq!(set.next_file_number(), 4);

        set.mark_file_number_used(10);
        assert_eq!(set.new_file_number(), 11);
        set.mark_file_number_used(5);
        assert_eq!(set.next_file_number(), 12);
    }

    #[test]
    fn test_log_and_apply_fills_counters() {
        let set = new_set();
        set.set_last_sequence(42);

        let mut edit = VersionEdit::new();
        edit.set_log_number(6);
        add(&mut edit, 0, 3, b"a", b"b");
        set.log_and_apply(&mut edit).unwrap();

        assert!(edit.is_sealed());
        assert_eq!(edit.comparator(), Some("leveldb.BytewiseComparator"));
        assert_eq!(edit.next_file_number(), Some(2));
        assert_eq!(edit.last_sequence(), Some(42));
        assert_eq!(set.log_number(), 6);
        assert_eq!(set.prev_log_number(), 0);

        // Comparator only goes into the first record.
        let mut edit = VersionEdit::new();
        set.log_and_apply(&mut edit).unwrap();
        assert_eq!(edit.comparator(), None);

        let log = set.edit_log();
        assert_eq!(log.records().len(), 2);
        assert_eq!(log.synced(), 2);
    }

    #[test]
    fn test_logged_records_rebuild_catalog() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 10, b"a", b"m");
        add(&mut edit, 0, 11, b"n", b"z");
        set.log_and_apply(&mut edit).unwrap();

        let mut edit = VersionEdit::new();
        edit.remove_file(0, 10);
        edit.remove_file(0, 11);
        add(&mut edit, 1, 12, b"a", b"z");
        edit.advance_compact_pointer(0, make_key(b"z", 1));
        set.log_and_apply(&mut edit).unwrap();

        let records: Vec<Bytes> = set.edit_log().records().to_vec();

        let mirror = new_set();
        for record in &records {
            mirror.apply_encoded(record).unwrap();
        }

        let (a, b) = (set.current(), mirror.current());
        for level in 0..MAX_LEVELS {
            let left: Vec<u64> = a.files(level).iter().map(|f| f.file_number()).collect();
            let right: Vec<u64> = b.files(level).iter().map(|f| f.file_number()).collect();
            assert_eq!(left, right, "level {}", level);
        }
        assert_eq!(mirror.compact_pointer(0), set.compact_pointer(0));
        assert_eq!(mirror.next_file_number(), set.next_file_number());
        assert!(mirror.edit_log().records().is_empty());
    }

    #[test_log::test]
    fn test_apply_encoded_rejects_corruption() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 3, b"a", b"b");
        let record = edit.encode();

        let err = set.apply_encoded(&record[..record.len() - 1]).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(set.current().total_files(), 0);

        set.apply_encoded(&record).unwrap();
        assert_eq!(set.current().total_files(), 1);
    }

    #[test]
    fn test_rejected_edit_is_not_logged() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 5, b"a", b"c");
        set.log_and_apply(&mut edit).unwrap();

        let mut reused = VersionEdit::new();
        add(&mut reused, 2, 5, b"a", b"c");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            set.log_and_apply(&mut reused)
        }));

        assert!(result.is_err());
        assert_eq!(set.edit_log().records().len(), 1);
        assert_eq!(set.current().total_files(), 1);
        assert_eq!(set.current().num_files(2), 0);

        // The set stays usable.
        let mut edit = VersionEdit::new();
        add(&mut edit, 2, 6, b"d", b"f");
        set.log_and_apply(&mut edit).unwrap();
        assert_eq!(set.edit_log().records().len(), 2);
    }

    #[test_log::test]
    fn test_apply_encoded_rejects_inconsistent_record() {
        let set = new_set();

        // One record adding file 9 twice.
        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 9, b"a", b"b");
        let single = edit.encode();
        let doubled = [&single[..], &single[..]].concat();
        assert_eq!(VersionEdit::decode(&doubled).unwrap().new_files().len(), 2);

        let err = set.apply_encoded(&doubled).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(set.current().total_files(), 0);

        // A record adding a file that is already live.
        set.apply_encoded(&single).unwrap();
        let err = set.apply_encoded(&single).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(set.current().total_files(), 1);
        assert_eq!(set.current().files(0)[0].refs(), 1);
    }

    #[test]
    fn test_logged_create_time_survives_replay() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 5, b"a", b"c");
        set.log_and_apply(&mut edit).unwrap();

        let created = set.current().files(1)[0].create_time();
        assert!(created > 0);
        assert_eq!(edit.new_files()[0].1.create_time(), created);

        let record = set.edit_log().records()[0].clone();
        let decoded = VersionEdit::decode(&record).unwrap();
        assert_eq!(decoded.new_files()[0].1.create_time(), created);

        let mirror = new_set();
        mirror.apply_encoded(&record).unwrap();
        assert_eq!(mirror.current().files(1)[0].create_time(), created);
    }

    #[test]
    fn test_builder_keeps_staged_create_time() {
        let base = Version::new();
        let mut builder = VersionBuilder::new(&base);

        let mut edit = VersionEdit::new();
        add(&mut edit, 1, 5, b"a", b"c");
        edit.stamp_create_time(500);
        builder.apply(&edit, 900);

        let (version, _) = builder.build(&Options::default());
        assert_eq!(version.files(1)[0].create_time(), 500);
    }

    #[test_log::test]
    fn test_failed_append_keeps_current_version() {
        let set = new_set();
        set.edit_log().set_fail_appends(true);

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 3, b"a", b"b");
        let err = set.log_and_apply(&mut edit).unwrap_err();

        assert!(matches!(err, Error::ManifestError(_)));
        assert_eq!(set.current().total_files(), 0);
        assert!(set.edit_log().records().is_empty());
    }

    #[test]
    fn test_compaction_score() {
        let options = Options {
            l0_compaction_trigger: 4,
            ..Options::default()
        };
        let set = VersionSet::new(Arc::new(options), MemoryEditLog::new()).unwrap();

        for i in 0..3u64 {
            let mut edit = VersionEdit::new();
            add(&mut edit, 0, 10 + i, b"a", b"z");
            set.log_and_apply(&mut edit).unwrap();
        }
        assert!(!set.current().needs_compaction());

        let mut edit = VersionEdit::new();
        add(&mut edit, 0, 13, b"a", b"z");
        set.log_and_apply(&mut edit).unwrap();

        let current = set.current();
        assert!(current.needs_compaction());
        assert_eq!(current.compaction_level(), 0);
        assert_eq!(current.compaction_score(), 1.0);
    }

    #[test]
    fn test_version_set_summary() {
        let set = new_set();

        let mut edit = VersionEdit::new();
        edit.add_file(
            0,
            10,
            1024 * 1024,
            make_key(b"a", 1),
            make_key(b"z", 100),
            EstimateSource::Seed(60),
        );
        set.log_and_apply(&mut edit).unwrap();

        assert!(set.summary().contains("L0: 1 files (1.00 MB)"));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = Options {
            l0_compaction_trigger: 0,
            ..Options::default()
        };
        assert!(VersionSet::new(Arc::new(options), MemoryEditLog::new()).is_err());
    }
}
