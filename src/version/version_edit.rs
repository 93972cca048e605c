//! VersionEdit - describes changes between versions.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::options::MAX_LEVELS;
use crate::types::InternalKey;
use crate::util::coding::{decode_length_prefixed, decode_varint64, encode_length_prefixed, encode_varint64};
use crate::{Error, Result};

use super::{EditTag, EstimateSource, FileMetadata};

const FLAG_SIZE_TRIGGERED: u64 = 1;
const FLAG_PASSIVE_REMOVAL: u64 = 1 << 1;
const FLAG_DELETE_TOMBSTONE: u64 = 1 << 2;
const KNOWN_FLAGS: u64 = FLAG_SIZE_TRIGGERED | FLAG_PASSIVE_REMOVAL | FLAG_DELETE_TOMBSTONE;

/// A file removal carrying audit annotations.
///
/// The flags describe why the file left the catalog. They are passed through
/// to the lifetime calibration loop unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemovedFile {
    pub file_number: u64,
    /// Compaction that removed the file.
    pub deleting_compaction_id: u64,
    pub is_size_triggered: bool,
    pub is_passive_removal: bool,
    pub is_delete_tombstone: bool,
}

impl RemovedFile {
    fn flags(&self) -> u64 {
        let mut flags = 0;
        if self.is_size_triggered {
            flags |= FLAG_SIZE_TRIGGERED;
        }
        if self.is_passive_removal {
            flags |= FLAG_PASSIVE_REMOVAL;
        }
        if self.is_delete_tombstone {
            flags |= FLAG_DELETE_TOMBSTONE;
        }
        flags
    }
}

/// A VersionEdit describes the changes between two Versions.
///
/// It records:
/// - Log, file-number and sequence counters
/// - Compaction pointers
/// - Files to delete, plain or annotated
/// - New files to add
///
/// An edit is staged by one thread and then handed off with [`seal`] (which
/// [`encode`] also does). Staging into a sealed edit panics. A sealed edit is
/// read-only and can be shared between threads.
///
/// [`seal`]: VersionEdit::seal
/// [`encode`]: VersionEdit::encode
#[derive(Debug, Default)]
pub struct VersionEdit {
    comparator: Option<String>,
    log_number: Option<u64>,
    prev_log_number: Option<u64>,
    next_file_number: Option<u64>,
    last_sequence: Option<u64>,
    /// Every pointer advance, in staging order.
    compact_pointers: Vec<(usize, InternalKey)>,
    deleted_files: BTreeSet<(usize, u64)>,
    annotated_removals: Vec<(usize, RemovedFile)>,
    new_files: Vec<(usize, FileMetadata)>,
    trivial_move: bool,
    sealed: AtomicBool,
}

impl VersionEdit {
    /// Create a new empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comparator name.
    pub fn set_comparator(&mut self, name: impl Into<String>) {
        self.check_mutable();
        self.comparator = Some(name.into());
    }

    /// Set the log number.
    pub fn set_log_number(&mut self, num: u64) {
        self.check_mutable();
        self.log_number = Some(num);
    }

    /// Set the previous log number.
    pub fn set_prev_log_number(&mut self, num: u64) {
        self.check_mutable();
        self.prev_log_number = Some(num);
    }

    /// Set the next file number.
    pub fn set_next_file_number(&mut self, num: u64) {
        self.check_mutable();
        self.next_file_number = Some(num);
    }

    /// Set the last sequence number.
    pub fn set_last_sequence(&mut self, seq: u64) {
        self.check_mutable();
        self.last_sequence = Some(seq);
    }

    /// Record how far compaction has progressed in `level`.
    ///
    /// Repeated calls for one level are all kept; the applier honors the last.
    pub fn advance_compact_pointer(&mut self, level: usize, key: InternalKey) {
        self.check_mutable();
        check_level(level);
        self.compact_pointers.push((level, key));
    }

    /// Stage a new file.
    ///
    /// # Panics
    ///
    /// Panics if `smallest` orders after `largest`, if `level` is out of
    /// range, or if the edit is sealed.
    pub fn add_file(
        &mut self,
        level: usize,
        file_number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
        estimate: EstimateSource,
    ) {
        self.check_mutable();
        check_level(level);

        let mut file = FileMetadata::new(file_number, file_size, smallest, largest);
        let resolved = estimate.resolve();
        file.set_estimates(
            resolved.avg,
            resolved.calc,
            resolved.fused,
            resolved.creating_compaction_id,
        );
        self.new_files.push((level, file));
    }

    /// Stage a plain removal. Staging the same removal twice is a no-op.
    pub fn remove_file(&mut self, level: usize, file_number: u64) {
        self.check_mutable();
        check_level(level);
        self.deleted_files.insert((level, file_number));
    }

    /// Stage a removal carrying audit annotations.
    ///
    /// Unlike [`remove_file`](Self::remove_file) these are not deduplicated.
    pub fn remove_file_annotated(
        &mut self,
        level: usize,
        file_number: u64,
        is_size_triggered: bool,
        is_passive_removal: bool,
        deleting_compaction_id: u64,
    ) {
        self.push_removal(
            level,
            RemovedFile {
                file_number,
                deleting_compaction_id,
                is_size_triggered,
                is_passive_removal,
                is_delete_tombstone: false,
            },
        );
    }

    /// Stage an annotated removal copying the annotations of `file`.
    pub fn remove_file_record(&mut self, level: usize, file: &FileMetadata) {
        self.push_removal(
            level,
            RemovedFile {
                file_number: file.file_number(),
                deleting_compaction_id: file.deleting_compaction_id(),
                is_size_triggered: file.is_size_triggered(),
                is_passive_removal: file.is_passive_removal(),
                is_delete_tombstone: file.is_delete_tombstone(),
            },
        );
    }

    fn push_removal(&mut self, level: usize, removal: RemovedFile) {
        self.check_mutable();
        check_level(level);
        self.annotated_removals.push((level, removal));
    }

    /// Give every staged file without a creation time the time `now`.
    pub(crate) fn stamp_create_time(&mut self, now: u64) {
        self.check_mutable();
        for (_, file) in &mut self.new_files {
            if file.create_time() == 0 {
                file.set_create_time(now);
            }
        }
    }

    /// Mark this edit as moving a single file between levels unchanged.
    pub fn mark_trivial_move(&mut self) {
        self.check_mutable();
        self.trivial_move = true;
    }

    pub fn is_trivial_move(&self) -> bool {
        self.trivial_move
    }

    pub fn comparator(&self) -> Option<&str> {
        self.comparator.as_deref()
    }

    pub fn log_number(&self) -> Option<u64> {
        self.log_number
    }

    pub fn prev_log_number(&self) -> Option<u64> {
        self.prev_log_number
    }

    pub fn next_file_number(&self) -> Option<u64> {
        self.next_file_number
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Compaction pointer advances in staging order.
    pub fn compact_pointers(&self) -> &[(usize, InternalKey)] {
        &self.compact_pointers
    }

    /// Plain removals as (level, file_number).
    pub fn deleted_files(&self) -> &BTreeSet<(usize, u64)> {
        &self.deleted_files
    }

    /// Annotated removals in staging order.
    pub fn annotated_removals(&self) -> &[(usize, RemovedFile)] {
        &self.annotated_removals
    }

    /// New files in staging order.
    pub fn new_files(&self) -> &[(usize, FileMetadata)] {
        &self.new_files
    }

    /// Check if the edit is empty.
    pub fn is_empty(&self) -> bool {
        self.comparator.is_none()
            && self.log_number.is_none()
            && self.prev_log_number.is_none()
            && self.next_file_number.is_none()
            && self.last_sequence.is_none()
            && self.compact_pointers.is_empty()
            && self.deleted_files.is_empty()
            && self.annotated_removals.is_empty()
            && self.new_files.is_empty()
            && !self.trivial_move
    }

    /// Freeze the edit. Any later staging call panics.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn check_mutable(&self) {
        assert!(
            !self.is_sealed(),
            "version edit modified after it was handed off"
        );
    }

    /// Seal the edit and encode it to bytes.
    pub fn encode(&self) -> Bytes {
        self.seal();

        let mut buf = BytesMut::with_capacity(256);

        if let Some(ref name) = self.comparator {
            buf.put_u8(EditTag::Comparator.to_byte());
            encode_length_prefixed(&mut buf, name.as_bytes());
        }

        if let Some(num) = self.log_number {
            buf.put_u8(EditTag::LogNumber.to_byte());
            encode_varint64(&mut buf, num);
        }

        if let Some(num) = self.prev_log_number {
            buf.put_u8(EditTag::PrevLogNumber.to_byte());
            encode_varint64(&mut buf, num);
        }

        if let Some(num) = self.next_file_number {
            buf.put_u8(EditTag::NextFileNumber.to_byte());
            encode_varint64(&mut buf, num);
        }

        if let Some(seq) = self.last_sequence {
            buf.put_u8(EditTag::LastSequence.to_byte());
            encode_varint64(&mut buf, seq);
        }

        for (level, key) in &self.compact_pointers {
            buf.put_u8(EditTag::CompactPointer.to_byte());
            encode_varint64(&mut buf, *level as u64);
            encode_length_prefixed(&mut buf, &key.encode());
        }

        for &(level, file_number) in &self.deleted_files {
            buf.put_u8(EditTag::DeletedFile.to_byte());
            encode_varint64(&mut buf, level as u64);
            encode_varint64(&mut buf, file_number);
        }

        for (level, removal) in &self.annotated_removals {
            buf.put_u8(EditTag::AnnotatedDeletedFile.to_byte());
            encode_varint64(&mut buf, *level as u64);
            encode_varint64(&mut buf, removal.file_number);
            encode_varint64(&mut buf, removal.deleting_compaction_id);
            encode_varint64(&mut buf, removal.flags());
        }

        for (level, file) in &self.new_files {
            buf.put_u8(EditTag::NewFile.to_byte());
            encode_varint64(&mut buf, *level as u64);
            encode_varint64(&mut buf, file.file_number());
            encode_varint64(&mut buf, file.file_size());
            encode_length_prefixed(&mut buf, &file.smallest().encode());
            encode_length_prefixed(&mut buf, &file.largest().encode());
            encode_varint64(&mut buf, file.create_time());
            encode_varint64(&mut buf, file.avg_estimate());
            encode_varint64(&mut buf, file.calc_estimate());
            encode_varint64(&mut buf, file.fused_estimate());
            encode_varint64(&mut buf, file.creating_compaction_id());
        }

        if self.trivial_move {
            buf.put_u8(EditTag::TrivialMove.to_byte());
        }

        log::trace!("Encoded version edit into {} bytes", buf.len());

        buf.freeze()
    }

    /// Decode an edit from bytes.
    ///
    /// Any malformed input fails the whole decode with a corruption error.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::new();
        let mut cursor = data;

        while cursor.has_remaining() {
            let tag = cursor.get_u8();
            let tag = EditTag::from_byte(tag)
                .ok_or_else(|| Error::corruption(format!("unknown edit tag: {}", tag)))?;

            match tag {
                EditTag::Comparator => {
                    let name = decode_length_prefixed(&mut cursor)
                        .ok_or_else(|| Error::corruption("truncated comparator name"))?;
                    edit.comparator = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| Error::corruption("invalid comparator name"))?,
                    );
                }
                EditTag::LogNumber => {
                    edit.log_number = Some(read_varint(&mut cursor, "log number")?);
                }
                EditTag::PrevLogNumber => {
                    edit.prev_log_number = Some(read_varint(&mut cursor, "prev log number")?);
                }
                EditTag::NextFileNumber => {
                    edit.next_file_number = Some(read_varint(&mut cursor, "next file number")?);
                }
                EditTag::LastSequence => {
                    edit.last_sequence = Some(read_varint(&mut cursor, "last sequence")?);
                }
                EditTag::CompactPointer => {
                    let level = read_level(&mut cursor, "compact pointer")?;
                    let key = read_key(&mut cursor, "compact pointer key")?;
                    edit.compact_pointers.push((level, key));
                }
                EditTag::DeletedFile => {
                    let level = read_level(&mut cursor, "deleted file")?;
                    let file_number = read_varint(&mut cursor, "deleted file number")?;
                    edit.deleted_files.insert((level, file_number));
                }
                EditTag::AnnotatedDeletedFile => {
                    let level = read_level(&mut cursor, "annotated deleted file")?;
                    let file_number = read_varint(&mut cursor, "annotated file number")?;
                    let deleting_compaction_id =
                        read_varint(&mut cursor, "deleting compaction id")?;
                    let flags = read_varint(&mut cursor, "removal flags")?;
                    if flags & !KNOWN_FLAGS != 0 {
                        return Err(Error::corruption(format!(
                            "unknown removal flags: {:#x}",
                            flags
                        )));
                    }
                    edit.annotated_removals.push((
                        level,
                        RemovedFile {
                            file_number,
                            deleting_compaction_id,
                            is_size_triggered: flags & FLAG_SIZE_TRIGGERED != 0,
                            is_passive_removal: flags & FLAG_PASSIVE_REMOVAL != 0,
                            is_delete_tombstone: flags & FLAG_DELETE_TOMBSTONE != 0,
                        },
                    ));
                }
                EditTag::NewFile => {
                    let level = read_level(&mut cursor, "new file")?;
                    let file_number = read_varint(&mut cursor, "new file number")?;
                    let file_size = read_varint(&mut cursor, "new file size")?;
                    let smallest = read_key(&mut cursor, "smallest key")?;
                    let largest = read_key(&mut cursor, "largest key")?;
                    if smallest > largest {
                        return Err(Error::corruption(format!(
                            "file {} has inverted key range",
                            file_number
                        )));
                    }
                    let create_time = read_varint(&mut cursor, "create time")?;
                    let avg_estimate = read_varint(&mut cursor, "avg estimate")?;
                    let calc_estimate = read_varint(&mut cursor, "calc estimate")?;
                    let fused_estimate = read_varint(&mut cursor, "fused estimate")?;
                    let creating_compaction_id =
                        read_varint(&mut cursor, "creating compaction id")?;

                    let mut file = FileMetadata::new(file_number, file_size, smallest, largest);
                    file.set_create_time(create_time);
                    file.set_estimates(
                        avg_estimate,
                        calc_estimate,
                        fused_estimate,
                        creating_compaction_id,
                    );
                    edit.new_files.push((level, file));
                }
                EditTag::TrivialMove => {
                    edit.trivial_move = true;
                }
            }
        }

        log::trace!("Decoded version edit from {} bytes", data.len());

        Ok(edit)
    }
}

fn check_level(level: usize) {
    assert!(level < MAX_LEVELS, "level {level} out of range (max {MAX_LEVELS})");
}

fn read_varint(cursor: &mut &[u8], what: &str) -> Result<u64> {
    decode_varint64(cursor).ok_or_else(|| Error::corruption(format!("truncated {}", what)))
}

fn read_level(cursor: &mut &[u8], what: &str) -> Result<usize> {
    let level = read_varint(cursor, what)?;
    if level >= MAX_LEVELS as u64 {
        return Err(Error::corruption(format!("invalid level for {}: {}", what, level)));
    }
    Ok(level as usize)
}

fn read_key(cursor: &mut &[u8], what: &str) -> Result<InternalKey> {
    let bytes = decode_length_prefixed(cursor)
        .ok_or_else(|| Error::corruption(format!("truncated {}", what)))?;
    InternalKey::decode(bytes).ok_or_else(|| Error::corruption(format!("invalid {}", what)))
}

impl Clone for VersionEdit {
    /// The copy is unsealed and may be staged into again.
    fn clone(&self) -> Self {
        Self {
            comparator: self.comparator.clone(),
            log_number: self.log_number,
            prev_log_number: self.prev_log_number,
            next_file_number: self.next_file_number,
            last_sequence: self.last_sequence,
            compact_pointers: self.compact_pointers.clone(),
            deleted_files: self.deleted_files.clone(),
            annotated_removals: self.annotated_removals.clone(),
            new_files: self.new_files.clone(),
            trivial_move: self.trivial_move,
            sealed: AtomicBool::new(false),
        }
    }
}

impl PartialEq for VersionEdit {
    /// Compares staged content; the sealed flag is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.comparator == other.comparator
            && self.log_number == other.log_number
            && self.prev_log_number == other.prev_log_number
            && self.next_file_number == other.next_file_number
            && self.last_sequence == other.last_sequence
            && self.compact_pointers == other.compact_pointers
            && self.deleted_files == other.deleted_files
            && self.annotated_removals == other.annotated_removals
            && self.trivial_move == other.trivial_move
            && self.new_files.len() == other.new_files.len()
            && self
                .new_files
                .iter()
                .zip(&other.new_files)
                .all(|((la, a), (lb, b))| la == lb && a.same_content(b))
    }
}

impl fmt::Display for VersionEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VersionEdit {{")?;
        if let Some(ref name) = self.comparator {
            writeln!(f, "  Comparator: {}", name)?;
        }
        if let Some(num) = self.log_number {
            writeln!(f, "  LogNumber: {}", num)?;
        }
        if let Some(num) = self.prev_log_number {
            writeln!(f, "  PrevLogNumber: {}", num)?;
        }
        if let Some(num) = self.next_file_number {
            writeln!(f, "  NextFile: {}", num)?;
        }
        if let Some(seq) = self.last_sequence {
            writeln!(f, "  LastSeq: {}", seq)?;
        }
        for (level, key) in &self.compact_pointers {
            writeln!(f, "  CompactPointer: {} {:?}", level, key)?;
        }
        for (level, file_number) in &self.deleted_files {
            writeln!(f, "  RemoveFile: {} {}", level, file_number)?;
        }
        for (level, removal) in &self.annotated_removals {
            writeln!(
                f,
                "  RemoveFileAnnotated: {} {} compaction={} flags={:#x}",
                level,
                removal.file_number,
                removal.deleting_compaction_id,
                removal.flags()
            )?;
        }
        for (level, file) in &self.new_files {
            writeln!(
                f,
                "  AddFile: {} {} {} {:?} .. {:?} est={}",
                level,
                file.file_number(),
                file.file_size(),
                file.smallest(),
                file.largest(),
                file.fused_estimate()
            )?;
        }
        if self.trivial_move {
            writeln!(f, "  TrivialMove")?;
        }
        write!(f, "}}")
    }
}
