// Example API Usage - how a storage engine drives the catalog
// This file is not compiled; it sketches the calls around a flush and a compaction.

use rustdb_catalog::{EstimateSource, InternalKey, MemoryEditLog, Options, VersionEdit, VersionSet};
use std::sync::Arc;

fn main() -> rustdb_catalog::Result<()> {
    // ===========================================
    // Setup
    // ===========================================

    let options = Arc::new(Options::default());
    let versions = VersionSet::new(options, MemoryEditLog::new())?;

    // ===========================================
    // Flush: a memtable becomes an L0 table
    // ===========================================

    let table = versions.new_file_number();
    let mut edit = VersionEdit::new();
    edit.add_file(
        0,
        table,
        4 * 1024 * 1024,
        InternalKey::for_value(&b"apple"[..], 1_200),
        InternalKey::for_deletion(&b"zebra"[..], 1_001),
        EstimateSource::Seed(3_600),
    );
    versions.log_and_apply(&mut edit)?;

    // ===========================================
    // Compaction: inputs leave with annotations, output gets fused estimate
    // ===========================================

    let output = versions.new_file_number();
    let mut edit = VersionEdit::new();
    edit.remove_file_annotated(0, table, true, false, 7);
    edit.add_file(
        1,
        output,
        4 * 1024 * 1024,
        InternalKey::for_value(&b"apple"[..], 1_200),
        InternalKey::for_deletion(&b"zebra"[..], 1_001),
        EstimateSource::Fused { calc: 5_000, avg: 3_600, compaction_id: 7 },
    );
    edit.advance_compact_pointer(0, InternalKey::for_deletion(&b"zebra"[..], 1_001));

    // Retired files carry their observed lifetime for calibration.
    for retired in versions.log_and_apply(&mut edit)? {
        println!(
            "L{} file {} lived {}s (predicted {}s)",
            retired.level,
            retired.file.file_number(),
            retired.file.real_lifetime(),
            retired.file.fused_estimate(),
        );
    }

    // ===========================================
    // Readers
    // ===========================================

    let snapshot = versions.current();
    for file in snapshot.get_overlapping_files(1, b"cherry", b"grape") {
        if snapshot.record_seek(1, &file) {
            println!("file {} is due for seek compaction", file.file_number());
        }
    }

    println!("{}", versions.summary());
    Ok(())
}
