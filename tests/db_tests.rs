// Engine facade tests
// End-to-end behaviour across the memtable, flushes and compaction.

use std::fs;

use lsm_engine::manifest::run_file_name;
use lsm_engine::{DB, Error, Options, Value};
use tempfile::tempdir;

fn visible(items: &[i32]) -> Value {
    Value::Visible(items.to_vec())
}

// RUST_LOG=lsm_engine=debug to follow flushes and compactions.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Test 1: Mixed workload over several levels
// =============================================================================
// flush 5 / level 10 / multiplier 2; puts, a point delete and two range
// deletes spread across the memtable and many runs.
#[test]
fn scenario_across_levels() {
    init_tracing();
    let dir = tempdir().unwrap();
    let mut db = DB::open(dir.path(), Options::default()).unwrap();
    db.set_flush_threshold(5).unwrap();
    db.set_level_size_base(10).unwrap();
    db.set_level_size_multiplier(2).unwrap();

    for k in 0..13 {
        db.put(k, vec![k, k + 1]).unwrap();
    }
    db.delete(1).unwrap();
    db.delete_range(4, 6).unwrap();
    for k in 13..213 {
        db.put(k, vec![k, k + 1]).unwrap();
    }
    db.delete_range(10, 12).unwrap();

    assert_eq!(db.get(0).unwrap(), visible(&[0, 1]));
    assert_eq!(db.get(1).unwrap(), Value::Hidden);
    assert_eq!(db.get(4).unwrap(), Value::Hidden);
    assert_eq!(db.get(5).unwrap(), Value::Hidden);
    assert_eq!(db.get(6).unwrap(), visible(&[6, 7]));
    assert_eq!(db.get(7).unwrap(), visible(&[7, 8]));
    assert_eq!(db.get(10).unwrap(), Value::Hidden);
    assert_eq!(db.get(11).unwrap(), Value::Hidden);
    assert_eq!(db.get(12).unwrap(), visible(&[12, 13]));
    assert_eq!(db.get(100).unwrap(), visible(&[100, 101]));

    // a later write un-deletes
    db.put(5, vec![5, 5]).unwrap();
    assert_eq!(db.get(5).unwrap(), visible(&[5, 5]));

    // never written
    assert_eq!(db.get(1000).unwrap(), Value::Hidden);

    db.delete_range(100, 213).unwrap();
    assert_eq!(db.get(100).unwrap(), Value::Hidden);
    assert_eq!(db.get(212).unwrap(), Value::Hidden);
    assert_eq!(db.get(99).unwrap(), visible(&[99, 100]));

    // 0..100 minus {1, 4, 10, 11}; 5 came back
    let all = db.scan().unwrap();
    assert_eq!(all.len(), 96);
    assert_eq!(all[0], visible(&[0, 1]));
    assert_eq!(all[2], visible(&[3, 4]));
    assert_eq!(all[3], visible(&[5, 5]));
    assert!(all.iter().all(Value::is_visible));

    let stats = db.stats();
    assert!(stats.flushes >= 40);
    assert!(stats.levels.len() > 1);
    assert_eq!(db.size(), 13 + 2 + 200 + 1 + 1 + 1);
}

// =============================================================================
// Test 2: Range delete is half-open
// =============================================================================
#[test]
fn range_delete_excludes_end() {
    let dir = tempdir().unwrap();
    let mut db = DB::open(dir.path(), Options::default()).unwrap();
    for k in 0..10 {
        db.put(k, vec![k]).unwrap();
    }
    db.delete_range(4, 6).unwrap();

    assert_eq!(db.get(3).unwrap(), visible(&[3]));
    assert_eq!(db.get(4).unwrap(), Value::Hidden);
    assert_eq!(db.get(5).unwrap(), Value::Hidden);
    assert_eq!(db.get(6).unwrap(), visible(&[6]));
}

#[test]
fn empty_range_delete_is_rejected() {
    let dir = tempdir().unwrap();
    let mut db = DB::open(dir.path(), Options::default()).unwrap();
    assert!(matches!(
        db.delete_range(6, 4),
        Err(Error::InvalidRange { start: 6, end: 4 })
    ));
    assert_eq!(db.size(), 0);
}

// =============================================================================
// Test 3: Last write wins, whichever level holds the older one
// =============================================================================
#[test]
fn newest_write_wins_across_runs() {
    let dir = tempdir().unwrap();
    let options = Options::builder().flush_threshold(2).build().unwrap();
    let mut db = DB::open(dir.path(), options).unwrap();

    db.put(1, vec![1]).unwrap();
    db.put(2, vec![2]).unwrap(); // flush
    db.delete(1).unwrap();
    db.put(3, vec![3]).unwrap(); // flush
    assert_eq!(db.get(1).unwrap(), Value::Hidden);

    db.put(1, vec![11]).unwrap();
    assert_eq!(db.get(1).unwrap(), visible(&[11]));
    db.flush().unwrap();
    assert_eq!(db.get(1).unwrap(), visible(&[11]));
}

// =============================================================================
// Test 4: Scans
// =============================================================================
#[test]
fn scan_range_is_half_open_and_sorted() {
    let dir = tempdir().unwrap();
    let options = Options::builder().flush_threshold(3).build().unwrap();
    let mut db = DB::open(dir.path(), options).unwrap();

    for k in [9, -3, 4, 0, 7, 2] {
        db.put(k, vec![k]).unwrap();
    }
    db.delete(4).unwrap();

    assert_eq!(
        db.scan().unwrap(),
        vec![visible(&[-3]), visible(&[0]), visible(&[2]), visible(&[7]), visible(&[9])]
    );
    assert_eq!(db.scan_range(0, 7).unwrap(), vec![visible(&[0]), visible(&[2])]);
    assert_eq!(db.scan_range(7, 7).unwrap(), vec![]);
    assert_eq!(
        db.range(Some(1), None).unwrap(),
        vec![(2, vec![2]), (7, vec![7]), (9, vec![9])]
    );
}

// =============================================================================
// Test 5: size counts operations, not keys
// =============================================================================
#[test]
fn size_counts_operations() {
    let dir = tempdir().unwrap();
    let mut db = DB::open(dir.path(), Options::default()).unwrap();
    db.put(1, vec![1]).unwrap();
    db.put(1, vec![2]).unwrap();
    db.delete(1).unwrap();
    db.delete_range(0, 10).unwrap();
    assert_eq!(db.size(), 4);
}

// =============================================================================
// Test 6: Flushing
// =============================================================================
#[test]
fn flush_threshold_creates_one_run() {
    let dir = tempdir().unwrap();
    let options = Options::builder().flush_threshold(4).build().unwrap();
    let mut db = DB::open(dir.path(), options).unwrap();

    for k in 0..3 {
        db.put(k, vec![k]).unwrap();
    }
    assert_eq!(db.stats().flushes, 0);
    db.put(3, vec![3]).unwrap();
    let stats = db.stats();
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.levels[0].runs, 1);
    assert_eq!(stats.levels[0].size, 4);

    // explicit flush of an empty memtable does nothing
    db.flush().unwrap();
    assert_eq!(db.stats().flushes, 1);
}

// =============================================================================
// Test 7: Runs without bloom filters read the same
// =============================================================================
#[test]
fn bloom_is_optional() {
    let dir = tempdir().unwrap();
    let options = Options::builder()
        .flush_threshold(3)
        .bloom_bits_per_key(None)
        .build()
        .unwrap();
    let mut db = DB::open(dir.path(), options).unwrap();
    for k in 0..30 {
        db.put(k, vec![k]).unwrap();
    }
    db.delete_range(10, 20).unwrap();
    for k in 0..30 {
        let expected = if (10..20).contains(&k) { Value::Hidden } else { visible(&[k]) };
        assert_eq!(db.get(k).unwrap(), expected, "key {}", k);
    }
}

// =============================================================================
// Test 8: Opening over an old directory never clobbers its files
// =============================================================================
#[test]
fn open_skips_existing_run_ids() {
    let dir = tempdir().unwrap();
    let stale = dir.path().join(run_file_name(7));
    fs::write(&stale, "stale").unwrap();

    let options = Options::builder().flush_threshold(1).build().unwrap();
    let mut db = DB::open(dir.path(), options).unwrap();
    db.put(1, vec![1]).unwrap();

    assert_eq!(fs::read_to_string(&stale).unwrap(), "stale");
    assert!(dir.path().join(run_file_name(8)).exists());
    assert_eq!(db.get(1).unwrap(), visible(&[1]));
}

#[test]
fn open_rejects_bad_options() {
    let dir = tempdir().unwrap();
    let options = Options {
        level_size_multiplier: 0,
        ..Options::default()
    };
    assert!(matches!(
        DB::open(dir.path(), options),
        Err(Error::InvalidOption(_))
    ));
}
