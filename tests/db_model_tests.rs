// Engine model tests
// Random operation sequences checked against an ordered map.

use std::collections::BTreeMap;
use std::fs;

use lsm_engine::manifest::parse_run_file_name;
use lsm_engine::{DB, Options, Value};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Put(i32, Vec<i32>),
    Delete(i32),
    DeleteRange(i32, i32),
    Flush,
}

const KEY_SPACE: i32 = 40;

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..KEY_SPACE, prop::collection::vec(-5i32..5, 0..3)).prop_map(|(k, v)| Op::Put(k, v)),
        2 => (0..KEY_SPACE).prop_map(Op::Delete),
        1 => (0..KEY_SPACE, 1..10i32).prop_map(|(s, len)| Op::DeleteRange(s, s + len)),
        1 => Just(Op::Flush),
    ]
}

fn options() -> impl Strategy<Value = Options> {
    (1usize..8, 1u64..12, 1u64..4, prop::option::of(1usize..12)).prop_map(
        |(flush_threshold, level_size_base, level_size_multiplier, bloom_bits_per_key)| Options {
            flush_threshold,
            level_size_base,
            level_size_multiplier,
            bloom_bits_per_key,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_matches_ordered_map(options in options(), ops in prop::collection::vec(op(), 1..120)) {
        let dir = tempdir().unwrap();
        let mut db = DB::open(dir.path(), options).unwrap();
        let mut model: BTreeMap<i32, Vec<i32>> = BTreeMap::new();

        for op in &ops {
            match op {
                Op::Put(k, v) => {
                    db.put(*k, v.clone()).unwrap();
                    model.insert(*k, v.clone());
                }
                Op::Delete(k) => {
                    db.delete(*k).unwrap();
                    model.remove(k);
                }
                Op::DeleteRange(s, e) => {
                    db.delete_range(*s, *e).unwrap();
                    model.retain(|k, _| !(*s..*e).contains(k));
                }
                Op::Flush => db.flush().unwrap(),
            }
        }

        let expected: Vec<(i32, Vec<i32>)> = model.iter().map(|(k, v)| (*k, v.clone())).collect();
        prop_assert_eq!(db.range(None, None).unwrap(), expected);

        for k in -1..KEY_SPACE + 10 {
            let want = model.get(&k).map_or(Value::Hidden, |v| Value::Visible(v.clone()));
            prop_assert_eq!(db.get(k).unwrap(), want, "key {}", k);
        }

        // every live run has exactly one file, nothing leaked
        let files = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| parse_run_file_name(&e.as_ref().unwrap().path()).is_some())
            .count();
        let runs: usize = db.stats().levels.iter().map(|l| l.runs).sum();
        prop_assert_eq!(files, runs);

        let non_flush = ops.iter().filter(|o| !matches!(o, Op::Flush)).count() as u64;
        prop_assert_eq!(db.size(), non_flush);
    }
}
