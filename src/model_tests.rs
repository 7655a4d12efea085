//! Randomized operation-sequence property test over the real [`crate::Cache`], grounded on the
//! `quickcheck`-driven `Action`/model-check harness in the bare `disk_v2/tests/model.rs`
//! (not the `variants/disk_v2` copy, which has no model test): generate a
//! sequence of `put`/`remove`/`get`/`flush` actions over a small fixed key universe and check
//! that the invariants from the spec's testable-properties section keep holding, rather than
//! comparing against a hand-written parallel model (the real filesystem is the oracle here: a
//! key is either readable through `get()` with the bytes it was last committed with, or it
//! isn't).

use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

use crate::config::CacheConfig;
use crate::Cache;

const KEY_UNIVERSE: usize = 6;

fn key_for(index: u8) -> String {
    format!("k{}", index as usize % KEY_UNIVERSE)
}

#[derive(Clone, Debug)]
enum Action {
    Put(u8, u8),
    Remove(u8),
    Get(u8),
    Flush,
}

impl Arbitrary for Action {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 4 {
            0 => Action::Put(u8::arbitrary(g), u8::arbitrary(g) % 32),
            1 => Action::Remove(u8::arbitrary(g)),
            2 => Action::Get(u8::arbitrary(g)),
            _ => Action::Flush,
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Action::Put(k, len) => {
                let k = *k;
                Box::new(len.shrink().map(move |len| Action::Put(k, len)))
            }
            _ => Box::new(std::iter::empty()),
        }
    }
}

fn on_disk_len(dir: &std::path::Path, key: &str) -> Option<u64> {
    std::fs::metadata(dir.join(format!("{key}.0"))).ok().map(|m| m.len())
}

#[test]
fn random_operation_sequences_keep_size_consistent_with_disk() {
    fn inner(actions: Vec<Action>) -> TestResult {
        crate::test_support::init_tracing();
        if actions.len() > 200 {
            return TestResult::discard();
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open_with_config(
            CacheConfig::builder(dir.path())
                .value_count(1)
                .max_size(1_000_000)
                .build()
                .expect("valid config"),
        )
        .expect("cache should open");

        for action in &actions {
            match action {
                Action::Put(k, len) => {
                    let key = key_for(*k);
                    if let Some(mut editor) = cache.edit(&key).expect("edit should not error") {
                        let payload = vec![b'x'; *len as usize];
                        if editor.set(0, &payload).is_ok() {
                            let _ = editor.commit();
                        } else {
                            let _ = editor.abort();
                        }
                    }
                }
                Action::Remove(k) => {
                    let key = key_for(*k);
                    let _ = cache.remove(&key);
                }
                Action::Get(k) => {
                    let key = key_for(*k);
                    let _ = cache.get(&key);
                }
                Action::Flush => {
                    let _ = cache.flush();
                }
            }
        }

        cache.flush().expect("flush should not error");

        let mut expected_size = 0u64;
        for i in 0..KEY_UNIVERSE as u8 {
            let key = key_for(i);
            match cache.get(&key) {
                Ok(Some(snapshot)) => {
                    let reported = snapshot.get_length(0).expect("index 0 exists");
                    let on_disk = match on_disk_len(dir.path(), &key) {
                        Some(len) => len,
                        None => return TestResult::error(format!("{key}: readable but file missing")),
                    };
                    if reported != on_disk {
                        return TestResult::error(format!(
                            "{key}: snapshot length {reported} != on-disk length {on_disk}"
                        ));
                    }
                    expected_size += on_disk;
                }
                Ok(None) => {
                    if dir.path().join(format!("{key}.0")).exists() {
                        return TestResult::error(format!("{key}: not readable but file exists"));
                    }
                }
                Err(e) => return TestResult::error(format!("{key}: get() errored: {e}")),
            }
        }

        if cache.size() != expected_size {
            return TestResult::error(format!(
                "cache.size() {} != sum of on-disk readable lengths {}",
                cache.size(),
                expected_size
            ));
        }

        cache.close().expect("close should not error");
        TestResult::passed()
    }

    QuickCheck::new().tests(200).quickcheck(inner as fn(Vec<Action>) -> TestResult);
}

#[test]
fn at_most_one_editor_survives_concurrent_attempts() {
    fn inner(k: u8) -> TestResult {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open_with_config(
            CacheConfig::builder(dir.path())
                .value_count(1)
                .max_size(1_000_000)
                .build()
                .expect("valid config"),
        )
        .expect("cache should open");

        let key = key_for(k);
        let first = cache.edit(&key).expect("edit should not error");
        let second = cache.edit(&key).expect("edit should not error");

        let result = match (first.is_some(), second.is_some()) {
            (true, false) => TestResult::passed(),
            other => TestResult::error(format!("expected exactly one editor, got {other:?}")),
        };

        cache.close().expect("close should not error");
        result
    }

    QuickCheck::new().tests(50).quickcheck(inner as fn(u8) -> TestResult);
}
