use crate::dcd::{DcStore, ExtentRange, Region};
use crate::poison::{PoisonKind, PoisonRecord, PoisonStore};
use crate::{MailboxStatus, CACHE_LINE_SIZE};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;
use std::collections::BTreeSet;

const LINE: u64 = CACHE_LINE_SIZE;
const MAX_LINES: u64 = 64;
const MAX_OPS: usize = 48;

const BLOCK: u64 = 2 * 1024 * 1024;
const BLOCKS: usize = 32;
const DC_BASE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
enum PoisonOp {
    Inject { line: u64 },
    Clear { line: u64 },
    MediaError { line: u64, lines: u64 },
}

fn poison_op_strategy() -> impl Strategy<Value = PoisonOp> {
    prop_oneof![
        3 => (0..MAX_LINES).prop_map(|line| PoisonOp::Inject { line }),
        3 => (0..MAX_LINES).prop_map(|line| PoisonOp::Clear { line }),
        1 => (0..MAX_LINES, 1u64..8).prop_map(|(line, lines)| PoisonOp::MediaError { line, lines }),
    ]
}

fn covered_lines(records: &[PoisonRecord]) -> BTreeSet<u64> {
    records
        .iter()
        .flat_map(|r| (r.start / LINE)..(r.end() / LINE))
        .collect()
}

fn check_disjoint(records: &[PoisonRecord]) -> TestCaseResult {
    for pair in records.windows(2) {
        prop_assert!(pair[0].end() <= pair[1].start, "overlap: {:?}", pair);
    }
    for r in records {
        prop_assert!(r.len > 0 && r.len % LINE == 0 && r.start % LINE == 0);
    }
    Ok(())
}

/// Turns a run pattern into disjoint block-aligned extents: 0 leaves a gap,
/// 1 extends the current extent, 2 starts a new one.
fn extents_from_pattern(pattern: &[u8]) -> Vec<ExtentRange> {
    let mut out: Vec<ExtentRange> = Vec::new();
    let mut extending = false;
    for (i, &p) in pattern.iter().enumerate() {
        match (p, out.last_mut()) {
            (0, _) => {
                extending = false;
                continue;
            }
            (1, Some(last)) if extending => {
                last.len += BLOCK;
                continue;
            }
            _ => {}
        }
        out.push(ExtentRange::new(DC_BASE + i as u64 * BLOCK, BLOCK));
        extending = true;
    }
    out
}

fn dc_store() -> DcStore {
    DcStore::new(vec![Region {
        base: DC_BASE,
        decode_len: 256 * 1024 * 1024,
        len: BLOCKS as u64 * BLOCK,
        block_size: BLOCK,
        dsmad_handle: 0,
        flags: 0,
    }])
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_poison_store_matches_line_model(ops in prop::collection::vec(poison_op_strategy(), 1..MAX_OPS)) {
        let mut store = PoisonStore::new();
        let mut model = BTreeSet::new();
        for op in ops {
            match op {
                PoisonOp::Inject { line } => {
                    prop_assert!(store.inject(line * LINE, false).is_ok());
                    model.insert(line);
                }
                PoisonOp::Clear { line } => {
                    let was_poisoned = model.remove(&line);
                    prop_assert_eq!(store.clear(line * LINE + 8, false, 0), was_poisoned);
                }
                PoisonOp::MediaError { line, lines } => {
                    store.record_media_error(line * LINE, lines * LINE, PoisonKind::Internal, 0);
                    model.extend(line..line + lines);
                }
            }
            check_disjoint(store.records())?;
            prop_assert_eq!(covered_lines(store.records()), model.clone());
        }
        prop_assert_eq!(store.overflow_timestamp(), None);
    }

    #[test]
    fn prop_clear_splits_into_head_and_tail(lines in 1u64..32, cleared in 0u64..32) {
        let cleared = cleared % lines;
        let mut store = PoisonStore::new();
        store.record_media_error(0x4000, lines * LINE, PoisonKind::External, 0);
        prop_assert!(store.clear(0x4000 + cleared * LINE, false, 0));

        let expected = usize::from(cleared > 0) + usize::from(cleared + 1 < lines);
        prop_assert_eq!(store.len(), expected);

        let mut union = covered_lines(store.records());
        prop_assert!(!union.contains(&(0x4000 / LINE + cleared)));
        union.insert(0x4000 / LINE + cleared);
        let original: BTreeSet<u64> = (0x4000 / LINE..0x4000 / LINE + lines).collect();
        prop_assert_eq!(union, original);
    }

    #[test]
    fn prop_inject_then_clear_restores_count(lines in prop::collection::btree_set(0u64..MAX_LINES, 0..16), target in 0u64..MAX_LINES) {
        prop_assume!(!lines.contains(&target));
        let mut store = PoisonStore::new();
        for &line in &lines {
            store.inject(line * LINE, false).unwrap();
        }
        let before = store.len();
        store.inject(target * LINE, false).unwrap();
        store.clear(target * LINE, false, 0);
        prop_assert_eq!(store.len(), before);
        prop_assert_eq!(covered_lines(store.records()), lines);
    }

    #[test]
    fn prop_add_then_release_restores_extents(pattern in prop::collection::vec(0u8..3, BLOCKS)) {
        let batch = extents_from_pattern(&pattern);
        let mut store = dc_store();
        let before = store.extents().len();

        prop_assert_eq!(store.add(&batch), Ok(()));
        prop_assert_eq!(store.extents().len(), before + batch.len());
        if batch.is_empty() {
            prop_assert_eq!(store.release(&batch), Err(MailboxStatus::InvalidInput));
        } else {
            prop_assert_eq!(store.release(&batch), Ok(()));
        }
        prop_assert_eq!(store.extents().len(), before);
    }

    #[test]
    fn prop_duplicate_block_in_batch_is_rejected(pattern in prop::collection::vec(0u8..3, BLOCKS), pick in any::<prop::sample::Index>()) {
        let mut batch = extents_from_pattern(&pattern);
        prop_assume!(!batch.is_empty());
        let dup = batch[pick.index(batch.len())];
        batch.push(ExtentRange::new(dup.start, BLOCK));

        let mut store = dc_store();
        prop_assert_eq!(store.validate_batch(&batch), Err(MailboxStatus::InvalidExtentList));
        prop_assert_eq!(store.add(&batch), Err(MailboxStatus::InvalidExtentList));
        prop_assert!(store.extents().is_empty());
    }
}
