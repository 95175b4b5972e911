//! Property tests for implant, rewrite and check

use graft_core::{check, slot_id, ImplantRequest, Implanter, RangeError};
use graft_store::{walk, Dataset, RecordKind, RecordStore, Schema, SCHEMA_VERSION};
use graft_test_utils::arb_unit_store;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Source store, target store, source start, block length and target start
fn arb_case() -> impl Strategy<Value = (RecordStore, RecordStore, usize, usize, usize)> {
    (1usize..16, 1usize..16, 1usize..4).prop_flat_map(|(src_len, dst_len, realm_count)| {
        (
            arb_unit_store(src_len, realm_count),
            arb_unit_store(dst_len, realm_count),
            0..src_len,
            1..=src_len,
            0usize..24,
        )
    })
}

fn units(store: RecordStore) -> Dataset {
    Dataset::new(SCHEMA_VERSION).with_store(RecordKind::Unit, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn implanted_self_ids_match_slots((src, dst, start, count, to) in arb_case()) {
        let schema = Schema::builtin();
        let source = units(src);
        let mut target = units(dst);
        let request = ImplantRequest::new(RecordKind::Unit, start, to).with_count(count);
        let outcome = Implanter::new(&schema).implant(&source, &mut target, &request).unwrap();

        let store = target.store(RecordKind::Unit).unwrap();
        for slot in outcome.target_slots() {
            for realm in 0..store.realm_count() {
                if let Some(record) = store.get(realm, slot) {
                    prop_assert_eq!(record.int("id"), Some(slot_id(slot)));
                }
            }
        }
    }

    #[test]
    fn implant_writes_only_its_footprint((src, dst, start, count, to) in arb_case()) {
        let schema = Schema::builtin();
        let source = units(src);
        let before = dst.clone();
        let mut target = units(dst);
        let request = ImplantRequest::new(RecordKind::Unit, start, to).with_count(count);
        let outcome = Implanter::new(&schema).implant(&source, &mut target, &request).unwrap();

        let store = target.store(RecordKind::Unit).unwrap();
        let footprint = outcome.target_slots();
        prop_assert_eq!(store.len(), before.len().max(footprint.end));
        for realm in 0..store.realm_count() {
            for slot in 0..store.len() {
                if footprint.contains(&slot) {
                    continue;
                }
                if slot < before.len() {
                    prop_assert_eq!(store.get(realm, slot), before.get(realm, slot));
                } else {
                    prop_assert!(store.get(realm, slot).is_none());
                }
            }
        }
    }

    #[test]
    fn implant_relocates_exactly_in_range_references((src, dst, start, count, to) in arb_case()) {
        let schema = Schema::builtin();
        let entry = schema.kind(RecordKind::Unit).unwrap();
        let source = units(src);
        let mut target = units(dst);
        let request = ImplantRequest::new(RecordKind::Unit, start, to).with_count(count);
        let outcome = Implanter::new(&schema).implant(&source, &mut target, &request).unwrap();

        let offset = slot_id(to) - slot_id(start);
        let moved = slot_id(start)..slot_id(start + outcome.count);
        let src_store = source.store(RecordKind::Unit).unwrap();
        let dst_store = target.store(RecordKind::Unit).unwrap();
        for (from, slot) in outcome.source_slots().zip(outcome.target_slots()) {
            for realm in 0..src_store.realm_count() {
                let (Some(old), Some(new)) = (src_store.get(realm, from), dst_store.get(realm, slot)) else {
                    prop_assert!(dst_store.get(realm, slot).is_none());
                    continue;
                };
                for field in &entry.references {
                    let mut was = Vec::new();
                    let mut now = Vec::new();
                    walk::visit(old, &field.path, |_, v| was.push(v)).unwrap();
                    walk::visit(new, &field.path, |_, v| now.push(v)).unwrap();
                    let expected: Vec<i64> = was
                        .into_iter()
                        .map(|v| if moved.contains(&v) { v + offset } else { v })
                        .collect();
                    prop_assert_eq!(now, expected);
                }
            }
        }
    }

    #[test]
    fn checker_is_read_only_and_repeatable((store, _, start, count, _) in arb_case()) {
        let schema = Schema::builtin();
        let entry = schema.kind(RecordKind::Unit).unwrap();
        let implanted: BTreeSet<usize> = (start..(start + count).min(store.len())).collect();
        let stale: BTreeSet<i64> = (0..slot_id(store.len())).step_by(3).collect();
        let before = store.clone();

        let first = check(&store, entry, &implanted, &stale);
        let second = check(&store, entry, &implanted, &stale);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&store, &before);
        for pair in first.windows(2) {
            prop_assert!((pair[0].slot, pair[0].realm) <= (pair[1].slot, pair[1].realm));
        }
    }

    #[test]
    fn count_is_clamped_to_source(len in 1usize..64, start in 0usize..80, count in 0usize..100) {
        let request = ImplantRequest::new(RecordKind::Unit, start, 0).with_count(count);
        match request.resolve(len) {
            Ok(n) => {
                prop_assert!(start < len);
                prop_assert_eq!(n, count.min(len - start));
                prop_assert!(n > 0);
            }
            Err(RangeError::StartOutOfBounds { .. }) => prop_assert!(start >= len),
            Err(RangeError::EmptyRange { .. }) => prop_assert_eq!(count, 0),
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
