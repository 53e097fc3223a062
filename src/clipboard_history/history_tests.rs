use super::*;
use crate::clipboard_history::hashing::hash_bytes;

fn text(value: &str) -> ClipboardRecord {
    ClipboardRecord::text(value, false)
}

fn texts(model: &HistoryModel) -> Vec<&str> {
    model.records().iter().map(|r| r.resolved_text()).collect()
}

fn assert_partitioned(model: &HistoryModel) {
    let first_unpinned = model
        .records()
        .iter()
        .position(|r| !r.is_pinned)
        .unwrap_or(model.len());
    assert!(
        model.records()[first_unpinned..].iter().all(|r| !r.is_pinned),
        "pinned record found after an unpinned one: {:?}",
        model
            .records()
            .iter()
            .map(|r| (r.resolved_text(), r.is_pinned))
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_insert_prepends_unpinned() {
    let mut model = HistoryModel::new(10);
    model.insert(text("a"));
    model.insert(text("b"));
    assert_eq!(texts(&model), vec!["b", "a"]);
    assert_eq!(model.revision(), 2);
}

#[test]
fn test_bound_evicts_oldest() {
    let mut model = HistoryModel::new(20);
    let mut evicted = Vec::new();
    for i in 0..25 {
        let outcome = model.insert(text(&format!("item {i}")));
        assert!(model.unpinned_len() <= 20);
        evicted.extend(outcome.evicted);
    }

    assert_eq!(model.unpinned_len(), 20);
    let evicted_texts: Vec<_> = evicted.iter().map(|r| r.resolved_text()).collect();
    assert_eq!(
        evicted_texts,
        vec!["item 0", "item 1", "item 2", "item 3", "item 4"]
    );
    assert_eq!(model.records()[0].resolved_text(), "item 24");
}

#[test]
fn test_pinned_records_do_not_count_against_bound() {
    let mut model = HistoryModel::new(2);
    for i in 0..3 {
        let id = model.insert(text(&format!("pin {i}"))).inserted.unwrap();
        model.toggle_pin(id);
    }
    model.insert(text("x"));
    model.insert(text("y"));
    model.insert(text("z"));

    assert_eq!(model.pinned_len(), 3);
    assert_eq!(model.unpinned_len(), 2);
    assert_eq!(texts(&model)[3..], ["z", "y"]);
}

#[test]
fn test_duplicate_keeps_pin_state() {
    let mut model = HistoryModel::new(10);
    let a = model.insert(text("hello")).inserted.unwrap();
    model.insert(text("other"));
    assert_eq!(model.toggle_pin(a), Some(true));

    let b = text("hello");
    let b_id = b.id;
    let b_ts = b.timestamp;
    let outcome = model.insert(b);

    assert_eq!(outcome.decision, DedupDecision::DuplicateReplace(a));
    assert_eq!(outcome.replaced.as_ref().map(|r| r.id), Some(a));
    let hellos: Vec<_> = model
        .records()
        .iter()
        .filter(|r| r.resolved_text() == "hello")
        .collect();
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].id, b_id);
    assert_eq!(hellos[0].timestamp, b_ts);
    assert!(hellos[0].is_pinned);
    assert_partitioned(&model);
}

#[test]
fn test_duplicate_of_unpinned_moves_to_front() {
    let mut model = HistoryModel::new(10);
    model.insert(text("a"));
    model.insert(text("b"));
    model.insert(text("a"));
    assert_eq!(texts(&model), vec!["a", "b"]);
}

#[test]
fn test_resubmitting_same_id_is_skipped() {
    let mut model = HistoryModel::new(10);
    let record = text("a");
    model.insert(record.clone());
    let revision = model.revision();

    let outcome = model.insert(record);
    assert_eq!(outcome.decision, DedupDecision::DuplicateSkip);
    assert_eq!(outcome.inserted, None);
    assert_eq!(model.len(), 1);
    assert_eq!(model.revision(), revision);
}

#[test]
fn test_image_dedup_uses_index() {
    let mut model = HistoryModel::new(10);
    let hash = hash_bytes(b"png");
    let first = model
        .insert(ClipboardRecord::image(hash.clone(), false))
        .inserted
        .unwrap();
    model.insert(text("between"));

    let outcome = model.insert(ClipboardRecord::image(hash.clone(), false));
    assert_eq!(outcome.decision, DedupDecision::DuplicateReplace(first));
    assert_eq!(model.len(), 2);
    assert_eq!(model.find_image(&hash), outcome.inserted);
}

#[test]
fn test_index_follows_eviction_and_delete() {
    let mut model = HistoryModel::new(1);
    let hash = hash_bytes(b"png");
    model.insert(ClipboardRecord::image(hash.clone(), false));
    model.insert(text("pushes image out"));
    assert_eq!(model.find_image(&hash), None);

    let id = model
        .insert(ClipboardRecord::image(hash.clone(), false))
        .inserted
        .unwrap();
    assert!(model.delete(id).is_some());
    assert_eq!(model.find_image(&hash), None);
}

#[test]
fn test_toggle_pin_moves_to_boundary() {
    let mut model = HistoryModel::new(10);
    let a = model.insert(text("a")).inserted.unwrap();
    let b = model.insert(text("b")).inserted.unwrap();
    let c = model.insert(text("c")).inserted.unwrap();

    model.toggle_pin(a);
    model.toggle_pin(c);
    // pinning appends to the end of the pinned partition
    assert_eq!(texts(&model), vec!["a", "c", "b"]);

    assert_eq!(model.toggle_pin(a), Some(false));
    // unpinning lands at the start of the unpinned partition
    assert_eq!(texts(&model), vec!["c", "a", "b"]);
    assert_eq!(model.toggle_pin(b).map(|_| model.pinned_len()), Some(2));
    assert_eq!(model.toggle_pin(RecordId::new()), None);
}

#[test]
fn test_unpin_does_not_evict() {
    let mut model = HistoryModel::new(1);
    let a = model.insert(text("a")).inserted.unwrap();
    model.toggle_pin(a);
    model.insert(text("b"));
    model.toggle_pin(a);
    assert_eq!(model.unpinned_len(), 2);

    let outcome = model.insert(text("c"));
    assert_eq!(outcome.evicted.len(), 2);
    assert_eq!(texts(&model), vec!["c"]);
}

#[test]
fn test_clear_keep_pinned() {
    let mut model = HistoryModel::new(10);
    let a = model.insert(text("a")).inserted.unwrap();
    model.insert(text("b"));
    model.insert(text("c"));
    model.toggle_pin(a);

    let removed = model.clear(true);
    assert_eq!(removed.len(), 2);
    assert_eq!(texts(&model), vec!["a"]);

    let removed = model.clear(false);
    assert_eq!(removed.len(), 1);
    assert!(model.is_empty());
    assert!(model.clear(false).is_empty());
}

#[test]
fn test_from_records_restores_invariants() {
    let mut pinned = text("pinned");
    pinned.is_pinned = true;
    let newest = text("dup");
    let stale_dup = text("dup");
    let stored = vec![
        newest.clone(),
        pinned.clone(),
        text("one"),
        stale_dup.clone(),
        text("two"),
    ];

    let (model, dropped) = HistoryModel::from_records(stored, 2);
    assert_eq!(texts(&model), vec!["pinned", "dup", "one"]);
    let dropped_ids: Vec<_> = dropped.iter().map(|r| r.id).collect();
    assert!(dropped_ids.contains(&stale_dup.id));
    assert_eq!(dropped.len(), 2);
    assert_eq!(model.records()[1].id, newest.id);
}

#[test]
fn test_absorb_appends_stored_records_behind_held_ones() {
    let stored_a = text("a");
    let stored_b = text("b");
    let stored_copy = text("fresh");
    let mut stored_pinned = text("pinned");
    stored_pinned.is_pinned = true;

    let mut model = HistoryModel::new(3);
    let held = model.insert(text("fresh")).inserted.unwrap();
    let revision = model.revision();

    let dropped = model.absorb(vec![
        stored_b.clone(),
        stored_pinned,
        stored_a,
        stored_copy.clone(),
    ]);

    assert_eq!(texts(&model), vec!["pinned", "fresh", "b", "a"]);
    assert_eq!(model.records()[1].id, held);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].id, stored_copy.id);
    assert_eq!(model.revision(), revision + 1);
    assert_partitioned(&model);

    // nothing new to fold in
    let again = model.absorb(vec![stored_b]);
    assert!(again.is_empty());
    assert_eq!(model.revision(), revision + 1);
}

#[test]
fn test_absorb_honors_bound() {
    let stored: Vec<ClipboardRecord> = (0..4).map(|i| text(&format!("stored {i}"))).collect();
    let mut model = HistoryModel::new(2);
    model.insert(text("held"));

    let dropped = model.absorb(stored);
    assert_eq!(texts(&model), vec!["held", "stored 3"]);
    assert_eq!(dropped.len(), 3);
}

#[test]
fn test_referenced_asset_paths() {
    let mut model = HistoryModel::new(10);
    let mut record = text("rich");
    record.html_path = Some(PathBuf::from("/assets/a.html"));
    record.rich_text_path = Some(PathBuf::from("/assets/a.rtf"));
    model.insert(record);
    model.insert(text("plain"));

    let paths = model.referenced_asset_paths();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&PathBuf::from("/assets/a.html")));
}

#[test]
fn test_invariants_hold_under_mixed_operations() {
    // xorshift keeps the sequence deterministic
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let max = 5;
    let mut model = HistoryModel::new(max);
    for _ in 0..2_000 {
        match next() % 5 {
            0 | 1 => {
                let outcome = model.insert(text(&format!("t{}", next() % 12)));
                assert!(model.unpinned_len() <= max);
                assert!(outcome.inserted.is_some());
            }
            2 | 3 if !model.is_empty() => {
                let index = (next() as usize) % model.len();
                let id = model.records()[index].id;
                model.toggle_pin(id);
            }
            4 if !model.is_empty() => {
                let index = (next() as usize) % model.len();
                let id = model.records()[index].id;
                model.delete(id);
            }
            _ => {}
        }

        assert_partitioned(&model);
        let unique: HashSet<&str> = model.records().iter().map(|r| r.resolved_text()).collect();
        assert_eq!(unique.len(), model.len(), "duplicate text in history");
    }
}
