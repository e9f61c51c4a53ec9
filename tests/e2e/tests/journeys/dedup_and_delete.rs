//! Journey: deduplication and deletion
//!
//! Identical content always lands on one record; the index tracks every
//! record change exactly.

use memvault_core::{SearchFilters, StoreRequest};
use memvault_e2e_tests::TestVault;

#[test]
fn test_same_content_same_id() {
    let tv = TestVault::open();

    let first = tv
        .vault
        .store_memory(StoreRequest::new("coffee at 9am").context("habits"))
        .unwrap();
    let second = tv
        .vault
        .store_memory(
            StoreRequest::new("coffee at 9am")
                .context("routine")
                .record_type("habit")
                .metadata("source", "chat"),
        )
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(tv.count(), 1);

    // Last write wins on labels
    let record = tv.vault.get_memory_by_id(first).unwrap().unwrap();
    assert_eq!(record.context, "routine");
    assert_eq!(record.record_type, "habit");
    assert_eq!(record.metadata.get("source").map(String::as_str), Some("chat"));
}

#[test]
fn test_typescript_note_store_dedup_delete() {
    let tv = TestVault::open();
    let note = || StoreRequest::new("Project uses TypeScript").context("notes");

    assert_eq!(tv.vault.store_memory(note()).unwrap(), 1);
    assert_eq!(tv.vault.store_memory(note()).unwrap(), 1);

    let hits = tv
        .vault
        .search_memories("TypeScript", 10, SearchFilters::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[0].context, "notes");

    assert!(tv.vault.delete_memory(1).unwrap());
    let hits = tv
        .vault
        .search_memories("TypeScript", 10, SearchFilters::default())
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(tv.count(), 0);
}

#[test]
fn test_near_duplicates_are_distinct() {
    let tv = TestVault::open();
    let a = tv.store("coffee at 9am");
    let b = tv.store("coffee at 9am ");
    let c = tv.store("Coffee at 9am");
    assert!(a != b && b != c && a != c);
    assert_eq!(tv.count(), 3);
}

#[test]
fn test_delete_removes_from_search() {
    let tv = TestVault::open();
    let keep = tv.store("keep the orchid watered");
    let drop = tv.store("drop the orchid subscription");

    assert!(tv.vault.delete_memory(drop).unwrap());
    assert!(!tv.vault.delete_memory(drop).unwrap());
    assert!(tv.vault.get_memory_by_id(drop).unwrap().is_none());

    let hits = tv
        .vault
        .search_memories("orchid", 10, SearchFilters::default())
        .unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![keep]);
}

#[test]
fn test_delete_then_restore_gets_new_id() {
    let tv = TestVault::open();
    let old = tv.store("ephemeral thought");
    assert!(tv.vault.delete_memory(old).unwrap());
    let new = tv.store("ephemeral thought");
    assert!(new > old);
}

#[test]
fn test_index_bijection_across_mixed_operations() {
    let tv = TestVault::open();
    let ids = tv.seed(40);

    for (i, id) in ids.iter().enumerate() {
        if i % 3 == 0 {
            assert!(tv.vault.delete_memory(*id).unwrap());
        }
    }
    // Re-store a few survivors unchanged (replace path)
    for i in [1usize, 2, 4] {
        let record = tv.vault.get_memory_by_id(ids[i]).unwrap().unwrap();
        let again = tv
            .vault
            .store_memory(StoreRequest::new(record.content).context("moved"))
            .unwrap();
        assert_eq!(again, ids[i]);
    }

    let report = tv.vault.verify_index().unwrap();
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.records, 40 - 14);
    assert_eq!(report.records, report.indexed);

    let tv = tv.reopen();
    assert!(tv.vault.verify_index().unwrap().is_consistent());
}

#[test]
fn test_stats_track_bytes() {
    let tv = TestVault::open();
    tv.store("12345");
    let id = tv.store("hé");
    assert_eq!(tv.vault.get_stats().unwrap().total_content_bytes, 5 + 3);

    tv.vault.delete_memory(id).unwrap();
    assert_eq!(tv.vault.get_stats().unwrap().total_content_bytes, 5);
}
