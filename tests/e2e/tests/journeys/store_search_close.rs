//! Journey: store, search, close, reopen
//!
//! The everyday lifecycle of a vault from first run to a restored session.

use memvault_core::{ErrorKind, SearchFilters, StoreRequest, VaultError};
use memvault_e2e_tests::{TestDataFactory, TestVault};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_typescript_preference_roundtrip() {
    init_tracing();
    let tv = TestVault::open();

    let id = tv
        .vault
        .store_memory(
            StoreRequest::new("User prefers TypeScript over JavaScript for new services")
                .context("preferences")
                .record_type("preference")
                .tags(["languages"]),
        )
        .unwrap();

    let hits = tv
        .vault
        .search_memories("TypeScript", 10, SearchFilters::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
    assert_eq!(hits[0].tags, vec!["languages"]);

    let stats = tv.vault.get_stats().unwrap();
    assert_eq!(stats.total_records, 1);
    assert!(stats.last_updated.is_some());
}

#[test]
fn test_reopen_restores_everything() {
    init_tracing();
    let tv = TestVault::open();
    let ids = tv.seed(25);
    let before = tv.vault.get_stats().unwrap();

    let tv = tv.reopen();
    let after = tv.vault.get_stats().unwrap();
    assert_eq!(before, after);

    for id in ids {
        assert!(tv.vault.get_memory_by_id(id).unwrap().is_some());
    }
    assert!(tv.vault.verify_index().unwrap().is_consistent());
}

#[test]
fn test_closed_vault_leaves_no_plaintext() {
    init_tracing();
    let tv = TestVault::open();
    tv.store("the launch code is in the blue folder");
    assert!(tv.working_path().exists());

    tv.vault.close().unwrap();
    assert!(!tv.working_path().exists());
    assert!(tv.envelope_path().exists());

    for entry in std::fs::read_dir(tv.dir()).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().to_string();
        assert!(
            !name.ends_with("-wal") && !name.ends_with("-shm") && !name.ends_with("-journal"),
            "leftover side file {}",
            name
        );
    }

    let raw = std::fs::read_to_string(tv.envelope_path()).unwrap();
    assert!(!raw.contains("blue folder"));
}

#[test]
fn test_filters_narrow_results() {
    init_tracing();
    let tv = TestVault::open();
    tv.vault
        .remember("deploy with blue green rollout", Some("work"), Some("procedure"))
        .unwrap();
    tv.vault
        .remember("deploy the garden furniture", Some("personal"), Some("todo"))
        .unwrap();

    let all = tv
        .vault
        .search_memories("deploy", 10, SearchFilters::default())
        .unwrap();
    assert_eq!(all.len(), 2);

    let work = tv
        .vault
        .search_memories("deploy", 10, SearchFilters::default().with_context("work"))
        .unwrap();
    assert_eq!(work.len(), 1);
    assert_eq!(work[0].record_type, "procedure");

    let none = tv
        .vault
        .search_memories(
            "deploy",
            10,
            SearchFilters::default().with_context("work").with_type("todo"),
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_list_is_newest_first() {
    init_tracing();
    let tv = TestVault::open();
    let ids = tv.seed(5);

    let listed: Vec<u64> = tv
        .vault
        .list_memories(3, 0)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![ids[4], ids[3], ids[2]]);
}

#[test]
fn test_search_respects_limit() {
    init_tracing();
    let tv = TestVault::open();
    for i in 0..30 {
        tv.store(&format!("{} shared-term", TestDataFactory::lorem_content(4, i) + &i.to_string()));
    }

    let hits = tv
        .vault
        .search_memories("shared-term", 7, SearchFilters::default())
        .unwrap();
    assert_eq!(hits.len(), 7);
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.relevance)));
}

#[test]
fn test_closed_vault_rejects_calls() {
    init_tracing();
    let tv = TestVault::open();
    tv.vault.close().unwrap();

    let err = tv
        .vault
        .search_memories("anything", 10, SearchFilters::default())
        .unwrap_err();
    assert!(matches!(err, VaultError::NotOpen));
    assert_eq!(err.kind(), ErrorKind::State);
}
