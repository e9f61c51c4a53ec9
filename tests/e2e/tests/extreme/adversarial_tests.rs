//! Adversarial input tests
//!
//! Hostile or malformed input must be rejected before anything is written,
//! and query syntax must never reach the index unescaped.

use memvault_core::{ErrorKind, SearchFilters, StoreRequest, ValidationError, VaultError};
use memvault_e2e_tests::TestVault;

fn assert_rejected(tv: &TestVault, content: String, kind: ErrorKind) {
    let err = tv.vault.store_memory(StoreRequest::new(content)).unwrap_err();
    assert_eq!(err.kind(), kind, "unexpected error: {}", err);
}

#[test]
fn test_content_shape_boundaries() {
    let tv = TestVault::open();

    assert_rejected(&tv, String::new(), ErrorKind::Validation);
    assert_rejected(&tv, " \t\n ".into(), ErrorKind::Validation);
    assert_rejected(&tv, "a".repeat(10_001), ErrorKind::Validation);

    // Exactly at the limit is fine, and the limit counts characters
    tv.store(&"a".repeat(10_000));
    tv.store(&"é".repeat(10_000));
    assert_eq!(tv.count(), 2);
}

#[test]
fn test_secret_shapes_rejected() {
    let tv = TestVault::open();

    // Assembled at runtime so repository scanners leave the file alone
    let samples = [
        ["sk", "_live_", "0123456789abcdefghijklmn"].concat(),
        ["AI", "za", &"x".repeat(35)].concat(),
        ["pk", "_live_", &"Q".repeat(24)].concat(),
        "db PASSWORD = swordfish".to_string(),
        "client secret: abc123".to_string(),
        "api key=zzz".to_string(),
        "API_KEY: zzz".to_string(),
    ];
    for sample in samples {
        assert_rejected(&tv, sample, ErrorKind::SecuritySignal);
    }
    assert_eq!(tv.count(), 0);
}

#[test]
fn test_security_error_does_not_echo_content() {
    let tv = TestVault::open();
    let err = tv
        .vault
        .store_memory(StoreRequest::new("password: correct-horse-battery"))
        .unwrap_err();
    assert!(matches!(err, VaultError::Security(_)));
    assert!(!err.to_string().contains("correct-horse-battery"));
}

#[test]
fn test_benign_mentions_pass() {
    let tv = TestVault::open();
    tv.store("remember to rotate the password next week");
    tv.store("the secret ingredient is cardamom");
    tv.store("sk_short");
    assert_eq!(tv.count(), 3);
}

#[test]
fn test_limit_bounds() {
    let tv = TestVault::open();
    for limit in [0usize, 101, usize::MAX] {
        let err = tv
            .vault
            .search_memories("x", limit, SearchFilters::default())
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(ValidationError::InvalidLimit(_))));
    }
}

#[test]
fn test_fts_syntax_is_neutralized() {
    let tv = TestVault::open();
    let id = tv.store("NEAR the OR gate stands a NOT sign");

    let hostile = [
        "NEAR(",
        "\"unterminated",
        "OR",
        "content:gate",
        "gate*",
        "^gate",
        "(gate) AND",
        "gate'; DROP TABLE memories; --",
    ];
    for query in hostile {
        let result = tv.vault.search_memories(query, 10, SearchFilters::default());
        assert!(result.is_ok(), "query {:?} failed: {:?}", query, result.err());
    }

    let hits = tv
        .vault
        .search_memories("OR gate", 10, SearchFilters::default())
        .unwrap();
    assert_eq!(hits[0].id, id);
    assert!(tv.vault.verify_index().unwrap().is_consistent());
}

#[test]
fn test_punctuation_only_query_is_invalid() {
    let tv = TestVault::open();
    let err = tv
        .vault
        .search_memories("!!! ??? ***", 10, SearchFilters::default())
        .unwrap_err();
    assert!(matches!(err, VaultError::Validation(ValidationError::InvalidQuery(_))));
}

#[test]
fn test_concurrent_readers_and_writer() {
    let tv = std::sync::Arc::new(TestVault::open());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tv = std::sync::Arc::clone(&tv);
            std::thread::spawn(move || {
                for i in 0..25 {
                    tv.store(&format!("thread {} note {} parallel", t, i));
                    let _ = tv
                        .vault
                        .search_memories("parallel", 5, SearchFilters::default())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tv.count(), 100);
    assert!(tv.vault.verify_index().unwrap().is_consistent());
}
