//! Test Data Factory
//!
//! Generates realistic, distinct memories for seeding vaults.

use memvault_core::StoreRequest;

/// Factory for creating test data
pub struct TestDataFactory;

impl TestDataFactory {
    /// A distinct request; the index is embedded so contents never collide
    pub fn request(seed: usize) -> StoreRequest {
        StoreRequest::new(format!("{} (entry {})", Self::lorem_content(8, seed), seed))
            .context(Self::context(seed))
            .record_type(Self::record_type(seed))
            .tags(Self::generate_tags(2, seed))
    }

    pub fn record_type(seed: usize) -> &'static str {
        const TYPES: [&str; 5] = ["fact", "preference", "procedure", "event", "insight"];
        TYPES[seed % TYPES.len()]
    }

    pub fn context(seed: usize) -> &'static str {
        const CONTEXTS: [&str; 3] = ["work", "personal", "general"];
        CONTEXTS[seed % CONTEXTS.len()]
    }

    /// Generate lorem ipsum-like content
    pub fn lorem_content(words: usize, seed: usize) -> String {
        const WORDS: [&str; 20] = [
            "the", "memory", "learning", "knowledge", "algorithm",
            "data", "system", "process", "function", "method",
            "class", "object", "variable", "constant", "type",
            "structure", "pattern", "design", "architecture", "code",
        ];

        (0..words)
            .map(|i| WORDS[(seed + i * 7) % WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Generate tags
    pub fn generate_tags(count: usize, seed: usize) -> Vec<String> {
        const TAGS: [&str; 10] = [
            "important", "review", "todo", "concept", "fact",
            "code", "note", "idea", "question", "reference",
        ];

        (0..count)
            .map(|i| TAGS[(seed + i) % TAGS.len()].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_distinct() {
        let a = TestDataFactory::request(0);
        let b = TestDataFactory::request(20);
        assert_ne!(a.content, b.content);
    }

    #[test]
    fn test_lorem_content() {
        let content = TestDataFactory::lorem_content(10, 42);
        assert_eq!(content.split_whitespace().count(), 10);
    }
}
