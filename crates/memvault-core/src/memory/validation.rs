//! Content validation
//!
//! Runs before anything touches the database: shape checks on the content
//! and a scan for text that looks like a credential.

use regex::Regex;

/// Maximum content length in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Built-in secret-shaped patterns as `(name, regex)`
pub const DEFAULT_SECRET_PATTERNS: &[(&str, &str)] = &[
    ("stripe-secret-key", r"sk_[A-Za-z0-9_]{20,}"),
    ("google-api-key", r"AIza[0-9A-Za-z\-_]{35}"),
    ("stripe-live-publishable-key", r"pk_live_[A-Za-z0-9]{24,}"),
    ("password-assignment", r"(?i)password\s*[:=]\s*\S+"),
    ("secret-assignment", r"(?i)secret\s*[:=]\s*\S+"),
    ("api-key-assignment", r"(?i)api[_\s]*key\s*[:=]\s*\S+"),
];

// ============================================================================
// ERRORS
// ============================================================================

/// Bad caller input; reported immediately, never retried
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid content: must be a non-empty string")]
    EmptyContent,
    #[error("Invalid content: cannot be whitespace only")]
    WhitespaceContent,
    #[error("Content too large: {chars} characters (max {max})")]
    ContentTooLarge { chars: usize, max: usize },
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Invalid limit {0}: must be between 1 and 100")]
    InvalidLimit(usize),
    #[error("Invalid secret pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },
}

/// Content rejected for resembling a credential.
///
/// Only the pattern name is carried; the offending text never is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Potential secret detected in content (pattern: {pattern})")]
pub struct SecuritySignal {
    pub pattern: String,
}

/// Either failure mode of [`ContentValidator::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentRejection {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Secret(#[from] SecuritySignal),
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Compiled validation rules
#[derive(Debug, Clone)]
pub struct ContentValidator {
    max_chars: usize,
    patterns: Vec<(String, Regex)>,
}

impl ContentValidator {
    /// Compile a validator from `(name, regex)` pairs
    pub fn new<I, N, P>(max_chars: usize, patterns: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|(name, pattern)| {
                let name = name.into();
                Regex::new(pattern.as_ref())
                    .map(|re| (name.clone(), re))
                    .map_err(|e| ValidationError::InvalidPattern {
                        name,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_chars,
            patterns,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Check shape first, then scan for secrets
    pub fn validate(&self, content: &str) -> Result<(), ContentRejection> {
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        if content.trim().is_empty() {
            return Err(ValidationError::WhitespaceContent.into());
        }

        let chars = content.chars().count();
        if chars > self.max_chars {
            return Err(ValidationError::ContentTooLarge {
                chars,
                max: self.max_chars,
            }
            .into());
        }

        if let Some((name, _)) = self.patterns.iter().find(|(_, re)| re.is_match(content)) {
            tracing::warn!(pattern = %name, "Rejected content matching secret pattern");
            return Err(SecuritySignal {
                pattern: name.clone(),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(MAX_CONTENT_CHARS, DEFAULT_SECRET_PATTERNS.iter().copied())
            .expect("built-in secret patterns compile")
    }
}

/// Validate a search limit (1..=100)
pub fn validate_limit(limit: usize) -> Result<(), ValidationError> {
    if (1..=100).contains(&limit) {
        Ok(())
    } else {
        Err(ValidationError::InvalidLimit(limit))
    }
}
