
use std::sync::LazyLock;

use fancy_regex::Regex;
use thiserror::Error;

/// Markup and script injection patterns, matched case-insensitively
static SUSPICIOUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<script.*?>.*?</script>",
        r"(?i)javascript:",
        r"(?i)on\w+\s*=",
        r"(?i)data:text/html",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("suspicious content pattern is valid"))
    .collect()
});

/// A request rejected before any component was called
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Input cannot be empty")]
    EmptyQuery,
    #[error("Input too long ({length} characters, max {max})")]
    QueryTooLong { length: usize, max: usize },
    #[error("Input contains potentially unsafe content")]
    SuspiciousContent,
    #[error("k must be a positive integer, got {0}")]
    InvalidK(i64),
}

impl ValidationError {
    /// Stable machine-readable code
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::QueryTooLong { .. } => "query_too_long",
            Self::SuspiciousContent => "suspicious_content",
            Self::InvalidK(_) => "invalid_k",
        }
    }
}

/// Trim `text` and check it against the emptiness, length and content rules
///
/// Length is counted in characters after trimming.
#[inline]
pub fn validate_query(text: &str, max_length: usize) -> Result<&str, ValidationError> {
    let text = text.trim();

    if text.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    let length = text.chars().count();
    if length > max_length {
        return Err(ValidationError::QueryTooLong {
            length,
            max: max_length,
        });
    }

    // A pattern that errors out (backtrack limit) is treated as a match
    if SUSPICIOUS_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(text).unwrap_or(true))
    {
        return Err(ValidationError::SuspiciousContent);
    }

    Ok(text)
}
