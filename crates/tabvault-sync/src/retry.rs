use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn retryable_message_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|connection.?(refused|reset)")
            .expect("retry regex must compile")
    })
}

pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504) || retryable_message_regex().is_match(error_text)
}

/// Fixed-delay retry policy. A `Retry-After` from the server replaces the
/// delay for that attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_http_error(429, ""));
        assert!(is_retryable_http_error(503, ""));
        assert!(is_retryable_http_error(400, "upstream overloaded"));
        assert!(!is_retryable_http_error(400, "bad payload"));
        assert!(!is_retryable_http_error(404, ""));
    }
}
