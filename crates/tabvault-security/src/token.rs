//! Share token format: `share_<millis>_<random>`

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::SecurityError;
use crate::Result;

pub const SHARE_TOKEN_PREFIX: &str = "share";
const RANDOM_PART_LEN: usize = 12;

pub fn generate_share_token(now: DateTime<Utc>) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_PART_LEN)
        .map(char::from)
        .collect();

    format!(
        "{}_{}_{}",
        SHARE_TOKEN_PREFIX,
        now.timestamp_millis().max(1),
        random.to_lowercase()
    )
}

pub fn validate_share_token(token: &str) -> Result<()> {
    let parts: Vec<&str> = token.split('_').collect();
    if parts.len() != 3 {
        return Err(SecurityError::InvalidToken(format!(
            "expected 3 parts, found {}",
            parts.len()
        )));
    }

    if parts[0] != SHARE_TOKEN_PREFIX {
        return Err(SecurityError::InvalidToken(
            "missing share prefix".to_string(),
        ));
    }

    match parts[1].parse::<u64>() {
        Ok(ts) if ts > 0 => {}
        _ => {
            return Err(SecurityError::InvalidToken(
                "timestamp is not a positive integer".to_string(),
            ))
        }
    }

    if parts[2].is_empty() || !parts[2].chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SecurityError::InvalidToken(
            "random part must be alphanumeric".to_string(),
        ));
    }

    Ok(())
}
