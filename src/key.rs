use crate::error::CacheError;

/// Maximum length of a cache key, in bytes.
pub const MAX_KEY_LEN: usize = 120;

/// Validates that `key` matches `^[a-z0-9_-]{1,120}$`.
///
/// Returns the key back on success so callers can chain validation into an
/// expression without a separate borrow.
pub(crate) fn validate_key(key: &str) -> Result<&str, CacheError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');

    if valid {
        Ok(key)
    } else {
        Err(CacheError::InvalidArgument {
            reason: format!("Keys must match regex [a-z0-9_-]{{1,120}}: \"{key}\""),
        })
    }
}
