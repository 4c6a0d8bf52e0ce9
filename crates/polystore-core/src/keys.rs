//! Key normalization for backends with a restricted key character set.

use crate::error::StorageError;

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Fails with `InvalidKey` when the result is empty. Idempotent:
/// `normalize(normalize(k)) == normalize(k)`.
pub fn normalize(key: &str) -> Result<String, StorageError> {
    let normalized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if normalized.is_empty() {
        return Err(StorageError::InvalidKey(
            "key is empty after normalization".to_string(),
        ));
    }
    Ok(normalized)
}
