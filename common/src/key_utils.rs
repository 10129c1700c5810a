use percent_encoding::{NON_ALPHANUMERIC, percent_encode};

use crate::constants::MAX_ID_LEN;
use crate::error::KeyError;

/// Validates a file or node identifier before it is used in a path, a store key
/// or a comma-separated query parameter.
pub fn validate_id(raw: &str) -> Result<&str, KeyError> {
    if raw.is_empty() || raw.len() > MAX_ID_LEN {
        return Err(KeyError::Length);
    }
    if raw == "." || raw.contains("..") {
        return Err(KeyError::Forbidden);
    }
    if raw
        .bytes()
        .any(|b| b < 0x20 || b == 0x7f || matches!(b, b'/' | b'\\' | b',' | b'#'))
    {
        return Err(KeyError::Forbidden);
    }
    Ok(raw)
}

pub fn encode_component(s: &str) -> String {
    percent_encode(s.as_bytes(), NON_ALPHANUMERIC).to_string()
}

/// Splits the `secondaries` query parameter of a proxied upload.
pub fn split_node_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
