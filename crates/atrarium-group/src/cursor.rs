//! Opaque feed pagination cursors.
//!
//! A cursor encodes the last-returned `(created_at_us, uri)` pair as
//! URL-safe unpadded base64 of `<micros>|<uri>`. Decoding failures are
//! reported as [`GroupError::InvalidCursor`] — a malformed cursor is a
//! caller bug and must stay distinguishable from a cleanly exhausted page,
//! which is signalled by omitting the cursor entirely.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::GroupError;

/// Encodes a pagination position.
pub fn encode_cursor(created_at_us: i64, uri: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{created_at_us}|{uri}"))
}

/// Decodes a pagination position.
pub fn decode_cursor(cursor: &str) -> Result<(i64, String), GroupError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| GroupError::InvalidCursor(format!("not base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| GroupError::InvalidCursor("not utf-8".to_string()))?;

    let (ts, uri) = text
        .split_once('|')
        .ok_or_else(|| GroupError::InvalidCursor("missing separator".to_string()))?;

    let created_at_us: i64 = ts
        .parse()
        .map_err(|_| GroupError::InvalidCursor("timestamp is not an integer".to_string()))?;

    if uri.is_empty() {
        return Err(GroupError::InvalidCursor("empty uri".to_string()));
    }

    Ok((created_at_us, uri.to_string()))
}
