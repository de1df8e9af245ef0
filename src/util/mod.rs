use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// Decodes a base64 frame, tolerating a `data:<mime>;base64,` prefix and stray whitespace.
pub fn decode_base64_payload(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = encoded.trim();
    let data = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => trimmed,
    };
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_STANDARD.decode(compact)
}

/// Reduces an extractor-supplied id to characters safe for a file name.
pub fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if stem.is_empty() {
        "video".to_owned()
    } else {
        stem
    }
}
