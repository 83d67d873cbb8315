//! `data:` URL helpers for JPEG frames carried inside JSON bodies.

use crate::error::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const JPEG_PREFIX: &str = "data:image/jpeg;base64,";

/// Wrap encoded JPEG bytes as a `data:image/jpeg;base64,...` string
pub fn encode_jpeg(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(JPEG_PREFIX.len() + bytes.len() * 4 / 3 + 4);
    out.push_str(JPEG_PREFIX);
    STANDARD.encode_string(bytes, &mut out);
    out
}

/// Decode a base64 payload, with or without a `data:<mime>;base64,` header.
pub fn decode(payload: &str) -> Result<Vec<u8>, Error> {
    let body = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| Error::Validation("Malformed data URL".to_string()))?;
            if !header.ends_with(";base64") {
                return Err(Error::Validation(format!(
                    "Unsupported data URL encoding: {}",
                    header
                )));
            }
            body
        }
        None => payload,
    };

    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| Error::Validation(format!("Invalid base64 image: {}", e)))?;

    if bytes.is_empty() {
        return Err(Error::Validation("Image payload is empty".to_string()));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_any_base64_data_header() {
        let bytes = [0xff, 0xd8, 0xff, 0xe0];
        let url = encode_jpeg(&bytes);
        assert!(url.starts_with(JPEG_PREFIX));
        assert_eq!(decode(&url).unwrap(), bytes);

        let png = format!("data:image/png;base64,{}", STANDARD.encode(bytes));
        assert_eq!(decode(&png).unwrap(), bytes);

        let bare = STANDARD.encode(bytes);
        assert_eq!(decode(&bare).unwrap(), bytes);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("data:image/jpeg,abc"), Err(Error::Validation(_))));
        assert!(matches!(decode("data:image/jpeg;base64"), Err(Error::Validation(_))));
        assert!(matches!(decode("***"), Err(Error::Validation(_))));
        assert!(matches!(decode(""), Err(Error::Validation(_))));
    }
}
