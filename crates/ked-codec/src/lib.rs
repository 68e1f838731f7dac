//! Kroki diagram token codec.
//!
//! A token is the URL-safe form of diagram source used by Kroki GET requests
//! and shareable links:
//!
//! ```text
//! source (UTF-8) -> zlib deflate -> base64 -> '+' => '-', '/' => '_'
//! ```
//!
//! [`encode`] and [`decode`] are pure and deterministic, so the same source
//! always produces the same token and the token can be used as a cache or
//! share key.
//!
//! # Example
//!
//! ```
//! let token = ked_codec::encode("@startuml\nA -> B\n@enduml").unwrap();
//! assert_eq!(ked_codec::decode(&token).unwrap(), "@startuml\nA -> B\n@enduml");
//! ```

use std::io::{ErrorKind, Read, Write};

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::BASE64_URL_SAFE;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Decoder accepting tokens with or without trailing `=` padding.
///
/// Tokens produced by other Kroki clients are frequently unpadded.
const TOKEN_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Error raised when a token cannot be produced or reversed.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Compressing the source failed.
    #[error("failed to encode diagram: {0}")]
    Encode(#[from] std::io::Error),
    /// Token is empty or whitespace.
    #[error("failed to decode diagram: token is empty")]
    Empty,
    /// Token contains characters outside the URL-safe base64 alphabet.
    #[error("failed to decode diagram: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Compressed stream is corrupt.
    #[error("failed to decode diagram: {0}")]
    Inflate(std::io::Error),
    /// Compressed stream ended before the end marker.
    #[error("failed to decode diagram: compressed data is truncated")]
    Truncated,
    /// Decompressed bytes are not valid UTF-8.
    #[error("failed to decode diagram: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encode diagram source into a URL-safe token.
///
/// The empty string encodes to a valid, non-empty token.
pub fn encode(source: &str) -> Result<String, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64_URL_SAFE.encode(compressed))
}

/// Decode a token back into diagram source.
///
/// Every failure carries the underlying cause; nothing is ever substituted
/// for content that could not be recovered.
pub fn decode(token: &str) -> Result<String, CodecError> {
    if token.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    let compressed = TOKEN_DECODER.decode(token)?;
    let bytes = inflate(&compressed)?;
    Ok(String::from_utf8(bytes)?)
}

/// Inflate a complete zlib stream, rejecting streams without an end marker.
fn inflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(CodecError::Truncated),
        Err(e) => Err(CodecError::Inflate(e)),
    }
}

/// Extract the token from a pasted Kroki URL, or return the input as-is.
///
/// `https://kroki.io/plantuml/svg/eNpLzkksLlZIzUvOT0nNAwAe5AS4` yields
/// `eNpLzkksLlZIzUvOT0nNAwAe5AS4`.
#[must_use]
pub fn extract_token(url_or_token: &str) -> &str {
    let trimmed = url_or_token.trim();
    match trimmed.rsplit_once('/') {
        Some((_, last)) => last,
        None => trimmed,
    }
}

/// Check that a string looks like a token: non-empty, URL-safe base64 alphabet.
///
/// Trailing `=` padding is accepted.
#[must_use]
pub fn is_valid_token(candidate: &str) -> bool {
    let body = candidate.trim_end_matches('=');
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(source: &str) {
        let token = encode(source).unwrap();
        assert!(is_valid_token(&token), "token not URL-safe: {token}");
        assert_eq!(decode(&token).unwrap(), source);
    }

    #[test]
    fn test_round_trip_plantuml() {
        round_trip("@startuml\nA->B\n@enduml");
    }

    #[test]
    fn test_round_trip_empty() {
        let token = encode("").unwrap();
        assert!(!token.is_empty());
        assert_eq!(decode(&token).unwrap(), "");
    }

    #[test]
    fn test_round_trip_multibyte() {
        round_trip("graph TD\n  A[开始] --> B[🚀 launch]\n  B --> C[Ünïcödé]");
        round_trip("😀😃😄😁😆😅🤣😂🙂🙃");
        round_trip("\r\n\t  mixed\nline endings\r\n");
    }

    #[test]
    fn test_round_trip_large_source() {
        let source = "A -> B: message with some payload\n".repeat(2_000);
        round_trip(&source);
    }

    #[test]
    fn test_round_trip_highly_compressible_sources() {
        // Repetitive diagrams inflate to many times their compressed size.
        for lines in [10, 50, 200, 1_000] {
            let source = "A -> B: message with some payload\n".repeat(lines);
            let token = encode(&source).unwrap();
            let compressed = TOKEN_DECODER.decode(&token).unwrap();
            assert!(source.len() > compressed.len() * 4, "{lines} lines");
            assert_eq!(decode(&token).unwrap(), source, "{lines} lines");
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let source = "digraph G { a -> b; b -> c; }";
        assert_eq!(encode(source).unwrap(), encode(source).unwrap());
    }

    #[test]
    fn test_encode_uses_url_safe_alphabet() {
        // Enough varied input to make '+' and '/' likely in standard base64.
        let source: String = (0..512u32)
            .filter_map(char::from_u32)
            .filter(|c| !c.is_control())
            .collect();
        let token = encode(&source).unwrap();
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert_eq!(decode(&token).unwrap(), source);
    }

    #[test]
    fn test_decode_unpadded_token() {
        let token = encode("digraph G {Hello->World}").unwrap();
        let unpadded = token.trim_end_matches('=');
        assert_eq!(decode(unpadded).unwrap(), "digraph G {Hello->World}");
    }

    #[test]
    fn test_decode_empty_token() {
        assert!(matches!(decode(""), Err(CodecError::Empty)));
        assert!(matches!(decode("   "), Err(CodecError::Empty)));
    }

    #[test]
    fn test_decode_invalid_alphabet() {
        let err = decode("not*valid*base64").unwrap_err();
        assert!(matches!(err, CodecError::Base64(_)), "got {err:?}");
        assert!(err.to_string().starts_with("failed to decode diagram"));
    }

    #[test]
    fn test_decode_corrupt_stream() {
        // Valid base64, but not a zlib stream.
        let token = BASE64_URL_SAFE.encode(b"definitely not zlib data");
        let err = decode(&token).unwrap_err();
        assert!(matches!(err, CodecError::Inflate(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_truncated_stream() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all("@startuml\nAlice -> Bob: hello\n@enduml".as_bytes())
            .unwrap();
        let compressed = encoder.finish().unwrap();
        let token = BASE64_URL_SAFE.encode(&compressed[..compressed.len() / 2]);

        let err = decode(&token).unwrap_err();
        assert!(matches!(err, CodecError::Truncated), "got {err:?}");
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let token = BASE64_URL_SAFE.encode(encoder.finish().unwrap());

        let err = decode(&token).unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)), "got {err:?}");
    }

    #[test]
    fn test_extract_token_from_url() {
        assert_eq!(
            extract_token("https://kroki.io/plantuml/svg/eNpLzkksLlZIzUvOT0nNAwAe5AS4"),
            "eNpLzkksLlZIzUvOT0nNAwAe5AS4"
        );
        assert_eq!(extract_token("  eNpLzkks  "), "eNpLzkks");
        assert_eq!(extract_token("https://kroki.io/plantuml/svg/"), "");
    }

    #[test]
    fn test_is_valid_token() {
        assert!(is_valid_token("eNpLzkksLlZIzUvOT0nNAwAe5AS4"));
        assert!(is_valid_token("eJwDAAAAAAE="));
        assert!(is_valid_token("a-b_c"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("==="));
        assert!(!is_valid_token("has space"));
        assert!(!is_valid_token("plus+slash/"));
    }
}
