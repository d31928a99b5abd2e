//! Compression codec for stored values and wire payloads.
//!
//! The engine treats compression as a collaborator: anything implementing
//! [`Codec`] can be plugged in as long as `decompress(compress(s)) == s` and
//! decompression fails closed on garbage.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque compressed value, kept in text form so it can live in a text
/// storage slot or inside a JSON snapshot unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blob(String);

impl Blob {
    /// Wrap text that is already in the codec's encoded form.
    pub fn from_encoded(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the encoded text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the encoded text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic text compression.
pub trait Codec {
    /// Compress UTF-8 text into a blob.
    fn compress(&self, text: &str) -> Blob;

    /// Recover the original text, or `None` if the blob is not valid.
    fn decompress(&self, blob: &Blob) -> Option<String>;
}

/// LZ4 block compression (size-prepended) wrapped in standard base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, text: &str) -> Blob {
        let compressed = lz4_flex::compress_prepend_size(text.as_bytes());
        Blob(STANDARD.encode(compressed))
    }

    fn decompress(&self, blob: &Blob) -> Option<String> {
        let compressed = STANDARD.decode(blob.as_str()).ok()?;
        let raw = lz4_flex::decompress_size_prepended(&compressed).ok()?;
        String::from_utf8(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_roundtrip() {
        let codec = Lz4Codec;
        for text in ["", "hello", "{\"tasks\":[]}", "日本語テスト 🎉", &"x".repeat(10_000)] {
            let blob = codec.compress(text);
            assert_eq!(codec.decompress(&blob).as_deref(), Some(text));
        }
    }

    #[test]
    fn compression_is_deterministic() {
        let codec = Lz4Codec;
        assert_eq!(codec.compress("same input"), codec.compress("same input"));
    }

    #[test]
    fn repetitive_text_shrinks() {
        let codec = Lz4Codec;
        let text = "abcdefgh".repeat(1000);
        assert!(codec.compress(&text).as_str().len() < text.len());
    }

    #[test]
    fn garbage_fails_closed() {
        let codec = Lz4Codec;
        assert_eq!(codec.decompress(&Blob::from_encoded("not valid")), None);
        // Valid base64, but too short to carry a size prefix
        assert_eq!(codec.decompress(&Blob::from_encoded("QUI=")), None);
    }

    #[test]
    fn blob_is_plain_json_string() {
        let blob = Blob::from_encoded("QUJD");
        assert_eq!(serde_json::to_string(&blob).unwrap(), "\"QUJD\"");
    }
}
