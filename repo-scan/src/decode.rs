//! Text decoding with a fixed fallback ladder.
//!
//! Order: strict UTF-8, then BOM-declared encoding, then Windows-1252. The
//! record keeps which rung was used and how many replacement characters the
//! final decode produced, so the auditor can report fallback statistics.

use serde::{Deserialize, Serialize};

/// How a file's bytes became text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeInfo {
    /// Encoding label actually used ("utf-8", "utf-8-bom", "windows-1252").
    pub encoding: String,
    /// True whenever the strict UTF-8 rung did not apply.
    pub fallback_used: bool,
    /// Count of U+FFFD characters in the decoded text.
    pub replacement_chars: usize,
}

/// Decode `bytes` through the ladder. Never fails: the last rung maps every
/// byte sequence to text.
pub fn decode_text(bytes: &[u8]) -> (String, DecodeInfo) {
    // Strict UTF-8 without BOM is the overwhelmingly common case.
    if !bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return (
                text.to_string(),
                DecodeInfo {
                    encoding: String::from("utf-8"),
                    fallback_used: false,
                    replacement_chars: 0,
                },
            );
        }
    }

    // BOM-declared encoding (UTF-8 with BOM, UTF-16 LE/BE).
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _, had_errors) = encoding.decode(&bytes[bom_len..]);
        let replacement_chars = count_replacements(&text);
        let label = if encoding == encoding_rs::UTF_8 {
            String::from("utf-8-bom")
        } else {
            encoding.name().to_lowercase()
        };
        if !had_errors || encoding != encoding_rs::UTF_8 {
            return (
                text.into_owned(),
                DecodeInfo {
                    encoding: label,
                    fallback_used: true,
                    replacement_chars,
                },
            );
        }
    }

    // Last rung: Windows-1252 maps every byte.
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    let replacement_chars = count_replacements(&text);
    (
        text.into_owned(),
        DecodeInfo {
            encoding: String::from("windows-1252"),
            fallback_used: true,
            replacement_chars,
        },
    )
}

/// NUL-byte sniff over the first 8 KiB; binary files are not chunked.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

fn count_replacements(text: &str) -> usize {
    text.chars().filter(|c| *c == '\u{FFFD}').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_is_not_a_fallback() {
        let (text, info) = decode_text("héllo".as_bytes());
        assert_eq!(text, "héllo");
        assert_eq!(info.encoding, "utf-8");
        assert!(!info.fallback_used);
        assert_eq!(info.replacement_chars, 0);
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"hello");
        let (text, info) = decode_text(&bytes);
        assert_eq!(text, "hello");
        assert_eq!(info.encoding, "utf-8-bom");
        assert!(info.fallback_used);
    }

    #[test]
    fn latin1_bytes_fall_through() {
        // 0xE9 is 'é' in Windows-1252 and invalid standalone UTF-8.
        let (text, info) = decode_text(b"caf\xE9");
        assert_eq!(text, "café");
        assert_eq!(info.encoding, "windows-1252");
        assert!(info.fallback_used);
    }

    #[test]
    fn nul_sniff_flags_binaries() {
        assert!(looks_binary(b"\x7fELF\x00\x01"));
        assert!(!looks_binary(b"plain text"));
    }
}
