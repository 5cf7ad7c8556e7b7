use std::io::Read;

use flate2::read::{DeflateDecoder, MultiGzDecoder};

use crate::domain::Codec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub text: String,
    pub codec: Codec,
}

/// Decodes a feed payload to text. Never fails: bytes that neither codec
/// accepts come back as (lossy) UTF-8.
pub fn decompress(bytes: &[u8]) -> String {
    decompress_detailed(bytes).text
}

pub fn decompress_detailed(bytes: &[u8]) -> Decompressed {
    if bytes.is_empty() {
        return Decompressed {
            text: String::new(),
            codec: Codec::Identity,
        };
    }

    match inflate_gzip(bytes) {
        Ok(text) => {
            return Decompressed {
                text,
                codec: Codec::Gzip,
            };
        }
        Err(err) => tracing::debug!("gzip decode failed, trying raw deflate: {err}"),
    }

    // Raw deflate has no header, so readable text can parse as a short
    // stream followed by ignored bytes. Only binary input is tried.
    if !looks_like_text(bytes) {
        match inflate_deflate(bytes) {
            Ok(text) => {
                return Decompressed {
                    text,
                    codec: Codec::Deflate,
                };
            }
            Err(err) => tracing::debug!("raw deflate decode failed: {err}"),
        }
    }

    if std::str::from_utf8(bytes).is_err() {
        tracing::warn!(
            bytes = bytes.len(),
            "payload is neither gzip nor deflate and not valid UTF-8; decoding lossily"
        );
    } else {
        tracing::warn!(
            bytes = bytes.len(),
            "payload is neither gzip nor deflate; using it as plain text"
        );
    }
    Decompressed {
        text: String::from_utf8_lossy(bytes).into_owned(),
        codec: Codec::Identity,
    }
}

fn inflate_gzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = MultiGzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

fn inflate_deflate(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    if decoder.total_in() != bytes.len() as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "deflate stream ended after {} of {} bytes",
                decoder.total_in(),
                bytes.len()
            ),
        ));
    }
    Ok(text)
}

/// Valid UTF-8 without control characters other than whitespace.
fn looks_like_text(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.chars().all(|ch| !ch.is_control() || ch.is_whitespace()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use proptest::prelude::*;

    use super::*;

    const BODY: &str = r#"{"relationships":[{"bdrId":"A1","nature":"parent"}]}"#;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn deflate(text: &str) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_and_raw_deflate_agree() {
        let gz = decompress_detailed(&gzip(BODY));
        let raw = decompress_detailed(&deflate(BODY));
        assert_eq!(gz.text, BODY);
        assert_eq!(raw.text, BODY);
        assert_eq!(gz.codec, Codec::Gzip);
        assert_eq!(raw.codec, Codec::Deflate);
    }

    #[test]
    fn plain_text_passes_through() {
        let out = decompress_detailed(BODY.as_bytes());
        assert_eq!(out.text, BODY);
        assert_eq!(out.codec, Codec::Identity);
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(decompress(&[]), "");
    }

    #[test]
    fn truncated_gzip_degrades_instead_of_failing() {
        let mut bytes = gzip(BODY);
        bytes.truncate(12);
        let out = decompress_detailed(&bytes);
        assert_eq!(out.codec, Codec::Identity);
        assert_eq!(out.text, String::from_utf8_lossy(&bytes));
    }

    #[test]
    fn text_that_parses_as_short_deflate_stream_is_kept() {
        for text in ["C@@M&gt", "C@@n$G%w1M<4I<6D;;Dh/"] {
            let out = decompress_detailed(text.as_bytes());
            assert_eq!(out.text, text);
            assert_eq!(out.codec, Codec::Identity);
        }
    }

    #[test]
    fn deflate_with_trailing_bytes_is_not_trusted() {
        let mut bytes = deflate(BODY);
        bytes.extend_from_slice(&[0xff, 0x00, 0x9c]);
        let out = decompress_detailed(&bytes);
        assert_eq!(out.codec, Codec::Identity);
        assert_eq!(out.text, String::from_utf8_lossy(&bytes));
    }

    #[test]
    fn concatenated_gzip_members_are_joined() {
        let mut bytes = gzip(r#"{"relationships":"#);
        bytes.extend(gzip(r#"[]}"#));
        let out = decompress_detailed(&bytes);
        assert_eq!(out.codec, Codec::Gzip);
        assert_eq!(out.text, r#"{"relationships":[]}"#);
    }

    proptest! {
        #[test]
        fn printable_text_is_returned_unchanged(text in "[ -~]{0,48}") {
            prop_assert_eq!(decompress(text.as_bytes()), text);
        }
    }
}
