//! Gzip for large response bodies.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Bodies of this many bytes or fewer go out uncompressed.
pub(crate) const MIN_COMPRESS_LEN: usize = 1024;

const SKIPPED_CONTENT_TYPES: &[&str] = &["image/", "audio/", "video/", "zip/", "zip2/", "application/zip"];

/// Whether a body with these properties should be gzipped.
pub(crate) fn should_compress(
    body_len: usize,
    accept_encoding: Option<&str>,
    content_type: Option<&str>,
    content_encoding: Option<&str>,
) -> bool {
    if body_len <= MIN_COMPRESS_LEN || content_encoding.is_some() {
        return false;
    }
    if !accept_encoding.is_some_and(|v| v.contains("gzip")) {
        return false;
    }
    match content_type {
        Some(ct) if !ct.is_empty() => !SKIPPED_CONTENT_TYPES.iter().any(|p| ct.starts_with(p)),
        _ => false,
    }
}

/// Gzips `body`. The caller keeps the original on error.
pub(crate) fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    #[test]
    fn only_large_accepted_compressible_bodies() {
        assert!(should_compress(2000, Some("gzip, deflate"), JSON, None));
        assert!(!should_compress(1024, Some("gzip"), JSON, None));
        assert!(!should_compress(2000, Some("br"), JSON, None));
        assert!(!should_compress(2000, None, JSON, None));
        assert!(!should_compress(2000, Some("gzip"), None, None));
        assert!(!should_compress(2000, Some("gzip"), Some("image/png"), None));
        assert!(!should_compress(2000, Some("gzip"), JSON, Some("br")));
    }

    #[test]
    fn gzip_output_decodes_to_input() {
        let body = "x".repeat(4096);
        let packed = gzip(body.as_bytes()).unwrap();
        assert!(packed.len() < body.len());

        let mut unpacked = String::new();
        GzDecoder::new(packed.as_slice()).read_to_string(&mut unpacked).unwrap();
        assert_eq!(unpacked, body);
    }
}
