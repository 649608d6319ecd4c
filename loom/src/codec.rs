//! Checksum and transparent compression helpers shared by the reference store
//! and shared memory. Checksums are always computed over uncompressed bytes.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the given bytes.
pub fn checksum_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Gzip-compresses the given bytes.
pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Decompresses gzip bytes.
pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: compress then decompress is identity; checksum covers the
    /// uncompressed form.
    #[test]
    fn compress_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        let unpacked = decompress(&packed).unwrap();
        assert_eq!(unpacked, data);
        assert_eq!(checksum_hex(&unpacked), checksum_hex(&data));
    }

    #[test]
    fn checksum_is_sha256_hex() {
        // sha256("") is a well-known constant.
        assert_eq!(
            checksum_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn decompress_rejects_garbage() {
        assert!(decompress(b"not gzip at all").is_err());
    }
}
