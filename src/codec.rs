//! Gzip transport codec
//!
//! Snapshots travel gzip-compressed. Readers detect compression from the
//! magic bytes rather than trusting the file name.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::error::{VaultError, VaultResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether the payload starts with the gzip magic bytes
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Gzip-compress a payload
pub fn compress(bytes: &[u8]) -> VaultResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| VaultError::Io(format!("Failed to compress payload: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| VaultError::Io(format!("Failed to finish compression: {}", e)))
}

/// Decompress a gzip payload; a broken stream means a corrupt snapshot
pub fn decompress(bytes: &[u8]) -> VaultResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VaultError::SnapshotCorrupt(format!("Failed to decompress: {}", e)))?;
    Ok(out)
}

/// Decompress when gzip, otherwise pass through
pub fn decode(bytes: Vec<u8>) -> VaultResult<Vec<u8>> {
    if is_gzip(&bytes) {
        decompress(&bytes)
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let payload = "{\"Center\": {\"count\": 0, \"data\": []}} 센터".repeat(20);
        let compressed = compress(payload.as_bytes()).unwrap();
        assert!(is_gzip(&compressed));
        assert!(compressed.len() < payload.len());
        assert_eq!(decompress(&compressed).unwrap(), payload.as_bytes());
    }

    #[test]
    fn test_empty_payload() {
        let compressed = compress(b"").unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_decode_passes_plain_json_through() {
        let plain = b"{\"_metadata\": {}}".to_vec();
        assert_eq!(decode(plain.clone()).unwrap(), plain);
    }

    #[test]
    fn test_truncated_header_is_corrupt() {
        assert!(matches!(
            decompress(&[0x1f, 0x8b, 0x08]),
            Err(VaultError::SnapshotCorrupt(_))
        ));
    }
}
