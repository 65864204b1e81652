//! Binary codec for storage entries.
//!
//! All data is serialized with:
//! - JSON for data (compatible with existing serde attributes)
//! - Length-prefixed format for framing
//! - CRC32 checksum for corruption detection
//! - Version byte for forward compatibility

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes to identify HyllaDB files.
pub const MAGIC: [u8; 4] = *b"HYLA";

/// Upper bound for a single entry (64 MiB).
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes a value to bytes with checksum.
///
/// Format:
/// ```text
/// [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;
    if data.len() > MAX_ENTRY_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("entry size {} exceeds maximum {MAX_ENTRY_SIZE}", data.len()),
        ));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Deserializes a value from bytes, verifying checksum.
///
/// # Errors
/// - `UnexpectedEof` if the entry is truncated
/// - `InvalidData` if the version is unsupported, the checksum fails or the
///   payload does not deserialize
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "unsupported codec version: {} (expected {CODEC_VERSION})",
                version[0]
            ),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_ENTRY_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("entry size {len} exceeds maximum {MAX_ENTRY_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);
    let computed_crc = checksum(&data);
    if stored_crc != computed_crc {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

/// Write the file header (magic + version).
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    Ok(())
}

/// Read and validate the file header.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported file version: {}", version[0]),
        ));
    }
    Ok(version[0])
}

/// Encodes a whole file: header followed by one entry.
pub fn encode_file<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let mut out = Vec::new();
    write_header(&mut out)?;
    out.extend_from_slice(&encode(value)?);
    Ok(out)
}

/// Decodes a file written by [`encode_file`].
pub fn decode_file<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    read_header(reader)?;
    decode(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::namespace::PathEntry;
    use crate::storage::persistent::journal::JournalEntry;
    use crate::storage::NamespaceDelta;

    #[test]
    fn test_detects_corruption() {
        let mut encoded = encode(&"test data".to_string()).unwrap();
        encoded[8] ^= 0xFF;

        let err = decode::<String>(&mut Cursor::new(encoded)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_entry_is_eof() {
        let encoded = encode(&"test data".to_string()).unwrap();
        let torn = &encoded[..encoded.len() - 2];
        let err = decode::<String>(&mut Cursor::new(torn)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_rejects_oversized_entry() {
        let mut bad_data = vec![CODEC_VERSION];
        bad_data.extend_from_slice(&(200_000_000u32).to_le_bytes());

        let err = decode::<String>(&mut Cursor::new(bad_data)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_header_rejects_foreign_files() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        assert_eq!(buf.len(), MAGIC.len() + 1);
        assert_eq!(read_header(&mut Cursor::new(&buf)).unwrap(), CODEC_VERSION);

        let err = read_header(&mut Cursor::new(b"JUNK\x01")).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_journal_entry_roundtrip() {
        let entry = JournalEntry {
            sequence: 1,
            timestamp: chrono::Utc::now(),
            delta: NamespaceDelta::Put {
                key: "a.b".into(),
                entry: PathEntry::shelf("a.b"),
            },
        };

        let encoded = encode(&entry).unwrap();
        let decoded: JournalEntry = decode(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded.sequence, 1);
        assert_eq!(decoded.delta, entry.delta);
    }

    #[test]
    fn test_file_roundtrip() {
        let bytes = encode_file(&vec![1u32, 2, 3]).unwrap();
        let decoded: Vec<u32> = decode_file(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }
}
