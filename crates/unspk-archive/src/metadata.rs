//! Archive metadata block (MessagePack)
//!
//! ```text
//! [ headerContext: bin|str (>= 32 bytes),
//!   files: [ [length: uint, hash: bin|str(32) | nil], ... ],
//!   ...ignored ]
//! ```

use rmpv::Value;
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::{HASH_SIZE, HEADER_CONTEXT_SIZE};

/// One embedded file as described by the metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Payload length in bytes within the container
    pub length: u64,
    /// Generic hash of the payload ciphertext, when recorded
    pub expected_hash: Option<[u8; HASH_SIZE]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub header_context: [u8; HEADER_CONTEXT_SIZE],
    pub files: Vec<FileDescriptor>,
}

impl Metadata {
    /// Decode a serialized metadata block.
    pub fn decode(block: &[u8]) -> ArchiveResult<Self> {
        let mut reader = block;
        let value = rmpv::decode::read_value(&mut reader)
            .map_err(|e| ArchiveError::format(format!("metadata decode: {e}")))?;
        if !reader.is_empty() {
            debug!(trailing = reader.len(), "ignoring bytes after metadata value");
        }
        Self::from_value(&value)
    }

    /// Interpret an already-decoded value tree.
    pub fn from_value(value: &Value) -> ArchiveResult<Self> {
        let top = value
            .as_array()
            .ok_or_else(|| ArchiveError::format("metadata must be an array"))?;
        if top.len() < 2 {
            return Err(ArchiveError::format(format!(
                "metadata array needs [context, files], got {} element(s)",
                top.len()
            )));
        }

        let raw_context = top[0]
            .as_slice()
            .ok_or_else(|| ArchiveError::format("header context must be a byte string"))?;
        if raw_context.len() < HEADER_CONTEXT_SIZE {
            return Err(ArchiveError::format(format!(
                "header context must be at least {HEADER_CONTEXT_SIZE} bytes, got {}",
                raw_context.len()
            )));
        }
        let mut header_context = [0u8; HEADER_CONTEXT_SIZE];
        header_context.copy_from_slice(&raw_context[..HEADER_CONTEXT_SIZE]);

        let files = top[1]
            .as_array()
            .ok_or_else(|| ArchiveError::format("file list must be an array"))?
            .iter()
            .enumerate()
            .map(|(index, entry)| parse_descriptor(index, entry))
            .collect::<ArchiveResult<Vec<_>>>()?;

        Ok(Self {
            header_context,
            files,
        })
    }

    /// Serialize back to the wire form (context as bin, hashes as bin or nil).
    pub fn encode(&self) -> ArchiveResult<Vec<u8>> {
        let files = self
            .files
            .iter()
            .map(|file| {
                let hash = match file.expected_hash {
                    Some(hash) => Value::Binary(hash.to_vec()),
                    None => Value::Nil,
                };
                Value::Array(vec![Value::from(file.length), hash])
            })
            .collect();
        let value = Value::Array(vec![
            Value::Binary(self.header_context.to_vec()),
            Value::Array(files),
        ]);

        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &value)
            .map_err(|e| ArchiveError::format(format!("metadata encode: {e}")))?;
        Ok(out)
    }

    /// Total payload bytes the descriptors claim.
    pub fn payload_len(&self) -> Option<u64> {
        self.files
            .iter()
            .try_fold(0u64, |acc, file| acc.checked_add(file.length))
    }
}

fn parse_descriptor(index: usize, entry: &Value) -> ArchiveResult<FileDescriptor> {
    let fields = entry
        .as_array()
        .ok_or_else(|| ArchiveError::format(format!("file {index}: descriptor must be an array")))?;

    let length = fields
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| ArchiveError::format(format!("file {index}: length must be an unsigned integer")))?;

    let expected_hash = match fields.get(1) {
        None | Some(Value::Nil) => None,
        Some(value) => {
            let raw = value.as_slice().ok_or_else(|| {
                ArchiveError::format(format!("file {index}: hash must be a byte string or nil"))
            })?;
            let hash: [u8; HASH_SIZE] = raw.try_into().map_err(|_| {
                ArchiveError::format(format!(
                    "file {index}: hash must be {HASH_SIZE} bytes, got {}",
                    raw.len()
                ))
            })?;
            Some(hash)
        }
    };

    Ok(FileDescriptor {
        length,
        expected_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            header_context: [3u8; HEADER_CONTEXT_SIZE],
            files: vec![
                FileDescriptor {
                    length: 451,
                    expected_hash: Some([9u8; HASH_SIZE]),
                },
                FileDescriptor {
                    length: 4096,
                    expected_hash: None,
                },
            ],
        }
    }

    fn to_bytes(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_encode_decode() {
        let meta = sample();
        let decoded = Metadata::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.payload_len(), Some(451 + 4096));
    }

    #[test]
    fn test_accepts_str_context_and_missing_hash() {
        let value = Value::Array(vec![
            Value::from("0123456789abcdef0123456789abcdefEXTRA"),
            Value::Array(vec![Value::Array(vec![Value::from(10u64)])]),
            Value::from("ignored"),
        ]);
        let meta = Metadata::decode(&to_bytes(&value)).unwrap();
        assert_eq!(&meta.header_context, b"0123456789abcdef0123456789abcdef");
        assert_eq!(meta.files[0].length, 10);
        assert_eq!(meta.files[0].expected_hash, None);
    }

    #[test]
    fn test_rejects_short_context() {
        let value = Value::Array(vec![Value::Binary(vec![0u8; 31]), Value::Array(vec![])]);
        assert!(matches!(
            Metadata::decode(&to_bytes(&value)),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn test_rejects_bad_hash_length() {
        let value = Value::Array(vec![
            Value::Binary(vec![0u8; 32]),
            Value::Array(vec![Value::Array(vec![
                Value::from(1u64),
                Value::Binary(vec![0u8; 16]),
            ])]),
        ]);
        assert!(Metadata::decode(&to_bytes(&value)).is_err());
    }

    #[test]
    fn test_rejects_negative_length() {
        let value = Value::Array(vec![
            Value::Binary(vec![0u8; 32]),
            Value::Array(vec![Value::Array(vec![Value::from(-1i64), Value::Nil])]),
        ]);
        assert!(Metadata::decode(&to_bytes(&value)).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Metadata::decode(&[0xC1]).is_err());
        assert!(Metadata::decode(&[]).is_err());
        assert!(Metadata::decode(&to_bytes(&Value::from(5u64))).is_err());
    }
}
