//! Per-file decryption
//!
//! Payload layout:
//! ```text
//! 0x000  [24 bytes: stream header A][403 bytes: tar header record, tag FINAL]
//! 0x1AB  [zero padding]
//! 0x200  [24 bytes: stream header B][chunk]...[chunk, tag FINAL]
//!        each chunk <= 4 MiB plaintext + 17 bytes
//! ```
//!
//! Stream A and stream B are independent sessions under the same file key.
//! Stream A authenticating is what proves a candidate key; stream B carries
//! the file body.

use tracing::trace;

use crate::error::{ArchiveError, ArchiveResult};
use crate::keys::DerivedKey;
use crate::primitives::{generic_hash, PullStream, StreamTag, STREAM_ABYTES, STREAM_HEADER_SIZE};
use crate::tar::{self, HeaderInfo, HEADER_RECORD_LEN};
use crate::HASH_SIZE;

/// Ciphertext length of the header record chunk
pub const HEADER_CHUNK_LEN: usize = HEADER_RECORD_LEN + STREAM_ABYTES;

/// Fixed offset of the body stream header
pub const BODY_OFFSET: usize = 0x200;

/// Maximum plaintext per body chunk
pub const BODY_CHUNK_PLAINTEXT: usize = 0x40_0000;

/// Maximum ciphertext per body chunk
pub const BODY_CHUNK_LEN: usize = BODY_CHUNK_PLAINTEXT + STREAM_ABYTES;

/// One decrypted file: its tar header record and its body.
#[derive(Debug, Clone)]
pub struct DecryptedFile {
    header: Vec<u8>,
    body: Vec<u8>,
}

impl DecryptedFile {
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn header_info(&self) -> Option<HeaderInfo> {
        HeaderInfo::parse(&self.header)
    }

    /// Length of the tar bytes this file contributes.
    pub fn tar_len(&self) -> usize {
        self.header.len()
            + tar::pad_len(self.header.len())
            + self.body.len()
            + tar::pad_len(self.body.len())
    }

    /// Append header, padding, body, padding.
    pub fn write_tar(&self, out: &mut Vec<u8>) {
        out.reserve(self.tar_len());
        tar::push_padded(out, &self.header);
        tar::push_padded(out, &self.body);
    }

    pub fn into_tar_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.tar_len());
        self.write_tar(&mut out);
        out
    }
}

/// Validate and decrypt one file payload.
///
/// Errors:
/// - `Integrity` on a hash mismatch (checked before any decryption) or a body
///   chunk that fails to authenticate
/// - `InvalidKey` when the header record does not authenticate under `key`
/// - `Format` on truncated payloads or out-of-sequence stream tags
pub fn decrypt_file(
    payload: &[u8],
    key: &DerivedKey,
    expected_hash: Option<&[u8; HASH_SIZE]>,
) -> ArchiveResult<DecryptedFile> {
    if let Some(expected) = expected_hash {
        let actual = generic_hash(payload)?;
        if &actual != expected {
            return Err(ArchiveError::integrity(format!(
                "payload hash {} does not match recorded {}",
                hex::encode(actual),
                hex::encode(expected)
            )));
        }
    }

    let header = decrypt_header(payload, key)?;
    let body = decrypt_body(payload, key)?;
    Ok(DecryptedFile { header, body })
}

fn decrypt_header(payload: &[u8], key: &DerivedKey) -> ArchiveResult<Vec<u8>> {
    let record_end = STREAM_HEADER_SIZE + HEADER_CHUNK_LEN;
    if payload.len() < record_end {
        return Err(ArchiveError::format(format!(
            "payload is {} bytes, too short for the {record_end}-byte header record",
            payload.len()
        )));
    }

    let mut stream = PullStream::init(&payload[..STREAM_HEADER_SIZE], key.as_bytes())?;
    let (record, tag) = stream
        .pull(&payload[STREAM_HEADER_SIZE..record_end])
        .map_err(|_| ArchiveError::InvalidKey)?;

    if tag != StreamTag::Final {
        return Err(ArchiveError::format(format!(
            "header record tagged {tag:?}, expected Final"
        )));
    }
    Ok(record)
}

fn decrypt_body(payload: &[u8], key: &DerivedKey) -> ArchiveResult<Vec<u8>> {
    // Header-only file: nothing stored past the padding
    if payload.len() <= BODY_OFFSET {
        return Ok(Vec::new());
    }

    let chunks_start = BODY_OFFSET + STREAM_HEADER_SIZE;
    if payload.len() < chunks_start {
        return Err(ArchiveError::format(format!(
            "payload ends {} bytes into the body stream header",
            payload.len() - BODY_OFFSET
        )));
    }

    let mut stream = PullStream::init(&payload[BODY_OFFSET..chunks_start], key.as_bytes())?;
    let mut body = Vec::with_capacity(payload.len() - chunks_start);
    let mut pos = chunks_start;

    while pos < payload.len() {
        let len = (payload.len() - pos).min(BODY_CHUNK_LEN);
        let (plaintext, tag) = stream.pull(&payload[pos..pos + len]).map_err(|_| {
            ArchiveError::integrity(format!("body chunk at offset {pos:#x} failed to authenticate"))
        })?;
        pos += len;
        let remaining = payload.len() - pos;
        trace!(offset = pos - len, len, ?tag, remaining, "pulled body chunk");

        match tag {
            StreamTag::Message if remaining > 0 => {}
            StreamTag::Message => {
                return Err(ArchiveError::format(
                    "body stream ends on a Message chunk without a Final tag",
                ))
            }
            StreamTag::Final if remaining == 0 => {}
            StreamTag::Final => {
                return Err(ArchiveError::format(format!(
                    "Final chunk followed by {remaining} more bytes"
                )))
            }
            other => {
                return Err(ArchiveError::format(format!(
                    "unexpected body chunk tag {other:?}"
                )))
            }
        }

        body.extend_from_slice(&plaintext);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{encrypt_file, FileSpec};
    use crate::keys::{derive_key, MasterKey};
    use crate::HEADER_CONTEXT_SIZE;

    fn test_key(seed: u8) -> DerivedKey {
        derive_key(
            &[seed; HEADER_CONTEXT_SIZE],
            &MasterKey::from_bytes([seed; crate::KEY_SIZE]),
        )
        .unwrap()
    }

    #[test]
    fn test_decrypt_roundtrip() {
        let key = test_key(1);
        let spec = FileSpec::new("hello.txt", b"hello, tar world".to_vec());
        let payload = encrypt_file(&spec, &key).unwrap();

        let file = decrypt_file(&payload, &key, None).unwrap();
        assert_eq!(file.body(), b"hello, tar world");
        assert_eq!(file.header().len(), HEADER_RECORD_LEN);

        let info = file.header_info().unwrap();
        assert_eq!(info.name, "hello.txt");
        assert_eq!(info.size, 16);

        let tar_bytes = file.into_tar_bytes();
        assert_eq!(tar_bytes.len(), 1024);
        assert_eq!(&tar_bytes[512..528], b"hello, tar world");
        assert!(tar_bytes[HEADER_RECORD_LEN..512].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_key_is_invalid_key() {
        let payload = encrypt_file(&FileSpec::new("a", vec![1, 2, 3]), &test_key(1)).unwrap();
        let err = decrypt_file(&payload, &test_key(2), None).unwrap_err();
        assert!(err.is_invalid_key(), "got {err:?}");
    }

    #[test]
    fn test_hash_checked_before_decryption() {
        let key = test_key(1);
        let payload = encrypt_file(&FileSpec::new("a", vec![1, 2, 3]), &key).unwrap();
        let hash = generic_hash(&payload).unwrap();
        assert!(decrypt_file(&payload, &key, Some(&hash)).is_ok());

        // Even under the wrong key, a bad hash reports corruption first
        let bogus = [0u8; HASH_SIZE];
        let err = decrypt_file(&payload, &test_key(2), Some(&bogus)).unwrap_err();
        assert!(matches!(err, ArchiveError::Integrity(_)));
    }

    #[test]
    fn test_header_only_payload() {
        let key = test_key(1);
        let spec = FileSpec::header_only("empty");
        let payload = encrypt_file(&spec, &key).unwrap();
        assert_eq!(payload.len(), STREAM_HEADER_SIZE + HEADER_CHUNK_LEN);

        let file = decrypt_file(&payload, &key, None).unwrap();
        assert!(file.body().is_empty());
        assert_eq!(file.into_tar_bytes().len(), 512);
    }

    #[test]
    fn test_truncated_header_record_is_format_error() {
        let key = test_key(1);
        let payload = encrypt_file(&FileSpec::new("a", vec![]), &key).unwrap();
        let err = decrypt_file(&payload[..400], &key, None).unwrap_err();
        assert!(matches!(err, ArchiveError::Format(_)));
    }

    #[test]
    fn test_truncated_body_header_is_format_error() {
        let key = test_key(1);
        let payload = encrypt_file(&FileSpec::new("a", vec![7u8; 10]), &key).unwrap();
        let err = decrypt_file(&payload[..BODY_OFFSET + 10], &key, None).unwrap_err();
        assert!(matches!(err, ArchiveError::Format(_)));
    }

    #[test]
    fn test_corrupt_body_chunk_is_integrity_error() {
        let key = test_key(1);
        let mut payload = encrypt_file(&FileSpec::new("a", vec![7u8; 100]), &key).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;

        let err = decrypt_file(&payload, &key, None).unwrap_err();
        assert!(matches!(err, ArchiveError::Integrity(_)));
    }

    #[test]
    fn test_multi_chunk_body() {
        let key = test_key(3);
        let body: Vec<u8> = (0..BODY_CHUNK_PLAINTEXT + 1000)
            .map(|i| (i.wrapping_mul(31) >> 3) as u8)
            .collect();
        let payload = encrypt_file(&FileSpec::new("big.bin", body.clone()), &key).unwrap();
        assert_eq!(
            payload.len(),
            BODY_OFFSET + STREAM_HEADER_SIZE + body.len() + 2 * STREAM_ABYTES
        );

        let file = decrypt_file(&payload, &key, None).unwrap();
        assert_eq!(file.body(), &body[..]);
    }
}
