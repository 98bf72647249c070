//! Thin adapter over the libsodium-compatible primitives in `dryoc`
//!
//! - `kdf_derive`: `crypto_kdf_derive_from_key` (BLAKE2b, salt = subkey id, personal = context)
//! - `generic_hash`: `crypto_generichash` with the default 32-byte output
//! - `PullStream` / `PushStream`: `crypto_secretstream_xchacha20poly1305`
//!
//! Nothing here is reimplemented. Failures surface as [`ArchiveError::Primitive`]
//! or, for stream pulls, as a bare [`PullError`] that the caller classifies.

use dryoc::classic::crypto_generichash::crypto_generichash;
use dryoc::classic::crypto_kdf::crypto_kdf_derive_from_key;
use dryoc::classic::crypto_secretstream_xchacha20poly1305::{
    crypto_secretstream_xchacha20poly1305_init_pull,
    crypto_secretstream_xchacha20poly1305_init_push, crypto_secretstream_xchacha20poly1305_pull,
    crypto_secretstream_xchacha20poly1305_push, Header, State,
};
use thiserror::Error;

use crate::error::{ArchiveError, ArchiveResult};
use crate::{HASH_SIZE, KDF_BYTES_MAX, KDF_BYTES_MIN, KDF_CONTEXT_SIZE, KEY_SIZE};

/// Size of a secretstream header (the XChaCha20 nonce material)
pub const STREAM_HEADER_SIZE: usize = 24;

/// Per-chunk secretstream overhead: 1 encrypted tag byte + 16-byte Poly1305 MAC
pub const STREAM_ABYTES: usize = 17;

const TAG_MESSAGE: u8 = 0x00;
const TAG_PUSH: u8 = 0x01;
const TAG_REKEY: u8 = 0x02;
const TAG_FINAL: u8 = 0x03;

/// Tag attached to every secretstream chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    Message,
    Push,
    Rekey,
    Final,
    /// Authenticated, but not one of the tags libsodium defines
    Other(u8),
}

impl StreamTag {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            TAG_MESSAGE => Self::Message,
            TAG_PUSH => Self::Push,
            TAG_REKEY => Self::Rekey,
            TAG_FINAL => Self::Final,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Message => TAG_MESSAGE,
            Self::Push => TAG_PUSH,
            Self::Rekey => TAG_REKEY,
            Self::Final => TAG_FINAL,
            Self::Other(byte) => byte,
        }
    }
}

/// A chunk failed to authenticate (or was too short to carry a MAC).
#[derive(Debug, Error)]
#[error("secretstream chunk failed to authenticate")]
pub struct PullError;

/// Derive `subkey.len()` bytes from `key` for `(subkey_id, context)`.
pub fn kdf_derive(
    subkey: &mut [u8],
    subkey_id: u64,
    context: &[u8; KDF_CONTEXT_SIZE],
    key: &[u8; KEY_SIZE],
) -> ArchiveResult<()> {
    if !(KDF_BYTES_MIN..=KDF_BYTES_MAX).contains(&subkey.len()) {
        return Err(ArchiveError::Primitive(format!(
            "subkey length {} outside {KDF_BYTES_MIN}..={KDF_BYTES_MAX}",
            subkey.len()
        )));
    }
    crypto_kdf_derive_from_key(subkey, subkey_id, context, key)
        .map_err(|e| ArchiveError::Primitive(format!("kdf derive: {e}")))
}

/// BLAKE2b-256 of `data`, unkeyed.
pub fn generic_hash(data: &[u8]) -> ArchiveResult<[u8; HASH_SIZE]> {
    let mut digest = [0u8; HASH_SIZE];
    crypto_generichash(&mut digest, data, None)
        .map_err(|e| ArchiveError::Primitive(format!("generichash: {e}")))?;
    Ok(digest)
}

/// Decrypting side of a secretstream session.
pub struct PullStream {
    state: State,
}

impl PullStream {
    /// Start a session from a 24-byte stream header.
    pub fn init(header: &[u8], key: &[u8; KEY_SIZE]) -> ArchiveResult<Self> {
        let header: &Header = header.try_into().map_err(|_| {
            ArchiveError::format(format!(
                "stream header must be {STREAM_HEADER_SIZE} bytes, got {}",
                header.len()
            ))
        })?;

        let mut state = State::new();
        crypto_secretstream_xchacha20poly1305_init_pull(&mut state, header, key);
        Ok(Self { state })
    }

    /// Authenticate and decrypt one chunk.
    pub fn pull(&mut self, chunk: &[u8]) -> Result<(Vec<u8>, StreamTag), PullError> {
        if chunk.len() < STREAM_ABYTES {
            return Err(PullError);
        }

        let mut message = vec![0u8; chunk.len() - STREAM_ABYTES];
        let mut tag = 0u8;
        crypto_secretstream_xchacha20poly1305_pull(
            &mut self.state,
            &mut message,
            &mut tag,
            chunk,
            None,
        )
        .map_err(|_| PullError)?;

        Ok((message, StreamTag::from_byte(tag)))
    }
}

/// Encrypting side of a secretstream session. Used to build archives.
pub struct PushStream {
    state: State,
}

impl PushStream {
    /// Start a session with a fresh random header, returned alongside.
    pub fn init(key: &[u8; KEY_SIZE]) -> (Self, [u8; STREAM_HEADER_SIZE]) {
        let mut state = State::new();
        let mut header: Header = [0u8; STREAM_HEADER_SIZE];
        crypto_secretstream_xchacha20poly1305_init_push(&mut state, &mut header, key);
        (Self { state }, header)
    }

    /// Encrypt one chunk: `message.len() + STREAM_ABYTES` bytes out.
    pub fn push(&mut self, message: &[u8], tag: StreamTag) -> ArchiveResult<Vec<u8>> {
        let mut chunk = vec![0u8; message.len() + STREAM_ABYTES];
        crypto_secretstream_xchacha20poly1305_push(
            &mut self.state,
            &mut chunk,
            message,
            None,
            tag.as_byte(),
        )
        .map_err(|e| ArchiveError::Primitive(format!("secretstream push: {e}")))?;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let (mut push, header) = PushStream::init(&key);
        let c1 = push.push(b"first", StreamTag::Message).unwrap();
        let c2 = push.push(b"second", StreamTag::Final).unwrap();
        assert_eq!(c1.len(), 5 + STREAM_ABYTES);

        let mut pull = PullStream::init(&header, &key).unwrap();
        assert_eq!(pull.pull(&c1).unwrap(), (b"first".to_vec(), StreamTag::Message));
        assert_eq!(pull.pull(&c2).unwrap(), (b"second".to_vec(), StreamTag::Final));
    }

    #[test]
    fn test_pull_wrong_key_fails() {
        let (mut push, header) = PushStream::init(&[1u8; KEY_SIZE]);
        let chunk = push.push(b"secret", StreamTag::Final).unwrap();

        let mut pull = PullStream::init(&header, &[2u8; KEY_SIZE]).unwrap();
        assert!(pull.pull(&chunk).is_err());
    }

    #[test]
    fn test_pull_short_chunk_fails() {
        let mut pull = PullStream::init(&[0u8; STREAM_HEADER_SIZE], &[0u8; KEY_SIZE]).unwrap();
        assert!(pull.pull(&[0u8; STREAM_ABYTES - 1]).is_err());
    }

    #[test]
    fn test_init_rejects_wrong_header_size() {
        let err = PullStream::init(&[0u8; 23], &[0u8; KEY_SIZE]).err().unwrap();
        assert!(matches!(err, ArchiveError::Format(_)));
    }

    #[test]
    fn test_tag_bytes() {
        for tag in [
            StreamTag::Message,
            StreamTag::Push,
            StreamTag::Rekey,
            StreamTag::Final,
            StreamTag::Other(0x80),
        ] {
            assert_eq!(StreamTag::from_byte(tag.as_byte()), tag);
        }
    }

    #[test]
    fn test_kdf_rejects_out_of_range_length() {
        let mut short = [0u8; KDF_BYTES_MIN - 1];
        let err = kdf_derive(&mut short, 0, b"context\0", &[0u8; KEY_SIZE]).unwrap_err();
        assert!(matches!(err, ArchiveError::Primitive(_)));

        let mut long = [0u8; KDF_BYTES_MAX + 1];
        assert!(kdf_derive(&mut long, 0, b"context\0", &[0u8; KEY_SIZE]).is_err());
    }

    #[test]
    fn test_generic_hash_deterministic() {
        let a = generic_hash(b"payload").unwrap();
        let b = generic_hash(b"payload").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generic_hash(b"payloae").unwrap());
    }
}
