//! Key material: candidate master keys and the per-archive derived file key
//!
//! ```text
//! Master Key (256-bit, caller-supplied candidate)
//!   └── File Key = KDF(len=32, id=ctx[16..24] LE, context=ctx[24..32] with byte 7 zeroed)
//! ```

use zeroize::Zeroize;

use crate::error::ArchiveResult;
use crate::primitives::kdf_derive;
use crate::{HEADER_CONTEXT_SIZE, KDF_CONTEXT_SIZE, KEY_SIZE};

/// A 256-bit candidate master key.
///
/// Zeroized on drop. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse 64 hex digits. Surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; KEY_SIZE];
        if let Err(e) = hex::decode_to_slice(text.trim(), &mut bytes) {
            bytes.zeroize();
            return Err(e);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Short one-way identifier for logs and reports: first 8 bytes of BLAKE3, hex.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.bytes);
        hex::encode(&digest.as_bytes()[..8])
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The per-archive file encryption key. Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Subkey id stored little-endian in bytes 16..24 of the header context.
pub fn subkey_id(header_context: &[u8; HEADER_CONTEXT_SIZE]) -> u64 {
    let mut id = [0u8; 8];
    id.copy_from_slice(&header_context[16..24]);
    u64::from_le_bytes(id)
}

/// KDF context: bytes 24..32 of the header context, last byte forced to zero.
pub fn kdf_context(header_context: &[u8; HEADER_CONTEXT_SIZE]) -> [u8; KDF_CONTEXT_SIZE] {
    let mut context = [0u8; KDF_CONTEXT_SIZE];
    context.copy_from_slice(&header_context[24..32]);
    context[KDF_CONTEXT_SIZE - 1] = 0x00;
    context
}

/// Derive the archive's file key from a candidate master key.
pub fn derive_key(
    header_context: &[u8; HEADER_CONTEXT_SIZE],
    master: &MasterKey,
) -> ArchiveResult<DerivedKey> {
    let mut derived = DerivedKey {
        bytes: [0u8; KEY_SIZE],
    };
    kdf_derive(
        &mut derived.bytes,
        subkey_id(header_context),
        &kdf_context(header_context),
        master.as_bytes(),
    )?;
    Ok(derived)
}
