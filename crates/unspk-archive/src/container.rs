//! Container layout (integers little-endian):
//!
//! ```text
//! [1 byte: version/flags][3 bytes: AD BE EF][4 bytes: metaLen]
//! [metaLen bytes: MessagePack metadata]
//! [64 bytes: signature, NOT verified]
//! [file payloads, back to back, lengths from metadata]
//! ```

use tracing::{debug, warn};

use crate::error::{ArchiveError, ArchiveResult};
use crate::metadata::{FileDescriptor, Metadata};

pub const MAGIC: [u8; 3] = [0xAD, 0xBE, 0xEF];

/// Version byte + magic + metadata length
pub const PREAMBLE_SIZE: usize = 8;

pub const SIGNATURE_SIZE: usize = 64;

/// A parsed, borrowed view over a raw archive.
#[derive(Debug)]
pub struct Container<'a> {
    version: u8,
    meta_len: usize,
    metadata: Metadata,
    signature: &'a [u8],
    payloads: Vec<&'a [u8]>,
}

impl<'a> Container<'a> {
    /// Split `raw` into metadata, signature and per-file payload slices.
    pub fn parse(raw: &'a [u8]) -> ArchiveResult<Self> {
        if raw.len() < PREAMBLE_SIZE {
            return Err(ArchiveError::format(format!(
                "archive is {} bytes, shorter than the {PREAMBLE_SIZE}-byte preamble",
                raw.len()
            )));
        }
        if raw[1..4] != MAGIC {
            return Err(ArchiveError::format(format!(
                "bad magic {:02X?}, expected {MAGIC:02X?}",
                &raw[1..4]
            )));
        }

        let meta_len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        if meta_len > raw.len() - PREAMBLE_SIZE {
            return Err(ArchiveError::format(format!(
                "metadata length {meta_len} exceeds the {} bytes available",
                raw.len() - PREAMBLE_SIZE
            )));
        }

        let meta_end = PREAMBLE_SIZE + meta_len;
        let sig_end = meta_end + SIGNATURE_SIZE;
        if raw.len() < sig_end {
            return Err(ArchiveError::format(format!(
                "archive truncated inside the signature block ({} of {SIGNATURE_SIZE} bytes)",
                raw.len() - meta_end
            )));
        }

        let metadata = Metadata::decode(&raw[PREAMBLE_SIZE..meta_end])?;
        let signature = &raw[meta_end..sig_end];
        let payloads = split_payloads(&raw[sig_end..], &metadata.files)?;

        debug!(
            version = raw[0],
            meta_len,
            files = payloads.len(),
            "parsed archive container"
        );

        Ok(Self {
            version: raw[0],
            meta_len,
            metadata,
            signature,
            payloads,
        })
    }

    /// The version/flags byte. Carried but not interpreted.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Length of the encoded metadata block.
    pub fn meta_len(&self) -> usize {
        self.meta_len
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The 64-byte archive signature. Nothing in this crate verifies it.
    pub fn signature(&self) -> &'a [u8] {
        self.signature
    }

    /// Descriptor and payload slice for every file, in archive order.
    pub fn files(&self) -> impl ExactSizeIterator<Item = (&FileDescriptor, &'a [u8])> + '_ {
        self.metadata
            .files
            .iter()
            .zip(self.payloads.iter().copied())
    }

    pub fn file_count(&self) -> usize {
        self.payloads.len()
    }
}

fn split_payloads<'a>(
    mut region: &'a [u8],
    files: &[FileDescriptor],
) -> ArchiveResult<Vec<&'a [u8]>> {
    let mut payloads = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let len = usize::try_from(file.length)
            .ok()
            .filter(|&len| len <= region.len())
            .ok_or_else(|| {
                ArchiveError::format(format!(
                    "file {index} claims {} bytes but only {} remain",
                    file.length,
                    region.len()
                ))
            })?;
        let (payload, rest) = region.split_at(len);
        payloads.push(payload);
        region = rest;
    }

    if !region.is_empty() {
        warn!(trailing = region.len(), "ignoring bytes after the last file payload");
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HASH_SIZE, HEADER_CONTEXT_SIZE};

    fn assemble(version: u8, meta: &Metadata, payloads: &[&[u8]]) -> Vec<u8> {
        let block = meta.encode().unwrap();
        let mut raw = vec![version];
        raw.extend_from_slice(&MAGIC);
        raw.extend_from_slice(&(block.len() as u32).to_le_bytes());
        raw.extend_from_slice(&block);
        raw.extend_from_slice(&[0x5Au8; SIGNATURE_SIZE]);
        for payload in payloads {
            raw.extend_from_slice(payload);
        }
        raw
    }

    fn meta(lengths: &[u64]) -> Metadata {
        Metadata {
            header_context: [1u8; HEADER_CONTEXT_SIZE],
            files: lengths
                .iter()
                .map(|&length| FileDescriptor {
                    length,
                    expected_hash: Some([0u8; HASH_SIZE]),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_splits_payloads() {
        let raw = assemble(2, &meta(&[3, 5]), &[b"abc", b"defgh"]);
        let container = Container::parse(&raw).unwrap();

        assert_eq!(container.version(), 2);
        assert_eq!(container.meta_len(), meta(&[3, 5]).encode().unwrap().len());
        assert_eq!(container.signature(), &[0x5Au8; SIGNATURE_SIZE][..]);
        let payloads: Vec<_> = container.files().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![&b"abc"[..], &b"defgh"[..]]);
    }

    #[test]
    fn test_parse_bad_magic() {
        let mut raw = assemble(0, &meta(&[]), &[]);
        raw[2] = 0x00;
        let err = Container::parse(&raw).unwrap_err();
        assert!(matches!(err, ArchiveError::Format(_)));
    }

    #[test]
    fn test_parse_metadata_length_overflow() {
        let mut raw = assemble(0, &meta(&[]), &[]);
        let too_long = (raw.len() - PREAMBLE_SIZE + 1) as u32;
        raw[4..8].copy_from_slice(&too_long.to_le_bytes());
        assert!(matches!(
            Container::parse(&raw),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn test_parse_truncated_signature() {
        let raw = assemble(0, &meta(&[]), &[]);
        assert!(Container::parse(&raw[..raw.len() - 1]).is_err());
    }

    #[test]
    fn test_parse_short_preamble() {
        assert!(Container::parse(&[0x00, 0xAD, 0xBE]).is_err());
    }

    #[test]
    fn test_parse_payload_overrun() {
        let raw = assemble(0, &meta(&[3, 10]), &[b"abc", b"short"]);
        let err = Container::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("file 1"));
    }

    #[test]
    fn test_parse_tolerates_trailing_bytes() {
        let raw = assemble(0, &meta(&[3]), &[b"abc", b"junk"]);
        let container = Container::parse(&raw).unwrap();
        assert_eq!(container.file_count(), 1);
    }
}
