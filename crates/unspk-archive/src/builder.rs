//! Push-side inverse of the decoder: builds containers in the exact layout
//! the decoder consumes. Used for synthetic archives in tests and benchmarks.
//!
//! The signature block is written as zeros; nothing checks it.

use crate::container::{MAGIC, SIGNATURE_SIZE};
use crate::decrypt::{BODY_CHUNK_PLAINTEXT, BODY_OFFSET};
use crate::error::{ArchiveError, ArchiveResult};
use crate::keys::{derive_key, DerivedKey, MasterKey};
use crate::metadata::{FileDescriptor, Metadata};
use crate::primitives::{generic_hash, PushStream, StreamTag};
use crate::tar::build_header_record;
use crate::HEADER_CONTEXT_SIZE;

/// One file to embed.
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub name: String,
    /// `None` stores the header record only, with no body stream at all
    pub body: Option<Vec<u8>>,
}

impl FileSpec {
    pub fn new(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body: Some(body),
        }
    }

    pub fn header_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: None,
        }
    }
}

/// Encrypt one file into its payload form.
pub fn encrypt_file(spec: &FileSpec, key: &DerivedKey) -> ArchiveResult<Vec<u8>> {
    let body_len = spec.body.as_ref().map_or(0, Vec::len);
    let record = build_header_record(&spec.name, body_len as u64)?;

    let (mut header_stream, header) = PushStream::init(key.as_bytes());
    let mut payload = header.to_vec();
    payload.extend_from_slice(&header_stream.push(&record, StreamTag::Final)?);

    let Some(body) = &spec.body else {
        return Ok(payload);
    };

    payload.resize(BODY_OFFSET, 0);
    let (mut body_stream, header) = PushStream::init(key.as_bytes());
    payload.extend_from_slice(&header);

    let chunk_count = body.len().div_ceil(BODY_CHUNK_PLAINTEXT).max(1);
    for index in 0..chunk_count {
        let start = index * BODY_CHUNK_PLAINTEXT;
        let end = (start + BODY_CHUNK_PLAINTEXT).min(body.len());
        let tag = if index + 1 == chunk_count {
            StreamTag::Final
        } else {
            StreamTag::Message
        };
        payload.extend_from_slice(&body_stream.push(&body[start..end], tag)?);
    }

    Ok(payload)
}

/// Lay out a container around already-encrypted payloads.
pub fn assemble(version: u8, metadata: &Metadata, payloads: &[Vec<u8>]) -> ArchiveResult<Vec<u8>> {
    if metadata.files.len() != payloads.len() {
        return Err(ArchiveError::format(format!(
            "{} descriptors for {} payloads",
            metadata.files.len(),
            payloads.len()
        )));
    }

    let block = metadata.encode()?;
    let meta_len = u32::try_from(block.len())
        .map_err(|_| ArchiveError::format("metadata block exceeds u32::MAX bytes"))?;

    let total = 8 + block.len() + SIGNATURE_SIZE + payloads.iter().map(Vec::len).sum::<usize>();
    let mut raw = Vec::with_capacity(total);
    raw.push(version);
    raw.extend_from_slice(&MAGIC);
    raw.extend_from_slice(&meta_len.to_le_bytes());
    raw.extend_from_slice(&block);
    raw.resize(raw.len() + SIGNATURE_SIZE, 0);
    for payload in payloads {
        raw.extend_from_slice(payload);
    }
    Ok(raw)
}

/// Builds a complete archive for one master key.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    version: u8,
    header_context: [u8; HEADER_CONTEXT_SIZE],
    record_hashes: bool,
    files: Vec<FileSpec>,
}

impl ArchiveBuilder {
    pub fn new(header_context: [u8; HEADER_CONTEXT_SIZE]) -> Self {
        Self {
            version: 0,
            header_context,
            record_hashes: true,
            files: Vec::new(),
        }
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Store payload hashes in the metadata (default: true).
    pub fn record_hashes(mut self, record: bool) -> Self {
        self.record_hashes = record;
        self
    }

    pub fn file(mut self, spec: FileSpec) -> Self {
        self.files.push(spec);
        self
    }

    /// Encrypt every file under the key derived from `master` and lay out the container.
    pub fn build(&self, master: &MasterKey) -> ArchiveResult<Vec<u8>> {
        let key = derive_key(&self.header_context, master)?;

        let mut files = Vec::with_capacity(self.files.len());
        let mut payloads = Vec::with_capacity(self.files.len());
        for spec in &self.files {
            let payload = encrypt_file(spec, &key)?;
            let expected_hash = if self.record_hashes {
                Some(generic_hash(&payload)?)
            } else {
                None
            };
            files.push(FileDescriptor {
                length: payload.len() as u64,
                expected_hash,
            });
            payloads.push(payload);
        }

        let metadata = Metadata {
            header_context: self.header_context,
            files,
        };
        assemble(self.version, &metadata, &payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::decrypt::HEADER_CHUNK_LEN;
    use crate::primitives::{STREAM_ABYTES, STREAM_HEADER_SIZE};

    #[test]
    fn test_payload_layout() {
        let key = derive_key(&[0u8; HEADER_CONTEXT_SIZE], &MasterKey::from_bytes([1u8; 32])).unwrap();
        let payload = encrypt_file(&FileSpec::new("f", vec![0xEE; 10]), &key).unwrap();

        assert_eq!(
            payload.len(),
            BODY_OFFSET + STREAM_HEADER_SIZE + 10 + STREAM_ABYTES
        );
        let padding = &payload[STREAM_HEADER_SIZE + HEADER_CHUNK_LEN..BODY_OFFSET];
        assert!(padding.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_body_still_has_final_chunk() {
        let key = derive_key(&[0u8; HEADER_CONTEXT_SIZE], &MasterKey::from_bytes([1u8; 32])).unwrap();
        let payload = encrypt_file(&FileSpec::new("f", Vec::new()), &key).unwrap();
        assert_eq!(payload.len(), BODY_OFFSET + STREAM_HEADER_SIZE + STREAM_ABYTES);
    }

    #[test]
    fn test_built_archive_parses() {
        let raw = ArchiveBuilder::new([4u8; HEADER_CONTEXT_SIZE])
            .version(7)
            .file(FileSpec::new("a.txt", b"aaa".to_vec()))
            .file(FileSpec::header_only("dir"))
            .build(&MasterKey::from_bytes([9u8; 32]))
            .unwrap();

        let container = Container::parse(&raw).unwrap();
        assert_eq!(container.version(), 7);
        assert_eq!(container.file_count(), 2);
        for (file, payload) in container.files() {
            assert_eq!(file.length as usize, payload.len());
            assert_eq!(file.expected_hash, Some(generic_hash(payload).unwrap()));
        }
    }

    #[test]
    fn test_assemble_rejects_count_mismatch() {
        let metadata = Metadata {
            header_context: [0u8; HEADER_CONTEXT_SIZE],
            files: vec![],
        };
        assert!(assemble(0, &metadata, &[vec![1, 2, 3]]).is_err());
    }
}
