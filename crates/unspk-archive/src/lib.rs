//! unspk-archive: decoder for ADBEEF encrypted archive containers
//!
//! Pipeline: raw bytes → parse container → derive file key per candidate →
//! authenticate + decrypt each file → re-pad to tar blocks → append end-of-archive
//!
//! Key hierarchy:
//! ```text
//! Candidate Master Key (256-bit, one of N supplied by the caller)
//!   └── File Key (KDF over the archive's header context, one per archive)
//!       ├── Header stream: secretstream XChaCha20-Poly1305, one FINAL chunk (tar header record)
//!       └── Body stream:   secretstream XChaCha20-Poly1305, 4 MiB chunks (file contents)
//! ```
//!
//! The 64-byte archive signature is carried through but never verified.

pub mod builder;
pub mod container;
pub mod decrypt;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod primitives;
pub mod recover;
pub mod tar;

pub use container::Container;
pub use decrypt::{decrypt_file, DecryptedFile};
pub use error::{ArchiveError, ArchiveResult};
pub use keys::{derive_key, DerivedKey, MasterKey};
pub use metadata::{FileDescriptor, Metadata};
pub use recover::{recover, recover_with, EntrySummary, ProgressFn, Recovered, RecoveryOptions};

/// Size of master and derived keys in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a generic-hash digest
pub const HASH_SIZE: usize = 32;

/// Size of the header context stored in the metadata block
pub const HEADER_CONTEXT_SIZE: usize = 32;

/// Size of a KDF context string
pub const KDF_CONTEXT_SIZE: usize = 8;

/// Subkey length bounds accepted by the KDF
pub const KDF_BYTES_MIN: usize = 16;
pub const KDF_BYTES_MAX: usize = 64;
