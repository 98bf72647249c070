use thiserror::Error;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Failure taxonomy of the archive decoder.
///
/// Only [`ArchiveError::InvalidKey`] is recoverable: the recovery driver
/// treats it as "try the next candidate". Everything else aborts the run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Malformed container: bad magic, inconsistent lengths, unexpected stream tag.
    #[error("malformed archive: {0}")]
    Format(String),

    /// A stream header failed to authenticate under the current candidate key.
    #[error("stream header failed to authenticate under the candidate key")]
    InvalidKey,

    /// Payload corruption: hash mismatch or a body chunk that fails to
    /// authenticate after the key was already proven.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Every candidate key was tried without success.
    #[error("no valid key among {candidates} candidate(s)")]
    NoValidKey { candidates: usize },

    /// A cryptographic primitive rejected its inputs.
    #[error("crypto primitive failed: {0}")]
    Primitive(String),

    /// The parallel key search could not start its worker pool.
    #[error("worker pool: {0}")]
    Pool(String),
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey)
    }

    /// True for errors that must abort the whole run rather than advance
    /// to the next candidate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidKey | Self::NoValidKey { .. })
    }
}
