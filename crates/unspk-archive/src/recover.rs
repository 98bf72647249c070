//! Archive recovery: search an ordered list of candidate master keys for the
//! one under which every file decrypts, and rebuild the tar stream.
//!
//! A candidate is abandoned at the first file whose header record does not
//! authenticate. Integrity and format errors abort the whole search: they
//! describe the archive, not the key.
//!
//! The parallel search returns exactly what the sequential one would. Winners
//! and fatal errors are ranked by candidate index, not completion time, and a
//! shared cutoff index cancels attempts that can no longer win.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::container::Container;
use crate::decrypt::decrypt_file;
use crate::error::{ArchiveError, ArchiveResult};
use crate::keys::{derive_key, MasterKey};
use crate::tar;

/// Progress callback: `(candidates_done, candidates_total, message)`
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    /// Treat a file without a recorded hash as corruption
    pub require_hashes: bool,
    /// Attempt candidates concurrently on a rayon pool
    pub parallel: bool,
    /// Pool size for the parallel search (0 = rayon default)
    pub threads: usize,
}

/// What one recovered file contributed to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    /// Entry name from the tar header, when it parses
    pub name: Option<String>,
    /// Size declared in the tar header
    pub declared_size: Option<u64>,
    /// Decrypted body length
    pub body_len: usize,
}

/// A successful recovery.
pub struct Recovered {
    /// Complete tar stream including the end-of-archive blocks
    pub tar: Vec<u8>,
    /// The candidate that decrypted every file
    pub key: MasterKey,
    /// Its position in the candidate list
    pub key_index: usize,
    pub entries: Vec<EntrySummary>,
}

impl std::fmt::Debug for Recovered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovered")
            .field("tar_len", &self.tar.len())
            .field("key", &self.key)
            .field("key_index", &self.key_index)
            .field("entries", &self.entries)
            .finish()
    }
}

struct Accepted {
    tar: Vec<u8>,
    entries: Vec<EntrySummary>,
}

enum Attempt {
    Accepted(Accepted),
    Rejected { file_index: usize },
    Cancelled,
}

/// Sequential recovery with default options.
pub fn recover(container: &Container<'_>, candidates: &[MasterKey]) -> ArchiveResult<Recovered> {
    recover_with(container, candidates, &RecoveryOptions::default(), None)
}

pub fn recover_with(
    container: &Container<'_>,
    candidates: &[MasterKey],
    options: &RecoveryOptions,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<Recovered> {
    warn!("archive signature is not verified; metadata lengths and hashes are trusted as-is");

    if options.require_hashes {
        if let Some(index) = container
            .metadata()
            .files
            .iter()
            .position(|file| file.expected_hash.is_none())
        {
            return Err(ArchiveError::integrity(format!(
                "file {index} has no recorded hash"
            )));
        }
    }
    if container.file_count() == 0 {
        warn!("archive has no files; the first candidate is accepted unchecked");
    }

    let found = if options.parallel && candidates.len() > 1 {
        search_parallel(container, candidates, options.threads, progress)?
    } else {
        search_sequential(container, candidates, progress)?
    };

    let Some((key_index, accepted)) = found else {
        return Err(ArchiveError::NoValidKey {
            candidates: candidates.len(),
        });
    };

    let key = candidates[key_index].clone();
    info!(
        candidate = key_index,
        fingerprint = %key.fingerprint(),
        files = accepted.entries.len(),
        tar_bytes = accepted.tar.len(),
        "archive recovered"
    );

    Ok(Recovered {
        tar: accepted.tar,
        key,
        key_index,
        entries: accepted.entries,
    })
}

fn search_sequential(
    container: &Container<'_>,
    candidates: &[MasterKey],
    progress: Option<&ProgressFn>,
) -> ArchiveResult<Option<(usize, Accepted)>> {
    let total = candidates.len() as u64;
    for (index, master) in candidates.iter().enumerate() {
        report(progress, index as u64, total, "trying candidate");
        match attempt(container, index, master, None)? {
            Attempt::Accepted(accepted) => {
                report(progress, index as u64 + 1, total, "recovered");
                return Ok(Some((index, accepted)));
            }
            Attempt::Rejected { file_index } => {
                debug!(candidate = index, file_index, "candidate rejected");
            }
            Attempt::Cancelled => {}
        }
    }
    report(progress, total, total, "no valid key");
    Ok(None)
}

fn search_parallel(
    container: &Container<'_>,
    candidates: &[MasterKey],
    threads: usize,
    progress: Option<&ProgressFn>,
) -> ArchiveResult<Option<(usize, Accepted)>> {
    let total = candidates.len() as u64;
    // Lowest index that is already decided (accepted or fatal)
    let cutoff = AtomicUsize::new(usize::MAX);
    let done = AtomicU64::new(0);

    let search = || {
        candidates
            .par_iter()
            .enumerate()
            .find_map_first(|(index, master)| {
                if cutoff.load(Ordering::Acquire) < index {
                    return None;
                }
                let outcome = attempt(container, index, master, Some(&cutoff));
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                report(progress, finished, total, "candidates tried");

                match outcome {
                    Ok(Attempt::Accepted(accepted)) => {
                        cutoff.fetch_min(index, Ordering::AcqRel);
                        Some(Ok((index, accepted)))
                    }
                    Ok(Attempt::Rejected { file_index }) => {
                        debug!(candidate = index, file_index, "candidate rejected");
                        None
                    }
                    Ok(Attempt::Cancelled) => {
                        debug!(candidate = index, "candidate cancelled");
                        None
                    }
                    Err(e) => {
                        cutoff.fetch_min(index, Ordering::AcqRel);
                        Some(Err(e))
                    }
                }
            })
    };

    let found = if threads == 0 {
        search()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| ArchiveError::Pool(e.to_string()))?;
        pool.install(search)
    };

    found.transpose()
}

fn attempt(
    container: &Container<'_>,
    index: usize,
    master: &MasterKey,
    cutoff: Option<&AtomicUsize>,
) -> ArchiveResult<Attempt> {
    let key = derive_key(&container.metadata().header_context, master)?;
    let mut out = Vec::new();
    let mut entries = Vec::with_capacity(container.file_count());

    for (file_index, (descriptor, payload)) in container.files().enumerate() {
        if cutoff.is_some_and(|cutoff| cutoff.load(Ordering::Acquire) < index) {
            return Ok(Attempt::Cancelled);
        }

        let file = match decrypt_file(payload, &key, descriptor.expected_hash.as_ref()) {
            Ok(file) => file,
            Err(ArchiveError::InvalidKey) => return Ok(Attempt::Rejected { file_index }),
            Err(e) => return Err(e),
        };
        if file_index == 0 {
            info!(
                candidate = index,
                fingerprint = %master.fingerprint(),
                "candidate key authenticates"
            );
        }

        let header = file.header_info();
        debug!(
            candidate = index,
            file_index,
            name = header.as_ref().map_or("?", |h| h.name.as_str()),
            body_len = file.body().len(),
            "decrypted file"
        );
        entries.push(EntrySummary {
            name: header.as_ref().map(|h| h.name.clone()),
            declared_size: header.as_ref().map(|h| h.size),
            body_len: file.body().len(),
        });
        file.write_tar(&mut out);
    }

    tar::push_end_of_archive(&mut out);
    Ok(Attempt::Accepted(Accepted { tar: out, entries }))
}

fn report(progress: Option<&ProgressFn>, done: u64, total: u64, msg: &str) {
    if let Some(cb) = progress {
        cb(done, total, msg);
    }
}
