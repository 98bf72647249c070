//! Output placement: default naming and all-or-nothing writes.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{UnspkError, UnspkResult};

/// `<archive><suffix>`, e.g. `backup.spk` → `backup.spk.tar`.
pub fn default_output_path(archive: &Path, suffix: &str) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write `data` to `path` atomically.
///
/// The bytes go to a temporary file in the destination directory, which is
/// renamed into place only once fully written. An existing file is replaced
/// only when `overwrite` is set.
pub fn write_atomic(path: &Path, data: &[u8], overwrite: bool) -> UnspkResult<()> {
    if !overwrite && path.exists() {
        return Err(UnspkError::Output(format!(
            "{} already exists (use --force to replace it)",
            path.display()
        )));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    if overwrite {
        tmp.persist(path)
            .map_err(|e| UnspkError::Output(format!("renaming into {}: {}", path.display(), e.error)))?;
    } else {
        tmp.persist_noclobber(path)
            .map_err(|e| UnspkError::Output(format!("renaming into {}: {}", path.display(), e.error)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/file.spk"), ".tar"),
            PathBuf::from("/data/file.spk.tar")
        );
        assert_eq!(
            default_output_path(Path::new("file.sa"), ".out.tar"),
            PathBuf::from("file.sa.out.tar")
        );
    }
}
