use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UnspkError, UnspkResult};

/// Top-level configuration (loaded from config.toml).
///
/// Never holds key material: candidate keys come from flags, the
/// environment, or a key file referenced by path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnspkConfig {
    pub log: LogConfig,
    pub keys: KeysConfig,
    pub recovery: RecoveryConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Key file with one hex master key per line
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Try candidate keys concurrently
    pub parallel: bool,
    /// Worker threads for the parallel search (0 = cpu_count)
    pub threads: usize,
    /// Reject archives that omit a per-file hash
    pub require_hashes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Appended to the archive path when no output path is given
    pub suffix: String,
    /// Replace an existing output file
    pub overwrite: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: ".tar".into(),
            overwrite: false,
        }
    }
}

impl UnspkConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> UnspkResult<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            tracing::debug!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| UnspkError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| UnspkError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Render as TOML for `config show`.
    pub fn to_toml(&self) -> UnspkResult<String> {
        toml::to_string_pretty(self).map_err(|e| UnspkError::Config(format!("serializing: {e}")))
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[keys]
key_file = "/etc/unspk/keys.txt"

[recovery]
parallel = true
threads = 8
require_hashes = true

[output]
suffix = ".recovered.tar"
overwrite = true
"#;
        let config: UnspkConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.keys.key_file, Some(PathBuf::from("/etc/unspk/keys.txt")));
        assert!(config.recovery.parallel);
        assert_eq!(config.recovery.threads, 8);
        assert!(config.recovery.require_hashes);
        assert_eq!(config.output.suffix, ".recovered.tar");
        assert!(config.output.overwrite);
    }

    #[test]
    fn test_parse_defaults() {
        let config: UnspkConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "text");
        assert!(config.keys.key_file.is_none());
        assert!(!config.recovery.parallel);
        assert_eq!(config.recovery.threads, 0);
        assert!(!config.recovery.require_hashes);
        assert_eq!(config.output.suffix, ".tar");
        assert!(!config.output.overwrite);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[recovery]
parallel = true
"#;
        let config: UnspkConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert!(config.recovery.parallel);
        // Defaults
        assert_eq!(config.recovery.threads, 0);
        assert_eq!(config.output.suffix, ".tar");
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let result: Result<UnspkConfig, _> = toml::from_str("[recovery]\nthreads = \"many\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = UnspkConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: UnspkConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.log.level, parsed.log.level);
        assert_eq!(config.output.suffix, parsed.output.suffix);
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde(Path::new("/etc/x")), PathBuf::from("/etc/x"));
    }
}
