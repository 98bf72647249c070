//! Candidate key sources
//!
//! Key text format (key files and `UNSPK_KEYS`):
//! ```text
//! # comment
//! 50eb...1ade
//! 64fa...3fe0, 7a01...9c2d   # several per line, comma or whitespace separated
//! ```
//! Order is preserved: it decides which key wins when several would work.

use secrecy::SecretString;
use std::path::Path;
use zeroize::Zeroize;

use crate::error::{UnspkError, UnspkResult};

/// Split key text into individual secret tokens, in order.
pub fn parse_key_list(text: &str) -> Vec<SecretString> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .map(|token| SecretString::from(token.to_string()))
        .collect()
}

/// Read a key file. The raw file contents are zeroized after parsing.
pub fn load_key_file(path: &Path) -> UnspkResult<Vec<SecretString>> {
    let mut text = std::fs::read_to_string(path)
        .map_err(|e| UnspkError::Keys(format!("reading key file {}: {e}", path.display())))?;
    let keys = parse_key_list(&text);
    text.zeroize();

    if keys.is_empty() {
        return Err(UnspkError::Keys(format!(
            "key file {} contains no keys",
            path.display()
        )));
    }
    tracing::debug!(count = keys.len(), path = %path.display(), "loaded candidate keys");
    Ok(keys)
}
