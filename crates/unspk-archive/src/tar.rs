//! Tar reconstruction helpers
//!
//! Each embedded file carries its ustar header record encrypted separately
//! from its body. The record is stored truncated to [`HEADER_RECORD_LEN`]
//! bytes; the dropped tail of a 512-byte ustar header is the unused end of
//! the `prefix` field plus padding, so zero-padding to the block boundary
//! restores the original header exactly.

use serde::Serialize;

use crate::error::{ArchiveError, ArchiveResult};

pub const TAR_BLOCK_SIZE: usize = 512;

/// Two zero blocks terminate a tar archive.
pub const END_OF_ARCHIVE_LEN: usize = 0x400;

/// Plaintext length of the stored header record (403-byte chunk minus 17 bytes overhead).
pub const HEADER_RECORD_LEN: usize = 386;

const NAME: std::ops::Range<usize> = 0..100;
const MODE: std::ops::Range<usize> = 100..108;
const UID: std::ops::Range<usize> = 108..116;
const GID: std::ops::Range<usize> = 116..124;
const SIZE: std::ops::Range<usize> = 124..136;
const MTIME: std::ops::Range<usize> = 136..148;
const CHKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..263;
const VERSION: std::ops::Range<usize> = 263..265;
const PREFIX: std::ops::Range<usize> = 345..500;

/// Number of zero bytes needed to bring `len` up to a 512-byte boundary.
pub fn pad_len(len: usize) -> usize {
    (TAR_BLOCK_SIZE - len % TAR_BLOCK_SIZE) % TAR_BLOCK_SIZE
}

/// Append `data` followed by its block padding.
pub fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    out.resize(out.len() + pad_len(data.len()), 0);
}

/// Append the two-block zero terminator.
pub fn push_end_of_archive(out: &mut Vec<u8>) {
    out.resize(out.len() + END_OF_ARCHIVE_LEN, 0);
}

/// Fields of interest from a (possibly truncated) ustar header record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderInfo {
    pub name: String,
    pub size: u64,
}

impl HeaderInfo {
    /// Extract the entry name and declared size. `None` when the record is too
    /// short or the size field is not a number.
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < SIZE.end {
            return None;
        }

        let mut name = field_str(&record[NAME]);
        if record.len() > PREFIX.start && record[MAGIC].starts_with(b"ustar") {
            let prefix = field_str(&record[PREFIX.start..record.len().min(PREFIX.end)]);
            if !prefix.is_empty() {
                name = format!("{prefix}/{name}");
            }
        }

        Some(Self {
            name,
            size: parse_size(&record[SIZE])?,
        })
    }
}

/// Build a regular-file ustar header for `name`, truncated to the stored
/// record length.
pub fn build_header_record(name: &str, size: u64) -> ArchiveResult<Vec<u8>> {
    if name.is_empty() || name.len() > NAME.len() {
        return Err(ArchiveError::format(format!(
            "tar entry name must be 1..={} bytes, got {}",
            NAME.len(),
            name.len()
        )));
    }
    if size >= 1 << 33 {
        return Err(ArchiveError::format(format!(
            "tar entry size {size} does not fit an octal size field"
        )));
    }

    let mut header = [0u8; TAR_BLOCK_SIZE];
    header[..name.len()].copy_from_slice(name.as_bytes());
    write_octal(&mut header[MODE], 0o644);
    write_octal(&mut header[UID], 0);
    write_octal(&mut header[GID], 0);
    write_octal(&mut header[SIZE], size);
    write_octal(&mut header[MTIME], 0);
    header[TYPEFLAG] = b'0';
    header[MAGIC].copy_from_slice(b"ustar\0");
    header[VERSION].copy_from_slice(b"00");

    header[CHKSUM].fill(b' ');
    let checksum: u32 = header.iter().map(|&b| u32::from(b)).sum();
    header[CHKSUM.start..CHKSUM.start + 6]
        .copy_from_slice(format!("{checksum:06o}").as_bytes());
    header[CHKSUM.start + 6] = 0;

    Ok(header[..HEADER_RECORD_LEN].to_vec())
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Octal size, or GNU base-256 when the high bit of the first byte is set.
fn parse_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 != 0 {
        let mut value: u64 = u64::from(field[0] & 0x7F);
        for &b in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(b))?;
        }
        return Some(value);
    }

    let text = std::str::from_utf8(field).ok()?;
    let digits = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 8).ok()
}

/// Zero-padded octal with a trailing NUL, filling the whole field.
fn write_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let text = format!("{value:0width$o}");
    field[..width].copy_from_slice(text.as_bytes());
    field[width] = 0;
}
