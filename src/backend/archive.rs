//! In-memory tar archive construction
//!
//! Container creation accepts a pre-built filesystem archive rather than
//! individual file writes, so the code and auxiliary files are packaged into
//! the tar wire format here: one 512-byte header per file followed by the
//! content padded to the next 512-byte boundary.
//!
//! The header checksum is two-pass: the checksum field is first filled with
//! eight ASCII spaces, the unsigned byte sum of the whole header is computed
//! with those spaces in place, and only then is the field overwritten with
//! the six-octal-digit sum. Readers re-verify the sum, so writing anything
//! else into the field before summing corrupts the archive silently.

use chrono::Utc;

use crate::constants::ARCHIVE_BLOCK_SIZE;
use crate::error::{BenchError, BenchResult};

const NAME_LEN: usize = 100;
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Builds a tar archive in memory, one regular file at a time
pub struct ArchiveBuilder {
    data: Vec<u8>,
    mtime: u64,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            mtime: Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Append one regular file. Names are limited to the 100-byte name field.
    pub fn append_file(&mut self, name: &str, contents: &[u8]) -> BenchResult<()> {
        if name.is_empty() {
            return Err(BenchError::InvalidInput(
                "archive entry name must be non-empty".to_string(),
            ));
        }
        if name.len() > NAME_LEN {
            return Err(BenchError::InvalidInput(format!(
                "archive entry name '{name}' exceeds {NAME_LEN} bytes"
            )));
        }

        let header = build_header(name, contents.len() as u64, self.mtime)?;
        self.data.extend_from_slice(&header);
        self.data.extend_from_slice(contents);

        // Pad the content out to the next block boundary
        let remainder = contents.len() % ARCHIVE_BLOCK_SIZE;
        if remainder != 0 {
            self.data
                .extend(std::iter::repeat_n(0u8, ARCHIVE_BLOCK_SIZE - remainder));
        }
        Ok(())
    }

    /// Terminate the archive with two zero blocks and return the bytes
    pub fn finish(mut self) -> Vec<u8> {
        self.data.extend(std::iter::repeat_n(0u8, 2 * ARCHIVE_BLOCK_SIZE));
        self.data
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_header(name: &str, size: u64, mtime: u64) -> BenchResult<[u8; ARCHIVE_BLOCK_SIZE]> {
    let mut header = [0u8; ARCHIVE_BLOCK_SIZE];

    // name: bytes 0-99, NUL padded
    header[..name.len()].copy_from_slice(name.as_bytes());

    // mode 100-107, uid 108-115, gid 116-123: 7 octal digits + NUL
    write_octal(&mut header[100..108], 0o644, b'\0')?;
    write_octal(&mut header[108..116], 0, b'\0')?;
    write_octal(&mut header[116..124], 0, b'\0')?;

    // size 124-135, mtime 136-147: 11 octal digits + space
    write_octal(&mut header[124..136], size, b' ')?;
    write_octal(&mut header[136..148], mtime, b' ')?;

    // checksum placeholder: eight spaces, summed as-is below
    header[CHECKSUM_RANGE].fill(b' ');

    // typeflag: regular file
    header[156] = b'0';

    let sum: u32 = header.iter().map(|&b| u32::from(b)).sum();

    // six octal digits, NUL, space
    let field = &mut header[CHECKSUM_RANGE];
    field[..6].copy_from_slice(format!("{sum:06o}").as_bytes());
    field[6] = b'\0';
    field[7] = b' ';

    Ok(header)
}

/// Zero-padded ASCII octal with a single terminator byte
fn write_octal(field: &mut [u8], value: u64, terminator: u8) -> BenchResult<()> {
    let width = field.len() - 1;
    let encoded = format!("{value:0width$o}");
    if encoded.len() > width {
        return Err(BenchError::InvalidInput(format!(
            "value {value} does not fit an {width}-digit octal field"
        )));
    }
    field[..width].copy_from_slice(encoded.as_bytes());
    field[width] = terminator;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries_of(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(data);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents).unwrap();
                (name, contents)
            })
            .collect()
    }

    #[test]
    fn test_round_trip_through_independent_reader() {
        let mut builder = ArchiveBuilder::new();
        builder.append_file("main.py", b"print('hello')\n").unwrap();
        builder
            .append_file("data/input.txt", b"1 2 3")
            .unwrap();
        builder.append_file("empty.txt", b"").unwrap();

        let entries = entries_of(&builder.finish());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "main.py");
        assert_eq!(entries[0].1, b"print('hello')\n");
        assert_eq!(entries[1].0, "data/input.txt");
        assert_eq!(entries[1].1, b"1 2 3");
        assert_eq!(entries[2].0, "empty.txt");
        assert!(entries[2].1.is_empty());
    }

    #[test]
    fn test_binary_content_survives() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1337).collect();
        let mut builder = ArchiveBuilder::new();
        builder.append_file("blob.bin", &payload).unwrap();

        let entries = entries_of(&builder.finish());
        assert_eq!(entries[0].1, payload);
    }

    #[test]
    fn test_reader_accepts_recomputed_checksum() {
        // tar rejects archives whose stored checksum does not match the
        // recomputed byte sum, so a parsed entry proves the two-pass write
        let mut builder = ArchiveBuilder::new();
        builder.append_file("main.sh", b"echo ok\n").unwrap();
        let data = builder.finish();

        let mut archive = tar::Archive::new(&data[..]);
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        let header_sum = entry.header().cksum().unwrap();

        let mut expected = [0u8; ARCHIVE_BLOCK_SIZE];
        expected.copy_from_slice(&data[..ARCHIVE_BLOCK_SIZE]);
        expected[CHECKSUM_RANGE].fill(b' ');
        let recomputed: u32 = expected.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(header_sum, recomputed);
    }

    #[test]
    fn test_header_field_layout() {
        let mut builder = ArchiveBuilder::new();
        builder.append_file("a.txt", b"x").unwrap();
        let data = builder.finish();

        // mode: zero-padded octal 644 with NUL terminator
        assert_eq!(&data[100..108], b"0000644\0");
        // size: 11 octal digits followed by a space
        assert_eq!(&data[124..136], b"00000000001 ");
        // typeflag: regular file
        assert_eq!(data[156], b'0');
        // checksum field terminator: NUL then space
        assert_eq!(data[154], 0);
        assert_eq!(data[155], b' ');
    }

    #[test]
    fn test_blocks_are_aligned_and_terminated() {
        let mut builder = ArchiveBuilder::new();
        builder.append_file("a.txt", &[7u8; 513]).unwrap();
        let data = builder.finish();

        assert_eq!(data.len() % ARCHIVE_BLOCK_SIZE, 0);
        // header + two content blocks + two trailer blocks
        assert_eq!(data.len(), 5 * ARCHIVE_BLOCK_SIZE);
        assert!(data[data.len() - 2 * ARCHIVE_BLOCK_SIZE..]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_name_length_limit() {
        let mut builder = ArchiveBuilder::new();
        assert!(builder.append_file(&"n".repeat(100), b"ok").is_ok());
        assert!(builder.append_file(&"n".repeat(101), b"no").is_err());
        assert!(builder.append_file("", b"no").is_err());
    }
}
