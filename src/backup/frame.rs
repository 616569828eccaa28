//! The framed writer (C5): emit one `(header, MAXALIGN(payload))` record per
//! page into a backup file, folding the exact written bytes into a running
//! file CRC.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::backup::codec::{compress, CompressAlg};
use crate::backup::constants::{maxalign, BLCKSZ, PAGE_IS_TRUNCATED};
use crate::backup::crc::FileCrc;

/// The fixed 8-byte frame prefix: little-endian `block` then
/// `compressed_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPageHeader {
    pub block: u32,
    pub compressed_size: i32,
}

impl BackupPageHeader {
    pub const SIZE: usize = 8;

    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.block);
        LittleEndian::write_i32(&mut buf[4..8], self.compressed_size);
    }
}

/// Frame for the truncate-marker sentinel: `compressed_size == PageIsTruncated`.
pub fn truncate_marker(block: u32) -> BackupPageHeader {
    BackupPageHeader {
        block,
        compressed_size: PAGE_IS_TRUNCATED,
    }
}

/// Write one page frame, updating `crc`, `write_size`, and `uncompressed_size`
/// counters. Returns the number of bytes written to `out` (header +
/// MAXALIGNed payload).
pub fn write_frame<W: Write>(
    out: &mut W,
    crc: &mut FileCrc,
    block: u32,
    page: &[u8],
    alg: CompressAlg,
    level: u32,
    write_size: &mut u64,
    uncompressed_size: &mut u64,
) -> std::io::Result<usize> {
    let mut scratch = vec![0u8; 2 * BLCKSZ as usize];
    let (compressed_size, payload): (i32, &[u8]) = match compress(&mut scratch, page, alg, level) {
        Ok(n) if n > 0 && n < BLCKSZ as usize => (n as i32, &scratch[..n]),
        _ => (BLCKSZ as i32, page),
    };

    let header = BackupPageHeader { block, compressed_size };
    let padded_len = maxalign(payload.len());

    let mut staged = Vec::with_capacity(BackupPageHeader::SIZE + padded_len);
    let mut hdr_buf = [0u8; BackupPageHeader::SIZE];
    header.encode(&mut hdr_buf);
    staged.extend_from_slice(&hdr_buf);
    staged.extend_from_slice(payload);
    staged.resize(BackupPageHeader::SIZE + padded_len, 0);

    crc.update(&staged);
    out.write_all(&staged)?;

    *write_size += staged.len() as u64;
    *uncompressed_size += BLCKSZ as u64;
    Ok(staged.len())
}

/// Write a truncate-marker frame (no payload). Used by the restore
/// compatibility path and by tests exercising C7 directly; the backup
/// driver itself never emits one (truncation is a restore-time concept
/// signalled by a short read, see C3/C6).
pub fn write_truncate_marker<W: Write>(out: &mut W, crc: &mut FileCrc, block: u32) -> std::io::Result<usize> {
    let header = truncate_marker(block);
    let mut hdr_buf = [0u8; BackupPageHeader::SIZE];
    header.encode(&mut hdr_buf);
    crc.update(&hdr_buf);
    out.write_all(&hdr_buf)?;
    Ok(BackupPageHeader::SIZE)
}
