//! The validator driver (C8): two independent surfaces over the same C2/C3
//! machinery — `check_data_file` classifies every block of a *live* file,
//! `check_file_pages` replays a *framed backup file* and cross-checks its
//! whole-file CRC.

use std::io::{Read, Seek};

use crate::backup::cancel::CancellationToken;
use crate::backup::codec::{decompress, CompressAlg};
use crate::backup::constants::{maxalign, BLCKSZ, PAGE_IS_TRUNCATED};
use crate::backup::crc::{BackupVersion, FileCrc};
use crate::backup::diagnostics::{Diagnostic, DiagnosticSink};
use crate::backup::file_entry::FileEntry;
use crate::backup::mode::BackupMode;
use crate::backup::reader::{prepare_page, PreparePageArgs, ReadCode};
use crate::backup::validator::{validate_one_page, ValidationCode};
use crate::error::{BackupError, Result};

/// Classify every block of a live database file. Runs the C3 loop
/// with `strict = false`: a corrupted block after retries is recorded and
/// the scan continues rather than aborting, so the caller learns about
/// every bad block in one pass.
pub fn check_data_file(
    source: &mut (impl Read + Seek),
    file: &FileEntry,
    checksum_enabled: bool,
    cancel: &CancellationToken,
    diag: DiagnosticSink<'_>,
) -> Result<bool> {
    let mut is_valid = true;
    for blknum in 0..file.n_blocks {
        cancel.checkpoint()?;
        let args = PreparePageArgs {
            rel_path: &file.rel_path,
            blknum,
            mode: BackupMode::Full,
            prev_backup_start_lsn: 0,
            exists_in_prev: false,
            ptrack_version: 0,
            strict: false,
            checksum_enabled,
            absolute_blkno: file.absolute_blkno(blknum),
            db_oid: file.rel.db_oid,
            tablespace_oid: file.rel.tablespace_oid,
            rel_oid: file.rel.rel_oid,
        };
        let (code, _, _) = prepare_page(source, cancel, None, args, &mut *diag)?;
        match code {
            ReadCode::PageIsTruncated => break,
            ReadCode::PageIsCorrupted => is_valid = false,
            ReadCode::PageIsOk | ReadCode::SkipCurrentPage => {}
        }
    }
    Ok(is_valid)
}

/// Replay a framed backup file, rolling the CRC, decompressing and
/// revalidating every page via the page validator (with `stop_lsn`
/// engaged), and comparing the final CRC against `file.crc`.
///
/// A mismatch, a corrupt frame, or any `HeaderInvalid`/`ChecksumMismatch`
/// marks the file invalid; `LsnFromFuture` is reported through `diag` but
/// does not fail validation (the caller escalates as policy).
pub fn check_file_pages(
    backup_file: &mut dyn Read,
    file: &FileEntry,
    stop_lsn: u64,
    backup_version: BackupVersion,
    checksum_enabled: bool,
    cancel: &CancellationToken,
    diag: DiagnosticSink<'_>,
) -> Result<bool> {
    let mut crc = FileCrc::new(backup_version);
    let mut is_valid = true;

    loop {
        cancel.checkpoint()?;

        let mut hdr_buf = [0u8; 8];
        let read = read_fully(backup_file, &mut hdr_buf).map_err(|e| BackupError::io(&file.rel_path, e))?;
        if read == 0 {
            break;
        }
        if read < 8 {
            diag(Diagnostic::error(format!("{}: truncated frame header at EOF", file.rel_path)));
            is_valid = false;
            break;
        }

        let block = u32::from_le_bytes([hdr_buf[0], hdr_buf[1], hdr_buf[2], hdr_buf[3]]);
        let compressed_size = i32::from_le_bytes([hdr_buf[4], hdr_buf[5], hdr_buf[6], hdr_buf[7]]);
        crc.update(&hdr_buf);

        if block == 0 && compressed_size == 0 {
            diag(Diagnostic::error(format!("{}: malformed empty frame encountered during validation", file.rel_path)));
            is_valid = false;
            break;
        }

        if compressed_size == PAGE_IS_TRUNCATED {
            break;
        }

        if compressed_size > BLCKSZ as i32 || compressed_size < 0 {
            diag(Diagnostic::error(format!(
                "{}: frame at block {} declares invalid compressed_size {}",
                file.rel_path, block, compressed_size
            )));
            is_valid = false;
            break;
        }

        let padded_len = maxalign(compressed_size as usize);
        let mut payload = vec![0u8; padded_len];
        let got = read_fully(backup_file, &mut payload).map_err(|e| BackupError::io(&file.rel_path, e))?;
        if got < padded_len {
            diag(Diagnostic::error(format!("{}: truncated payload at block {}", file.rel_path, block)));
            is_valid = false;
            break;
        }
        crc.update(&payload);

        let page = if compressed_size == BLCKSZ as i32 {
            payload[..BLCKSZ as usize].to_vec()
        } else {
            let mut dst = vec![0u8; BLCKSZ as usize];
            match decompress(&mut dst, &payload[..compressed_size as usize], file.compress_alg) {
                Ok(n) => {
                    dst.resize(n, 0);
                    dst.resize(BLCKSZ as usize, 0);
                    dst
                }
                Err(e) => {
                    diag(Diagnostic::error(format!("{}: block {}: {}", file.rel_path, block, e)));
                    is_valid = false;
                    continue;
                }
            }
        };

        let (code, _) = validate_one_page(Some(&page), file.absolute_blkno(block), stop_lsn, checksum_enabled);
        match code {
            ValidationCode::HeaderInvalid(reason) => {
                diag(Diagnostic::error(format!("{}: block {}: {}", file.rel_path, block, reason)));
                is_valid = false;
            }
            ValidationCode::ChecksumMismatch { stored, calculated } => {
                diag(Diagnostic::error(format!(
                    "{}: block {}: checksum mismatch (stored 0x{:04x}, calculated 0x{:04x})",
                    file.rel_path, block, stored, calculated
                )));
                is_valid = false;
            }
            ValidationCode::LsnFromFuture { page_lsn, stop_lsn } => {
                diag(Diagnostic::warning(format!(
                    "{}: block {}: LSN {} is newer than stop LSN {}",
                    file.rel_path, block, page_lsn, stop_lsn
                )));
            }
            ValidationCode::Valid | ValidationCode::Zeroed | ValidationCode::NotFound => {}
        }
    }

    let final_crc = crc.finalize();
    if final_crc != file.crc {
        diag(Diagnostic::error(format!(
            "{}: CRC mismatch (stored 0x{:08x}, computed 0x{:08x})",
            file.rel_path, file.crc, final_crc
        )));
        is_valid = false;
    }

    Ok(is_valid)
}

fn read_fully(input: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match input.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
