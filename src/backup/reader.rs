//! The page reader (C3): retry-until-stable read of one block, integrated
//! with the validator (C2) and, for old PTRACK versions, a shared-buffer
//! fallback.

use std::io::{Read, Seek, SeekFrom};

use crate::backup::cancel::CancellationToken;
use crate::backup::constants::{BLCKSZ, PAGE_READ_ATTEMPTS};
use crate::backup::diagnostics::{Diagnostic, DiagnosticSink, Severity};
use crate::backup::mode::BackupMode;
use crate::backup::validator::{validate_one_page, ValidationCode};
use crate::error::{BackupError, Result};

/// Outcome of `prepare_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCode {
    PageIsOk,
    PageIsTruncated,
    SkipCurrentPage,
    PageIsCorrupted,
}

/// External collaborator supplying a page from the live database's shared
/// buffers, for PTRACK versions in `[15, 20)`.
pub trait BlockSource {
    /// `Ok(None)` means the block was truncated on the live side.
    fn get_block(&mut self, db_oid: u32, tablespace_oid: u32, rel_oid: u32, blkno: u32) -> Result<Option<Vec<u8>>>;
}

pub struct PreparePageArgs<'a> {
    pub rel_path: &'a str,
    pub blknum: u32,
    pub mode: BackupMode,
    pub prev_backup_start_lsn: u64,
    pub exists_in_prev: bool,
    pub ptrack_version: u32,
    pub strict: bool,
    pub checksum_enabled: bool,
    pub absolute_blkno: u64,
    pub db_oid: u32,
    pub tablespace_oid: u32,
    pub rel_oid: u32,
}

/// Read and validate one block, retrying on transient corruption.
///
/// `source` must support positional reads; `block_source` is only consulted
/// for PTRACK versions in `[15, 20)`. Returns the page bytes only when
/// `ReadCode::PageIsOk` and the page was not a zero/truncated page handled
/// without a buffer — callers should treat `None` alongside `PageIsOk` as
/// "nothing to write" only for the zero-length-read case, which cannot
/// reach here (that path returns `PageIsTruncated`).
pub fn prepare_page<R: Read + Seek>(
    source: &mut R,
    cancel: &CancellationToken,
    block_source: Option<&mut dyn BlockSource>,
    args: PreparePageArgs<'_>,
    diag: DiagnosticSink<'_>,
) -> Result<(ReadCode, u64, Option<Vec<u8>>)> {
    cancel.checkpoint()?;

    let mut page_lsn = 0u64;
    let mut page: Vec<u8> = Vec::new();
    let mut last_buf: Vec<u8> = Vec::new();
    let mut have_valid_read = false;

    if !(args.mode == BackupMode::Ptrack && args.ptrack_version < 20) {
        let mut attempt = 0;
        loop {
            cancel.checkpoint()?;
            attempt += 1;

            let mut buf = vec![0u8; BLCKSZ as usize];
            let offset = args.blknum as u64 * BLCKSZ as u64;
            let read = positional_read(source, offset, &mut buf).map_err(|e| BackupError::io(args.rel_path, e))?;

            if read == 0 {
                return Ok((ReadCode::PageIsTruncated, 0, None));
            }

            if read < BLCKSZ as usize {
                diag(Diagnostic::warning(format!(
                    "{}: partial read of block {} ({} of {} bytes), retrying",
                    args.rel_path, args.blknum, read, BLCKSZ
                )));
            } else {
                last_buf = buf.clone();
                let (code, lsn) = validate_one_page(Some(&buf), args.absolute_blkno, 0, args.checksum_enabled);
                match code {
                    ValidationCode::Zeroed => {
                        return Ok((ReadCode::PageIsOk, 0, Some(buf)));
                    }
                    ValidationCode::Valid => {
                        page_lsn = lsn;
                        page = buf;
                        have_valid_read = true;
                        if !args.strict {
                            return Ok((ReadCode::PageIsOk, page_lsn, Some(page)));
                        }
                        if args.mode != BackupMode::Delta {
                            return Ok((ReadCode::PageIsOk, page_lsn, Some(page)));
                        }
                        break;
                    }
                    ValidationCode::HeaderInvalid(_) | ValidationCode::ChecksumMismatch { .. } => {
                        if !args.strict && attempt >= PAGE_READ_ATTEMPTS {
                            // checkdb-style callers still want the corrupted
                            // classification surfaced even though they don't
                            // fail the whole pass.
                            break;
                        }
                        // torn-page hypothesis: retry.
                    }
                    ValidationCode::NotFound | ValidationCode::LsnFromFuture { .. } => {
                        // prepare_page never passes stop_lsn, so this cannot
                        // occur; treated as a retry for safety.
                    }
                }
            }

            if attempt >= PAGE_READ_ATTEMPTS {
                break;
            }
        }

        if !have_valid_read {
            let (code, _) = validate_one_page(Some(&last_buf), args.absolute_blkno, 0, args.checksum_enabled);
            let reason = describe_failure(code);
            let message = format!("{}: corrupted block {}: {}", args.rel_path, args.blknum, reason);
            diag(Diagnostic {
                severity: if args.strict { Severity::Error } else { Severity::Warning },
                message,
            });
            return Ok((ReadCode::PageIsCorrupted, 0, None));
        }
    } else if let Some(source) = block_source {
        let fetched = source.get_block(args.db_oid, args.tablespace_oid, args.rel_oid, args.blknum)?;
        let buf = match fetched {
            None => return Ok((ReadCode::PageIsTruncated, 0, None)),
            Some(b) if b.len() != BLCKSZ as usize => {
                return Err(BackupError::corruption(
                    args.rel_path,
                    args.blknum,
                    format!("shared-buffer fetch returned {} bytes, expected {}", b.len(), BLCKSZ),
                ));
            }
            Some(b) => b,
        };

        let (code, lsn) = validate_one_page(Some(&buf), args.absolute_blkno, 0, args.checksum_enabled);
        match code {
            ValidationCode::Zeroed => {
                return Ok((ReadCode::PageIsOk, 0, Some(buf)));
            }
            ValidationCode::HeaderInvalid(reason) => {
                return Err(BackupError::corruption(
                    args.rel_path,
                    args.blknum,
                    format!("shared-buffer page failed header validity: {}", reason),
                ));
            }
            ValidationCode::ChecksumMismatch { .. } => {
                page_lsn = lsn;
                page = buf;
                if args.checksum_enabled {
                    recompute_checksum_in_place(&mut page, args.absolute_blkno);
                }
            }
            ValidationCode::Valid => {
                page_lsn = lsn;
                page = buf;
            }
            ValidationCode::NotFound | ValidationCode::LsnFromFuture { .. } => unreachable!(),
        }
    } else {
        return Err(BackupError::Argument(
            "PTRACK shared-buffer fallback requested with no block source".to_string(),
        ));
    }

    if args.mode == BackupMode::Delta && args.exists_in_prev && page_lsn != 0 && page_lsn < args.prev_backup_start_lsn
    {
        return Ok((ReadCode::SkipCurrentPage, page_lsn, None));
    }

    Ok((ReadCode::PageIsOk, page_lsn, Some(page)))
}

fn recompute_checksum_in_place(page: &mut [u8], absolute_blkno: u64) {
    use crate::backup::page_checksum::calculate_page_checksum;
    use crate::backup::page_header::PageHeader;

    if let Some(mut hdr) = PageHeader::parse(page) {
        hdr.checksum = calculate_page_checksum(page, absolute_blkno);
        hdr.write_into(page);
    }
}

fn describe_failure(code: ValidationCode) -> String {
    match code {
        ValidationCode::HeaderInvalid(reason) => reason.to_string(),
        ValidationCode::ChecksumMismatch { stored, calculated } => {
            format!("checksum mismatch: stored 0x{:04x}, calculated 0x{:04x}", stored, calculated)
        }
        other => format!("{:?}", other),
    }
}

fn positional_read<R: Read + Seek>(source: &mut R, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    source.seek(SeekFrom::Start(offset))?;
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
