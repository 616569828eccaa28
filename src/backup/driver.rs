//! The file backup driver (C6): orchestrates C3/C4/C5 for one source file,
//! deciding the skip-unchanged shortcut and dispatching to a remote agent
//! when the source lives on a remote host.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::backup::cancel::CancellationToken;
use crate::backup::codec::CompressAlg;
use crate::backup::constants::{BLCKSZ, BYTES_INVALID, FILE_NOT_FOUND};
use crate::backup::crc::{BackupVersion, FileCrc};
use crate::backup::diagnostics::{Diagnostic, DiagnosticSink};
use crate::backup::file_entry::FileEntry;
use crate::backup::frame::write_frame;
use crate::backup::mode::BackupMode;
use crate::backup::pagemap::use_pagemap;
use crate::backup::reader::{prepare_page, BlockSource, PreparePageArgs, ReadCode};
use crate::backup::remote::{RemoteAgent, SendPagesRequest};
use crate::error::{BackupError, Result};

pub struct BackupParams {
    pub mode: BackupMode,
    pub prev_backup_start_lsn: u64,
    pub compress_alg: CompressAlg,
    pub compress_level: u32,
    pub checksum_enabled: bool,
    pub ptrack_version: u32,
    pub missing_ok: bool,
    pub backup_version: BackupVersion,
    pub dest_permissions: u32,
}

/// Source for a local file backup pass: a source of blocks where the driver
/// does its own retry-read loop (as opposed to delegating to a
/// [`RemoteAgent`]).
pub enum Source<'a> {
    Local(&'a Path),
    Remote(&'a mut dyn RemoteAgent, &'a str),
}

/// Back up one file into `dst_path`. Returns `Ok(())` whether or not a
/// destination file was produced (the skip-unchanged and missing-source
/// cases legitimately produce none).
pub fn backup_one_file(
    source: Source<'_>,
    dst_path: &Path,
    file: &mut FileEntry,
    params: &BackupParams,
    cancel: &CancellationToken,
    block_source: Option<&mut dyn BlockSource>,
    diag: DiagnosticSink<'_>,
) -> Result<()> {
    match source {
        Source::Local(src_path) => backup_local_file(src_path, dst_path, file, params, cancel, block_source, diag),
        Source::Remote(agent, src_path) => backup_remote_file(agent, src_path, dst_path, file, params),
    }
}

fn backup_local_file(
    src_path: &Path,
    dst_path: &Path,
    file: &mut FileEntry,
    params: &BackupParams,
    cancel: &CancellationToken,
    mut block_source: Option<&mut dyn BlockSource>,
    diag: DiagnosticSink<'_>,
) -> Result<()> {
    let metadata = match std::fs::metadata(src_path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && params.missing_ok => {
            file.mark_missing();
            return Ok(());
        }
        Err(e) => return Err(BackupError::io(src_path.to_string_lossy(), e)),
    };

    let size = metadata.len();
    if size % BLCKSZ as u64 != 0 {
        diag(Diagnostic::warning(format!(
            "{}: size {} is not a multiple of {}, processing whole blocks only",
            src_path.display(),
            size,
            BLCKSZ
        )));
    }
    let nblocks = (size / BLCKSZ as u64) as u32;
    file.n_blocks = nblocks;

    if matches!(params.mode, BackupMode::Page | BackupMode::Ptrack)
        && file.pagemap.is_empty()
        && file.exists_in_prev
        && !file.pagemap.is_absent()
    {
        file.mark_unchanged();
        return Ok(());
    }

    file.read_size = 0;
    file.write_size = 0;
    file.uncompressed_size = 0;
    file.compress_alg = params.compress_alg;
    let mut crc = FileCrc::new(params.backup_version);

    let mut src_file = match File::open(src_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && params.missing_ok => {
            file.mark_missing();
            return Ok(());
        }
        Err(e) => return Err(BackupError::io(src_path.to_string_lossy(), e)),
    };

    let dst_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dst_path)
        .map_err(|e| BackupError::io(dst_path.to_string_lossy(), e))?;
    #[cfg(unix)]
    dst_file
        .set_permissions(std::fs::Permissions::from_mode(params.dest_permissions))
        .map_err(|e| BackupError::io(dst_path.to_string_lossy(), e))?;
    let mut dst_writer = BufWriter::new(dst_file);

    let use_map = use_pagemap(&file.pagemap, file.exists_in_prev);
    let block_iter: Vec<u32> = if use_map {
        file.pagemap.iter().collect()
    } else {
        (0..nblocks).collect()
    };

    let mut skipped = 0u64;
    for blknum in block_iter {
        cancel.checkpoint()?;
        let absolute_blkno = file.absolute_blkno(blknum);
        let args = PreparePageArgs {
            rel_path: &file.rel_path,
            blknum,
            mode: params.mode,
            prev_backup_start_lsn: params.prev_backup_start_lsn,
            exists_in_prev: file.exists_in_prev,
            ptrack_version: params.ptrack_version,
            strict: true,
            checksum_enabled: params.checksum_enabled,
            absolute_blkno,
            db_oid: file.rel.db_oid,
            tablespace_oid: file.rel.tablespace_oid,
            rel_oid: file.rel.rel_oid,
        };

        let (code, _lsn, page) = prepare_page(&mut src_file, cancel, block_source.as_deref_mut(), args, &mut *diag)?;
        file.read_size += BLCKSZ as i64;

        match code {
            ReadCode::PageIsTruncated => break,
            ReadCode::SkipCurrentPage => {
                skipped += 1;
                continue;
            }
            ReadCode::PageIsOk => {
                let page = page.expect("PageIsOk always carries page bytes");
                let mut write_size = file.write_size as u64;
                let mut uncompressed_size = file.uncompressed_size;
                write_frame(
                    &mut dst_writer,
                    &mut crc,
                    blknum,
                    &page,
                    params.compress_alg,
                    params.compress_level,
                    &mut write_size,
                    &mut uncompressed_size,
                )
                .map_err(|e| BackupError::io(dst_path.to_string_lossy(), e))?;
                file.write_size = write_size as i64;
                file.uncompressed_size = uncompressed_size;
            }
            ReadCode::PageIsCorrupted => {
                return Err(BackupError::corruption(&file.rel_path, blknum, "page failed validation after retries"));
            }
        }
    }
    let _ = skipped;

    if params.mode == BackupMode::Full || params.mode == BackupMode::Delta {
        file.n_blocks = (file.read_size / BLCKSZ as i64) as u32;
    }

    dst_writer
        .flush()
        .map_err(|e| BackupError::io(dst_path.to_string_lossy(), e))?;
    file.crc = crc.finalize();

    if params.mode.is_incremental() && file.exists_in_prev && file.write_size == 0 && file.n_blocks > 0 {
        file.mark_unchanged();
    }

    if file.write_size <= 0 {
        let _ = std::fs::remove_file(dst_path);
    }

    Ok(())
}

fn backup_remote_file(
    agent: &mut dyn RemoteAgent,
    src_path: &str,
    dst_path: &Path,
    file: &mut FileEntry,
    params: &BackupParams,
) -> Result<()> {
    let pagemap = use_pagemap(&file.pagemap, file.exists_in_prev).then(|| file.pagemap.clone());
    let request = SendPagesRequest {
        src_path,
        dst_path: &dst_path.to_string_lossy(),
        lsn_cutoff: params.prev_backup_start_lsn,
        alg: params.compress_alg,
        level: params.compress_level,
        checksum_version: if params.checksum_enabled { 1 } else { 0 },
        pagemap,
    };

    let blocks_read = agent.send_pages(request, file)?;
    file.read_size = blocks_read as i64 * BLCKSZ as i64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::file_entry::RelIdentity;
    use crate::backup::page_checksum::calculate_page_checksum;
    use crate::backup::page_header::PageHeader;
    use crate::backup::pagemap::Pagemap;
    use byteorder::{ByteOrder, LittleEndian};
    use std::io::Read;

    fn rel() -> RelIdentity {
        RelIdentity {
            tablespace_oid: 1,
            db_oid: 2,
            rel_oid: 3,
        }
    }

    fn write_block(buf: &mut Vec<u8>, lsn: u64, absolute_blkno: u64) {
        let mut page = vec![0u8; BLCKSZ as usize];
        let mut hdr = PageHeader {
            lsn,
            checksum: 0,
            flags: 0,
            lower: crate::backup::constants::HEADER_SIZE as u16,
            upper: BLCKSZ as u16,
            special: BLCKSZ as u16,
            page_size_and_version: PageHeader::pack_pagesize_version(BLCKSZ),
        };
        hdr.write_into(&mut page);
        hdr.checksum = calculate_page_checksum(&page, absolute_blkno);
        hdr.write_into(&mut page);
        buf.extend_from_slice(&page);
    }

    fn read_frames(dst_path: &Path) -> Vec<(u32, i32)> {
        let mut data = Vec::new();
        File::open(dst_path).unwrap().read_to_end(&mut data).unwrap();
        let mut frames = Vec::new();
        let mut pos = 0;
        while pos + 8 <= data.len() {
            let block = LittleEndian::read_u32(&data[pos..pos + 4]);
            let compressed_size = LittleEndian::read_i32(&data[pos + 4..pos + 8]);
            frames.push((block, compressed_size));
            let payload_len = if compressed_size == crate::backup::constants::PAGE_IS_TRUNCATED {
                0
            } else {
                crate::backup::constants::maxalign(compressed_size.max(0) as usize)
            };
            pos += 8 + payload_len;
        }
        frames
    }

    fn default_params(mode: BackupMode) -> BackupParams {
        BackupParams {
            mode,
            prev_backup_start_lsn: 0,
            compress_alg: CompressAlg::Zlib,
            compress_level: 6,
            checksum_enabled: true,
            ptrack_version: 0,
            missing_ok: false,
            backup_version: BackupVersion::new(2, 4, 0),
            dest_permissions: 0o600,
        }
    }

    #[test]
    fn zero_page_full_backup_is_stored_raw() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src");
        std::fs::write(&src_path, vec![0u8; BLCKSZ as usize]).unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        let mut params = default_params(BackupMode::Full);
        params.compress_alg = CompressAlg::None;
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        backup_one_file(Source::Local(&src_path), &dst_path, &mut file, &params, &cancel, None, &mut noop).unwrap();

        assert_eq!(file.n_blocks, 1);
        let frames = read_frames(&dst_path);
        assert_eq!(frames, vec![(0, BLCKSZ as i32)]);
    }

    #[test]
    fn delta_mode_skips_page_below_prev_start_lsn() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src");
        let mut data = Vec::new();
        write_block(&mut data, 100, 0);
        write_block(&mut data, 50, 1);
        std::fs::write(&src_path, &data).unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        file.exists_in_prev = true;
        let mut params = default_params(BackupMode::Delta);
        params.prev_backup_start_lsn = 75;
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        backup_one_file(Source::Local(&src_path), &dst_path, &mut file, &params, &cancel, None, &mut noop).unwrap();

        assert_eq!(file.read_size, 2 * BLCKSZ as i64);
        let frames = read_frames(&dst_path);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, 0);
    }

    #[test]
    fn page_bitmap_mode_visits_only_mapped_blocks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src");
        let mut data = Vec::new();
        for b in 0..10u64 {
            write_block(&mut data, 10, b);
        }
        std::fs::write(&src_path, &data).unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        file.exists_in_prev = true;
        file.pagemap = Pagemap::from_blocks([7, 3]);
        let params = default_params(BackupMode::Page);
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        backup_one_file(Source::Local(&src_path), &dst_path, &mut file, &params, &cancel, None, &mut noop).unwrap();

        assert_eq!(file.read_size, 2 * BLCKSZ as i64);
        let frames = read_frames(&dst_path);
        let blocks: Vec<u32> = frames.iter().map(|(b, _)| *b).collect();
        assert_eq!(blocks, vec![3, 7]);
    }

    #[test]
    fn page_mode_with_empty_pagemap_and_existing_file_is_skip_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src");
        std::fs::write(&src_path, vec![0u8; BLCKSZ as usize]).unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        file.exists_in_prev = true;
        file.pagemap = Pagemap::empty();
        let params = default_params(BackupMode::Page);
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        backup_one_file(Source::Local(&src_path), &dst_path, &mut file, &params, &cancel, None, &mut noop).unwrap();

        assert!(file.was_unchanged());
        assert!(!dst_path.exists());
    }

    #[test]
    fn missing_source_with_missing_ok_is_benign() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("does-not-exist");
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        let mut params = default_params(BackupMode::Full);
        params.missing_ok = true;
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        backup_one_file(Source::Local(&src_path), &dst_path, &mut file, &params, &cancel, None, &mut noop).unwrap();
        assert!(file.was_missing());
    }

    /// A [`RemoteAgent`] stub recording the request it was handed, so tests
    /// can assert on what `backup_remote_file` built without a real peer.
    struct MockAgent {
        last_request_pagemap_blocks: Option<Vec<u32>>,
        blocks_to_report: u64,
    }

    impl RemoteAgent for MockAgent {
        fn send_pages(&mut self, req: crate::backup::remote::SendPagesRequest<'_>, _file: &mut FileEntry) -> crate::backup::remote::SendPagesOutcome {
            self.last_request_pagemap_blocks = req.pagemap.as_ref().map(|m| m.iter().collect());
            Ok(self.blocks_to_report)
        }
    }

    #[test]
    fn remote_backup_dispatches_to_agent_and_records_read_size() {
        let dir = tempfile::tempdir().unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        file.exists_in_prev = true;
        file.pagemap = Pagemap::from_blocks([3, 7]);
        let params = default_params(BackupMode::Page);
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        let mut agent = MockAgent {
            last_request_pagemap_blocks: None,
            blocks_to_report: 2,
        };

        backup_one_file(
            Source::Remote(&mut agent, "remote/base/1/1"),
            &dst_path,
            &mut file,
            &params,
            &cancel,
            None,
            &mut noop,
        )
        .unwrap();

        assert_eq!(file.read_size, 2 * BLCKSZ as i64);
        assert_eq!(agent.last_request_pagemap_blocks, Some(vec![3, 7]));
    }

    #[test]
    fn remote_backup_omits_pagemap_for_full_mode() {
        let dir = tempfile::tempdir().unwrap();
        let dst_path = dir.path().join("dst");

        let mut file = FileEntry::new("base/1/1", 0, rel(), 0);
        let params = default_params(BackupMode::Full);
        let cancel = CancellationToken::new();
        let mut noop = |_: Diagnostic| {};

        let mut agent = MockAgent {
            last_request_pagemap_blocks: None,
            blocks_to_report: 0,
        };

        backup_one_file(
            Source::Remote(&mut agent, "remote/base/1/1"),
            &dst_path,
            &mut file,
            &params,
            &cancel,
            None,
            &mut noop,
        )
        .unwrap();

        assert!(agent.last_request_pagemap_blocks.is_none());
    }
}
