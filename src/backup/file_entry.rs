//! `FileEntry`: the per-segment bookkeeping record threaded through backup
//! and restore. Owned by the catalogue; the drivers (C6/C7/C8) borrow
//! it mutably for the duration of one pass.

use crate::backup::codec::CompressAlg;
use crate::backup::constants::{BYTES_INVALID, FILE_NOT_FOUND};
use crate::backup::pagemap::Pagemap;

/// Identifies the relation a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelIdentity {
    pub tablespace_oid: u32,
    pub db_oid: u32,
    pub rel_oid: u32,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub rel_path: String,
    pub segno: u32,
    pub rel: RelIdentity,
    pub size: u64,
    pub pagemap: Pagemap,
    pub exists_in_prev: bool,
    pub n_blocks: u32,
    pub read_size: i64,
    pub write_size: i64,
    pub uncompressed_size: u64,
    pub crc: u32,
    pub compress_alg: CompressAlg,
}

impl FileEntry {
    pub fn new(rel_path: impl Into<String>, segno: u32, rel: RelIdentity, size: u64) -> Self {
        FileEntry {
            rel_path: rel_path.into(),
            segno,
            rel,
            size,
            pagemap: Pagemap::absent(),
            exists_in_prev: false,
            n_blocks: 0,
            read_size: 0,
            write_size: 0,
            uncompressed_size: 0,
            crc: 0,
            compress_alg: CompressAlg::None,
        }
    }

    /// Absolute block number for `blkno` within this segment.
    pub fn absolute_blkno(&self, blkno: u32) -> u64 {
        self.segno as u64 * crate::backup::constants::RELSEG_SIZE as u64 + blkno as u64
    }

    pub fn mark_unchanged(&mut self) {
        self.write_size = BYTES_INVALID;
    }

    pub fn mark_missing(&mut self) {
        self.write_size = FILE_NOT_FOUND;
    }

    pub fn was_unchanged(&self) -> bool {
        self.write_size == BYTES_INVALID
    }

    pub fn was_missing(&self) -> bool {
        self.write_size == FILE_NOT_FOUND
    }
}

/// A backup's filelist: entries looked up by relative path via binary search
///. Kept sorted by `rel_path` by construction.
#[derive(Debug, Default)]
pub struct Filelist {
    entries: Vec<FileEntry>,
}

impl Filelist {
    pub fn new() -> Self {
        Filelist { entries: Vec::new() }
    }

    /// Insert `entry`, keeping entries sorted by `rel_path`.
    pub fn insert(&mut self, entry: FileEntry) {
        let pos = self
            .entries
            .binary_search_by(|e| e.rel_path.as_str().cmp(entry.rel_path.as_str()))
            .unwrap_or_else(|p| p);
        self.entries.insert(pos, entry);
    }

    pub fn find(&self, rel_path: &str) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.rel_path.as_str().cmp(rel_path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn find_mut(&mut self, rel_path: &str) -> Option<&mut FileEntry> {
        match self.entries.binary_search_by(|e| e.rel_path.as_str().cmp(rel_path)) {
            Ok(i) => Some(&mut self.entries[i]),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }
}
