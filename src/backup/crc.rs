//! Whole-file rolling CRC.
//!
//! Two families of backup have been produced by different versions of the
//! program that wrote this format: early and current versions use CRC32C,
//! one stretch of versions in between used the traditional (non-Castagnoli)
//! CRC32 polynomial. Both fold over the exact bytes written to a backup
//! file, so this wraps both behind one `Crc` accumulator rather than making
//! every caller branch on version.

use crc::{Crc, CRC_32_ISO_HDLC};

/// A parsed "backup version" triple, used only to pick a CRC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackupVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BackupVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        BackupVersion { major, minor, patch }
    }
}

const V2_0_21: BackupVersion = BackupVersion::new(2, 0, 21);
const V2_0_25: BackupVersion = BackupVersion::new(2, 0, 25);

/// Versions in `(2.0.21, 2.0.25)` wrote legacy CRC32; everything else,
/// including versions at or before 2.0.21 and at or after 2.0.25, uses
/// CRC32C.
fn uses_legacy_crc32(version: BackupVersion) -> bool {
    version > V2_0_21 && version < V2_0_25
}

static LEGACY: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A running whole-file checksum, fed one write at a time as a backup file
/// is produced, or replayed during validation (C8).
pub enum FileCrc {
    Crc32C(u32),
    Crc32(crc::Digest<'static, u32>),
}

impl FileCrc {
    pub fn new(version: BackupVersion) -> Self {
        if uses_legacy_crc32(version) {
            FileCrc::Crc32(LEGACY.digest())
        } else {
            FileCrc::Crc32C(0)
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            FileCrc::Crc32C(acc) => *acc = crc32c::crc32c_append(*acc, bytes),
            FileCrc::Crc32(digest) => digest.update(bytes),
        }
    }

    pub fn finalize(self) -> u32 {
        match self {
            FileCrc::Crc32C(acc) => acc,
            FileCrc::Crc32(digest) => digest.finalize(),
        }
    }
}
