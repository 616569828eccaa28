//! Page and file structure constants for the backup/restore engine.
//!
//! These mirror the fixed layout that a block-oriented relational database
//! uses for every on-disk page, plus the framing constants this crate
//! defines for backup files (see `frame.rs`).

/// Page size in bytes. Compile-time fixed per deployment.
pub const BLCKSZ: u32 = 8192;

/// Blocks per segment file.
pub const RELSEG_SIZE: u32 = 131_072;

/// Number of retry attempts for a torn/partial page read before giving up.
pub const PAGE_READ_ATTEMPTS: u32 = 100;

/// Bitmask of page header flag bits that are considered defined. Any other
/// bit set in `PageHeader::flags` makes the header invalid.
pub const PD_VALID_FLAG_BITS: u16 = 0x0007;

/// Size of the on-disk page header in bytes (prefix of every `BLCKSZ` block).
pub const HEADER_SIZE: usize = 24;

/// `write_size` sentinel meaning "page set unchanged, nothing stored".
pub const BYTES_INVALID: i64 = -1;

/// `write_size` sentinel meaning "source file vanished during backup".
pub const FILE_NOT_FOUND: i64 = -2;

/// Frame `compressed_size` sentinel meaning "truncate target to `block * BLCKSZ`".
pub const PAGE_IS_TRUNCATED: i32 = -1;

/// Round `x` up to the next multiple of 8.
#[inline]
pub const fn maxalign(x: usize) -> usize {
    (x + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maxalign_rounds_up_to_eight() {
        assert_eq!(maxalign(0), 0);
        assert_eq!(maxalign(1), 8);
        assert_eq!(maxalign(8), 8);
        assert_eq!(maxalign(9), 16);
        assert_eq!(maxalign(8192), 8192);
        assert_eq!(maxalign(4097), 4104);
    }
}
