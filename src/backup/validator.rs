//! The page validator (C2): classifies a raw block as zeroed,
//! header-invalid, checksum-mismatched, from-future, or valid.
//!
//! `validate_one_page` is side-effect-free — it performs no I/O and no
//! logging — because it is called in the tight retry loop of the page
//! reader (C3) and by the validator driver (C8).

use crate::backup::page_checksum::calculate_page_checksum;
use crate::backup::page_header::{is_all_zero, HeaderInvalidReason, PageHeader};

/// Outcome of validating one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    /// `page` was `None` — nothing to validate.
    NotFound,
    /// Every byte of the page is zero.
    Zeroed,
    /// The header predicate failed and the page is not all-zero.
    HeaderInvalid(HeaderInvalidReason),
    /// The header is structurally valid but the stored checksum does not
    /// match the recomputed one.
    ChecksumMismatch { stored: u16, calculated: u16 },
    /// The page's LSN is newer than `stop_lsn`.
    LsnFromFuture { page_lsn: u64, stop_lsn: u64 },
    /// The page passed every check.
    Valid,
}

impl ValidationCode {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationCode::Valid | ValidationCode::Zeroed)
    }
}

/// Validate one page. `absolute_blkno` feeds both the checksum fold
/// and error messages; `stop_lsn == 0` disables the from-future check.
///
/// Returns the classification and the page's LSN (0 if the page could not
/// be parsed at all).
pub fn validate_one_page(
    page: Option<&[u8]>,
    absolute_blkno: u64,
    stop_lsn: u64,
    checksum_enabled: bool,
) -> (ValidationCode, u64) {
    let page = match page {
        None => return (ValidationCode::NotFound, 0),
        Some(p) => p,
    };

    let header = match PageHeader::parse(page) {
        Some(h) => h,
        None => return (ValidationCode::NotFound, 0),
    };

    if let Some(reason) = header.validity_failure() {
        return if is_all_zero(page) {
            (ValidationCode::Zeroed, 0)
        } else {
            (ValidationCode::HeaderInvalid(reason), header.lsn)
        };
    }

    if checksum_enabled {
        let calculated = calculate_page_checksum(page, absolute_blkno);
        if header.checksum != calculated {
            return (
                ValidationCode::ChecksumMismatch {
                    stored: header.checksum,
                    calculated,
                },
                header.lsn,
            );
        }
    }

    if stop_lsn > 0 && header.lsn > stop_lsn {
        return (
            ValidationCode::LsnFromFuture {
                page_lsn: header.lsn,
                stop_lsn,
            },
            header.lsn,
        );
    }

    (ValidationCode::Valid, header.lsn)
}
