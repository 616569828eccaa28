//! The 16-bit page header checksum.
//!
//! Folds the page bytes pairwise through a small mixing function seeded
//! with the page's absolute block number, so the checksum is a function of
//! both contents and physical location: moving a page to a different block
//! number (even with identical bytes) changes the expected checksum.

use byteorder::{BigEndian, ByteOrder};

const FOLD_MASK1: u32 = 0x9E37_79B1;
const FOLD_MASK2: u32 = 0x8554_95A3;

#[inline]
fn fold_pair(acc: u32, word: u32) -> u32 {
    let step = acc ^ word ^ FOLD_MASK2;
    let step = step.rotate_left(5).wrapping_add(word);
    step ^ FOLD_MASK1
}

/// Calculate the 16-bit page checksum over `page`, seeded with
/// `absolute_blkno`. The header's own `checksum` field (bytes 8-9) is
/// excluded from the fold so validation is order-independent of when the
/// checksum is written.
pub fn calculate_page_checksum(page: &[u8], absolute_blkno: u64) -> u16 {
    let mut acc = fold_pair(0, (absolute_blkno & 0xFFFF_FFFF) as u32);
    acc = fold_pair(acc, (absolute_blkno >> 32) as u32);

    let mut i = 0usize;
    while i + 4 <= page.len() {
        if i == 8 {
            // skip the 2-byte checksum field plus the 2-byte flags field
            // that follows it, to keep the fold aligned on 4-byte words.
            i += 4;
            continue;
        }
        let word = BigEndian::read_u32(&page[i..i + 4]);
        acc = fold_pair(acc, word);
        i += 4;
    }
    // Any trailing bytes that don't fill a full word still contribute.
    if i < page.len() {
        let mut tail = [0u8; 4];
        tail[..page.len() - i].copy_from_slice(&page[i..]);
        acc = fold_pair(acc, u32::from_be_bytes(tail));
    }

    ((acc >> 16) ^ (acc & 0xFFFF)) as u16
}
