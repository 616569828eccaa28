//! The codec registry (C1): opaque compress/decompress pairs keyed by an
//! algorithm tag.
//!
//! The registry never allocates the output buffer — callers provide `dst`
//! of at least `2 * BLCKSZ` bytes, since a compressed page can in principle
//! exceed `BLCKSZ` before the framed writer (C5) falls back to storing it
//! raw. `NONE` and `NOT_DEFINED` always fail compression; decompression
//! additionally surfaces a fixed error string for both.

use std::io::{Read, Write};

use flate2::write::ZlibEncoder;
use flate2::{read::ZlibDecoder, Compression};

use crate::backup::pglz;

/// Compression algorithm tag. This is the on-disk contract (stored per
/// `FileEntry`); dispatch to an implementation is an internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressAlg {
    None,
    NotDefined,
    Zlib,
    Pglz,
}

/// A codec failure, carrying the codec-owned static error string: codec
/// errors are surfaced as this string appended to the block context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecError(pub &'static str);

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CodecError {}

/// Compress `src` into `dst`, returning the number of bytes written.
///
/// `level` is the codec-specific compression level (ignored by codecs that
/// don't have one, such as `Pglz`).
pub fn compress(dst: &mut [u8], src: &[u8], alg: CompressAlg, level: u32) -> Result<usize, CodecError> {
    match alg {
        CompressAlg::None | CompressAlg::NotDefined => {
            Err(CodecError("compression is disabled for this algorithm"))
        }
        CompressAlg::Zlib => zlib_compress(dst, src, level),
        CompressAlg::Pglz => pglz::compress(dst, src),
    }
}

/// Decompress `src` into `dst`, returning the number of bytes written.
pub fn decompress(dst: &mut [u8], src: &[u8], alg: CompressAlg) -> Result<usize, CodecError> {
    match alg {
        CompressAlg::None | CompressAlg::NotDefined => Err(CodecError("Invalid compression algorithm")),
        CompressAlg::Zlib => zlib_decompress(dst, src),
        CompressAlg::Pglz => pglz::decompress(dst, src),
    }
}

fn zlib_compress(dst: &mut [u8], src: &[u8], level: u32) -> Result<usize, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(src.len()), Compression::new(level));
    encoder
        .write_all(src)
        .map_err(|_| CodecError("zlib compression failed"))?;
    let out = encoder
        .finish()
        .map_err(|_| CodecError("zlib compression failed"))?;
    if out.len() > dst.len() {
        return Err(CodecError("zlib output exceeds destination buffer"));
    }
    dst[..out.len()].copy_from_slice(&out);
    Ok(out.len())
}

fn zlib_decompress(dst: &mut [u8], src: &[u8]) -> Result<usize, CodecError> {
    let mut decoder = ZlibDecoder::new(src);
    let mut out = Vec::with_capacity(dst.len());
    decoder
        .read_to_end(&mut out)
        .map_err(|_| CodecError("zlib decompression failed"))?;
    if out.len() > dst.len() {
        return Err(CodecError("zlib output exceeds destination buffer"));
    }
    dst[..out.len()].copy_from_slice(&out);
    Ok(out.len())
}
