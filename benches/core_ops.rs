//! Criterion benchmarks for `pbcore`'s hot paths.
//!
//! Benchmarks cover:
//! - Page header validity predicate + checksum calculation (C2)
//! - Frame round trip: compress, write the frame, decompress (C5, C1)
//! - Whole-file CRC accumulation over many frames (C5/C8)
//! - Pagemap iteration over a sparse bitmap (C4)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pbcore::backup::codec::{compress, decompress, CompressAlg};
use pbcore::backup::constants::{BLCKSZ, HEADER_SIZE};
use pbcore::backup::crc::{BackupVersion, FileCrc};
use pbcore::backup::frame::write_frame;
use pbcore::backup::pagemap::Pagemap;
use pbcore::backup::page_checksum::calculate_page_checksum;
use pbcore::backup::page_header::PageHeader;
use pbcore::backup::validator::validate_one_page;

fn build_valid_page(lsn: u64, absolute_blkno: u64) -> Vec<u8> {
    let mut page = vec![0u8; BLCKSZ as usize];
    let mut hdr = PageHeader {
        lsn,
        checksum: 0,
        flags: 0,
        lower: HEADER_SIZE as u16,
        upper: BLCKSZ as u16,
        special: BLCKSZ as u16,
        page_size_and_version: PageHeader::pack_pagesize_version(BLCKSZ),
    };
    hdr.write_into(&mut page);
    hdr.checksum = calculate_page_checksum(&page, absolute_blkno);
    hdr.write_into(&mut page);
    page
}

fn bench_page_checksum(c: &mut Criterion) {
    let page = build_valid_page(1000, 42);
    let mut group = c.benchmark_group("page_checksum");
    group.throughput(Throughput::Bytes(BLCKSZ as u64));
    group.bench_function("calculate_page_checksum", |b| {
        b.iter(|| calculate_page_checksum(black_box(&page), black_box(42)))
    });
    group.finish();
}

fn bench_validate_one_page(c: &mut Criterion) {
    let page = build_valid_page(1000, 42);
    let mut group = c.benchmark_group("validate_one_page");
    group.throughput(Throughput::Bytes(BLCKSZ as u64));
    group.bench_function("valid_page", |b| {
        b.iter(|| validate_one_page(Some(black_box(&page)), 42, 0, true))
    });
    group.finish();
}

fn bench_codec_roundtrip(c: &mut Criterion) {
    let mut repetitive = vec![0u8; BLCKSZ as usize];
    for (i, byte) in repetitive.iter_mut().enumerate() {
        *byte = ((i / 64) % 5) as u8;
    }

    let mut group = c.benchmark_group("codec_roundtrip");
    group.throughput(Throughput::Bytes(BLCKSZ as u64));
    for alg in [CompressAlg::Zlib, CompressAlg::Pglz] {
        group.bench_with_input(BenchmarkId::new("compress", format!("{:?}", alg)), &alg, |b, &alg| {
            let mut dst = vec![0u8; 2 * BLCKSZ as usize];
            b.iter(|| compress(&mut dst, black_box(&repetitive), alg, 6))
        });

        let mut dst = vec![0u8; 2 * BLCKSZ as usize];
        let n = compress(&mut dst, &repetitive, alg, 6).unwrap();
        let compressed = dst[..n].to_vec();
        group.bench_with_input(BenchmarkId::new("decompress", format!("{:?}", alg)), &alg, |b, &alg| {
            let mut out = vec![0u8; BLCKSZ as usize];
            b.iter(|| decompress(&mut out, black_box(&compressed), alg))
        });
    }
    group.finish();
}

fn bench_write_frame(c: &mut Criterion) {
    let page = build_valid_page(1000, 1);
    let mut group = c.benchmark_group("write_frame");
    group.throughput(Throughput::Bytes(BLCKSZ as u64));
    group.bench_function("zlib", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(BLCKSZ as usize);
            let mut crc = FileCrc::new(BackupVersion::new(2, 4, 0));
            let mut ws = 0u64;
            let mut us = 0u64;
            write_frame(&mut out, &mut crc, 0, black_box(&page), CompressAlg::Zlib, 6, &mut ws, &mut us).unwrap();
        })
    });
    group.finish();
}

fn bench_whole_file_crc(c: &mut Criterion) {
    let pages: Vec<Vec<u8>> = (0..256).map(|i| build_valid_page(i as u64, i as u64)).collect();
    let mut group = c.benchmark_group("whole_file_crc");
    group.throughput(Throughput::Bytes(256 * BLCKSZ as u64));
    group.bench_function("256_pages_crc32c", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(256 * BLCKSZ as usize);
            let mut crc = FileCrc::new(BackupVersion::new(2, 4, 0));
            let mut ws = 0u64;
            let mut us = 0u64;
            for (i, page) in pages.iter().enumerate() {
                write_frame(&mut out, &mut crc, i as u32, black_box(page), CompressAlg::None, 0, &mut ws, &mut us).unwrap_or(0);
            }
        })
    });
    group.finish();
}

fn bench_pagemap_iter(c: &mut Criterion) {
    let map = Pagemap::from_blocks((0..200_000u32).step_by(37));
    let mut group = c.benchmark_group("pagemap_iter");
    group.bench_function("sparse_bitmap_walk", |b| {
        b.iter(|| {
            let count = map.iter().count();
            black_box(count)
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_page_checksum,
    bench_validate_one_page,
    bench_codec_roundtrip,
    bench_write_frame,
    bench_whole_file_crc,
    bench_pagemap_iter,
);
criterion_main!(benches);
