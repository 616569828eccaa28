//! `pbcore`: the page-level backup/restore engine for a block-oriented
//! relational database.
//!
//! This crate is the core data-file pipeline described by a backup tool's
//! architecture: per-page read-validate-retry, the three incremental
//! selection modes (FULL / PAGE / DELTA / PTRACK), per-page compression
//! framing, and multi-backup restore by replaying framed streams into a
//! sparse rebuilt file. It is a library, not a CLI — the backup catalogue,
//! WAL parsing, process-wide configuration, and the remote-agent transport
//! are external collaborators, referenced only through the
//! [`backup::remote::RemoteAgent`] and [`backup::reader::BlockSource`]
//! traits a caller implements.
//!
//! # Component overview
//!
//! | Component | Module(s) | Responsibility |
//! |---|---|---|
//! | C1 Codec registry | [`backup::codec`], [`backup::pglz`] | opaque compress/decompress pairs |
//! | C2 Page validator | [`backup::page_header`], [`backup::page_checksum`], [`backup::validator`] | classify a raw block |
//! | C3 Page reader | [`backup::reader`] | retry-until-stable block read |
//! | C4 Pagemap iterator | [`backup::pagemap`] | changed-block bitmap walk |
//! | C5 Framed writer | [`backup::frame`], [`backup::crc`] | per-page framing + rolling CRC |
//! | C6 File backup driver | [`backup::file_entry`], [`backup::driver`], [`backup::remote`] | orchestrate one file's backup |
//! | C7 File restore driver | [`backup::restore`] | replay a backup chain into a target file |
//! | C8 Validator driver | [`backup::check`] | revalidate a live file or a backup file |
//!
//! # Quick example
//!
//! ```no_run
//! use pbcore::backup::cancel::CancellationToken;
//! use pbcore::backup::codec::CompressAlg;
//! use pbcore::backup::crc::BackupVersion;
//! use pbcore::backup::driver::{backup_one_file, BackupParams, Source};
//! use pbcore::backup::diagnostics::Diagnostic;
//! use pbcore::backup::file_entry::{FileEntry, RelIdentity};
//! use pbcore::backup::mode::BackupMode;
//! use std::path::Path;
//!
//! let mut file = FileEntry::new(
//!     "base/16384/16385",
//!     0,
//!     RelIdentity { tablespace_oid: 1663, db_oid: 16384, rel_oid: 16385 },
//!     0,
//! );
//! let params = BackupParams {
//!     mode: BackupMode::Full,
//!     prev_backup_start_lsn: 0,
//!     compress_alg: CompressAlg::Zlib,
//!     compress_level: 6,
//!     checksum_enabled: true,
//!     ptrack_version: 0,
//!     missing_ok: true,
//!     backup_version: BackupVersion::new(2, 4, 0),
//!     dest_permissions: 0o600,
//! };
//! let cancel = CancellationToken::new();
//! let mut diag = |d: Diagnostic| eprintln!("{:?}: {}", d.severity, d.message);
//!
//! backup_one_file(
//!     Source::Local(Path::new("/data/base/16384/16385")),
//!     Path::new("/backups/current/base/16384/16385"),
//!     &mut file,
//!     &params,
//!     &cancel,
//!     None,
//!     &mut diag,
//! ).ok();
//! ```

pub mod backup;

mod error;

pub use error::{BackupError, Result};
