//! The remote-agent contract: the core treats the RPC transport as an
//! external collaborator and only calls the `send_pages` operation.
//! Everything about how bytes reach the remote peer (network, framing
//! beyond what's in `SendPagesRequest`) is out of scope.

use crate::backup::codec::CompressAlg;
use crate::backup::file_entry::FileEntry;
use crate::backup::pagemap::Pagemap;

#[derive(Debug, Clone)]
pub struct SendPagesRequest<'a> {
    pub src_path: &'a str,
    pub dst_path: &'a str,
    pub lsn_cutoff: u64,
    pub alg: CompressAlg,
    pub level: u32,
    pub checksum_version: u32,
    /// Owned, not borrowed from the `FileEntry` passed alongside this
    /// request to `RemoteAgent::send_pages` — that `FileEntry` is borrowed
    /// mutably in the same call, so the pagemap decision is snapshotted here
    /// instead of referencing `file.pagemap` directly.
    pub pagemap: Option<Pagemap>,
}

/// Failure reported by the remote agent: distinct from a local I/O
/// error because the driver needs the block number the agent was working
/// on when it failed.
#[derive(Debug, Clone)]
pub enum RemoteFailure {
    RemoteError { err_blknum: u32, message: Option<String> },
    PageCorruption { err_blknum: u32, message: Option<String> },
    WriteFailed { err_blknum: u32, message: Option<String> },
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFailure::RemoteError { err_blknum, message } => {
                write!(f, "remote agent error at block {}", err_blknum)?;
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
            RemoteFailure::PageCorruption { err_blknum, message } => {
                write!(f, "remote agent reported corruption at block {}", err_blknum)?;
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
            RemoteFailure::WriteFailed { err_blknum, message } => {
                write!(f, "remote agent write failed at block {}", err_blknum)?;
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RemoteFailure {}

pub type SendPagesOutcome = Result<u64, RemoteFailure>;

/// External collaborator for remote-source backups. The core never opens a
/// network connection itself; it hands the request to whatever implements
/// this trait and interprets the result.
pub trait RemoteAgent {
    fn send_pages(&mut self, req: SendPagesRequest<'_>, file: &mut FileEntry) -> SendPagesOutcome;
}
