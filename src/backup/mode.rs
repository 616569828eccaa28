//! The backup mode selector: which incremental-selection
//! strategy a file pass uses.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// Copy every non-truncated block.
    Full,
    /// Select pages via the pagemap bitmap (C4).
    Page,
    /// Select pages by LSN comparison against the previous backup.
    Delta,
    /// Pages supplied out-of-band from the live database's shared buffers.
    Ptrack,
}

impl BackupMode {
    pub fn is_incremental(self) -> bool {
        !matches!(self, BackupMode::Full)
    }
}
