/// Tunables for one cell store instance.
#[derive(Debug, Clone, Copy)]
pub struct CellStoreConfig {
    /// Subtrees deeper than this are eligible to be collapsed into a single
    /// bag-of-cells blob (`stored_as_boc = true`) instead of one KV row per
    /// cell. Unlike the original celldb.cpp, where this is a validator
    /// config value (`celldb_compress_depth`), the port exposes it here so
    /// callers can tune it per store instance.
    pub boc_depth_cutoff: u16,
    /// Number of migration candidates drained from the queue per background
    /// pass (§4.2 "Optional migration").
    pub migration_batch_size: usize,
}

impl Default for CellStoreConfig {
    fn default() -> Self {
        CellStoreConfig { boc_depth_cutoff: 8, migration_batch_size: 64 }
    }
}
