use std::fmt;

/// Column families shared by the on-disk stores in this workspace.
///
/// Each physical RocksDB instance (cell store, one per archive slice, the
/// singletons store, the global catalog) only opens the subset of columns
/// it actually uses; declaring them all in one enum keeps key encoding and
/// column naming centralized, the way the teacher's `DBCol` does for a
/// single shared instance.
///
/// The name of a variant is the RocksDB column family name on disk: do not
/// rename a variant once shipped. Deprecate by prefixing with `_`.
#[derive(
    PartialEq,
    Eq,
    Copy,
    Clone,
    Debug,
    Hash,
    Ord,
    PartialOrd,
    enum_map::Enum,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum DBCol {
    /// Single row holding the on-disk format version, checked at open time.
    DbVersion,
    /// Cell bodies keyed by content hash, `{refcount, body, stored_as_boc}`
    /// (§4.2).
    Cells,
    /// The doubly-linked cell-root list, keyed by `block_id`, plus the
    /// sentinel entry under an empty key (§3 "Cell DB entry").
    CellRoots,
    /// Package `status`: the authoritative on-disk length of each package
    /// file, read back on recovery to truncate away any unindexed tail
    /// (§4.3 invariant).
    PackageStatus,
    /// Per-shard descriptor `{first_idx, last_idx, last_seqno, last_lt,
    /// last_ts}` inside one archive slice (§3 "Archive-slice").
    ShardDescriptor,
    /// Per-`(shard, idx)` entry `{block_id, lt, ts}` inside one archive
    /// slice.
    ShardEntry,
    /// Header listing every shard ever registered in a slice.
    ShardList,
    /// `file_hash -> package offset`, scoped to one archive slice.
    FileOffset,
    /// Serialized block-handle bytes, keyed by block id.
    HandleBytes,
    /// Per-sub-slice status (package length) and version, for sliced
    /// permanent archives.
    SubSliceStatus,
    /// The three ordered catalog maps (perm/key/temp) plus per-slice
    /// first-block maps (§3 "Archive catalog").
    Catalog,
    /// Singleton rows: init/gc/shard-client masterchain block ids,
    /// hardforks, async-serializer progress, destroyed validator sessions
    /// (§3 "Persistent state", §4.7).
    Singletons,
    /// Existence index over the static-file and persistent-state
    /// directories, keyed by content hash.
    FileIndex,
}

impl fmt::Display for DBCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = (*self).into();
        f.write_str(s)
    }
}

impl DBCol {
    /// All columns a fresh database of this kind should open. RocksDB
    /// requires every column family that will ever be touched to be
    /// declared up front.
    pub fn all() -> impl Iterator<Item = DBCol> {
        use strum::IntoEnumIterator;
        DBCol::iter()
    }
}
