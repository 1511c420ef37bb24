use borsh::{BorshDeserialize, BorshSerialize};

/// Identifies one archive catalog entry (§3 "Archive catalog"): `id` is a
/// masterchain seqno anchor for `perm`/`key` slices, or an hour-bucket
/// start unix time for `temp` slices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, BorshSerialize, BorshDeserialize)]
pub struct PackageId {
    pub id: u32,
    pub key_block: bool,
    pub temp: bool,
}

impl PackageId {
    pub fn perm(id: u32) -> Self {
        PackageId { id, key_block: false, temp: false }
    }

    pub fn key(id: u32) -> Self {
        PackageId { id, key_block: true, temp: false }
    }

    pub fn temp(id: u32) -> Self {
        PackageId { id, key_block: false, temp: true }
    }
}

/// One catalog row: the slice id plus the "deleted" flag that `run_gc`
/// stamps before asynchronously destroying the slice (§4.5 "delete_package
/// -> deleted_package: mark-deleted in KV ... reads that race see the
/// 'deleted' flag and fail fast").
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct CatalogRow {
    pub id: u32,
    pub deleted: bool,
}

/// The three ordered catalog maps (§3 "Archive catalog"), persisted as one
/// tagged value (`db.files.index.key` in §6).
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct Catalog {
    pub perm: Vec<CatalogRow>,
    pub key: Vec<CatalogRow>,
    pub temp: Vec<CatalogRow>,
}

impl Catalog {
    pub fn live_perm(&self) -> impl Iterator<Item = u32> + '_ {
        self.perm.iter().filter(|r| !r.deleted).map(|r| r.id)
    }

    pub fn live_temp(&self) -> impl Iterator<Item = u32> + '_ {
        self.temp.iter().filter(|r| !r.deleted).map(|r| r.id)
    }
}

pub(crate) const CATALOG_KEY: &[u8] = b"db.files.index.key";
