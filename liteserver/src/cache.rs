//! Response cache (§4.9 "Cache"): bounded LRU keyed by a hash of the
//! canonically-encoded *parsed* request, never the raw wire bytes, so that
//! two requests differing only in incidental framing still share an entry.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use archive_primitives::CryptoHash;

use crate::types::{LiteQuery, LiteResponse};

fn request_key(query: &LiteQuery) -> CryptoHash {
    let encoded = borsh::to_vec(query).expect("LiteQuery encoding never fails");
    CryptoHash::hash_bytes(&encoded)
}

pub struct ResponseCache {
    entries: Mutex<LruCache<CryptoHash, Arc<LiteResponse>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        ResponseCache { entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn get(&self, query: &LiteQuery) -> Option<Arc<LiteResponse>> {
        if !query.is_cacheable() {
            return None;
        }
        self.entries.lock().get(&request_key(query)).cloned()
    }

    pub fn put(&self, query: &LiteQuery, response: Arc<LiteResponse>) {
        if !query.is_cacheable() {
            return;
        }
        self.entries.lock().put(request_key(query), response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_primitives::{BlockId, MASTERCHAIN_ID, ShardPrefix};

    fn id(seqno: u32) -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno,
            root_hash: CryptoHash::ZERO,
            file_hash: CryptoHash::ZERO,
        }
    }

    #[test]
    fn identical_parsed_requests_share_a_cache_slot() {
        let cache = ResponseCache::new(4);
        let q = LiteQuery::GetBlock { id: id(5) };
        assert!(cache.get(&q).is_none());
        cache.put(&q, Arc::new(LiteResponse::SendMessage { status: 0 }));
        assert!(cache.get(&LiteQuery::GetBlock { id: id(5) }).is_some());
        assert!(cache.get(&LiteQuery::GetBlock { id: id(6) }).is_none());
    }

    #[test]
    fn send_message_is_never_cached() {
        let cache = ResponseCache::new(4);
        let q = LiteQuery::SendMessage { data: vec![1, 2, 3] };
        cache.put(&q, Arc::new(LiteResponse::SendMessage { status: 0 }));
        assert!(cache.get(&q).is_none());
    }
}
