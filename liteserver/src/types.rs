//! Request/response shapes for every query flow in §4.9. Requests derive
//! `BorshSerialize` so [`crate::cache`] can hash the canonical encoding of
//! the *parsed* request (never the raw wire bytes) per the resolved Open
//! Question on cache keying.

use borsh::BorshSerialize;

use archive_primitives::{BlockId, Cell, CryptoHash, ShardPrefix};
use archive_proof::{AccountStateHit, ChainLink, DictHit, HeaderProofMode, MerkleProof, ProofChain, TransactionHit};

/// Gates which optional subtrees a header proof reveals; mirrors
/// [`HeaderProofMode`] with `Borsh` support for cache keying.
#[derive(BorshSerialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderMode {
    pub prev_signatures: bool,
    pub value_flow: bool,
    pub state_update: bool,
    pub shard_hashes: bool,
}

impl From<HeaderMode> for HeaderProofMode {
    fn from(m: HeaderMode) -> Self {
        HeaderProofMode {
            prev_signatures: m.prev_signatures,
            value_flow: m.value_flow,
            state_update: m.state_update,
            shard_hashes: m.shard_hashes,
        }
    }
}

#[derive(BorshSerialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountId {
    pub workchain: i32,
    pub address: [u8; 32],
}

/// Which key a `lookup_block`/`get_block_by_*` query resolves on.
#[derive(BorshSerialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockLookupKey {
    Seqno(u32),
    Lt(u64),
    UnixTime(u32),
}

#[derive(BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub enum LiteQuery {
    GetMasterchainInfo,
    GetMasterchainInfoExt { mode: u32 },
    GetBlock { id: BlockId },
    GetBlockHeader { id: BlockId, mode: HeaderMode },
    GetBlockState { id: BlockId },
    GetAccountState { reference_block: BlockId, account: AccountId, prunned: bool },
    RunSmcMethod { reference_block: BlockId, account: AccountId, method_id: i32, params: Vec<u8> },
    GetTransactions { account: AccountId, lt: u64, hash: CryptoHash, count: u32 },
    ListBlockTransactions { id: BlockId, reverse: bool, count: u32, after: Option<(AccountId, u64)> },
    LookupBlock { workchain: i32, shard: ShardPrefix, key: BlockLookupKey, exact: bool, with_proof: bool },
    GetConfigParams { reference_block: BlockId, param_ids: Vec<i32>, from_prev_key_block: bool },
    GetShardInfo { reference_block: BlockId, shard: ShardPrefix, exact: bool },
    GetAllShardsInfo { reference_block: BlockId },
    GetBlockProof { from_seqno: u32, to_seqno: u32 },
    GetLibraries { reference_block: BlockId, hashes: Vec<CryptoHash>, with_proof: bool },
    GetShardBlockProof { id: BlockId },
    GetValidatorStats { reference_block: BlockId, limit: u32, start_after: Option<CryptoHash> },
    GetOutMsgQueueSizes { reference_block: BlockId },
    GetBlockOutMsgQueueSize { id: BlockId, shard: ShardPrefix, with_proof: bool },
    GetDispatchQueueInfo { id: BlockId, after: Option<[u8; 32]>, limit: u32 },
    GetDispatchQueueMessages { id: BlockId, account: [u8; 32], after_lt: u64, limit: u32, with_proof: bool },
    SendMessage { data: Vec<u8> },
}

impl LiteQuery {
    /// `send_message` is never response-cached (§4.9 "Errors are not
    /// cached" and, more fundamentally, not idempotent). `get_masterchain_info[_ext]`
    /// names no reference block at all — it always means "the current tip" —
    /// so caching it would freeze `last`/`now` at whatever they were on the
    /// first call. Everything else is keyed off an explicit reference block
    /// (or, for `get_block_proof`/`get_shard_block_proof`, explicit seqnos/
    /// ids) and is a stable cache candidate for the lifetime the cache
    /// imposes anyway.
    pub fn is_cacheable(&self) -> bool {
        !matches!(
            self,
            LiteQuery::SendMessage { .. }
                | LiteQuery::GetMasterchainInfo
                | LiteQuery::GetMasterchainInfoExt { .. }
        )
    }
}

#[derive(Clone, Debug)]
pub struct MasterchainInfo {
    pub last: BlockId,
    pub state_root_hash: CryptoHash,
    pub zerostate_id: BlockId,
    pub now: u32,
}

#[derive(Clone, Debug)]
pub struct BlockHeaderResponse {
    pub id: BlockId,
    pub proof: MerkleProof,
}

#[derive(Clone, Debug)]
pub struct AccountStateResponse {
    pub shard_proof: MerkleProof,
    pub state_proof: MerkleProof,
    pub account_cell: Option<Cell>,
    pub hit: Option<AccountStateHit>,
}

#[derive(Clone, Debug)]
pub struct RunSmcMethodResponse {
    pub exit_code: i32,
    pub stack: Vec<u8>,
    pub c7: Option<Vec<u8>>,
    pub shard_proof: MerkleProof,
    pub state_proof: MerkleProof,
}

#[derive(Clone, Debug)]
pub struct TransactionsResponse {
    pub transactions: Vec<Cell>,
    pub blocks: Vec<BlockId>,
}

#[derive(Clone, Debug)]
pub struct ListBlockTransactionsResponse {
    pub ids: Vec<(AccountId, u64, CryptoHash)>,
    pub incomplete: bool,
    pub proof: Option<MerkleProof>,
}

#[derive(Clone, Debug)]
pub struct LookupBlockResponse {
    pub id: BlockId,
    pub header_proof: Option<MerkleProof>,
    pub predecessor_proof: Option<MerkleProof>,
    pub shard_block_links: Option<Vec<ChainLink>>,
}

#[derive(Clone, Debug)]
pub struct ConfigParamsResponse {
    pub state_proof: MerkleProof,
    pub params: Vec<(i32, DictHit)>,
}

#[derive(Clone, Debug)]
pub struct ShardInfoResponse {
    pub proof: MerkleProof,
    pub hit: DictHit,
}

#[derive(Clone, Debug)]
pub struct AllShardsInfoResponse {
    pub proof: MerkleProof,
    pub entries: Vec<DictHit>,
}

#[derive(Clone, Debug)]
pub struct LibrariesResponse {
    pub proof: Option<MerkleProof>,
    pub libraries: Vec<DictHit>,
}

#[derive(Clone, Debug)]
pub struct ShardBlockProofResponse {
    pub mc_block_id: BlockId,
    pub links: Vec<ChainLink>,
    pub mc_membership_proof: Option<MerkleProof>,
}

#[derive(Clone, Debug)]
pub struct ValidatorStatsResponse {
    pub proof: MerkleProof,
    pub entries: Vec<DictHit>,
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct OutMsgQueueSizesResponse {
    pub proof: MerkleProof,
    pub entries: Vec<DictHit>,
}

#[derive(Clone, Debug)]
pub struct DispatchQueueResponse {
    pub proof: Option<MerkleProof>,
    pub entries: Vec<DictHit>,
    pub incomplete: bool,
}

#[derive(Clone, Debug)]
pub enum LiteResponse {
    MasterchainInfo(MasterchainInfo),
    Block(Vec<u8>),
    BlockHeader(BlockHeaderResponse),
    BlockState(Vec<u8>),
    AccountState(AccountStateResponse),
    RunSmcMethod(RunSmcMethodResponse),
    Transactions(TransactionsResponse),
    ListBlockTransactions(ListBlockTransactionsResponse),
    LookupBlock(LookupBlockResponse),
    ConfigParams(ConfigParamsResponse),
    ShardInfo(ShardInfoResponse),
    /// A single dict hit, same shape as [`ShardInfoResponse`]: `get_block_out_msg_queue_size`
    /// is a one-entry special case of the `out_msg_queue_sizes` dictionary walk.
    BlockOutMsgQueueSize(ShardInfoResponse),
    AllShardsInfo(AllShardsInfoResponse),
    BlockProof(ProofChain),
    Libraries(LibrariesResponse),
    ShardBlockProof(ShardBlockProofResponse),
    ValidatorStats(ValidatorStatsResponse),
    OutMsgQueueSizes(OutMsgQueueSizesResponse),
    DispatchQueue(DispatchQueueResponse),
    SendMessage { status: i32 },
}
