//! Simplified in-engine shard/masterchain state cell layout, the state-side
//! counterpart to [`crate::block`]. A state root's dictionaries (shard
//! hashes, config, old-masterchain-block list, per-validator stats,
//! out-message queues) do not all fit in one cell's four refs, so the
//! masterchain-only portion nests one level deeper (§4.8 "shard-info-in-state
//! proof", "ancestor-block proof", "ExtraCurrency/out-msg-queue" queries).

/// Index into a state root cell's `refs`. Every state (masterchain or
/// shard) carries `Accounts`; only a masterchain state carries `McExtra`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum StateRootRef {
    Accounts = 0,
    McExtra = 1,
}

/// Index into the nested masterchain-only extra cell's `refs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum McExtraRef {
    ShardHashes = 0,
    Config = 1,
    OldBlocksAndStats = 2,
    Libraries = 3,
}

/// Index into the nested `OldBlocksAndStats` cell's `refs`, one level
/// deeper still: `old_mc_blocks_info` (ancestor-block proofs),
/// per-validator creator stats, validator-set performance stats, and the
/// block's out-message-queue/dispatch-queue info all live here so the
/// masterchain extra cell itself stays within four refs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum OldBlocksAndStatsRef {
    OldMcBlocks = 0,
    ValidatorStats = 1,
    CreatorStats = 2,
    OutMsgQueueInfo = 3,
}
