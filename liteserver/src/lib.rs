//! Lite-query dispatcher (§4.9): a stateful actor sitting on top of
//! [`archive_rootdb::RootDb`] that turns each [`LiteQuery`] into a
//! proof-bearing [`LiteResponse`], bounded by a deadline and backed by a
//! response cache keyed on the canonically-encoded parsed request.
//!
//! Three things this crate cannot do on its own are reached through
//! external-collaborator traits, same pattern as `archive-proof`'s
//! `ChainCollaborator`/`ValidatorSetSource`: [`ChainTip`] answers "what is
//! the current masterchain tip", [`vm::GetMethodVm`] actually executes a
//! GET method, and [`sink::MessageSink`] actually propagates a submitted
//! external message.

pub mod cache;
pub mod dictwalk;
pub mod errors;
pub mod metrics;
pub mod sink;
pub mod types;
pub mod vm;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;

use archive_cells::CellStore;
use archive_primitives::{
    AccountBlocksRef, BlockId, BlockRootRef, Cell, CryptoHash, ExtraRef, HasErrorKind, McExtraRef,
    OldBlocksAndStatsRef, ShardDescrFields, ShardPrefix, StateRootRef, MASTERCHAIN_ID,
};
use archive_proof::{
    account_state_proof, ancestor_block_proof, block_header_proof, build_proof_chain, merge_proofs,
    prune_account_state_subtree, shard_info_in_state_proof, shard_predecessor_link,
    state_root_hash_of_block, transaction_proof, previous_transaction, CellSource,
    ChainCollaborator, ChainLink, DictHit, DictPath, HeaderProofMode, MerkleProof, ProofResult,
    ValidatorSetSource,
};
use archive_rootdb::RootDb;

pub use cache::ResponseCache;
pub use errors::{wire_code, LiteServerError, LiteServerResult};
pub use sink::MessageSink;
pub use types::*;
pub use vm::{GetMethodVm, SmcContext, SmcResult};

/// Supplies the facts about "now" this crate cannot derive from the archive
/// alone: which masterchain block is the current tip, what the zerostate
/// id is, and wall-clock time. Implemented by the surrounding node (it is
/// the one running consensus and deciding what "latest" means).
pub trait ChainTip: Send + Sync {
    fn last_masterchain_block(&self) -> LiteServerResult<BlockId>;
    fn zerostate_id(&self) -> BlockId;
    fn now(&self) -> u32;
}

pub struct LiteServerConfig {
    pub default_deadline: Duration,
    pub response_cache_capacity: usize,
    pub recent_messages_capacity: usize,
    /// Bound on how many dict entries a single enumerate-the-whole-dictionary
    /// flow (`get_all_shards_info`, `get_out_msg_queue_sizes`) will walk
    /// before giving up and returning what it has; a truncated result is
    /// logged rather than silently returned as complete.
    pub max_enumerated_entries: usize,
}

impl Default for LiteServerConfig {
    fn default() -> Self {
        LiteServerConfig {
            default_deadline: Duration::from_secs(3),
            response_cache_capacity: 4096,
            recent_messages_capacity: 4096,
            max_enumerated_entries: 4096,
        }
    }
}

/// The §4.9 dispatcher. One instance serves every query the node's lite
/// server front-end receives; all the per-query state is the response
/// cache and the recent-messages dedup set, everything else is read
/// straight out of [`RootDb`] on each call.
pub struct LiteServer {
    rootdb: Arc<RootDb>,
    chain: Arc<dyn ChainTip>,
    chain_collaborator: Arc<dyn ChainCollaborator>,
    validators: Arc<dyn ValidatorSetSource>,
    vm: Arc<dyn GetMethodVm>,
    sink: Arc<dyn MessageSink>,
    cache: ResponseCache,
    recent_messages: Mutex<LruCache<CryptoHash, ()>>,
    default_deadline: Duration,
    max_enumerated_entries: usize,
}

impl LiteServer {
    pub fn new(
        rootdb: Arc<RootDb>,
        chain: Arc<dyn ChainTip>,
        chain_collaborator: Arc<dyn ChainCollaborator>,
        validators: Arc<dyn ValidatorSetSource>,
        vm: Arc<dyn GetMethodVm>,
        sink: Arc<dyn MessageSink>,
        config: LiteServerConfig,
    ) -> Self {
        let recent_cap = NonZeroUsize::new(config.recent_messages_capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LiteServer {
            rootdb,
            chain,
            chain_collaborator,
            validators,
            vm,
            sink,
            cache: ResponseCache::new(config.response_cache_capacity),
            recent_messages: Mutex::new(LruCache::new(recent_cap)),
            default_deadline: config.default_deadline,
            max_enumerated_entries: config.max_enumerated_entries,
        }
    }

    fn cells(&self) -> &CellStore {
        self.rootdb.cells()
    }

    /// Handles `query` under this server's default deadline.
    pub async fn handle(self: &Arc<Self>, query: LiteQuery) -> LiteServerResult<Arc<LiteResponse>> {
        self.handle_with_deadline(query, self.default_deadline).await
    }

    /// Handles `query`, bounded by `deadline` (§5 "every query carries an
    /// explicit deadline"). The actual dispatch runs on a blocking task
    /// since everything under [`RootDb`] is synchronous disk/KV work.
    pub async fn handle_with_deadline(
        self: &Arc<Self>,
        query: LiteQuery,
        deadline: Duration,
    ) -> LiteServerResult<Arc<LiteResponse>> {
        if let Some(cached) = self.cache.get(&query) {
            metrics::CACHE_HITS.inc();
            return Ok(cached);
        }
        let _timer = metrics::QUERY_DURATION.start_timer();
        let this = Arc::clone(self);
        let task_query = query.clone();
        let task = tokio::task::spawn_blocking(move || this.dispatch(&task_query));
        let result = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LiteServerError::HandlerLost),
            Err(_) => Err(LiteServerError::Timeout),
        };
        let result = match result {
            Ok(response) => {
                metrics::QUERIES_HANDLED.inc();
                response
            }
            Err(e) => {
                metrics::QUERIES_FAILED.with_label_values(&[&e.kind().to_string()]).inc();
                return Err(e);
            }
        };
        let response = Arc::new(result);
        self.cache.put(&query, Arc::clone(&response));
        Ok(response)
    }

    /// Validates and deduplicates an external message, then hands it to the
    /// [`MessageSink`] collaborator. Never cached (§4.9).
    pub fn send_message(&self, data: Vec<u8>) -> LiteServerResult<LiteResponse> {
        let hash = CryptoHash::hash_bytes(&data);
        {
            let mut recent = self.recent_messages.lock();
            if recent.put(hash, ()).is_some() {
                tracing::debug!(%hash, "send_message: duplicate of a recently submitted message");
                return Ok(LiteResponse::SendMessage { status: 0 });
            }
        }
        let status = self.sink.submit(&data).map_err(LiteServerError::VmFailure)?;
        Ok(LiteResponse::SendMessage { status })
    }

    fn dispatch(&self, query: &LiteQuery) -> LiteServerResult<LiteResponse> {
        let _span = tracing::debug_span!("lite_query").entered();
        match query.clone() {
            LiteQuery::SendMessage { data } => self.send_message(data),
            LiteQuery::GetMasterchainInfo => self.get_masterchain_info(),
            LiteQuery::GetMasterchainInfoExt { mode: _ } => self.get_masterchain_info(),
            LiteQuery::GetBlock { id } => self.get_block(id),
            LiteQuery::GetBlockHeader { id, mode } => self.get_block_header(id, mode),
            LiteQuery::GetBlockState { id } => self.get_block_state(id),
            LiteQuery::GetAccountState { reference_block, account, prunned } => {
                self.get_account_state(reference_block, account, prunned)
            }
            LiteQuery::RunSmcMethod { reference_block, account, method_id, params } => {
                self.run_smc_method(reference_block, account, method_id, &params)
            }
            LiteQuery::GetTransactions { account, lt, hash, count } => {
                self.get_transactions(account, lt, hash, count)
            }
            LiteQuery::ListBlockTransactions { id, reverse, count, after } => {
                self.list_block_transactions(id, reverse, count, after)
            }
            LiteQuery::LookupBlock { workchain, shard, key, exact, with_proof } => {
                self.lookup_block(workchain, shard, key, exact, with_proof)
            }
            LiteQuery::GetConfigParams { reference_block, param_ids, from_prev_key_block } => {
                self.get_config_params(reference_block, &param_ids, from_prev_key_block)
            }
            LiteQuery::GetShardInfo { reference_block, shard, exact } => {
                self.get_shard_info(reference_block, shard, exact)
            }
            LiteQuery::GetAllShardsInfo { reference_block } => self.get_all_shards_info(reference_block),
            LiteQuery::GetBlockProof { from_seqno, to_seqno } => self.get_block_proof(from_seqno, to_seqno),
            LiteQuery::GetLibraries { reference_block, hashes, with_proof } => {
                self.get_libraries(reference_block, &hashes, with_proof)
            }
            LiteQuery::GetShardBlockProof { id } => self.get_shard_block_proof(id),
            LiteQuery::GetValidatorStats { reference_block, limit, start_after } => {
                self.get_validator_stats(reference_block, limit, start_after)
            }
            LiteQuery::GetOutMsgQueueSizes { reference_block } => self.get_out_msg_queue_sizes(reference_block),
            LiteQuery::GetBlockOutMsgQueueSize { id, shard, with_proof } => {
                self.get_block_out_msg_queue_size(id, shard, with_proof)
            }
            LiteQuery::GetDispatchQueueInfo { id, after, limit } => {
                self.get_dispatch_queue_info(id, after, limit)
            }
            LiteQuery::GetDispatchQueueMessages { id, account, after_lt, limit, with_proof } => {
                self.get_dispatch_queue_messages(id, account, after_lt, limit, with_proof)
            }
        }
    }

    // -- masterchain info / raw block access ------------------------------

    fn get_masterchain_info(&self) -> LiteServerResult<LiteResponse> {
        let last = self.chain.last_masterchain_block()?;
        let state_root_hash = state_root_hash_of_block(self.cells(), last.root_hash)?;
        Ok(LiteResponse::MasterchainInfo(MasterchainInfo {
            last,
            state_root_hash,
            zerostate_id: self.chain.zerostate_id(),
            now: self.chain.now(),
        }))
    }

    /// A non-masterchain block's handle carries the masterchain seqno that
    /// references it (§3 "BlockHandle"); masterchain blocks reference
    /// themselves. Needed wherever a file lookup asks which archive package
    /// to search.
    fn owning_mc_seqno(&self, id: &BlockId) -> LiteServerResult<u32> {
        if id.is_masterchain() {
            Ok(id.seqno)
        } else {
            Ok(self.rootdb.get_block_handle(*id)?.snapshot().masterchain_ref_seqno)
        }
    }

    fn get_block(&self, id: BlockId) -> LiteServerResult<LiteResponse> {
        let owning = self.owning_mc_seqno(&id)?;
        Ok(LiteResponse::Block(self.rootdb.get_block_data(&id, owning)?))
    }

    fn get_block_header(&self, id: BlockId, mode: HeaderMode) -> LiteServerResult<LiteResponse> {
        let (proof, _fields) = block_header_proof(self.cells(), id.root_hash, mode.into())?;
        Ok(LiteResponse::BlockHeader(BlockHeaderResponse { id, proof }))
    }

    fn get_block_state(&self, id: BlockId) -> LiteServerResult<LiteResponse> {
        let owning = self.owning_mc_seqno(&id)?;
        Ok(LiteResponse::BlockState(self.rootdb.get_block_state(&id, owning)?))
    }

    // -- account state / run_smc_method ------------------------------------

    /// Walks from `account_prefix`'s top bits down through `shard_hashes`,
    /// splitting one level at a time the same way a real shard topology is
    /// addressed, to find the leaf describing the shard that currently
    /// contains this account (§4.9 "finds the shard covering this account").
    fn find_enclosing_shard(
        &self,
        mc_state_root: CryptoHash,
        address: [u8; 32],
    ) -> LiteServerResult<(MerkleProof, ShardPrefix, ShardDescrFields)> {
        let account_prefix = u64::from_be_bytes(address[0..8].try_into().unwrap());
        let mut shard = ShardPrefix::MASTERCHAIN;
        for len in 0..=60u32 {
            if len > 0 {
                let bit = (account_prefix >> (64 - len)) & 1;
                let (left, right) = shard.split();
                shard = if bit == 0 { left } else { right };
            }
            let (proof, hit) = shard_info_in_state_proof(self.cells(), mc_state_root, shard, true)?;
            if let Some((_, leaf)) = hit {
                let fields = ShardDescrFields::unpack(&leaf.data)
                    .map_err(|e| LiteServerError::InvalidRequest(format!("undecodable shard descriptor: {e}")))?;
                return Ok((proof, shard, fields));
            }
        }
        Err(LiteServerError::InvalidRequest("account address matches no known shard".into()))
    }

    /// Resolves `account`'s state under `reference_block`, proving the path
    /// from the reference block down to the account leaf — through a
    /// shard-hashes indirection first if the reference is a masterchain
    /// block but the account lives on a shardchain.
    fn resolve_account_state(
        &self,
        reference_block: &BlockId,
        address: [u8; 32],
    ) -> LiteServerResult<(MerkleProof, MerkleProof, Option<archive_proof::AccountStateHit>)> {
        if reference_block.is_masterchain() {
            let mc_state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
            if reference_block.workchain == MASTERCHAIN_ID {
                // Still need to decide: does the query mean the masterchain
                // account dict itself, or a shard hanging off this mc block?
                // A masterchain reference always resolves through
                // shard-hashes unless the account is itself a masterchain
                // account (shard == MASTERCHAIN marker and no split entry).
                if let Ok((shard_proof, _, descr)) = self.find_enclosing_shard(mc_state_root, address) {
                    let (state_proof, hit) = account_state_proof(self.cells(), descr.state_root_hash, address)?;
                    return Ok((shard_proof, state_proof, hit));
                }
            }
            let (state_proof, hit) = account_state_proof(self.cells(), mc_state_root, address)?;
            let empty = MerkleProof { root: reference_block.root_hash, cells: Default::default() };
            Ok((empty, state_proof, hit))
        } else {
            let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
            let (state_proof, hit) = account_state_proof(self.cells(), state_root, address)?;
            let empty = MerkleProof { root: reference_block.root_hash, cells: Default::default() };
            Ok((empty, state_proof, hit))
        }
    }

    fn get_account_state(
        &self,
        reference_block: BlockId,
        account: AccountId,
        prunned: bool,
    ) -> LiteServerResult<LiteResponse> {
        let (shard_proof, mut state_proof, hit) = self.resolve_account_state(&reference_block, account.address)?;
        let account_cell = if prunned {
            None
        } else {
            match &hit {
                Some(h) => Some(self.cells().get_cell(h.account_state_hash)?),
                None => None,
            }
        };
        if prunned {
            if let Some(h) = &hit {
                let pruned = prune_account_state_subtree(self.cells(), h.account_state_hash)?;
                state_proof = merge_proofs(state_proof, pruned);
            }
        }
        Ok(LiteResponse::AccountState(AccountStateResponse { shard_proof, state_proof, account_cell, hit }))
    }

    fn run_smc_method(
        &self,
        reference_block: BlockId,
        account: AccountId,
        method_id: i32,
        params: &[u8],
    ) -> LiteServerResult<LiteResponse> {
        let (shard_proof, state_proof, hit) = self.resolve_account_state(&reference_block, account.address)?;
        let Some(hit) = hit else {
            return Err(LiteServerError::InvalidRequest("run_smc_method: account does not exist".into()));
        };
        let context = SmcContext {
            now: self.chain.now(),
            reference_block,
            account_block: reference_block,
            // Balance lives in the opaque account-state cell this engine
            // never decodes (§1 non-goal); the VM collaborator reads it
            // itself from the cell behind `account_state_hash`.
            balance_nanotons: 0,
            storage_fees_collected: 0,
            previous_blocks_info: None,
        };
        let result = self
            .vm
            .run_get_method(hit.account_state_hash, method_id, params, context)
            .map_err(LiteServerError::VmFailure)?;
        Ok(LiteResponse::RunSmcMethod(RunSmcMethodResponse {
            exit_code: result.exit_code,
            stack: result.stack,
            c7: result.c7,
            shard_proof,
            state_proof,
        }))
    }

    // -- transactions -------------------------------------------------------

    /// §4.9 `get_transactions`: "up to 16 transaction cells", regardless of
    /// what the caller asks for.
    const MAX_TRANSACTIONS: u32 = 16;

    fn get_transactions(
        &self,
        account: AccountId,
        lt: u64,
        hash: CryptoHash,
        count: u32,
    ) -> LiteServerResult<LiteResponse> {
        let mc_tip = self.chain.last_masterchain_block()?;
        let mc_state_root = state_root_hash_of_block(self.cells(), mc_tip.root_hash)?;
        let shard = if account.workchain == MASTERCHAIN_ID {
            ShardPrefix::MASTERCHAIN
        } else {
            self.find_enclosing_shard(mc_state_root, account.address)?.1
        };

        let mut transactions = Vec::new();
        let mut blocks = Vec::new();
        let mut cur_lt = lt;
        let mut cur_hash = hash;
        let mut cur_block = self.rootdb.get_block_by_lt(shard, cur_lt, true)?;

        for _ in 0..count.max(1).min(Self::MAX_TRANSACTIONS) {
            let (_, hit) = transaction_proof(self.cells(), cur_block.root_hash, account.address, cur_lt)?;
            let Some(hit) = hit else { break };
            if hit.transaction_hash != cur_hash {
                tracing::warn!(lt = cur_lt, "get_transactions: transaction hash does not match the requested chain");
                break;
            }
            transactions.push(self.cells().get_cell(hit.transaction_hash)?);
            blocks.push(cur_block);
            match previous_transaction(&hit.fields) {
                Some((plt, phash)) => {
                    cur_block = self.rootdb.get_block_by_lt(shard, plt, true)?;
                    cur_lt = plt;
                    cur_hash = phash;
                }
                None => break,
            }
        }
        Ok(LiteResponse::Transactions(TransactionsResponse { transactions, blocks }))
    }

    /// §4.9 `list_block_transactions`: "respects a 256-item cap", regardless
    /// of what the caller asks for.
    const MAX_LISTED_TRANSACTIONS: u32 = 256;

    fn list_block_transactions(
        &self,
        id: BlockId,
        reverse: bool,
        count: u32,
        after: Option<(AccountId, u64)>,
    ) -> LiteServerResult<LiteResponse> {
        let count = count.min(Self::MAX_LISTED_TRANSACTIONS);
        const ACCOUNT_DICT_DEPTH: u16 = 256;
        const TX_DICT_DEPTH: u16 = 64;
        let spine = [
            BlockRootRef::Extra as usize,
            ExtraRef::AccountBlocksAndQueues as usize,
            AccountBlocksRef::AccountBlocks as usize,
        ];

        let mut acct_cursor = match &after {
            Some((acc, _)) => DictPath::from_bytes(&acc.address, ACCOUNT_DICT_DEPTH),
            None if reverse => DictPath::from_bytes(&[0xFFu8; 32], ACCOUNT_DICT_DEPTH),
            None => DictPath::from_bytes(&[0u8; 32], ACCOUNT_DICT_DEPTH),
        };
        let mut resume_lt = after.map(|(_, lt)| lt);

        let mut ids = Vec::new();
        let mut proof_acc: Option<MerkleProof> = None;
        let mut incomplete = false;

        'accounts: loop {
            let (proof, hit) = if reverse {
                dictwalk::lookup_and_prove_predecessor(self.cells(), id.root_hash, &spine, ACCOUNT_DICT_DEPTH, &acct_cursor)?
            } else {
                dictwalk::lookup_and_prove(self.cells(), id.root_hash, &spine, ACCOUNT_DICT_DEPTH, &acct_cursor, false)?
            };
            proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            let Some((acct_key, acct_leaf)) = hit else { break };
            let address = dict_key_to_account(&acct_key);
            let Some(&tx_root) = acct_leaf.refs.first() else { break };

            let mut tx_cursor = match resume_lt.take() {
                Some(lt) if reverse => prev_lt_path(lt, TX_DICT_DEPTH),
                Some(lt) => next_lt_path(lt, TX_DICT_DEPTH),
                None if reverse => DictPath::from_u64(u64::MAX, TX_DICT_DEPTH as u8),
                None => DictPath::from_u64(0, TX_DICT_DEPTH as u8),
            };

            loop {
                if ids.len() as u32 >= count {
                    incomplete = true;
                    break 'accounts;
                }
                let tx_hit = if reverse {
                    archive_proof::dict::lookup_predecessor(self.cells(), tx_root, TX_DICT_DEPTH, &tx_cursor)?
                } else {
                    archive_proof::dict::lookup_successor(self.cells(), tx_root, TX_DICT_DEPTH, &tx_cursor)?
                };
                let Some((tx_key, tx_leaf)) = tx_hit else { break };
                let lt = dict_key_to_u64(&tx_key);
                let tx_hash = tx_leaf.refs.first().copied().unwrap_or(CryptoHash::ZERO);
                ids.push((AccountId { workchain: id.workchain, address }, lt, tx_hash));
                match if reverse { dictwalk::prev_path(&tx_key) } else { dictwalk::next_path(&tx_key) } {
                    Some(next) => tx_cursor = next,
                    None => break,
                }
            }

            match if reverse { dictwalk::prev_path(&acct_key) } else { dictwalk::next_path(&acct_key) } {
                Some(next) => acct_cursor = next,
                None => break,
            }
        }

        let proof = proof_acc.unwrap_or_else(|| MerkleProof { root: id.root_hash, cells: Default::default() });
        Ok(LiteResponse::ListBlockTransactions(ListBlockTransactionsResponse {
            ids,
            incomplete,
            proof: Some(proof),
        }))
    }

    // -- block lookup / header-only flows -----------------------------------

    /// §4.9 `lookup_block_with_proof`: besides the found block's own header
    /// proof, a masterchain block additionally carries a proof of its own
    /// membership in the current tip's `old_mc_blocks` (so a client can
    /// place it in history without separately calling `get_block_proof`);
    /// a shard block additionally carries, if `after_split` is set, a
    /// header proof of its immediate predecessor (the other half of the
    /// split), and the `shard_block_links` chain back from the enclosing
    /// masterchain block's shard-top (`self.walk_shard_predecessor_links`,
    /// shared with [`Self::get_shard_block_proof`]).
    fn lookup_block(
        &self,
        workchain: i32,
        shard: ShardPrefix,
        key: BlockLookupKey,
        exact: bool,
        with_proof: bool,
    ) -> LiteServerResult<LiteResponse> {
        let id = match key {
            BlockLookupKey::Seqno(s) => self.rootdb.get_block_by_seqno(shard, s, exact)?,
            BlockLookupKey::Lt(lt) => self.rootdb.get_block_by_lt(shard, lt, exact)?,
            BlockLookupKey::UnixTime(t) => self.rootdb.get_block_by_unix_time(shard, t, exact)?,
        };
        if !with_proof {
            return Ok(LiteResponse::LookupBlock(LookupBlockResponse {
                id,
                header_proof: None,
                predecessor_proof: None,
                shard_block_links: None,
            }));
        }

        let (header_proof, fields) = block_header_proof(self.cells(), id.root_hash, HeaderProofMode::default())?;

        let (predecessor_proof, shard_block_links) = if id.is_masterchain() {
            let tip = self.chain.last_masterchain_block()?;
            let tip_state_root = state_root_hash_of_block(self.cells(), tip.root_hash)?;
            let (proof, hit) = ancestor_block_proof(self.cells(), tip_state_root, id.seqno)?;
            if hit.is_none() {
                return Err(LiteServerError::InvalidRequest(format!(
                    "masterchain block {} is not recorded in the current tip's old_mc_blocks",
                    id.seqno
                )));
            }
            (Some(proof), None)
        } else {
            let predecessor_proof = if fields.after_split {
                let snapshot = self.rootdb.get_block_handle(id)?.snapshot();
                let prev = snapshot.prev[0].ok_or_else(|| {
                    LiteServerError::InvalidRequest(format!("block {id} is after_split but has no recorded predecessor"))
                })?;
                Some(block_header_proof(self.cells(), prev.root_hash, HeaderProofMode::default())?.0)
            } else {
                None
            };

            let owning = self.owning_mc_seqno(&id)?;
            let mc_root_hash = self.chain_collaborator.block_root_hash(owning)?;
            let mc_state_root = state_root_hash_of_block(self.cells(), mc_root_hash)?;
            let links = match self.shard_top_block_id(mc_state_root, workchain, id.shard)? {
                Some((_, top_id)) => self.walk_shard_predecessor_links(top_id, id.seqno)?,
                None => Vec::new(),
            };
            (predecessor_proof, Some(links))
        };

        Ok(LiteResponse::LookupBlock(LookupBlockResponse {
            id,
            header_proof: Some(header_proof),
            predecessor_proof,
            shard_block_links,
        }))
    }

    fn get_config_params(
        &self,
        reference_block: BlockId,
        param_ids: &[i32],
        from_prev_key_block: bool,
    ) -> LiteServerResult<LiteResponse> {
        const CONFIG_DICT_DEPTH: u16 = 32;
        let mc_root_hash = if from_prev_key_block {
            let prev_key = self.chain_collaborator.prev_key_block_seqno(reference_block.seqno)?.unwrap_or(0);
            self.chain_collaborator.block_root_hash(prev_key)?
        } else {
            reference_block.root_hash
        };
        let state_root = state_root_hash_of_block(self.cells(), mc_root_hash)?;
        let spine = [StateRootRef::McExtra as usize, McExtraRef::Config as usize];

        let mut proof_acc: Option<MerkleProof> = None;
        let mut params = Vec::new();
        for &pid in param_ids {
            let key = DictPath::from_u64(pid as u32 as u64, 32);
            let (proof, hit) =
                dictwalk::lookup_and_prove(self.cells(), state_root, &spine, CONFIG_DICT_DEPTH, &key, true)?;
            proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            params.push((pid, hit));
        }
        let proof = proof_acc.unwrap_or_else(|| MerkleProof { root: state_root, cells: Default::default() });
        Ok(LiteResponse::ConfigParams(ConfigParamsResponse { state_proof: proof, params }))
    }

    fn get_shard_info(&self, reference_block: BlockId, shard: ShardPrefix, exact: bool) -> LiteServerResult<LiteResponse> {
        let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
        let (proof, hit) = shard_info_in_state_proof(self.cells(), state_root, shard, exact)?;
        Ok(LiteResponse::ShardInfo(ShardInfoResponse { proof, hit }))
    }

    /// Walks the whole `shard_hashes` dictionary via repeated
    /// successor-lookups, bounded at `max_enumerated_entries` (no silent
    /// truncation: a bound hit is logged).
    fn get_all_shards_info(&self, reference_block: BlockId) -> LiteServerResult<LiteResponse> {
        let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
        let spine = [StateRootRef::McExtra as usize, McExtraRef::ShardHashes as usize];
        let (proof, entries) = self.enumerate_dict(state_root, &spine, 64, "get_all_shards_info")?;
        Ok(LiteResponse::AllShardsInfo(AllShardsInfoResponse { proof, entries }))
    }

    fn enumerate_dict(
        &self,
        root_hash: CryptoHash,
        spine: &[usize],
        depth: u16,
        flow_name: &str,
    ) -> LiteServerResult<(MerkleProof, Vec<DictHit>)> {
        let mut entries = Vec::new();
        let mut proof_acc: Option<MerkleProof> = None;
        let mut cursor = DictPath::from_u64(0, depth as u8);
        loop {
            let (proof, hit) = dictwalk::lookup_and_prove(self.cells(), root_hash, spine, depth, &cursor, false)?;
            proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            let Some((key, _)) = &hit else { break };
            let key = key.clone();
            entries.push(hit);
            if entries.len() >= self.max_enumerated_entries() {
                tracing::warn!(flow = flow_name, limit = entries.len(), "dictionary enumeration truncated");
                break;
            }
            match dictwalk::next_path(&key) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        let proof = proof_acc.unwrap_or_else(|| MerkleProof { root: root_hash, cells: Default::default() });
        Ok((proof, entries))
    }

    fn max_enumerated_entries(&self) -> usize {
        self.max_enumerated_entries
    }

    fn get_block_proof(&self, from_seqno: u32, to_seqno: u32) -> LiteServerResult<LiteResponse> {
        let chain = build_proof_chain(
            self.cells(),
            self.chain_collaborator.as_ref(),
            self.validators.as_ref(),
            from_seqno,
            to_seqno,
        )?;
        Ok(LiteResponse::BlockProof(chain))
    }

    fn get_libraries(&self, reference_block: BlockId, hashes: &[CryptoHash], with_proof: bool) -> LiteServerResult<LiteResponse> {
        const LIBRARIES_DICT_DEPTH: u16 = 256;
        let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
        let spine = [StateRootRef::McExtra as usize, McExtraRef::Libraries as usize];

        let mut proof_acc: Option<MerkleProof> = None;
        let mut libraries = Vec::new();
        for h in hashes {
            let key = DictPath::from_bytes(h.as_bytes(), 256);
            let (proof, hit) =
                dictwalk::lookup_and_prove(self.cells(), state_root, &spine, LIBRARIES_DICT_DEPTH, &key, true)?;
            if with_proof {
                proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            }
            libraries.push(hit);
        }
        Ok(LiteResponse::Libraries(LibrariesResponse { proof: proof_acc, libraries }))
    }

    /// §4.9: shard-block link chains never exceed this many hops.
    const MAX_SHARD_LINK_HOPS: usize = 8;

    /// Walks `prev[0]` handle links from `from` down to `target_seqno`,
    /// collecting one header proof per hop (used by both
    /// `get_shard_block_proof` and `lookup_block`'s `shard_block_links`,
    /// since both need "the chain of shard blocks back from the enclosing
    /// masterchain block's shard-top to the target").
    fn walk_shard_predecessor_links(&self, from: BlockId, target_seqno: u32) -> LiteServerResult<Vec<ChainLink>> {
        let mut links = Vec::new();
        let mut cur = from;
        while cur.seqno > target_seqno {
            if links.len() >= Self::MAX_SHARD_LINK_HOPS {
                return Err(LiteServerError::InvalidRequest(format!(
                    "shard block predecessor chain from {} to seqno {target_seqno} exceeds {} hops",
                    from,
                    Self::MAX_SHARD_LINK_HOPS
                )));
            }
            let snapshot = self.rootdb.get_block_handle(cur)?.snapshot();
            let prev = snapshot.prev[0].ok_or_else(|| {
                LiteServerError::InvalidRequest(format!("block {cur} has no recorded predecessor"))
            })?;
            links.push(shard_predecessor_link(self.cells(), prev.seqno, cur.root_hash)?);
            cur = prev;
        }
        if cur.seqno != target_seqno {
            return Err(LiteServerError::InvalidRequest(format!(
                "shard block predecessor walk overshot seqno {target_seqno}, landed on {}",
                cur.seqno
            )));
        }
        Ok(links)
    }

    /// Decodes the top-of-shard block id a masterchain state's
    /// `shard_hashes` dictionary records for `shard`, if any.
    fn shard_top_block_id(
        &self,
        mc_state_root: CryptoHash,
        workchain: i32,
        shard: ShardPrefix,
    ) -> LiteServerResult<Option<(MerkleProof, BlockId)>> {
        let (proof, hit) = shard_info_in_state_proof(self.cells(), mc_state_root, shard, true)?;
        let Some((_, leaf)) = hit else { return Ok(None) };
        let fields = ShardDescrFields::unpack(&leaf.data)
            .map_err(|e| LiteServerError::InvalidRequest(format!("undecodable shard descriptor: {e}")))?;
        let top_id =
            BlockId { workchain, shard, seqno: fields.seqno, root_hash: fields.root_hash, file_hash: fields.file_hash };
        Ok(Some((proof, top_id)))
    }

    fn get_shard_block_proof(&self, id: BlockId) -> LiteServerResult<LiteResponse> {
        let owning = self.owning_mc_seqno(&id)?;
        let mc_root_hash = self.chain_collaborator.block_root_hash(owning)?;
        let mc_block_id = BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno: owning,
            root_hash: mc_root_hash,
            file_hash: CryptoHash::ZERO,
        };
        let mc_state_root = state_root_hash_of_block(self.cells(), mc_root_hash)?;
        let Some((membership_proof, top_id)) = self.shard_top_block_id(mc_state_root, id.workchain, id.shard)? else {
            return Err(LiteServerError::InvalidRequest(format!(
                "masterchain block {owning} does not carry shard {:?} in its shard config",
                id.shard
            )));
        };
        let links = self.walk_shard_predecessor_links(top_id, id.seqno)?;
        Ok(LiteResponse::ShardBlockProof(ShardBlockProofResponse {
            mc_block_id,
            links,
            mc_membership_proof: Some(membership_proof),
        }))
    }

    fn get_validator_stats(
        &self,
        reference_block: BlockId,
        limit: u32,
        start_after: Option<CryptoHash>,
    ) -> LiteServerResult<LiteResponse> {
        const STATS_DICT_DEPTH: u16 = 256;
        let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
        let spine = [
            StateRootRef::McExtra as usize,
            McExtraRef::OldBlocksAndStats as usize,
            OldBlocksAndStatsRef::ValidatorStats as usize,
        ];

        let mut cursor = match start_after {
            Some(h) => {
                let key = DictPath::from_bytes(h.as_bytes(), STATS_DICT_DEPTH);
                match dictwalk::next_path(&key) {
                    Some(n) => n,
                    None => {
                        let empty = MerkleProof { root: state_root, cells: Default::default() };
                        return Ok(LiteResponse::ValidatorStats(ValidatorStatsResponse {
                            proof: empty,
                            entries: Vec::new(),
                            complete: true,
                        }));
                    }
                }
            }
            None => DictPath::from_bytes(&[0u8; 32], STATS_DICT_DEPTH),
        };

        let mut entries = Vec::new();
        let mut proof_acc: Option<MerkleProof> = None;
        let mut complete = true;
        for _ in 0..limit {
            let (proof, hit) =
                dictwalk::lookup_and_prove(self.cells(), state_root, &spine, STATS_DICT_DEPTH, &cursor, false)?;
            proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            let Some((key, _)) = &hit else { break };
            let key = key.clone();
            entries.push(hit);
            match dictwalk::next_path(&key) {
                Some(n) => {
                    cursor = n;
                    complete = false;
                }
                None => break,
            }
        }
        let proof = proof_acc.unwrap_or_else(|| MerkleProof { root: state_root, cells: Default::default() });
        Ok(LiteResponse::ValidatorStats(ValidatorStatsResponse { proof, entries, complete }))
    }

    fn get_out_msg_queue_sizes(&self, reference_block: BlockId) -> LiteServerResult<LiteResponse> {
        let state_root = state_root_hash_of_block(self.cells(), reference_block.root_hash)?;
        let spine = [
            StateRootRef::McExtra as usize,
            McExtraRef::OldBlocksAndStats as usize,
            OldBlocksAndStatsRef::OutMsgQueueInfo as usize,
        ];
        let (proof, entries) = self.enumerate_dict(state_root, &spine, 64, "get_out_msg_queue_sizes")?;
        Ok(LiteResponse::OutMsgQueueSizes(OutMsgQueueSizesResponse { proof, entries }))
    }

    fn get_block_out_msg_queue_size(&self, id: BlockId, shard: ShardPrefix, with_proof: bool) -> LiteServerResult<LiteResponse> {
        let spine = [
            BlockRootRef::Extra as usize,
            ExtraRef::AccountBlocksAndQueues as usize,
            AccountBlocksRef::OutMsgQueue as usize,
        ];
        let key = DictPath::from_u64(shard.0, 64);
        let (proof, hit) = dictwalk::lookup_and_prove(self.cells(), id.root_hash, &spine, 64, &key, true)?;
        let proof = if with_proof { proof } else { MerkleProof { root: id.root_hash, cells: Default::default() } };
        Ok(LiteResponse::BlockOutMsgQueueSize(ShardInfoResponse { proof, hit }))
    }

    fn get_dispatch_queue_info(
        &self,
        id: BlockId,
        after: Option<[u8; 32]>,
        limit: u32,
    ) -> LiteServerResult<LiteResponse> {
        const DISPATCH_DICT_DEPTH: u16 = 256;
        let spine = [
            BlockRootRef::Extra as usize,
            ExtraRef::AccountBlocksAndQueues as usize,
            AccountBlocksRef::DispatchQueue as usize,
        ];
        let mut cursor = match after {
            Some(addr) => match dictwalk::next_path(&DictPath::from_bytes(&addr, DISPATCH_DICT_DEPTH)) {
                Some(n) => n,
                None => {
                    return Ok(LiteResponse::DispatchQueue(DispatchQueueResponse {
                        proof: None,
                        entries: Vec::new(),
                        incomplete: false,
                    }))
                }
            },
            None => DictPath::from_bytes(&[0u8; 32], DISPATCH_DICT_DEPTH),
        };

        let mut entries = Vec::new();
        let mut proof_acc: Option<MerkleProof> = None;
        let mut incomplete = false;
        for _ in 0..limit {
            let (proof, hit) =
                dictwalk::lookup_and_prove(self.cells(), id.root_hash, &spine, DISPATCH_DICT_DEPTH, &cursor, false)?;
            proof_acc = Some(match proof_acc { Some(acc) => merge_proofs(acc, proof), None => proof });
            let Some((key, _)) = &hit else { break };
            let key = key.clone();
            entries.push(hit);
            match dictwalk::next_path(&key) {
                Some(n) => cursor = n,
                None => break,
            }
            if entries.len() as u32 >= limit {
                incomplete = true;
                break;
            }
        }
        Ok(LiteResponse::DispatchQueue(DispatchQueueResponse { proof: proof_acc, entries, incomplete }))
    }

    fn get_dispatch_queue_messages(
        &self,
        id: BlockId,
        account: [u8; 32],
        after_lt: u64,
        limit: u32,
        with_proof: bool,
    ) -> LiteServerResult<LiteResponse> {
        const DISPATCH_DICT_DEPTH: u16 = 256;
        const LT_DICT_DEPTH: u16 = 64;
        let spine = [
            BlockRootRef::Extra as usize,
            ExtraRef::AccountBlocksAndQueues as usize,
            AccountBlocksRef::DispatchQueue as usize,
        ];
        let addr_key = DictPath::from_bytes(&account, DISPATCH_DICT_DEPTH);
        let (spine_proof, acct_hit) =
            dictwalk::lookup_and_prove(self.cells(), id.root_hash, &spine, DISPATCH_DICT_DEPTH, &addr_key, true)?;
        let Some((_, leaf)) = acct_hit else {
            return Ok(LiteResponse::DispatchQueue(DispatchQueueResponse {
                proof: with_proof.then_some(spine_proof),
                entries: Vec::new(),
                incomplete: false,
            }));
        };
        let Some(&msgs_root) = leaf.refs.first() else {
            return Ok(LiteResponse::DispatchQueue(DispatchQueueResponse {
                proof: with_proof.then_some(spine_proof),
                entries: Vec::new(),
                incomplete: false,
            }));
        };

        let mut cursor = next_lt_path(after_lt, LT_DICT_DEPTH);
        let mut entries = Vec::new();
        let mut proof_acc = spine_proof;
        let mut incomplete = false;
        for _ in 0..limit {
            let hit = archive_proof::dict::lookup_successor(self.cells(), msgs_root, LT_DICT_DEPTH, &cursor)?;
            let Some((key, _)) = &hit else { break };
            let key = key.clone();
            if with_proof {
                let p = archive_proof::dict::prove(self.cells(), msgs_root, LT_DICT_DEPTH, &hit, &cursor)?;
                proof_acc = merge_proofs(proof_acc, p);
            }
            entries.push(hit);
            match dictwalk::next_path(&key) {
                Some(n) => cursor = n,
                None => break,
            }
            if entries.len() as u32 >= limit {
                incomplete = true;
                break;
            }
        }
        Ok(LiteResponse::DispatchQueue(DispatchQueueResponse {
            proof: with_proof.then_some(proof_acc),
            entries,
            incomplete,
        }))
    }
}

fn dict_key_to_u64(key: &DictPath) -> u64 {
    let mut value = 0u64;
    for i in 0..key.depth() as usize {
        value = (value << 1) | key.bit(i) as u64;
    }
    value
}

fn dict_key_to_account(key: &DictPath) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let mut b = 0u8;
        for bit in 0..8 {
            b = (b << 1) | key.bit(i * 8 + bit) as u8;
        }
        *byte = b;
    }
    bytes
}

fn next_lt_path(lt: u64, depth: u16) -> DictPath {
    DictPath::from_u64(lt.saturating_add(1), depth as u8)
}

fn prev_lt_path(lt: u64, depth: u16) -> DictPath {
    DictPath::from_u64(lt.saturating_sub(1), depth as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use archive_cells::CellStoreConfig;
    use archive_kv::{Database, MemoryDatabase};
    use archive_manager::{ManagerConfig, SliceDbFactory};
    use archive_proof::Validator;
    use archive_rootdb::RootDbConfig;

    struct NoChain;
    impl ChainCollaborator for NoChain {
        fn block_root_hash(&self, _seqno: u32) -> ProofResult<CryptoHash> {
            Err(archive_proof::ProofError::MissingCell(CryptoHash::ZERO))
        }
        fn is_key_block(&self, _seqno: u32) -> ProofResult<bool> {
            Ok(false)
        }
        fn next_key_block_seqno(&self, _after: u32) -> ProofResult<Option<u32>> {
            Ok(None)
        }
        fn prev_key_block_seqno(&self, _before: u32) -> ProofResult<Option<u32>> {
            Ok(None)
        }
    }

    impl ValidatorSetSource for NoChain {
        fn validator_set(&self, _key_block_seqno: u32) -> ProofResult<Vec<Validator>> {
            Ok(Vec::new())
        }
    }

    struct FixedTip(BlockId);
    impl ChainTip for FixedTip {
        fn last_masterchain_block(&self) -> LiteServerResult<BlockId> {
            Ok(self.0)
        }
        fn zerostate_id(&self) -> BlockId {
            self.0
        }
        fn now(&self) -> u32 {
            1_700_000_000
        }
    }

    struct NoVm;
    impl GetMethodVm for NoVm {
        fn run_get_method(
            &self,
            _account_state_hash: CryptoHash,
            _method_id: i32,
            _params: &[u8],
            _context: SmcContext,
        ) -> Result<SmcResult, String> {
            Err("no vm wired up in this fixture".into())
        }
    }

    struct NoSink;
    impl MessageSink for NoSink {
        fn submit(&self, _data: &[u8]) -> Result<i32, String> {
            Ok(0)
        }
    }

    fn mc_id(seqno: u32, root_hash: CryptoHash) -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno,
            root_hash,
            file_hash: CryptoHash::ZERO,
        }
    }

    fn open_rootdb(dir: &std::path::Path) -> Arc<RootDb> {
        let cells_db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
        let state_db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
        let catalog_db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
        let factory: SliceDbFactory =
            Arc::new(|_path| Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn archive_kv::Database>));
        let config = RootDbConfig { manager: ManagerConfig::default(), cells: CellStoreConfig::default() };
        Arc::new(RootDb::open(dir, cells_db, state_db, catalog_db, factory, config).unwrap())
    }

    fn build_server(dir: &std::path::Path, tip: BlockId) -> Arc<LiteServer> {
        let rootdb = open_rootdb(dir);
        Arc::new(LiteServer::new(
            rootdb,
            Arc::new(FixedTip(tip)),
            Arc::new(NoChain),
            Arc::new(NoChain),
            Arc::new(NoVm),
            Arc::new(NoSink),
            LiteServerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn get_masterchain_info_reports_the_fixed_tip_and_zerostate() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = Cell::new_ordinary(vec![1], 8, vec![]);
        let value_flow = Cell::new_ordinary(vec![], 0, vec![]);
        let state_update_cell = Cell::new_ordinary(vec![], 0, vec![CryptoHash::ZERO, leaf.hash()]);
        let info = Cell::new_ordinary(vec![], 0, vec![]);
        let extra = Cell::new_ordinary(vec![], 0, vec![]);
        let root = Cell::new_ordinary(
            vec![],
            0,
            vec![info.hash(), value_flow.hash(), state_update_cell.hash(), extra.hash()],
        );

        let rootdb = open_rootdb(dir.path());
        let mut bodies = std::collections::HashMap::new();
        for c in [&leaf, &value_flow, &state_update_cell, &info, &extra] {
            bodies.insert(c.hash(), c.clone());
        }
        let id = mc_id(7, root.hash());
        rootdb.store_shard_state(id, root.clone(), &bodies).unwrap();

        let server = Arc::new(LiteServer::new(
            rootdb,
            Arc::new(FixedTip(id)),
            Arc::new(NoChain),
            Arc::new(NoChain),
            Arc::new(NoVm),
            Arc::new(NoSink),
            LiteServerConfig::default(),
        ));

        let response = server.handle(LiteQuery::GetMasterchainInfo).await.unwrap();
        match response.as_ref() {
            LiteResponse::MasterchainInfo(info) => {
                assert_eq!(info.last, id);
                assert_eq!(info.state_root_hash, leaf.hash());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_block_without_a_stored_handle_surfaces_as_a_rootdb_error() {
        let dir = tempfile::tempdir().unwrap();
        let id = mc_id(1, CryptoHash::hash_bytes(b"root"));
        let server = build_server(dir.path(), id);
        let err1 = server.handle(LiteQuery::GetBlock { id }).await.unwrap_err();
        assert!(matches!(err1, LiteServerError::RootDb(_)));
    }

    #[tokio::test]
    async fn a_cached_response_is_served_without_touching_rootdb_again() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = Cell::new_ordinary(vec![1], 8, vec![]);
        let value_flow = Cell::new_ordinary(vec![], 0, vec![]);
        let state_update_cell = Cell::new_ordinary(vec![], 0, vec![CryptoHash::ZERO, leaf.hash()]);
        let info = Cell::new_ordinary(vec![], 0, vec![]);
        let extra = Cell::new_ordinary(vec![], 0, vec![]);
        let root = Cell::new_ordinary(
            vec![],
            0,
            vec![info.hash(), value_flow.hash(), state_update_cell.hash(), extra.hash()],
        );
        let rootdb = open_rootdb(dir.path());
        let mut bodies = std::collections::HashMap::new();
        for c in [&leaf, &value_flow, &state_update_cell, &info, &extra] {
            bodies.insert(c.hash(), c.clone());
        }
        let id = mc_id(7, root.hash());
        rootdb.store_shard_state(id, root.clone(), &bodies).unwrap();

        let server = Arc::new(LiteServer::new(
            rootdb,
            Arc::new(FixedTip(id)),
            Arc::new(NoChain),
            Arc::new(NoChain),
            Arc::new(NoVm),
            Arc::new(NoSink),
            LiteServerConfig::default(),
        ));

        // `GetBlockHeader` carries an explicit reference block, so it is a
        // cache candidate (§4.9); two calls must share one cache entry.
        let query = LiteQuery::GetBlockHeader { id, mode: HeaderMode::default() };
        let first = server.handle(query.clone()).await.unwrap();
        let second = server.handle(query).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn get_masterchain_info_is_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = Cell::new_ordinary(vec![1], 8, vec![]);
        let value_flow = Cell::new_ordinary(vec![], 0, vec![]);
        let state_update_cell = Cell::new_ordinary(vec![], 0, vec![CryptoHash::ZERO, leaf.hash()]);
        let info = Cell::new_ordinary(vec![], 0, vec![]);
        let extra = Cell::new_ordinary(vec![], 0, vec![]);
        let root = Cell::new_ordinary(
            vec![],
            0,
            vec![info.hash(), value_flow.hash(), state_update_cell.hash(), extra.hash()],
        );
        let rootdb = open_rootdb(dir.path());
        let mut bodies = std::collections::HashMap::new();
        for c in [&leaf, &value_flow, &state_update_cell, &info, &extra] {
            bodies.insert(c.hash(), c.clone());
        }
        let id = mc_id(7, root.hash());
        rootdb.store_shard_state(id, root.clone(), &bodies).unwrap();

        let server = Arc::new(LiteServer::new(
            rootdb,
            Arc::new(FixedTip(id)),
            Arc::new(NoChain),
            Arc::new(NoChain),
            Arc::new(NoVm),
            Arc::new(NoSink),
            LiteServerConfig::default(),
        ));

        // A query with no reference block at all must never be served from
        // cache: each call has to re-ask the chain tip for the latest block,
        // not replay whatever `last`/`now` happened to be the first time.
        let first = server.handle(LiteQuery::GetMasterchainInfo).await.unwrap();
        let second = server.handle(LiteQuery::GetMasterchainInfo).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        let first_ext = server.handle(LiteQuery::GetMasterchainInfoExt { mode: 0 }).await.unwrap();
        let second_ext = server.handle(LiteQuery::GetMasterchainInfoExt { mode: 0 }).await.unwrap();
        assert!(!Arc::ptr_eq(&first_ext, &second_ext));
    }

    #[tokio::test]
    async fn send_message_is_deduplicated_and_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let id = mc_id(1, CryptoHash::hash_bytes(b"root"));
        let server = build_server(dir.path(), id);
        let r1 = server.handle(LiteQuery::SendMessage { data: vec![1, 2, 3] }).await.unwrap();
        let r2 = server.handle(LiteQuery::SendMessage { data: vec![1, 2, 3] }).await.unwrap();
        assert!(matches!(r1.as_ref(), LiteResponse::SendMessage { status: 0 }));
        assert!(matches!(r2.as_ref(), LiteResponse::SendMessage { status: 0 }));
    }

    #[test]
    fn dict_key_round_trips_through_u64() {
        let key = DictPath::from_u64(0xDEAD_BEEF, 64);
        assert_eq!(dict_key_to_u64(&key), 0xDEAD_BEEF);
    }

    #[test]
    fn dict_key_round_trips_through_account_address() {
        let addr = [7u8; 32];
        let key = DictPath::from_bytes(&addr, 256);
        assert_eq!(dict_key_to_account(&key), addr);
    }
}
