//! Stand-ins for the external collaborators spec.md §1 places out of this
//! workspace's scope: consensus/validator-set computation, the VM, and
//! message propagation. A real deployment links this binary against those
//! subsystems and swaps these out; until then the archive engine is fully
//! operational for everything it owns (storage, indexing, proof
//! construction) and these seams fail closed rather than silently fabricate
//! an answer.

use std::sync::atomic::{AtomicU32, Ordering};

use archive_liteserver::{ChainTip, GetMethodVm, LiteServerResult, MessageSink, SmcContext, SmcResult};
use archive_primitives::{BlockId, CryptoHash};
use archive_proof::{ChainCollaborator, ProofError, ProofResult, Validator, ValidatorSetSource};

/// Reports the masterchain tip last observed through [`Self::set_tip`].
/// Whatever drives consensus (out of scope per spec.md §1) is expected to
/// call that setter as new blocks are applied; until the first call this
/// collaborator has nothing to report.
pub struct StaticChainTip {
    tip: std::sync::Mutex<Option<BlockId>>,
    zerostate: BlockId,
    now: AtomicU32,
}

impl StaticChainTip {
    pub fn new(zerostate: BlockId) -> Self {
        StaticChainTip { tip: std::sync::Mutex::new(None), zerostate, now: AtomicU32::new(0) }
    }

    pub fn set_tip(&self, id: BlockId, now: u32) {
        *self.tip.lock().unwrap() = Some(id);
        self.now.store(now, Ordering::Relaxed);
    }
}

impl ChainTip for StaticChainTip {
    fn last_masterchain_block(&self) -> LiteServerResult<BlockId> {
        self.tip.lock().unwrap().ok_or(archive_liteserver::LiteServerError::InvalidRequest(
            "no masterchain block observed yet; consensus has not reported a tip".into(),
        ))
    }

    fn zerostate_id(&self) -> BlockId {
        self.zerostate
    }

    fn now(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}

/// A [`ChainCollaborator`]/[`ValidatorSetSource`] that answers only from
/// what has already been committed to [`archive_rootdb::RootDb`] via block
/// handles — not yet wired to this node, since the validator-set/catchain
/// subsystem that owns this knowledge is an external collaborator.
pub struct UnwiredValidatorSource;

impl ChainCollaborator for UnwiredValidatorSource {
    fn block_root_hash(&self, _seqno: u32) -> ProofResult<CryptoHash> {
        Err(ProofError::MissingCollaboratorData("block_root_hash: no chain collaborator wired".into()))
    }

    fn is_key_block(&self, _seqno: u32) -> ProofResult<bool> {
        Err(ProofError::MissingCollaboratorData("is_key_block: no chain collaborator wired".into()))
    }

    fn next_key_block_seqno(&self, _after: u32) -> ProofResult<Option<u32>> {
        Err(ProofError::MissingCollaboratorData("next_key_block_seqno: no chain collaborator wired".into()))
    }

    fn prev_key_block_seqno(&self, _before: u32) -> ProofResult<Option<u32>> {
        Err(ProofError::MissingCollaboratorData("prev_key_block_seqno: no chain collaborator wired".into()))
    }
}

impl ValidatorSetSource for UnwiredValidatorSource {
    fn validator_set(&self, _key_block_seqno: u32) -> ProofResult<Vec<Validator>> {
        Err(ProofError::MissingCollaboratorData("validator_set: no validator-set source wired".into()))
    }
}

/// `run_smc_method`'s VM boundary (§1 non-goal: no VM re-implementation).
/// Reports a VM-level failure rather than a catastrophic one, per §9
/// "exceptions from the VM ... never propagated as catastrophic failures" —
/// the absence of a wired VM is itself such a controlled failure.
pub struct UnwiredVm;

impl GetMethodVm for UnwiredVm {
    fn run_get_method(
        &self,
        _account_state_hash: CryptoHash,
        _method_id: i32,
        _params: &[u8],
        _context: SmcContext,
    ) -> Result<SmcResult, String> {
        Err("no GET-method VM wired into this node".to_string())
    }
}

/// `send_message`'s external collaborator boundary (peer transport is out
/// of scope per §1). Rejects rather than silently dropping the message.
pub struct UnwiredMessageSink;

impl MessageSink for UnwiredMessageSink {
    fn submit(&self, _data: &[u8]) -> Result<i32, String> {
        Err("no message sink wired into this node".to_string())
    }
}
