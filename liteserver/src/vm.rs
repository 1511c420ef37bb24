//! `run_smc_method`'s VM boundary (§1 non-goal: no VM re-implementation).
//! The lite-query dispatcher fetches the account state and builds the
//! config tuple; actually executing the GET method is delegated to
//! whatever sandboxed VM the surrounding node wires in.

use archive_primitives::{BlockId, CryptoHash};

/// The `c7`-style configuration tuple a GET method sees as its initial
/// environment: wall-clock time, the reference block ids, the account's
/// balance, and (for blocks old enough to need it) the previous-blocks
/// info the method may read via `PREVBLOCKSINFO`-style opcodes.
#[derive(Clone, Debug)]
pub struct SmcContext {
    pub now: u32,
    pub reference_block: BlockId,
    pub account_block: BlockId,
    pub balance_nanotons: u128,
    pub storage_fees_collected: u128,
    pub previous_blocks_info: Option<Vec<u8>>,
}

/// Outcome of one GET method invocation; exit codes outside the normal TVM
/// range (insufficient gas, missing code, stack underflow) are carried as
/// ordinary values here rather than as a failure of this trait's method,
/// per §9 "these are captured, mapped to a specific exit code ... never
/// propagated as catastrophic failures".
#[derive(Clone, Debug)]
pub struct SmcResult {
    pub exit_code: i32,
    pub stack: Vec<u8>,
    pub c7: Option<Vec<u8>>,
}

/// External collaborator that actually runs a GET method against a
/// contract's code/data cells. Implemented by the surrounding node; this
/// crate only ever calls it with bytes it has already proven came from the
/// requested account's state.
pub trait GetMethodVm: Send + Sync {
    fn run_get_method(
        &self,
        account_state_hash: CryptoHash,
        method_id: i32,
        params: &[u8],
        context: SmcContext,
    ) -> Result<SmcResult, String>;
}
