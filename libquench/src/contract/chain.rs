use crate::amount::EtherAmount;
use crate::contract::{ContractError, EscrowSwap, Stage};
use crate::types::{EthAddress, SwapId, TxHash};
use async_trait::async_trait;
use std::time::Duration;

/// Result of a successful `new_swap` call: the struct as constructed on
/// chain (timeouts filled in from the block timestamp), its id, and the
/// inclusion transaction.
#[derive(Debug, Clone)]
pub struct NewSwapReceipt {
    pub swap: EscrowSwap,
    pub swap_id: SwapId,
    pub tx_hash: TxHash,
}

/// The escrow contract as seen from one signing account. Mutating calls
/// wait for inclusion; implementations serialise nonce allocation so
/// concurrent swaps on the same account do not race.
#[async_trait]
pub trait EthChain: Send + Sync + 'static {
    /// The address transactions are signed with.
    fn account(&self) -> EthAddress;

    /// The deployed escrow contract's address.
    fn contract_address(&self) -> EthAddress;

    /// Locks `value` for `claimer`, with `t0 = now + timeout` and
    /// `t1 = now + 2 * timeout`. Emits `New`.
    async fn new_swap(
        &self,
        pub_key_claim: [u8; 32],
        pub_key_refund: [u8; 32],
        claimer: EthAddress,
        timeout: Duration,
        nonce: [u8; 32],
        value: EtherAmount,
    ) -> Result<NewSwapReceipt, ContractError>;

    /// Owner-only Pending -> Ready transition. Emits `Ready`.
    async fn set_ready(&self, swap: &EscrowSwap) -> Result<TxHash, ContractError>;

    /// Claims the escrowed value, revealing `secret` (big-endian) in the
    /// `Claimed` event.
    async fn claim(&self, swap: &EscrowSwap, secret: [u8; 32]) -> Result<TxHash, ContractError>;

    /// Refunds the escrowed value to the owner, revealing `secret` in the
    /// `Refunded` event.
    async fn refund(&self, swap: &EscrowSwap, secret: [u8; 32]) -> Result<TxHash, ContractError>;

    /// Current stage of the swap; `Stage::Invalid` for unknown ids.
    async fn stage(&self, id: SwapId) -> Result<Stage, ContractError>;

    async fn is_ready(&self, id: SwapId) -> Result<bool, ContractError> {
        Ok(self.stage(id).await? == Stage::Ready)
    }

    /// Looks up the `New` event for `id` and returns the full swap struct.
    async fn find_new(&self, id: SwapId) -> Result<Option<EscrowSwap>, ContractError>;

    /// The secret revealed by a `Claimed` event for `id`, if any.
    async fn find_claimed(&self, id: SwapId) -> Result<Option<[u8; 32]>, ContractError>;

    /// The secret revealed by a `Refunded` event for `id`, if any.
    async fn find_refunded(&self, id: SwapId) -> Result<Option<[u8; 32]>, ContractError>;

    /// Timestamp of the latest block; the time base for `t0`/`t1`.
    async fn latest_time(&self) -> Result<u64, ContractError>;

    async fn balance_of(&self, addr: EthAddress) -> Result<EtherAmount, ContractError>;
}
