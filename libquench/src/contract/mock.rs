//! An in-memory escrow chain enforcing the full consensus rules of the
//! contract, for tests and demos. All connected accounts share one state;
//! block time is read from the injected [`Clock`], so tests running under
//! paused tokio time control it deterministically.

use crate::amount::EtherAmount;
use crate::contract::{mul_verify, ContractError, EscrowSwap, EthChain, NewSwapReceipt, Stage};
use crate::types::{Clock, EthAddress, SwapId, TxHash};
use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ChainState {
    swaps: HashMap<SwapId, (EscrowSwap, Stage)>,
    claimed: HashMap<SwapId, [u8; 32]>,
    refunded: HashMap<SwapId, [u8; 32]>,
    balances: HashMap<EthAddress, EtherAmount>,
    tx_counter: u64,
}

impl ChainState {
    fn next_tx_hash(&mut self) -> TxHash {
        self.tx_counter += 1;
        let mut h = [0u8; 32];
        h[24..].copy_from_slice(&self.tx_counter.to_be_bytes());
        TxHash(h)
    }

    fn credit(&mut self, addr: EthAddress, value: EtherAmount) {
        let balance = self.balances.entry(addr).or_insert(EtherAmount::from_wei(0));
        *balance = balance.checked_add(value).unwrap_or(*balance);
    }

    fn debit(&mut self, addr: EthAddress, value: EtherAmount) -> Result<(), ContractError> {
        let balance = self.balances.entry(addr).or_insert(EtherAmount::from_wei(0));
        match balance.checked_sub(value) {
            Some(rest) => {
                *balance = rest;
                Ok(())
            }
            None => Err(ContractError::Reverted("insufficient balance".into())),
        }
    }
}

/// The shared chain. Hand one of these to the test and a
/// [`MockEthChain`] handle to each party.
pub struct MockEthNetwork {
    state: Arc<Mutex<ChainState>>,
    clock: Arc<dyn Clock>,
}

impl MockEthNetwork {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MockEthNetwork { state: Arc::new(Mutex::new(ChainState::default())), clock }
    }

    /// Binds a signing account with an initial balance.
    pub fn connect(&self, account: EthAddress, balance: EtherAmount) -> MockEthChain {
        self.state.lock().unwrap().credit(account, balance);
        MockEthChain { state: self.state.clone(), clock: self.clock.clone(), account }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_unix()
    }
}

/// One party's view of the mock chain.
#[derive(Clone)]
pub struct MockEthChain {
    state: Arc<Mutex<ChainState>>,
    clock: Arc<dyn Clock>,
    account: EthAddress,
}

#[async_trait]
impl EthChain for MockEthChain {
    fn account(&self) -> EthAddress {
        self.account
    }

    fn contract_address(&self) -> EthAddress {
        EthAddress([0xe5; 20])
    }

    async fn new_swap(
        &self,
        pub_key_claim: [u8; 32],
        pub_key_refund: [u8; 32],
        claimer: EthAddress,
        timeout: Duration,
        nonce: [u8; 32],
        value: EtherAmount,
    ) -> Result<NewSwapReceipt, ContractError> {
        let now = self.clock.now_unix();
        let mut state = self.state.lock().unwrap();
        state.debit(self.account, value)?;
        let swap = EscrowSwap {
            owner: self.account,
            claimer,
            pub_key_claim,
            pub_key_refund,
            timeout_0: now + timeout.as_secs(),
            timeout_1: now + 2 * timeout.as_secs(),
            value,
            nonce,
        };
        let swap_id = swap.swap_id();
        if state.swaps.contains_key(&swap_id) {
            state.credit(self.account, value);
            return Err(ContractError::Reverted("swap already exists".into()));
        }
        state.swaps.insert(swap_id, (swap, Stage::Pending));
        let tx_hash = state.next_tx_hash();
        debug!("mock chain: New {swap_id} t0={} t1={}", swap.timeout_0, swap.timeout_1);
        Ok(NewSwapReceipt { swap, swap_id, tx_hash })
    }

    async fn set_ready(&self, swap: &EscrowSwap) -> Result<TxHash, ContractError> {
        let id = swap.swap_id();
        let mut state = self.state.lock().unwrap();
        let (stored, stage) =
            state.swaps.get_mut(&id).ok_or(ContractError::UnknownSwap(id))?;
        if stored.owner != self.account {
            return Err(ContractError::Reverted("only the owner can call set_ready".into()));
        }
        if *stage != Stage::Pending {
            return Err(ContractError::Reverted(format!("swap is {stage}, not Pending")));
        }
        *stage = Stage::Ready;
        debug!("mock chain: Ready {id}");
        Ok(state.next_tx_hash())
    }

    async fn claim(&self, swap: &EscrowSwap, secret: [u8; 32]) -> Result<TxHash, ContractError> {
        let id = swap.swap_id();
        let now = self.clock.now_unix();
        let mut state = self.state.lock().unwrap();
        let (stored, stage) =
            state.swaps.get_mut(&id).ok_or(ContractError::UnknownSwap(id))?;
        if !matches!(*stage, Stage::Pending | Stage::Ready) {
            return Err(ContractError::Reverted(format!("swap is {stage}")));
        }
        if stored.claimer != self.account {
            return Err(ContractError::Reverted("only the claimer can claim".into()));
        }
        if now >= stored.timeout_1 {
            return Err(ContractError::Reverted("past t1, claim window closed".into()));
        }
        if *stage != Stage::Ready && now < stored.timeout_0 {
            return Err(ContractError::Reverted("not ready and before t0".into()));
        }
        if !mul_verify(secret, stored.pub_key_claim) {
            return Err(ContractError::Reverted("secret does not match claim key".into()));
        }
        *stage = Stage::Completed;
        let (claimer, value) = (stored.claimer, stored.value);
        state.claimed.insert(id, secret);
        state.credit(claimer, value);
        debug!("mock chain: Claimed {id}");
        Ok(state.next_tx_hash())
    }

    async fn refund(&self, swap: &EscrowSwap, secret: [u8; 32]) -> Result<TxHash, ContractError> {
        let id = swap.swap_id();
        let now = self.clock.now_unix();
        let mut state = self.state.lock().unwrap();
        let (stored, stage) =
            state.swaps.get_mut(&id).ok_or(ContractError::UnknownSwap(id))?;
        if !matches!(*stage, Stage::Pending | Stage::Ready) {
            return Err(ContractError::Reverted(format!("swap is {stage}")));
        }
        if stored.owner != self.account {
            return Err(ContractError::Reverted("only the owner can refund".into()));
        }
        let early = now < stored.timeout_0 && *stage != Stage::Ready;
        let late = now >= stored.timeout_1;
        if !early && !late {
            return Err(ContractError::Reverted("inside the claim window".into()));
        }
        if !mul_verify(secret, stored.pub_key_refund) {
            return Err(ContractError::Reverted("secret does not match refund key".into()));
        }
        *stage = Stage::Completed;
        let (owner, value) = (stored.owner, stored.value);
        state.refunded.insert(id, secret);
        state.credit(owner, value);
        debug!("mock chain: Refunded {id}");
        Ok(state.next_tx_hash())
    }

    async fn stage(&self, id: SwapId) -> Result<Stage, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.swaps.get(&id).map(|(_, stage)| *stage).unwrap_or(Stage::Invalid))
    }

    async fn find_new(&self, id: SwapId) -> Result<Option<EscrowSwap>, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.swaps.get(&id).map(|(swap, _)| *swap))
    }

    async fn find_claimed(&self, id: SwapId) -> Result<Option<[u8; 32]>, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.claimed.get(&id).copied())
    }

    async fn find_refunded(&self, id: SwapId) -> Result<Option<[u8; 32]>, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.refunded.get(&id).copied())
    }

    async fn latest_time(&self) -> Result<u64, ContractError> {
        Ok(self.clock.now_unix())
    }

    async fn balance_of(&self, addr: EthAddress) -> Result<EtherAmount, ContractError> {
        let state = self.state.lock().unwrap();
        Ok(state.balances.get(&addr).copied().unwrap_or(EtherAmount::from_wei(0)))
    }
}
