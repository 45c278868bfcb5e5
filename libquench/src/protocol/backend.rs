use crate::contract::EthChain;
use crate::monero::{WalletHandle, XmrWallet};
use crate::types::{Clock, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Engine configuration. `swap_timeout` is the contract Δ: `t0 = deploy + Δ`
/// and `t1 = deploy + 2Δ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    pub env: Environment,
    pub swap_timeout: Duration,
    /// Slack added to every wait on `t0`/`t1` to absorb clock skew.
    pub timeout_grace: Duration,
    pub poll_interval: Duration,
    /// How long the maker searches for the `New` log after
    /// `NotifyETHLocked` before treating the claim as a mismatch.
    pub log_search_window: Duration,
    /// How long the maker keeps scanning for the taker's `Refunded` log
    /// after `t1` passes without the contract turning Ready.
    pub refund_follow_up: Duration,
    pub data_dir: PathBuf,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig {
            env: Environment::Development,
            swap_timeout: Duration::from_secs(600),
            timeout_grace: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            log_search_window: Duration::from_secs(30),
            refund_follow_up: Duration::from_secs(2400),
            data_dir: PathBuf::from(".quench"),
        }
    }
}

/// Everything a swap task needs from the process: the chain handle, the
/// lock-guarded wallet, a clock and the shared configuration. Cheap to
/// clone; all swaps of one daemon share the same backend.
pub struct Backend<C: EthChain, W: XmrWallet> {
    chain: Arc<C>,
    wallet: WalletHandle<W>,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<SwapConfig>>,
}

impl<C: EthChain, W: XmrWallet> Clone for Backend<C, W> {
    fn clone(&self) -> Self {
        Backend {
            chain: self.chain.clone(),
            wallet: self.wallet.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: EthChain, W: XmrWallet> Backend<C, W> {
    pub fn new(chain: C, wallet: W, clock: Arc<dyn Clock>, config: SwapConfig) -> Self {
        Backend {
            chain: Arc::new(chain),
            wallet: WalletHandle::new(wallet),
            clock,
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn wallet(&self) -> &WalletHandle<W> {
        &self.wallet
    }

    pub fn now_unix(&self) -> u64 {
        self.clock.now_unix()
    }

    pub fn env(&self) -> Environment {
        self.config.read().unwrap().env
    }

    pub fn swap_timeout(&self) -> Duration {
        self.config.read().unwrap().swap_timeout
    }

    pub fn set_swap_timeout(&self, timeout: Duration) {
        self.config.write().unwrap().swap_timeout = timeout;
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.read().unwrap().poll_interval
    }

    pub fn log_search_window(&self) -> Duration {
        self.config.read().unwrap().log_search_window
    }

    pub fn refund_follow_up(&self) -> Duration {
        self.config.read().unwrap().refund_follow_up
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.read().unwrap().data_dir.clone()
    }

    /// Sleeps until wall-clock second `t` plus the configured grace.
    pub async fn sleep_until_unix(&self, t: u64) {
        let grace = self.config.read().unwrap().timeout_grace;
        let delta = t.saturating_sub(self.clock.now_unix());
        tokio::time::sleep(Duration::from_secs(delta) + grace).await;
    }
}
