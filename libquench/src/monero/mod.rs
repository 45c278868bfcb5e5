//! The engine's view of `monero-wallet-rpc`. The daemon is single-tenant,
//! so every wallet is reached through a [`WalletHandle`] that serialises
//! access process-wide.

pub mod data_objects;
#[cfg(feature = "dummy")]
pub mod dummy_impl;
pub mod error;
mod traits;

pub use error::WalletError;
pub use traits::XmrWallet;

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared, lock-guarded access to the process-global wallet RPC daemon.
pub struct WalletHandle<W: XmrWallet> {
    inner: Arc<Mutex<W>>,
}

impl<W: XmrWallet> Clone for WalletHandle<W> {
    fn clone(&self) -> Self {
        WalletHandle { inner: self.inner.clone() }
    }
}

impl<W: XmrWallet> WalletHandle<W> {
    pub fn new(wallet: W) -> Self {
        WalletHandle { inner: Arc::new(Mutex::new(wallet)) }
    }

    /// Acquires the wallet for a sequence of calls. Hold the guard across
    /// open/use/close sequences so concurrent swaps cannot interleave
    /// wallet switches.
    pub async fn lock(&self) -> MutexGuard<'_, W> {
        self.inner.lock().await
    }
}
