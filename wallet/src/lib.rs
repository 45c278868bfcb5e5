//! A `monero-wallet-rpc` client implementing the [`XmrWallet`] interface
//! the quench engine consumes. One daemon serves one wallet at a time, so
//! callers reach this through `libquench`'s lock-guarded `WalletHandle`.

mod rpc;

pub use rpc::MoneroWalletRpc;

/// Connects to a running `monero-wallet-rpc` daemon.
pub fn connect(endpoint: impl Into<String>) -> MoneroWalletRpc {
    MoneroWalletRpc::new(endpoint)
}
