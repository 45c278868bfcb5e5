//! Quench core library: a trust-minimised atomic swap engine between
//! Monero and an EVM chain.
//!
//! The ETH side of a swap is escrowed in a two-timeout contract; the XMR
//! side is locked to an address whose spend and view keys are the sums of
//! both parties' keys. A cross-group DLEQ proof binds each party's ed25519
//! spend key to the secp256k1 key committed in the contract, so that every
//! on-chain claim or refund reveals exactly the scalar the counterparty
//! needs to recover the locked XMR.
//!
//! The engine is transport- and node-agnostic: peers are reached through
//! [`transport::MessageTransport`], the escrow contract through
//! [`contract::EthChain`] and the Monero wallet through
//! [`monero::XmrWallet`]. Swaps run as independent tasks owned by
//! [`manager::SwapService`].

pub mod amount;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod helpers;
pub mod manager;
pub mod message;
pub mod monero;
pub mod protocol;
pub mod storage;
pub mod transport;
pub mod types;
