use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Error deserializing response: {0}")]
    Deserialize(String),
    #[error("No wallet with filename {0}")]
    WalletNotFound(String),
    #[error("Not enough unlocked funds in the wallet")]
    InsufficientFunds,
    #[error("No wallet is currently open")]
    NotOpen,
}
