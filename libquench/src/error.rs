use crate::contract::ContractError;
use crate::crypto::dleq::DleqError;
use crate::crypto::keys::KeyError;
use crate::message::MessageError;
use crate::monero::WalletError;
use crate::storage::StoreError;
use crate::transport::TransportError;
use crate::types::OfferId;
use thiserror::Error;

/// Everything that can end a swap early. Inside a running swap these are
/// converted into a terminal status wherever funds allow, so subscribers
/// always observe a terminal value.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("DLEQ verification failed on peer keys: {0}")]
    InvalidProof(#[from] DleqError),
    #[error("on-chain escrow does not match expectation: {0}")]
    ContractMismatch(String),
    #[error("peer sent {got} while in state {state}")]
    UnexpectedMessage { state: &'static str, got: &'static str },
    #[error("peer disconnected prematurely")]
    PeerDisconnected,
    #[error("{0} reached with no progress")]
    TimerExpired(&'static str),
    #[error(transparent)]
    Chain(#[from] ContractError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("swap is already completed")]
    AlreadyCompleted,
    #[error("no swap found for offer {}", .0.name())]
    NotFound(OfferId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Codec(#[from] MessageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl ProtocolError {
    /// Transient errors may be retried; consensus-level rejections and
    /// protocol violations may not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProtocolError::Chain(ContractError::Chain(_)) => true,
            ProtocolError::Wallet(WalletError::Http(_)) => true,
            _ => false,
        }
    }
}
