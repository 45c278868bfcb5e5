//! The swap protocol proper: per-swap key material, the shared backend,
//! the two role state machines, the offer book and the recovery engine.

pub mod backend;
pub mod keys;
pub mod maker;
pub mod offers;
pub mod recovery;
pub mod taker;

use crate::contract::ContractError;
use crate::error::ProtocolError;
use crate::message::ProtocolMessage;
use crate::transport::MessageTransport;
use crate::types::SwapStatus;
use log::*;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Bounded attempts for transient chain failures before surfacing them.
pub(crate) const MAX_CHAIN_RETRIES: u32 = 5;

/// Per-swap control handles: status publication and the cooperative
/// cancellation signal.
pub struct SwapControl {
    status_tx: watch::Sender<SwapStatus>,
    cancel_rx: watch::Receiver<bool>,
}

impl SwapControl {
    pub fn new() -> (Self, watch::Receiver<SwapStatus>, watch::Sender<bool>) {
        let (status_tx, status_rx) = watch::channel(SwapStatus::ExpectingKeys);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (SwapControl { status_tx, cancel_rx }, status_rx, cancel_tx)
    }

    pub fn publish(&self, status: SwapStatus) {
        if *self.status_tx.borrow() != status {
            debug!("swap status -> {status}");
            self.status_tx.send_replace(status);
        }
    }

    pub fn current(&self) -> SwapStatus {
        *self.status_tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves otherwise.
    pub async fn cancelled(&mut self) {
        if *self.cancel_rx.borrow() {
            return;
        }
        while self.cancel_rx.changed().await.is_ok() {
            if *self.cancel_rx.borrow() {
                return;
            }
        }
        // the cancel sender is gone; cancellation can no longer happen
        std::future::pending::<()>().await;
    }
}

/// Retries a chain call with linear backoff while it fails transiently.
/// Reverts and other consensus rejections surface immediately.
pub(crate) async fn retry_chain<T, F, Fut>(
    backoff: Duration,
    mut call: F,
) -> Result<T, ContractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ContractError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(ContractError::Chain(e)) if attempt < MAX_CHAIN_RETRIES => {
                attempt += 1;
                warn!("transient chain error (attempt {attempt}/{MAX_CHAIN_RETRIES}): {e}");
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Receives the next peer message, requiring it to match `expect`. Any
/// other tag terminates the session; a closed stream maps to
/// `PeerDisconnected`.
pub(crate) async fn expect_message<F, T>(
    transport: &mut Box<dyn MessageTransport>,
    state: &'static str,
    expect: F,
) -> Result<T, ProtocolError>
where
    F: Fn(ProtocolMessage) -> Result<T, ProtocolMessage>,
{
    match transport.receive().await? {
        Some(msg) => expect(msg).map_err(|other| {
            warn!("unexpected {} while in state {state}", other.type_name());
            ProtocolError::UnexpectedMessage { state, got: other.type_name() }
        }),
        None => Err(ProtocolError::PeerDisconnected),
    }
}
