//! The engine's view of a peer connection: an ordered, bidirectional
//! message stream with a close signal. Real deployments back this with a
//! libp2p stream; tests use the in-memory pair, which still round-trips
//! every message through the frame codec.

use crate::message::{self, MessageError, ProtocolMessage};
use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&mut self, msg: ProtocolMessage) -> Result<(), TransportError>;

    /// Next message from the peer, in arrival order. `Ok(None)` means the
    /// peer closed the stream.
    async fn receive(&mut self) -> Result<Option<ProtocolMessage>, TransportError>;

    /// Signals the peer that no further messages will be sent.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("peer connection closed")]
    Closed,
    #[error(transparent)]
    Codec(#[from] MessageError),
}

#[cfg(feature = "dummy")]
pub use memory::{memory_pair, MemoryTransport};

#[cfg(feature = "dummy")]
mod memory {
    use super::*;
    use tokio::sync::mpsc;

    /// One end of an in-memory duplex connection carrying encoded frames.
    pub struct MemoryTransport {
        tx: Option<mpsc::Sender<Vec<u8>>>,
        rx: mpsc::Receiver<Vec<u8>>,
    }

    /// Creates a connected pair of transports.
    pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
        let (tx_a, rx_b) = mpsc::channel(64);
        let (tx_b, rx_a) = mpsc::channel(64);
        (
            MemoryTransport { tx: Some(tx_a), rx: rx_a },
            MemoryTransport { tx: Some(tx_b), rx: rx_b },
        )
    }

    #[async_trait]
    impl MessageTransport for MemoryTransport {
        async fn send(&mut self, msg: ProtocolMessage) -> Result<(), TransportError> {
            let mut frame = Vec::new();
            message::write_framed(&mut frame, &msg)?;
            match &self.tx {
                Some(tx) => tx.send(frame).await.map_err(|_| TransportError::Closed),
                None => Err(TransportError::Closed),
            }
        }

        async fn receive(&mut self) -> Result<Option<ProtocolMessage>, TransportError> {
            match self.rx.recv().await {
                Some(frame) => {
                    let msg = message::read_framed(&mut frame.as_slice())?;
                    Ok(Some(msg))
                }
                None => Ok(None),
            }
        }

        async fn close(&mut self) {
            self.tx.take();
        }
    }
}
