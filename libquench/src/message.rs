//! The peer wire protocol: a tag byte followed by a JSON body, carried in
//! length-prefixed frames. Any tag unknown to this version fails decoding,
//! and the session is torn down by the caller.

use crate::amount::{EtherAmount, MoneroAmount};
use crate::types::{EthAddress, Offer, OfferId, SwapId, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use thiserror::Error;

/// Frames larger than this are rejected outright. The largest legitimate
/// message is `SendKeys` carrying a hex-encoded cross-group proof.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    QueryResponse(QueryResponse),
    SendKeys(SendKeysMessage),
    NotifyEthLocked(NotifyEthLocked),
    NotifyXmrLock(NotifyXmrLock),
    NotifyReady(NotifyReady),
    NotifyClaimed(NotifyClaimed),
    NotifyRefund(NotifyRefund),
}

/// Listing of the sender's open offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub offers: Vec<Offer>,
}

/// Sent by both parties to open the protocol. The private spend key never
/// crosses the wire; the view key and both public points do, together with
/// the proof binding them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendKeysMessage {
    pub offer_id: OfferId,
    pub public_spend_key: String,
    pub private_view_key: String,
    pub dleq_proof: String,
    pub secp256k1_public_key: String,
    pub eth_address: EthAddress,
    /// XMR the sender will lock (maker side).
    pub xmr_amount: Option<MoneroAmount>,
    /// ETH the sender will lock (taker side).
    pub eth_amount: Option<EtherAmount>,
}

/// Sent by the taker after the escrow swap is included on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEthLocked {
    pub address: EthAddress,
    pub contract_swap_id: SwapId,
}

/// Sent by the maker after locking XMR to the shared address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyXmrLock {
    pub address: String,
}

/// Sent by the taker after calling `set_ready` on the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyReady {}

/// Sent by the maker after claiming the ETH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyClaimed {
    pub tx_hash: TxHash,
}

/// Sent by the taker after refunding the ETH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyRefund {
    pub tx_hash: TxHash,
}

impl ProtocolMessage {
    pub fn tag(&self) -> u8 {
        match self {
            ProtocolMessage::QueryResponse(_) => 0,
            ProtocolMessage::SendKeys(_) => 1,
            ProtocolMessage::NotifyEthLocked(_) => 2,
            ProtocolMessage::NotifyXmrLock(_) => 3,
            ProtocolMessage::NotifyReady(_) => 4,
            ProtocolMessage::NotifyClaimed(_) => 5,
            ProtocolMessage::NotifyRefund(_) => 6,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ProtocolMessage::QueryResponse(_) => "QueryResponse",
            ProtocolMessage::SendKeys(_) => "SendKeys",
            ProtocolMessage::NotifyEthLocked(_) => "NotifyETHLocked",
            ProtocolMessage::NotifyXmrLock(_) => "NotifyXMRLock",
            ProtocolMessage::NotifyReady(_) => "NotifyReady",
            ProtocolMessage::NotifyClaimed(_) => "NotifyClaimed",
            ProtocolMessage::NotifyRefund(_) => "NotifyRefund",
        }
    }

    /// Tag byte followed by the JSON body.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let body = match self {
            ProtocolMessage::QueryResponse(m) => serde_json::to_vec(m),
            ProtocolMessage::SendKeys(m) => serde_json::to_vec(m),
            ProtocolMessage::NotifyEthLocked(m) => serde_json::to_vec(m),
            ProtocolMessage::NotifyXmrLock(m) => serde_json::to_vec(m),
            ProtocolMessage::NotifyReady(m) => serde_json::to_vec(m),
            ProtocolMessage::NotifyClaimed(m) => serde_json::to_vec(m),
            ProtocolMessage::NotifyRefund(m) => serde_json::to_vec(m),
        }
        .map_err(|e| MessageError::Malformed(e.to_string()))?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.tag());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let (tag, body) = match bytes.split_first() {
            Some((tag, body)) => (*tag, body),
            None => return Err(MessageError::EmptyMessage),
        };
        let malformed = |e: serde_json::Error| MessageError::Malformed(e.to_string());
        let msg = match tag {
            0 => ProtocolMessage::QueryResponse(serde_json::from_slice(body).map_err(malformed)?),
            1 => ProtocolMessage::SendKeys(serde_json::from_slice(body).map_err(malformed)?),
            2 => ProtocolMessage::NotifyEthLocked(serde_json::from_slice(body).map_err(malformed)?),
            3 => ProtocolMessage::NotifyXmrLock(serde_json::from_slice(body).map_err(malformed)?),
            4 => ProtocolMessage::NotifyReady(serde_json::from_slice(body).map_err(malformed)?),
            5 => ProtocolMessage::NotifyClaimed(serde_json::from_slice(body).map_err(malformed)?),
            6 => ProtocolMessage::NotifyRefund(serde_json::from_slice(body).map_err(malformed)?),
            t => return Err(MessageError::InvalidMessageType(t)),
        };
        Ok(msg)
    }
}

impl Display for ProtocolMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolMessage::QueryResponse(m) => {
                write!(f, "QueryResponse with {} offers", m.offers.len())
            }
            ProtocolMessage::SendKeys(m) => {
                write!(f, "SendKeys for offer {}", m.offer_id.name())
            }
            ProtocolMessage::NotifyEthLocked(m) => {
                write!(f, "NotifyETHLocked swap={}", m.contract_swap_id)
            }
            ProtocolMessage::NotifyXmrLock(m) => write!(f, "NotifyXMRLock to {}", m.address),
            ProtocolMessage::NotifyReady(_) => write!(f, "NotifyReady"),
            ProtocolMessage::NotifyClaimed(m) => write!(f, "NotifyClaimed tx={}", m.tx_hash),
            ProtocolMessage::NotifyRefund(m) => write!(f, "NotifyRefund tx={}", m.tx_hash),
        }
    }
}

/// Writes one message as a `u32` big-endian length prefix plus payload.
pub fn write_framed<W: Write>(writer: &mut W, msg: &ProtocolMessage) -> Result<(), MessageError> {
    let payload = msg.encode()?;
    let len = u32::try_from(payload.len()).map_err(|_| MessageError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_SIZE {
        return Err(MessageError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).map_err(|e| MessageError::Io(e.to_string()))?;
    writer.write_all(&payload).map_err(|e| MessageError::Io(e.to_string()))?;
    Ok(())
}

/// Reads one length-prefixed message.
pub fn read_framed<R: Read>(reader: &mut R) -> Result<ProtocolMessage, MessageError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).map_err(|e| MessageError::Io(e.to_string()))?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(MessageError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).map_err(|e| MessageError::Io(e.to_string()))?;
    ProtocolMessage::decode(&payload)
}

#[derive(Debug, Clone, Error)]
pub enum MessageError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),
    #[error("malformed message body: {0}")]
    Malformed(String),
    #[error("empty message")]
    EmptyMessage,
    #[error("frame of {0} bytes exceeds the maximum")]
    FrameTooLarge(u32),
    #[error("i/o error: {0}")]
    Io(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::{ExchangeRate, MoneroAmount};
    use crate::types::Offer;
    use rand::{rngs::StdRng, SeedableRng};

    fn sample_messages() -> Vec<ProtocolMessage> {
        let offer = Offer::new(
            &mut StdRng::seed_from_u64(0),
            MoneroAmount::from_xmr("0.1").unwrap(),
            MoneroAmount::from_xmr("10").unwrap(),
            ExchangeRate::from_eth_per_xmr("0.05").unwrap(),
        );
        vec![
            ProtocolMessage::QueryResponse(QueryResponse { offers: vec![offer] }),
            ProtocolMessage::SendKeys(SendKeysMessage {
                offer_id: OfferId([7; 32]),
                public_spend_key: "aa".repeat(32),
                private_view_key: "bb".repeat(32),
                dleq_proof: "cc".repeat(64),
                secp256k1_public_key: "dd".repeat(33),
                eth_address: EthAddress([1; 20]),
                xmr_amount: Some(MoneroAmount::from_xmr("1.0").unwrap()),
                eth_amount: None,
            }),
            ProtocolMessage::NotifyEthLocked(NotifyEthLocked {
                address: EthAddress([2; 20]),
                contract_swap_id: SwapId([9; 32]),
            }),
            ProtocolMessage::NotifyXmrLock(NotifyXmrLock { address: "4AdUndXHHZ".into() }),
            ProtocolMessage::NotifyReady(NotifyReady {}),
            ProtocolMessage::NotifyClaimed(NotifyClaimed { tx_hash: TxHash([3; 32]) }),
            ProtocolMessage::NotifyRefund(NotifyRefund { tx_hash: TxHash([4; 32]) }),
        ]
    }

    #[test]
    fn encode_decode_round_trip() {
        for msg in sample_messages() {
            let encoded = msg.encode().unwrap();
            let decoded = ProtocolMessage::decode(&encoded).unwrap();
            assert_eq!(msg, decoded, "round trip failed for {}", msg.type_name());
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = ProtocolMessage::decode(&[42, b'{', b'}']).unwrap_err();
        assert!(matches!(err, MessageError::InvalidMessageType(42)));
    }

    #[test]
    fn malformed_body_rejected() {
        let err = ProtocolMessage::decode(&[1, b'n', b'o']).unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
        assert!(matches!(ProtocolMessage::decode(&[]), Err(MessageError::EmptyMessage)));
    }

    #[test]
    fn framing_round_trip() {
        let mut buf = Vec::new();
        for msg in sample_messages() {
            write_framed(&mut buf, &msg).unwrap();
        }
        let mut reader = &buf[..];
        for msg in sample_messages() {
            let read = read_framed(&mut reader).unwrap();
            assert_eq!(msg, read);
        }
        assert!(read_framed(&mut reader).is_err());
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        let mut reader = &buf[..];
        assert!(matches!(read_framed(&mut reader), Err(MessageError::FrameTooLarge(_))));
    }
}
