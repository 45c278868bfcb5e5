use crate::amount::{EtherAmount, ExchangeRate, MoneroAmount};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// The on-chain identifier of an escrow swap: `keccak256(abi_encode(swap))`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapId(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub [u8; 32],
);

impl Display for SwapId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for SwapId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SwapId({self})")
    }
}

/// Identifies an offer (and the swap made from it) between two peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub [u8; 32],
);

impl OfferId {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut id = [0u8; 32];
        rng.fill_bytes(&mut id);
        OfferId(id)
    }

    /// Short name used for log lines and on-disk directories,
    /// e.g. `QSWa2edd1f8091cc375`.
    pub fn name(&self) -> String {
        format!("QSW{}", hex::encode(&self.0[..8]))
    }
}

impl Display for OfferId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for OfferId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OfferId({})", self.name())
    }
}

/// An Ethereum transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub [u8; 32],
);

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TxHash({self})")
    }
}

/// A 20-byte Ethereum account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct EthAddress(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::address_from_hex")]
    pub [u8; 20],
);

impl EthAddress {
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; 20];
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(EthAddress(out))
    }
}

impl Display for EthAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for EthAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EthAddress({self})")
    }
}

/// Which side of the swap we are driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapRole {
    /// Holds ETH, locks it in the escrow contract, and receives XMR.
    Taker,
    /// Holds XMR, locks it to the shared address, and claims the ETH.
    Maker,
}

impl Display for SwapRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapRole::Taker => write!(f, "taker"),
            SwapRole::Maker => write!(f, "maker"),
        }
    }
}

/// Observable progress of a swap. Terminal variants never change once
/// published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    ExpectingKeys,
    KeysExchanged,
    EthLocked,
    XmrLocked,
    ContractReady,
    CompletedSuccess,
    CompletedRefund,
    CompletedAbort,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapStatus::CompletedSuccess | SwapStatus::CompletedRefund | SwapStatus::CompletedAbort
        )
    }
}

impl Display for SwapStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SwapStatus::ExpectingKeys => "ExpectingKeys",
            SwapStatus::KeysExchanged => "KeysExchanged",
            SwapStatus::EthLocked => "ETHLocked",
            SwapStatus::XmrLocked => "XMRLocked",
            SwapStatus::ContractReady => "ContractReady",
            SwapStatus::CompletedSuccess => "CompletedSuccess",
            SwapStatus::CompletedRefund => "CompletedRefund",
            SwapStatus::CompletedAbort => "CompletedAbort",
        };
        write!(f, "{s}")
    }
}

/// The Monero network a swap settles on. Development targets a regtest
/// node, which uses mainnet address encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Mainnet,
    Stagenet,
    Development,
}

impl Environment {
    pub fn monero_network(&self) -> monero::Network {
        match self {
            Environment::Mainnet | Environment::Development => monero::Network::Mainnet,
            Environment::Stagenet => monero::Network::Stagenet,
        }
    }
}

/// An open offer to sell XMR for ETH at a fixed rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub min_amount: MoneroAmount,
    pub max_amount: MoneroAmount,
    pub exchange_rate: ExchangeRate,
}

impl Offer {
    pub fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        min_amount: MoneroAmount,
        max_amount: MoneroAmount,
        exchange_rate: ExchangeRate,
    ) -> Self {
        Offer { id: OfferId::random(rng), min_amount, max_amount, exchange_rate }
    }
}

/// The manager's durable view of one swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRecord {
    pub offer_id: OfferId,
    pub role: SwapRole,
    pub status: SwapStatus,
    pub info_path: PathBuf,
    pub counterparty_eth_address: EthAddress,
    pub xmr_amount: MoneroAmount,
    pub eth_amount: EtherAmount,
    pub exchange_rate: ExchangeRate,
    pub started_at: u64,
    pub completed_at: Option<u64>,
}

/// Wall-clock seconds. Swap timers run on this; the contract runs on block
/// timestamps, which the chain interface exposes separately.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
    }
}

/// A clock driven by the tokio runtime, so tests running with paused time
/// advance it deterministically.
#[cfg(feature = "dummy")]
#[derive(Debug, Clone)]
pub struct MockClock {
    base_unix: u64,
    start: tokio::time::Instant,
}

#[cfg(feature = "dummy")]
impl MockClock {
    pub fn new(base_unix: u64) -> Self {
        MockClock { base_unix, start: tokio::time::Instant::now() }
    }
}

#[cfg(feature = "dummy")]
impl Clock for MockClock {
    fn now_unix(&self) -> u64 {
        self.base_unix + self.start.elapsed().as_secs()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offer_id_name() {
        let id = OfferId([0xa2; 32]);
        assert_eq!(id.name(), "QSWa2a2a2a2a2a2a2a2");
    }

    #[test]
    fn status_terminality() {
        assert!(!SwapStatus::ExpectingKeys.is_terminal());
        assert!(!SwapStatus::ContractReady.is_terminal());
        assert!(SwapStatus::CompletedSuccess.is_terminal());
        assert!(SwapStatus::CompletedRefund.is_terminal());
        assert!(SwapStatus::CompletedAbort.is_terminal());
    }

    #[test]
    fn eth_address_round_trip() {
        let addr = EthAddress::from_hex("0x1111111111111111111111111111111111111111").unwrap();
        assert_eq!(addr.to_string(), "0x1111111111111111111111111111111111111111");
        let json = serde_json::to_string(&addr).unwrap();
        let back: EthAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }
}
