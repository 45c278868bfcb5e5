//! On-disk state for crash recovery. Each swap owns a directory named
//! after its offer id holding `info.json`, rewritten after every state
//! transition; completed swaps are appended to `past.json`.

use crate::amount::{EtherAmount, MoneroAmount};
use crate::contract::EscrowSwap;
use crate::types::{EthAddress, OfferId, SwapId, SwapRecord, SwapRole, SwapStatus};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The secret material needed to finish or unwind a swap after a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoFile {
    pub offer_id: OfferId,
    pub role: SwapRole,
    pub status: SwapStatus,
    /// Our ed25519 private spend key, hex.
    pub private_spend_key: String,
    /// Our ed25519 private view key, hex.
    pub private_view_key: String,
    /// Counterparty public spend key, hex.
    pub counterparty_public_spend: String,
    /// Counterparty private view key, hex.
    pub counterparty_private_view: String,
    /// Counterparty secp256k1 public key, hex (compressed).
    pub counterparty_secp256k1_public: String,
    pub counterparty_eth_address: EthAddress,
    pub contract_swap: Option<EscrowSwap>,
    pub swap_id: Option<SwapId>,
    pub xmr_amount: MoneroAmount,
    pub eth_amount: EtherAmount,
    /// The address the XMR is (to be) locked at.
    pub lock_address: Option<String>,
    /// Keys to the summed payout wallet, appended on completion.
    pub payout: Option<PayoutKeys>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutKeys {
    pub private_spend_key: String,
    pub private_view_key: String,
    pub address: String,
}

/// File-backed store rooted at the engine's data directory.
#[derive(Debug, Clone)]
pub struct InfoStore {
    base: PathBuf,
}

impl InfoStore {
    pub fn new(base: PathBuf) -> Result<Self, StoreError> {
        if !base.exists() {
            fs::create_dir_all(&base)?;
        }
        Ok(InfoStore { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn swap_dir(&self, offer_id: OfferId) -> PathBuf {
        self.base.join(offer_id.name())
    }

    pub fn info_path(&self, offer_id: OfferId) -> PathBuf {
        self.swap_dir(offer_id).join("info.json")
    }

    /// Persists the info file, creating the swap directory on first write.
    pub fn write_info(&self, info: &InfoFile) -> Result<PathBuf, StoreError> {
        let dir = self.swap_dir(info.offer_id);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = dir.join("info.json");
        let json = serde_json::to_string_pretty(info)?;
        fs::write(&path, json)?;
        trace!("wrote info file for {} at {}", info.offer_id.name(), path.display());
        Ok(path)
    }

    pub fn load_info(&self, offer_id: OfferId) -> Result<InfoFile, StoreError> {
        let path = self.info_path(offer_id);
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Appends (or replaces) the record of a completed swap.
    pub fn record_past(&self, record: &SwapRecord) -> Result<(), StoreError> {
        let mut past = self.load_past()?;
        past.insert(record.offer_id, record.clone());
        let path = self.base.join("past.json");
        let entries: Vec<&SwapRecord> = past.values().collect();
        fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    pub fn load_past(&self) -> Result<HashMap<OfferId, SwapRecord>, StoreError> {
        let path = self.base.join("past.json");
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let json = fs::read_to_string(&path)?;
        let entries: Vec<SwapRecord> = serde_json::from_str(&json)?;
        Ok(entries.into_iter().map(|r| (r.offer_id, r)).collect())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::ExchangeRate;

    fn sample_info(offer_id: OfferId) -> InfoFile {
        InfoFile {
            offer_id,
            role: SwapRole::Taker,
            status: SwapStatus::ExpectingKeys,
            private_spend_key: "aa".repeat(32),
            private_view_key: "bb".repeat(32),
            counterparty_public_spend: "cc".repeat(32),
            counterparty_private_view: "dd".repeat(32),
            counterparty_secp256k1_public: "ee".repeat(33),
            counterparty_eth_address: EthAddress([9; 20]),
            contract_swap: None,
            swap_id: None,
            xmr_amount: MoneroAmount::from_xmr("1").unwrap(),
            eth_amount: EtherAmount::from_eth("0.05").unwrap(),
            lock_address: None,
            payout: None,
        }
    }

    #[test]
    fn info_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = InfoStore::new(dir.path().to_path_buf()).unwrap();
        let offer_id = OfferId([5; 32]);

        let mut info = sample_info(offer_id);
        store.write_info(&info).unwrap();

        info.status = SwapStatus::EthLocked;
        info.lock_address = Some("44abc".into());
        store.write_info(&info).unwrap();

        let loaded = store.load_info(offer_id).unwrap();
        assert_eq!(loaded.status, SwapStatus::EthLocked);
        assert_eq!(loaded.lock_address.as_deref(), Some("44abc"));
    }

    #[test]
    fn past_records_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = InfoStore::new(dir.path().to_path_buf()).unwrap();
        let offer_id = OfferId([6; 32]);
        let record = SwapRecord {
            offer_id,
            role: SwapRole::Maker,
            status: SwapStatus::CompletedSuccess,
            info_path: store.info_path(offer_id),
            counterparty_eth_address: EthAddress([1; 20]),
            xmr_amount: MoneroAmount::from_xmr("1").unwrap(),
            eth_amount: EtherAmount::from_eth("0.05").unwrap(),
            exchange_rate: ExchangeRate::from_eth_per_xmr("0.05").unwrap(),
            started_at: 100,
            completed_at: Some(200),
        };
        store.record_past(&record).unwrap();

        let store2 = InfoStore::new(dir.path().to_path_buf()).unwrap();
        let past = store2.load_past().unwrap();
        assert_eq!(past.len(), 1);
        assert_eq!(past.get(&offer_id).unwrap().status, SwapStatus::CompletedSuccess);
    }
}
