use crate::amount::MoneroAmount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: MoneroAmount,
    pub unlocked_balance: MoneroAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_hash: String,
    pub fee: MoneroAmount,
}

/// Parameters for `generate_from_keys`. A missing spend key creates a
/// view-only wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateFromKeys {
    pub filename: String,
    pub password: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend_key: Option<String>,
    pub view_key: String,
    pub restore_height: u64,
}
