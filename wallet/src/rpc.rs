use async_trait::async_trait;
use libquench::amount::MoneroAmount;
use libquench::monero::data_objects::{Balance, GenerateFromKeys, TransferReceipt};
use libquench::monero::{WalletError, XmrWallet};
use log::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// JSON-RPC 2.0 client for `monero-wallet-rpc`.
pub struct MoneroWalletRpc {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct GetAddressResult {
    address: String,
}

#[derive(Debug, Deserialize)]
struct GetBalanceResult {
    balance: u64,
    unlocked_balance: u64,
}

#[derive(Debug, Deserialize)]
struct TransferResult {
    tx_hash: String,
    fee: u64,
}

#[derive(Debug, Deserialize)]
struct SweepAllResult {
    tx_hash_list: Vec<String>,
    #[serde(default)]
    fee_list: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct GetHeightResult {
    height: u64,
}

#[derive(Debug, Serialize)]
struct Destination<'a> {
    amount: u64,
    address: &'a str,
}

impl MoneroWalletRpc {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let endpoint =
            if endpoint.ends_with("/json_rpc") { endpoint } else { format!("{endpoint}/json_rpc") };
        MoneroWalletRpc { endpoint, client: reqwest::Client::new() }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, WalletError> {
        trace!("wallet rpc: {method}");
        let body = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Http(e.to_string()))?;
        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| WalletError::Deserialize(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(WalletError::Rpc(format!("{method}: {} (code {})", err.message, err.code)));
        }
        envelope
            .result
            .ok_or_else(|| WalletError::Deserialize(format!("{method}: missing result")))
    }
}

#[async_trait]
impl XmrWallet for MoneroWalletRpc {
    async fn open_wallet(&mut self, filename: &str, password: &str) -> Result<(), WalletError> {
        let _: Empty = self
            .call("open_wallet", json!({ "filename": filename, "password": password }))
            .await
            .map_err(|e| match e {
                WalletError::Rpc(msg) if msg.contains("Failed to open") => {
                    WalletError::WalletNotFound(filename.to_string())
                }
                other => other,
            })?;
        Ok(())
    }

    async fn close_wallet(&mut self) -> Result<(), WalletError> {
        let _: Empty = self.call("close_wallet", json!({})).await?;
        Ok(())
    }

    async fn create_wallet(&mut self, filename: &str, password: &str) -> Result<(), WalletError> {
        let _: Empty = self
            .call(
                "create_wallet",
                json!({ "filename": filename, "password": password, "language": "English" }),
            )
            .await?;
        Ok(())
    }

    async fn get_address(&self, account: u32) -> Result<String, WalletError> {
        let result: GetAddressResult =
            self.call("get_address", json!({ "account_index": account })).await?;
        Ok(result.address)
    }

    async fn get_balance(&self, account: u32) -> Result<Balance, WalletError> {
        let result: GetBalanceResult =
            self.call("get_balance", json!({ "account_index": account })).await?;
        Ok(Balance {
            balance: MoneroAmount::from_piconero(result.balance),
            unlocked_balance: MoneroAmount::from_piconero(result.unlocked_balance),
        })
    }

    async fn transfer(
        &mut self,
        to: &str,
        account: u32,
        amount: MoneroAmount,
    ) -> Result<TransferReceipt, WalletError> {
        let destinations = [Destination { amount: amount.to_piconero(), address: to }];
        let result: TransferResult = self
            .call(
                "transfer",
                json!({ "destinations": destinations, "account_index": account }),
            )
            .await?;
        debug!("transferred {amount} to {to} in tx {}", result.tx_hash);
        Ok(TransferReceipt {
            tx_hash: result.tx_hash,
            fee: MoneroAmount::from_piconero(result.fee),
        })
    }

    async fn sweep_all(
        &mut self,
        to: &str,
        account: u32,
    ) -> Result<Vec<TransferReceipt>, WalletError> {
        let result: SweepAllResult = self
            .call("sweep_all", json!({ "address": to, "account_index": account }))
            .await?;
        let mut fees = result.fee_list.into_iter();
        Ok(result
            .tx_hash_list
            .into_iter()
            .map(|tx_hash| TransferReceipt {
                tx_hash,
                fee: MoneroAmount::from_piconero(fees.next().unwrap_or_default()),
            })
            .collect())
    }

    async fn generate_from_keys(&mut self, req: GenerateFromKeys) -> Result<(), WalletError> {
        let mut params = json!({
            "filename": req.filename,
            "password": req.password,
            "address": req.address,
            "viewkey": req.view_key,
            "restore_height": req.restore_height,
        });
        if let Some(spend_key) = &req.spend_key {
            params["spendkey"] = json!(spend_key);
        }
        let _: Empty = self.call("generate_from_keys", params).await?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), WalletError> {
        let _: Empty = self.call("refresh", json!({})).await?;
        Ok(())
    }

    async fn get_height(&self) -> Result<u64, WalletError> {
        let result: GetHeightResult = self.call("get_height", json!({})).await?;
        Ok(result.height)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn endpoint_normalisation() {
        let rpc = MoneroWalletRpc::new("http://127.0.0.1:18083");
        assert_eq!(rpc.endpoint, "http://127.0.0.1:18083/json_rpc");
        let rpc = MoneroWalletRpc::new("http://127.0.0.1:18083/json_rpc");
        assert_eq!(rpc.endpoint, "http://127.0.0.1:18083/json_rpc");
    }

    #[test]
    fn error_envelope_parses() {
        let raw = r#"{"id":"0","jsonrpc":"2.0","error":{"code":-21,"message":"Wallet already exists."}}"#;
        let envelope: RpcEnvelope<Empty> = serde_json::from_str(raw).unwrap();
        assert!(envelope.result.is_none());
        let err = envelope.error.unwrap();
        assert_eq!(err.code, -21);
        assert_eq!(err.message, "Wallet already exists.");
    }

    #[test]
    fn balance_envelope_parses() {
        let raw = r#"{"id":"0","jsonrpc":"2.0","result":{"balance":1250000000000,"unlocked_balance":1000000000000,"multisig_import_needed":false}}"#;
        let envelope: RpcEnvelope<GetBalanceResult> = serde_json::from_str(raw).unwrap();
        let result = envelope.result.unwrap();
        assert_eq!(result.balance, 1_250_000_000_000);
        assert_eq!(result.unlocked_balance, 1_000_000_000_000);
    }
}
