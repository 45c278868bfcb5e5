//! In-memory wallet backend for tests. All wallets created from one
//! [`DummyXmrNetwork`] share a ledger keyed by address, so a transfer made
//! through one party's wallet is visible to the other party's view-only
//! import.

use crate::amount::MoneroAmount;
use crate::monero::data_objects::{Balance, GenerateFromKeys, TransferReceipt};
use crate::monero::{WalletError, XmrWallet};
use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct DummyXmrNetwork {
    ledger: Mutex<HashMap<String, MoneroAmount>>,
    height: AtomicU64,
    tx_counter: AtomicU64,
}

impl DummyXmrNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(DummyXmrNetwork {
            ledger: Mutex::new(HashMap::new()),
            height: AtomicU64::new(2_500_000),
            tx_counter: AtomicU64::new(0),
        })
    }

    pub fn credit(&self, address: &str, amount: MoneroAmount) {
        let mut ledger = self.ledger.lock().unwrap();
        let balance = ledger.entry(address.to_string()).or_insert(MoneroAmount::from_piconero(0));
        *balance = balance.checked_add(amount).unwrap_or(*balance);
    }

    pub fn balance_of(&self, address: &str) -> MoneroAmount {
        let ledger = self.ledger.lock().unwrap();
        ledger.get(address).copied().unwrap_or(MoneroAmount::from_piconero(0))
    }

    pub fn mine(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }

    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn transfer(&self, from: &str, to: &str, amount: MoneroAmount) -> Result<String, WalletError> {
        let mut ledger = self.ledger.lock().unwrap();
        let from_balance =
            ledger.entry(from.to_string()).or_insert(MoneroAmount::from_piconero(0));
        let rest = from_balance.checked_sub(amount).ok_or(WalletError::InsufficientFunds)?;
        *from_balance = rest;
        let to_balance = ledger.entry(to.to_string()).or_insert(MoneroAmount::from_piconero(0));
        *to_balance = to_balance.checked_add(amount).unwrap_or(*to_balance);
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{n:064x}"))
    }
}

struct WalletRecord {
    address: String,
    view_only: bool,
}

pub struct DummyWallet {
    network: Arc<DummyXmrNetwork>,
    wallets: HashMap<String, WalletRecord>,
    open: Option<String>,
}

impl DummyWallet {
    /// A wallet daemon whose primary wallet holds `funds` at `address`.
    pub fn new(network: Arc<DummyXmrNetwork>, address: &str, funds: MoneroAmount) -> Self {
        network.credit(address, funds);
        let mut wallets = HashMap::new();
        wallets.insert(
            "primary".to_string(),
            WalletRecord { address: address.to_string(), view_only: false },
        );
        DummyWallet { network, wallets, open: Some("primary".to_string()) }
    }

    fn open_record(&self) -> Result<&WalletRecord, WalletError> {
        let filename = self.open.as_ref().ok_or(WalletError::NotOpen)?;
        self.wallets.get(filename).ok_or_else(|| WalletError::WalletNotFound(filename.clone()))
    }
}

#[async_trait]
impl XmrWallet for DummyWallet {
    async fn open_wallet(&mut self, filename: &str, _password: &str) -> Result<(), WalletError> {
        if !self.wallets.contains_key(filename) {
            return Err(WalletError::WalletNotFound(filename.to_string()));
        }
        self.open = Some(filename.to_string());
        Ok(())
    }

    async fn close_wallet(&mut self) -> Result<(), WalletError> {
        self.open = None;
        Ok(())
    }

    async fn create_wallet(&mut self, filename: &str, _password: &str) -> Result<(), WalletError> {
        let address = format!("dummy:{filename}");
        self.wallets
            .insert(filename.to_string(), WalletRecord { address, view_only: false });
        self.open = Some(filename.to_string());
        Ok(())
    }

    async fn get_address(&self, _account: u32) -> Result<String, WalletError> {
        Ok(self.open_record()?.address.clone())
    }

    async fn get_balance(&self, _account: u32) -> Result<Balance, WalletError> {
        let address = &self.open_record()?.address;
        let balance = self.network.balance_of(address);
        Ok(Balance { balance, unlocked_balance: balance })
    }

    async fn transfer(
        &mut self,
        to: &str,
        _account: u32,
        amount: MoneroAmount,
    ) -> Result<TransferReceipt, WalletError> {
        let record = self.open_record()?;
        if record.view_only {
            return Err(WalletError::Rpc("wallet is view-only".into()));
        }
        let tx_hash = self.network.transfer(&record.address, to, amount)?;
        debug!("dummy wallet: sent {amount} to {to}");
        Ok(TransferReceipt { tx_hash, fee: MoneroAmount::from_piconero(0) })
    }

    async fn sweep_all(
        &mut self,
        to: &str,
        account: u32,
    ) -> Result<Vec<TransferReceipt>, WalletError> {
        let balance = self.get_balance(account).await?.unlocked_balance;
        if balance.is_zero() {
            return Ok(vec![]);
        }
        let receipt = self.transfer(to, account, balance).await?;
        Ok(vec![receipt])
    }

    async fn generate_from_keys(&mut self, req: GenerateFromKeys) -> Result<(), WalletError> {
        let view_only = req.spend_key.is_none();
        self.wallets.insert(
            req.filename.clone(),
            WalletRecord { address: req.address, view_only },
        );
        self.open = Some(req.filename);
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn get_height(&self) -> Result<u64, WalletError> {
        Ok(self.network.height())
    }
}
