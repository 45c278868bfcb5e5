use crate::amount::MoneroAmount;
use crate::monero::data_objects::{Balance, GenerateFromKeys, TransferReceipt};
use crate::monero::WalletError;
use async_trait::async_trait;

/// The `monero-wallet-rpc` surface the swap engine consumes.
#[async_trait]
pub trait XmrWallet: Send + Sync + 'static {
    async fn open_wallet(&mut self, filename: &str, password: &str) -> Result<(), WalletError>;

    async fn close_wallet(&mut self) -> Result<(), WalletError>;

    async fn create_wallet(&mut self, filename: &str, password: &str) -> Result<(), WalletError>;

    /// Primary address of the given account in the open wallet.
    async fn get_address(&self, account: u32) -> Result<String, WalletError>;

    async fn get_balance(&self, account: u32) -> Result<Balance, WalletError>;

    async fn transfer(
        &mut self,
        to: &str,
        account: u32,
        amount: MoneroAmount,
    ) -> Result<TransferReceipt, WalletError>;

    /// Sends the whole unlocked balance of the account to `to`.
    async fn sweep_all(&mut self, to: &str, account: u32) -> Result<Vec<TransferReceipt>, WalletError>;

    /// Creates (and opens) a wallet from explicit keys. A view-only wallet
    /// is created when no spend key is given.
    async fn generate_from_keys(&mut self, req: GenerateFromKeys) -> Result<(), WalletError>;

    async fn refresh(&mut self) -> Result<(), WalletError>;

    async fn get_height(&self) -> Result<u64, WalletError>;
}
