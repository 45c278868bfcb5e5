//! The XMR-holder's state machine. The maker locks nothing until the
//! on-chain escrow is verified, because the XMR side has no refund path of
//! its own: once locked, the funds only come back through the taker's
//! on-chain refund revealing the scalar needed to reconstruct the shared
//! wallet.

use crate::amount::{EtherAmount, MoneroAmount};
use crate::contract::{ContractError, EscrowSwap, EthChain, Stage};
use crate::crypto::keys::{spend_key_from_contract_secret, Curve25519Secret, PrivateKeyPair, PublicKeyPair};
use crate::error::ProtocolError;
use crate::message::{NotifyClaimed, NotifyXmrLock, ProtocolMessage};
use crate::monero::data_objects::GenerateFromKeys;
use crate::monero::XmrWallet;
use crate::protocol::backend::Backend;
use crate::protocol::keys::{CounterpartyKeys, SwapKeySet};
use crate::protocol::{expect_message, retry_chain, SwapControl};
use crate::storage::{InfoFile, InfoStore, PayoutKeys};
use crate::transport::MessageTransport;
use crate::types::{Offer, SwapId, SwapStatus, SwapRole};
use log::*;
use rand_core::OsRng;

pub struct MakerSwap<C: EthChain, W: XmrWallet> {
    backend: Backend<C, W>,
    transport: Box<dyn MessageTransport>,
    store: InfoStore,
    control: SwapControl,
    offer: Offer,
    /// XMR we lock; fixed once the taker states the ETH it brings.
    xmr_amount: MoneroAmount,
    /// ETH we expect from the escrow.
    eth_amount: EtherAmount,
    keys: SwapKeySet,
    counterparty: Option<CounterpartyKeys>,
    swap: Option<EscrowSwap>,
    swap_id: Option<SwapId>,
    lock_address: Option<String>,
    xmr_locked: bool,
    payout: Option<PayoutKeys>,
}

enum Waited<T> {
    Cancelled,
    Deadline,
    Msg(T),
    Poll,
}

impl<C: EthChain, W: XmrWallet> MakerSwap<C, W> {
    pub fn new(
        backend: Backend<C, W>,
        transport: Box<dyn MessageTransport>,
        store: InfoStore,
        control: SwapControl,
        offer: Offer,
    ) -> Result<Self, ProtocolError> {
        let keys = SwapKeySet::generate(&mut OsRng)?;
        Ok(MakerSwap {
            backend,
            transport,
            store,
            control,
            offer,
            xmr_amount: MoneroAmount::from_piconero(0),
            eth_amount: EtherAmount::from_wei(0),
            keys,
            counterparty: None,
            swap: None,
            swap_id: None,
            lock_address: None,
            xmr_locked: false,
            payout: None,
        })
    }

    pub async fn run(mut self) -> SwapStatus {
        let status = match self.drive().await {
            Ok(status) => status,
            Err(e) => {
                warn!("maker swap {} errored: {e}", self.offer.id.name());
                self.unwind().await
            }
        };
        info!("maker swap {} finished with {status}", self.offer.id.name());
        self.control.publish(status);
        if let Err(e) = self.persist(status) {
            error!("failed to persist terminal state for {}: {e}", self.offer.id.name());
        }
        self.transport.close().await;
        status
    }

    async fn drive(&mut self) -> Result<SwapStatus, ProtocolError> {
        self.persist(SwapStatus::ExpectingKeys)?;

        // the taker opens the protocol
        let peer_keys = tokio::select! {
            biased;
            _ = self.control.cancelled() => return Ok(SwapStatus::CompletedAbort),
            res = expect_message(&mut self.transport, "ExpectingKeys", |m| match m {
                ProtocolMessage::SendKeys(inner) => Ok(inner),
                other => Err(other),
            }) => res?,
        };
        let counterparty = CounterpartyKeys::verify(&peer_keys)?;

        // fix the amounts from the taker's offered ETH and our rate
        let eth_amount = counterparty.eth_amount().ok_or_else(|| {
            ProtocolError::InvalidState("taker did not state the ETH it provides".into())
        })?;
        let xmr_amount = self
            .offer
            .exchange_rate
            .xmr_for(eth_amount)
            .ok_or_else(|| ProtocolError::InvalidState("unrepresentable amount".into()))?;
        if xmr_amount < self.offer.min_amount || xmr_amount > self.offer.max_amount {
            return Err(ProtocolError::InvalidState(format!(
                "taker asked for {xmr_amount}, outside offer bounds"
            )));
        }
        self.eth_amount = eth_amount;
        self.xmr_amount = xmr_amount;
        self.counterparty = Some(counterparty);

        let reply = self.keys.send_keys_message(
            self.offer.id,
            self.backend.chain().account(),
            Some(xmr_amount),
            None,
        );
        self.transport.send(ProtocolMessage::SendKeys(reply)).await?;
        self.control.publish(SwapStatus::KeysExchanged);
        self.persist(SwapStatus::KeysExchanged)?;

        // wait for the escrow lock; nothing of ours is at risk yet
        let lock_wait = 2 * self.backend.swap_timeout();
        let event = tokio::select! {
            biased;
            _ = self.control.cancelled() => Waited::Cancelled,
            _ = tokio::time::sleep(lock_wait) => Waited::Deadline,
            res = expect_message(&mut self.transport, "KeysExchanged", |m| match m {
                ProtocolMessage::NotifyEthLocked(inner) => Ok(inner),
                other => Err(other),
            }) => Waited::Msg(res?),
        };
        let eth_locked = match event {
            Waited::Msg(m) => m,
            Waited::Cancelled => return Ok(SwapStatus::CompletedAbort),
            Waited::Deadline => {
                warn!("taker never locked ETH; aborting");
                return Ok(SwapStatus::CompletedAbort);
            }
            Waited::Poll => unreachable!("no poll branch in this select"),
        };

        // the claimed swap id must resolve to a New log that matches what
        // we agreed to, before any XMR moves
        let swap = self.find_new_bounded(eth_locked.contract_swap_id).await?;
        self.check_contract(&swap).await?;
        self.swap = Some(swap);
        self.swap_id = Some(eth_locked.contract_swap_id);
        self.persist(SwapStatus::KeysExchanged)?;

        // lock the XMR to the summed address
        let shared = PublicKeyPair::sum(self.keys.public(), self.counterparty()?.public_pair());
        let address = shared.address(self.backend.env())?;
        {
            let mut wallet = self.backend.wallet().lock().await;
            let balance = wallet.get_balance(0).await?;
            if balance.unlocked_balance < xmr_amount {
                return Err(ProtocolError::Wallet(
                    crate::monero::WalletError::InsufficientFunds,
                ));
            }
            let receipt = wallet.transfer(&address, 0, xmr_amount).await?;
            info!("locked {xmr_amount} at {address} in tx {}", receipt.tx_hash);
            wallet.refresh().await?;
        }
        self.lock_address = Some(address.clone());
        self.xmr_locked = true;
        self.persist(SwapStatus::XmrLocked)?;
        self.transport
            .send(ProtocolMessage::NotifyXmrLock(NotifyXmrLock { address }))
            .await?;
        self.control.publish(SwapStatus::XmrLocked);

        // from here on the only exits are claim or reclaim
        let poll = self.backend.poll_interval();
        loop {
            if let Some(status) = self.check_progress().await? {
                return Ok(status);
            }
            let event: Waited<ProtocolMessage> = tokio::select! {
                biased;
                _ = tokio::time::sleep(poll) => Waited::Poll,
                res = expect_message(&mut self.transport, "XMRLocked", |m| match m {
                    ProtocolMessage::NotifyReady(_) | ProtocolMessage::NotifyRefund(_) => Ok(m),
                    other => Err(other),
                }) => Waited::Msg(res?),
            };
            if let Waited::Msg(m) = event {
                debug!("peer message in XMRLocked: {m}");
            }
        }
    }

    /// One pass over the on-chain state: reclaim if the taker refunded,
    /// claim while the window is open, give up past the follow-up window.
    async fn check_progress(&mut self) -> Result<Option<SwapStatus>, ProtocolError> {
        let swap = self.swap()?;
        let id = swap.swap_id();
        let poll = self.backend.poll_interval();
        let chain = self.backend.chain();

        if let Some(secret) = retry_chain(poll, || chain.find_refunded(id)).await? {
            info!("taker refunded; reclaiming the locked XMR");
            let status = self.reclaim_xmr(secret).await?;
            return Ok(Some(status));
        }

        let stage = retry_chain(poll, || chain.stage(id)).await?;
        let now = chain.latest_time().await?;
        if stage == Stage::Ready {
            self.control.publish(SwapStatus::ContractReady);
        }

        if now < swap.timeout_1
            && (stage == Stage::Ready || (stage == Stage::Pending && now >= swap.timeout_0))
        {
            match chain.claim(&swap, self.keys.contract_secret()).await {
                Ok(tx_hash) => {
                    info!("claimed {} in tx {tx_hash}", swap.value);
                    let _ = self
                        .transport
                        .send(ProtocolMessage::NotifyClaimed(NotifyClaimed { tx_hash }))
                        .await;
                    return Ok(Some(SwapStatus::CompletedSuccess));
                }
                Err(ContractError::Reverted(e)) => {
                    // raced the refund window; the next pass sees the log
                    debug!("claim reverted: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if now >= swap.timeout_1 + self.backend.refund_follow_up().as_secs() {
            warn!(
                "follow-up window expired with no Refunded log; the XMR at {} stays locked until the taker refunds",
                self.lock_address.as_deref().unwrap_or("<unknown>")
            );
            return Ok(Some(SwapStatus::CompletedRefund));
        }

        Ok(None)
    }

    /// Rebuilds the shared wallet from the taker's revealed spend scalar.
    async fn reclaim_xmr(&mut self, secret: [u8; 32]) -> Result<SwapStatus, ProtocolError> {
        let taker_spend = spend_key_from_contract_secret(secret)?;
        let counterparty = self.counterparty()?.clone();
        let ours = self.keys.keypair();
        let payout = PrivateKeyPair::from_keys(
            Curve25519Secret::from(taker_spend.as_scalar() + ours.spend().as_scalar()),
            Curve25519Secret::from(
                counterparty.private_view().as_scalar() + ours.view().as_scalar(),
            ),
        );
        let address = payout.address(self.backend.env())?;
        if let Some(lock) = &self.lock_address {
            if *lock != address {
                warn!("reclaim address {address} differs from lock address {lock}");
            }
        }

        self.payout = Some(PayoutKeys {
            private_spend_key: payout.spend().to_hex(),
            private_view_key: payout.view().to_hex(),
            address: address.clone(),
        });
        self.persist(SwapStatus::XmrLocked)?;

        let mut wallet = self.backend.wallet().lock().await;
        wallet
            .generate_from_keys(GenerateFromKeys {
                filename: format!("{}-reclaim", self.offer.id.name()),
                password: String::new(),
                address: address.clone(),
                spend_key: Some(payout.spend().to_hex()),
                view_key: payout.view().to_hex(),
                restore_height: 0,
            })
            .await?;
        wallet.refresh().await?;
        info!("reclaimed XMR wallet restored at {address}");
        Ok(SwapStatus::CompletedRefund)
    }

    /// Polls for the `New` log within the configured search window.
    async fn find_new_bounded(&self, id: SwapId) -> Result<EscrowSwap, ProtocolError> {
        let poll = self.backend.poll_interval();
        let deadline = tokio::time::Instant::now() + self.backend.log_search_window();
        loop {
            let chain = self.backend.chain();
            if let Some(swap) = retry_chain(poll, || chain.find_new(id)).await? {
                return Ok(swap);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProtocolError::ContractMismatch(format!(
                    "no New log found for swap id {id}"
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// The escrow must commit to exactly the keys, parties and value this
    /// swap agreed on. Any mismatch aborts before the XMR lock.
    async fn check_contract(&self, swap: &EscrowSwap) -> Result<(), ProtocolError> {
        let counterparty = self.counterparty()?;
        if swap.pub_key_claim != self.keys.secp_public().keccak256() {
            return Err(ProtocolError::ContractMismatch("claim key is not ours".into()));
        }
        if swap.pub_key_refund != counterparty.secp_public().keccak256() {
            return Err(ProtocolError::ContractMismatch(
                "refund key is not the taker's".into(),
            ));
        }
        if swap.claimer != self.backend.chain().account() {
            return Err(ProtocolError::ContractMismatch(
                "we are not the claimer of this escrow".into(),
            ));
        }
        if swap.owner != counterparty.eth_address() {
            return Err(ProtocolError::ContractMismatch(
                "escrow owner is not the taker".into(),
            ));
        }
        if swap.value < self.eth_amount {
            return Err(ProtocolError::ContractMismatch(format!(
                "escrow value {} is below the agreed {}",
                swap.value, self.eth_amount
            )));
        }
        let now = self.backend.chain().latest_time().await?;
        if swap.timeout_0 <= now || swap.timeout_1 <= swap.timeout_0 {
            return Err(ProtocolError::ContractMismatch("escrow timeouts are inconsistent".into()));
        }
        Ok(())
    }

    async fn unwind(&mut self) -> SwapStatus {
        if !self.xmr_locked {
            return SwapStatus::CompletedAbort;
        }
        // XMR is locked; keep watching the chain without the peer
        let poll = self.backend.poll_interval();
        loop {
            match self.check_progress().await {
                Ok(Some(status)) => return status,
                Ok(None) => tokio::time::sleep(poll).await,
                Err(e) => {
                    error!("maker swap {} could not unwind: {e}", self.offer.id.name());
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    fn counterparty(&self) -> Result<&CounterpartyKeys, ProtocolError> {
        self.counterparty
            .as_ref()
            .ok_or_else(|| ProtocolError::InvalidState("no counterparty keys yet".into()))
    }

    fn swap(&self) -> Result<EscrowSwap, ProtocolError> {
        self.swap.ok_or_else(|| ProtocolError::InvalidState("no escrow swap yet".into()))
    }

    fn persist(&self, status: SwapStatus) -> Result<(), ProtocolError> {
        let info = InfoFile {
            offer_id: self.offer.id,
            role: SwapRole::Maker,
            status,
            private_spend_key: self.keys.keypair().spend().to_hex(),
            private_view_key: self.keys.keypair().view().to_hex(),
            counterparty_public_spend: self
                .counterparty
                .as_ref()
                .map(|c| c.public_spend().to_hex())
                .unwrap_or_default(),
            counterparty_private_view: self
                .counterparty
                .as_ref()
                .map(|c| c.private_view().to_hex())
                .unwrap_or_default(),
            counterparty_secp256k1_public: self
                .counterparty
                .as_ref()
                .map(|c| c.secp_public().to_hex())
                .unwrap_or_default(),
            counterparty_eth_address: self
                .counterparty
                .as_ref()
                .map(|c| c.eth_address())
                .unwrap_or_default(),
            contract_swap: self.swap,
            swap_id: self.swap_id,
            xmr_amount: self.xmr_amount,
            eth_amount: self.eth_amount,
            lock_address: self.lock_address.clone(),
            payout: self.payout.clone(),
        };
        self.store.write_info(&info)?;
        Ok(())
    }
}
