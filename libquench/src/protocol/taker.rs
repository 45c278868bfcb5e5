//! The ETH-holder's state machine. The taker locks ether in the escrow,
//! waits for the maker's XMR lock, flips the contract to Ready, and either
//! observes the maker's claim (gaining the XMR spend key) or unwinds
//! through `refund`.

use crate::amount::{EtherAmount, MoneroAmount};
use crate::contract::{ContractError, EscrowSwap, EthChain, Stage};
use crate::crypto::keys::{spend_key_from_contract_secret, PrivateKeyPair, PublicKeyPair};
use crate::error::ProtocolError;
use crate::message::{NotifyEthLocked, NotifyRefund, ProtocolMessage};
use crate::monero::data_objects::GenerateFromKeys;
use crate::monero::XmrWallet;
use crate::protocol::backend::Backend;
use crate::protocol::keys::{CounterpartyKeys, SwapKeySet};
use crate::protocol::{expect_message, retry_chain, SwapControl};
use crate::storage::{InfoFile, InfoStore, PayoutKeys};
use crate::transport::MessageTransport;
use crate::types::{OfferId, SwapId, SwapStatus, SwapRole};
use log::*;
use rand_core::{OsRng, RngCore};

pub struct TakerSwap<C: EthChain, W: XmrWallet> {
    backend: Backend<C, W>,
    transport: Box<dyn MessageTransport>,
    store: InfoStore,
    control: SwapControl,
    offer_id: OfferId,
    /// XMR we expect to receive.
    xmr_amount: MoneroAmount,
    /// ETH we lock in the escrow.
    eth_amount: EtherAmount,
    keys: SwapKeySet,
    counterparty: Option<CounterpartyKeys>,
    swap: Option<EscrowSwap>,
    swap_id: Option<SwapId>,
    lock_address: Option<String>,
    payout: Option<PayoutKeys>,
}

enum Waited<T> {
    Cancelled,
    Deadline,
    Msg(T),
    Poll,
}

impl<C: EthChain, W: XmrWallet> TakerSwap<C, W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Backend<C, W>,
        transport: Box<dyn MessageTransport>,
        store: InfoStore,
        control: SwapControl,
        offer_id: OfferId,
        xmr_amount: MoneroAmount,
        eth_amount: EtherAmount,
    ) -> Result<Self, ProtocolError> {
        let keys = SwapKeySet::generate(&mut OsRng)?;
        Ok(TakerSwap {
            backend,
            transport,
            store,
            control,
            offer_id,
            xmr_amount,
            eth_amount,
            keys,
            counterparty: None,
            swap: None,
            swap_id: None,
            lock_address: None,
            payout: None,
        })
    }

    /// Drives the swap to a terminal status. Errors inside the protocol
    /// are converted to the safest terminal transition available.
    pub async fn run(mut self) -> SwapStatus {
        let status = match self.drive().await {
            Ok(status) => status,
            Err(e) => {
                warn!("taker swap {} errored: {e}", self.offer_id.name());
                self.unwind().await
            }
        };
        info!("taker swap {} finished with {status}", self.offer_id.name());
        self.control.publish(status);
        if let Err(e) = self.persist(status) {
            error!("failed to persist terminal state for {}: {e}", self.offer_id.name());
        }
        self.transport.close().await;
        status
    }

    async fn drive(&mut self) -> Result<SwapStatus, ProtocolError> {
        self.persist(SwapStatus::ExpectingKeys)?;

        // the taker opens the protocol by sending its keys
        let our_keys = self.keys.send_keys_message(
            self.offer_id,
            self.backend.chain().account(),
            None,
            Some(self.eth_amount),
        );
        self.transport.send(ProtocolMessage::SendKeys(our_keys)).await?;

        let peer_keys = tokio::select! {
            biased;
            _ = self.control.cancelled() => return Ok(SwapStatus::CompletedAbort),
            res = expect_message(&mut self.transport, "ExpectingKeys", |m| match m {
                ProtocolMessage::SendKeys(inner) => Ok(inner),
                other => Err(other),
            }) => res?,
        };

        let counterparty = CounterpartyKeys::verify(&peer_keys)?;
        if let Some(promised) = counterparty.xmr_amount() {
            if promised < self.xmr_amount {
                return Err(ProtocolError::InvalidState(format!(
                    "maker promised {promised}, expected {}",
                    self.xmr_amount
                )));
            }
        }
        self.counterparty = Some(counterparty);
        self.control.publish(SwapStatus::KeysExchanged);
        self.persist(SwapStatus::KeysExchanged)?;

        // lock the ETH
        let claim_key = self.counterparty()?.secp_public().keccak256();
        let refund_key = self.keys.secp_public().keccak256();
        let claimer = self.counterparty()?.eth_address();
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);
        let timeout = self.backend.swap_timeout();
        let value = self.eth_amount;
        let poll = self.backend.poll_interval();
        let chain = self.backend.chain();
        let receipt = retry_chain(poll, || {
            chain.new_swap(claim_key, refund_key, claimer, timeout, nonce, value)
        })
        .await?;
        info!(
            "locked {} in escrow swap {} (t0={}, t1={})",
            value, receipt.swap_id, receipt.swap.timeout_0, receipt.swap.timeout_1
        );
        self.swap = Some(receipt.swap);
        self.swap_id = Some(receipt.swap_id);
        self.persist(SwapStatus::EthLocked)?;

        self.transport
            .send(ProtocolMessage::NotifyEthLocked(NotifyEthLocked {
                address: self.backend.chain().contract_address(),
                contract_swap_id: receipt.swap_id,
            }))
            .await?;
        self.control.publish(SwapStatus::EthLocked);

        // wait for the maker's XMR lock; at t0 the swap is refundable
        let event = tokio::select! {
            biased;
            _ = self.control.cancelled() => Waited::Cancelled,
            _ = self.backend.sleep_until_unix(receipt.swap.timeout_0) => Waited::Deadline,
            res = expect_message(&mut self.transport, "ETHLocked", |m| match m {
                ProtocolMessage::NotifyXmrLock(inner) => Ok(inner),
                other => Err(other),
            }) => Waited::Msg(res?),
        };
        let xmr_lock = match event {
            Waited::Msg(m) => m,
            Waited::Cancelled => {
                info!("swap {} cancelled while awaiting XMR lock", self.offer_id.name());
                return self.refund_when_safe().await;
            }
            Waited::Deadline => {
                warn!("t0 reached without an XMR lock; refunding");
                return self.refund_when_safe().await;
            }
            Waited::Poll => unreachable!("no poll branch in this select"),
        };

        // the lock address must be the sum of both parties' public pairs
        let shared = PublicKeyPair::sum(self.keys.public(), self.counterparty()?.public_pair());
        let expected_address = shared.address(self.backend.env())?;
        if xmr_lock.address != expected_address {
            warn!(
                "maker claims XMR locked at {}, expected {expected_address}",
                xmr_lock.address
            );
            return Err(ProtocolError::ContractMismatch(
                "XMR lock address does not match the summed keys".into(),
            ));
        }
        self.lock_address = Some(expected_address.clone());
        self.confirm_xmr_balance(&expected_address).await?;

        // the off-chain asset is locked: flip the contract to Ready
        let swap = self.swap()?;
        let chain = self.backend.chain();
        retry_chain(poll, || chain.set_ready(&swap)).await?;
        self.transport
            .send(ProtocolMessage::NotifyReady(crate::message::NotifyReady {}))
            .await?;
        self.control.publish(SwapStatus::ContractReady);
        self.persist(SwapStatus::ContractReady)?;

        // await the maker's claim; at t1 the refund window reopens
        loop {
            let event: Waited<ProtocolMessage> = tokio::select! {
                biased;
                _ = self.control.cancelled() => Waited::Cancelled,
                _ = self.backend.sleep_until_unix(swap.timeout_1) => Waited::Deadline,
                res = expect_message(&mut self.transport, "ContractReady", |m| match m {
                    ProtocolMessage::NotifyClaimed(_) => Ok(m),
                    other => Err(other),
                }) => Waited::Msg(res?),
                _ = tokio::time::sleep(poll) => Waited::Poll,
            };
            match event {
                Waited::Cancelled | Waited::Deadline => return self.refund_when_safe().await,
                Waited::Msg(_) | Waited::Poll => {
                    // a claim is only believed once its log is on chain
                    if let Some(secret) =
                        self.backend.chain().find_claimed(self.swap_id()?).await?
                    {
                        return self.complete_success(secret).await;
                    }
                }
            }
        }
    }

    /// Builds the summed wallet after the maker's claim revealed their
    /// spend scalar.
    async fn complete_success(&mut self, secret: [u8; 32]) -> Result<SwapStatus, ProtocolError> {
        let maker_spend = spend_key_from_contract_secret(secret)?;
        let counterparty = self.counterparty()?.clone();
        let ours = self.keys.keypair();
        let payout = PrivateKeyPair::from_keys(
            crate::crypto::keys::Curve25519Secret::from(
                maker_spend.as_scalar() + ours.spend().as_scalar(),
            ),
            crate::crypto::keys::Curve25519Secret::from(
                counterparty.private_view().as_scalar() + ours.view().as_scalar(),
            ),
        );
        let address = payout.address(self.backend.env())?;
        info!("claim observed; payout wallet address is {address}");

        // keys go to disk before any wallet call can fail
        self.payout = Some(PayoutKeys {
            private_spend_key: payout.spend().to_hex(),
            private_view_key: payout.view().to_hex(),
            address: address.clone(),
        });
        self.persist(SwapStatus::ContractReady)?;

        let mut wallet = self.backend.wallet().lock().await;
        wallet
            .generate_from_keys(GenerateFromKeys {
                filename: format!("{}-claim", self.offer_id.name()),
                password: String::new(),
                address,
                spend_key: Some(payout.spend().to_hex()),
                view_key: payout.view().to_hex(),
                restore_height: 0,
            })
            .await?;
        wallet.refresh().await?;
        Ok(SwapStatus::CompletedSuccess)
    }

    /// Imports the shared address view-only and checks the locked balance
    /// before committing to `set_ready`.
    async fn confirm_xmr_balance(&mut self, address: &str) -> Result<(), ProtocolError> {
        let shared_view = crate::crypto::keys::Curve25519Secret::from(
            self.counterparty()?.private_view().as_scalar() + self.keys.keypair().view().as_scalar(),
        );
        let mut wallet = self.backend.wallet().lock().await;
        wallet
            .generate_from_keys(GenerateFromKeys {
                filename: format!("{}-view", self.offer_id.name()),
                password: String::new(),
                address: address.to_string(),
                spend_key: None,
                view_key: shared_view.to_hex(),
                restore_height: 0,
            })
            .await?;
        wallet.refresh().await?;
        let balance = wallet.get_balance(0).await?;
        wallet.close_wallet().await?;
        if balance.balance < self.xmr_amount {
            return Err(ProtocolError::ContractMismatch(format!(
                "locked XMR balance {} is below the expected {}",
                balance.balance, self.xmr_amount
            )));
        }
        debug!("confirmed {} locked at {address}", balance.balance);
        Ok(())
    }

    /// Takes the safest terminal transition available for the current
    /// contract stage: refund where the window allows it, success if the
    /// maker claims while we wait, abort if nothing was ever locked.
    async fn refund_when_safe(&mut self) -> Result<SwapStatus, ProtocolError> {
        let swap = match self.swap {
            Some(swap) => swap,
            None => return Ok(SwapStatus::CompletedAbort),
        };
        let id = swap.swap_id();
        let poll = self.backend.poll_interval();
        loop {
            let chain = self.backend.chain();
            let stage = retry_chain(poll, || chain.stage(id)).await?;
            match stage {
                Stage::Invalid => return Ok(SwapStatus::CompletedAbort),
                Stage::Completed => {
                    if let Some(secret) = chain.find_claimed(id).await? {
                        return self.complete_success(secret).await;
                    }
                    if chain.find_refunded(id).await?.is_some() {
                        return Ok(SwapStatus::CompletedRefund);
                    }
                    return Err(ProtocolError::InvalidState(
                        "swap completed with neither Claimed nor Refunded".into(),
                    ));
                }
                Stage::Pending | Stage::Ready => {
                    let now = chain.latest_time().await?;
                    let refundable = (stage == Stage::Pending && now < swap.timeout_0)
                        || now >= swap.timeout_1;
                    if refundable {
                        match chain.refund(&swap, self.keys.contract_secret()).await {
                            Ok(tx_hash) => {
                                info!("refunded escrow swap {id} in {tx_hash}");
                                let _ = self
                                    .transport
                                    .send(ProtocolMessage::NotifyRefund(NotifyRefund { tx_hash }))
                                    .await;
                                return Ok(SwapStatus::CompletedRefund);
                            }
                            Err(ContractError::Reverted(e)) => {
                                // lost a race with the claimer; the next
                                // stage read resolves it
                                debug!("refund reverted: {e}");
                            }
                            Err(e) => return Err(e.into()),
                        }
                    } else if let Some(secret) = chain.find_claimed(id).await? {
                        return self.complete_success(secret).await;
                    }
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    async fn unwind(&mut self) -> SwapStatus {
        match self.refund_when_safe().await {
            Ok(status) => status,
            Err(e) => {
                error!("taker swap {} could not unwind: {e}", self.offer_id.name());
                SwapStatus::CompletedAbort
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

    fn swap_id(&self) -> Result<SwapId, ProtocolError> {
        self.swap_id.ok_or_else(|| ProtocolError::InvalidState("no escrow swap yet".into()))
    }

    fn persist(&self, status: SwapStatus) -> Result<(), ProtocolError> {
        let info = InfoFile {
            offer_id: self.offer_id,
            role: SwapRole::Taker,
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
