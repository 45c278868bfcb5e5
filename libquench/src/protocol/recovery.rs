//! Crash recovery: rebuilds a swap's position from its persisted
//! info-file and the on-chain stage, then drives it to claim or refund.
//! Every entry point re-reads the stage first, so running recovery twice
//! lands on the same terminal status.

use crate::contract::{ContractError, EscrowSwap, EthChain, Stage};
use crate::crypto::keys::{
    spend_key_from_contract_secret, Curve25519PublicKey, Curve25519Secret, PrivateKeyPair,
};
use crate::error::ProtocolError;
use crate::monero::data_objects::GenerateFromKeys;
use crate::monero::XmrWallet;
use crate::protocol::backend::Backend;
use crate::protocol::retry_chain;
use crate::storage::{InfoFile, InfoStore, PayoutKeys};
use crate::types::{SwapRole, SwapStatus};
use log::*;

/// Outcome of a recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    pub status: SwapStatus,
    /// An on-chain claim settled the swap.
    pub claimed: bool,
    /// An on-chain refund settled the swap.
    pub refunded: bool,
    /// The summed-key wallet holding the XMR was restored.
    pub xmr_recovered: bool,
    pub payout_address: Option<String>,
}

impl RecoveryResult {
    fn aborted() -> Self {
        RecoveryResult {
            status: SwapStatus::CompletedAbort,
            claimed: false,
            refunded: false,
            xmr_recovered: false,
            payout_address: None,
        }
    }
}

pub struct RecoveryState<C: EthChain, W: XmrWallet> {
    backend: Backend<C, W>,
    store: InfoStore,
    info: InfoFile,
    keys: PrivateKeyPair,
    counterparty_view: Curve25519Secret,
    counterparty_spend_pub: Curve25519PublicKey,
    swap: Option<EscrowSwap>,
}

impl<C: EthChain, W: XmrWallet> RecoveryState<C, W> {
    /// Reconstructs the position from a persisted info-file.
    pub fn from_info(
        backend: Backend<C, W>,
        store: InfoStore,
        info: InfoFile,
    ) -> Result<Self, ProtocolError> {
        let spend = Curve25519Secret::from_hex(&info.private_spend_key)?;
        let view = Curve25519Secret::from_hex(&info.private_view_key)?;
        let keys = PrivateKeyPair::from_keys(spend, view);
        let counterparty_view = Curve25519Secret::from_hex(&info.counterparty_private_view)?;
        let counterparty_spend_pub =
            Curve25519PublicKey::from_hex(&info.counterparty_public_spend)?;
        let swap = info.contract_swap;
        Ok(RecoveryState { backend, store, info, keys, counterparty_view, counterparty_spend_pub, swap })
    }

    /// Drives the recovered swap to its terminal outcome.
    pub async fn claim_or_refund(&mut self) -> Result<RecoveryResult, ProtocolError> {
        let Some(swap) = self.swap else {
            // never created on chain
            info!("recovery for {}: no escrow was created", self.info.offer_id.name());
            return Ok(RecoveryResult::aborted());
        };
        let id = swap.swap_id();
        let poll = self.backend.poll_interval();
        let chain = self.backend.chain();
        let stage = retry_chain(poll, || chain.stage(id)).await?;
        debug!(
            "recovery for {} ({}): stage is {stage}",
            self.info.offer_id.name(),
            self.info.role
        );

        match stage {
            Stage::Invalid => Ok(RecoveryResult::aborted()),
            Stage::Completed => self.resolve_completed(&swap).await,
            Stage::Pending | Stage::Ready => match self.info.role {
                SwapRole::Taker => self.taker_claim_or_refund(&swap).await,
                SwapRole::Maker => self.maker_claim_or_reclaim(&swap).await,
            },
        }
    }

    /// The contract settled while we were away: read the outcome logs.
    async fn resolve_completed(&mut self, swap: &EscrowSwap) -> Result<RecoveryResult, ProtocolError> {
        let id = swap.swap_id();
        let chain = self.backend.chain();
        if let Some(secret) = chain.find_claimed(id).await? {
            return match self.info.role {
                SwapRole::Taker => {
                    let address = self.restore_summed_wallet(secret, "claim").await?;
                    Ok(RecoveryResult {
                        status: SwapStatus::CompletedSuccess,
                        claimed: true,
                        refunded: false,
                        xmr_recovered: true,
                        payout_address: Some(address),
                    })
                }
                SwapRole::Maker => Ok(RecoveryResult {
                    status: SwapStatus::CompletedSuccess,
                    claimed: true,
                    refunded: false,
                    xmr_recovered: false,
                    payout_address: None,
                }),
            };
        }
        if let Some(secret) = chain.find_refunded(id).await? {
            return match self.info.role {
                SwapRole::Taker => Ok(RecoveryResult {
                    status: SwapStatus::CompletedRefund,
                    claimed: false,
                    refunded: true,
                    xmr_recovered: false,
                    payout_address: None,
                }),
                SwapRole::Maker => {
                    let address = self.restore_summed_wallet(secret, "reclaim").await?;
                    Ok(RecoveryResult {
                        status: SwapStatus::CompletedRefund,
                        claimed: false,
                        refunded: true,
                        xmr_recovered: true,
                        payout_address: Some(address),
                    })
                }
            };
        }
        Err(ProtocolError::InvalidState(
            "swap completed with neither Claimed nor Refunded".into(),
        ))
    }

    async fn taker_claim_or_refund(&mut self, swap: &EscrowSwap) -> Result<RecoveryResult, ProtocolError> {
        let id = swap.swap_id();
        let poll = self.backend.poll_interval();
        loop {
            let chain = self.backend.chain();
            let stage = retry_chain(poll, || chain.stage(id)).await?;
            if stage == Stage::Completed {
                return self.resolve_completed(swap).await;
            }
            let now = chain.latest_time().await?;
            let refundable =
                (stage == Stage::Pending && now < swap.timeout_0) || now >= swap.timeout_1;
            if refundable {
                match chain.refund(swap, crate::crypto::keys::contract_secret(self.keys.spend())).await {
                    Ok(tx_hash) => {
                        info!("recovery refunded swap {id} in {tx_hash}");
                        return Ok(RecoveryResult {
                            status: SwapStatus::CompletedRefund,
                            claimed: false,
                            refunded: true,
                            xmr_recovered: false,
                            payout_address: None,
                        });
                    }
                    Err(ContractError::Reverted(e)) => debug!("recovery refund reverted: {e}"),
                    Err(e) => return Err(e.into()),
                }
            } else if stage == Stage::Pending && now >= swap.timeout_0 {
                // the claim window is open but the contract was never set
                // ready; unblock the counterparty and wait
                match chain.set_ready(swap).await {
                    Ok(_) => debug!("recovery set swap {id} ready"),
                    Err(ContractError::Reverted(e)) => debug!("set_ready reverted: {e}"),
                    Err(e) => return Err(e.into()),
                }
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn maker_claim_or_reclaim(&mut self, swap: &EscrowSwap) -> Result<RecoveryResult, ProtocolError> {
        let id = swap.swap_id();
        let poll = self.backend.poll_interval();
        let follow_up = self.backend.refund_follow_up().as_secs();
        loop {
            let chain = self.backend.chain();
            let stage = retry_chain(poll, || chain.stage(id)).await?;
            if stage == Stage::Completed {
                return self.resolve_completed(swap).await;
            }
            let now = chain.latest_time().await?;
            if now < swap.timeout_1
                && (stage == Stage::Ready || (stage == Stage::Pending && now >= swap.timeout_0))
            {
                match chain.claim(swap, crate::crypto::keys::contract_secret(self.keys.spend())).await {
                    Ok(tx_hash) => {
                        info!("recovery claimed swap {id} in {tx_hash}");
                        return Ok(RecoveryResult {
                            status: SwapStatus::CompletedSuccess,
                            claimed: true,
                            refunded: false,
                            xmr_recovered: false,
                            payout_address: None,
                        });
                    }
                    Err(ContractError::Reverted(e)) => debug!("recovery claim reverted: {e}"),
                    Err(e) => return Err(e.into()),
                }
            }
            if now >= swap.timeout_1 + follow_up {
                warn!("recovery: follow-up window expired with no Refunded log for {id}");
                return Ok(RecoveryResult {
                    status: SwapStatus::CompletedRefund,
                    claimed: false,
                    refunded: false,
                    xmr_recovered: false,
                    payout_address: None,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Restores the wallet whose spend key is the sum of ours and the
    /// scalar revealed on chain, and records its keys in the info-file.
    async fn restore_summed_wallet(
        &mut self,
        secret: [u8; 32],
        label: &str,
    ) -> Result<String, ProtocolError> {
        let revealed = spend_key_from_contract_secret(secret)?;
        if Curve25519PublicKey::from_secret(&revealed) != self.counterparty_spend_pub {
            warn!("revealed scalar does not generate the counterparty's public spend key");
        }
        let payout = PrivateKeyPair::from_keys(
            Curve25519Secret::from(revealed.as_scalar() + self.keys.spend().as_scalar()),
            Curve25519Secret::from(
                self.counterparty_view.as_scalar() + self.keys.view().as_scalar(),
            ),
        );
        let address = payout.address(self.backend.env())?;

        self.info.payout = Some(PayoutKeys {
            private_spend_key: payout.spend().to_hex(),
            private_view_key: payout.view().to_hex(),
            address: address.clone(),
        });
        self.store.write_info(&self.info)?;

        let mut wallet = self.backend.wallet().lock().await;
        wallet
            .generate_from_keys(GenerateFromKeys {
                filename: format!("{}-{label}-recovered", self.info.offer_id.name()),
                password: String::new(),
                address: address.clone(),
                spend_key: Some(payout.spend().to_hex()),
                view_key: payout.view().to_hex(),
                restore_height: 0,
            })
            .await?;
        wallet.refresh().await?;
        info!("restored summed wallet at {address}");
        Ok(address)
    }
}
