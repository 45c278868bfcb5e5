//! Swap lifecycle registry and the outward-facing service handle. Each
//! swap runs as its own tokio task; the manager keeps the status receiver
//! and the cancellation sender, and moves finished swaps into the
//! persisted past-swap log.

use crate::amount::{EtherAmount, ExchangeRate, MoneroAmount};
use crate::contract::EthChain;
use crate::error::ProtocolError;
use crate::monero::XmrWallet;
use crate::protocol::backend::Backend;
use crate::protocol::maker::MakerSwap;
use crate::protocol::offers::OfferManager;
use crate::protocol::taker::TakerSwap;
use crate::protocol::SwapControl;
use crate::storage::InfoStore;
use crate::transport::MessageTransport;
use crate::types::{Offer, OfferId, SwapRecord, SwapRole, SwapStatus};
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

struct OngoingSwap {
    record: SwapRecord,
    status_rx: watch::Receiver<SwapStatus>,
    cancel_tx: watch::Sender<bool>,
}

/// Registry of ongoing and past swaps.
pub struct SwapManager {
    ongoing: Mutex<HashMap<OfferId, OngoingSwap>>,
    past: Mutex<HashMap<OfferId, SwapRecord>>,
    store: InfoStore,
}

impl SwapManager {
    pub fn new(store: InfoStore) -> Result<Self, ProtocolError> {
        let past = store.load_past()?;
        Ok(SwapManager { ongoing: Mutex::new(HashMap::new()), past: Mutex::new(past), store })
    }

    /// Registers a freshly spawned swap with its control channels.
    pub fn add_swap(
        &self,
        record: SwapRecord,
        status_rx: watch::Receiver<SwapStatus>,
        cancel_tx: watch::Sender<bool>,
    ) {
        let offer_id = record.offer_id;
        let mut ongoing = self.ongoing.lock().unwrap();
        ongoing.insert(offer_id, OngoingSwap { record, status_rx, cancel_tx });
    }

    /// Moves a finished swap to the past log with its terminal status.
    pub fn complete_ongoing_swap(&self, offer_id: OfferId, completed_at: u64) {
        let removed = self.ongoing.lock().unwrap().remove(&offer_id);
        let Some(swap) = removed else {
            warn!("completing unknown swap {}", offer_id.name());
            return;
        };
        let mut record = swap.record;
        record.status = *swap.status_rx.borrow();
        record.completed_at = Some(completed_at);
        if let Err(e) = self.store.record_past(&record) {
            error!("failed to persist past swap {}: {e}", offer_id.name());
        }
        self.past.lock().unwrap().insert(offer_id, record);
    }

    pub fn get_ongoing_swap(&self, offer_id: OfferId) -> Option<SwapRecord> {
        let ongoing = self.ongoing.lock().unwrap();
        ongoing.get(&offer_id).map(|s| {
            let mut record = s.record.clone();
            record.status = *s.status_rx.borrow();
            record
        })
    }

    pub fn get_past_swap(&self, offer_id: OfferId) -> Option<SwapRecord> {
        self.past.lock().unwrap().get(&offer_id).cloned()
    }

    /// Status stream for an ongoing swap. For a completed swap the
    /// returned receiver already holds the terminal value.
    pub fn subscribe(&self, offer_id: OfferId) -> Result<watch::Receiver<SwapStatus>, ProtocolError> {
        if let Some(swap) = self.ongoing.lock().unwrap().get(&offer_id) {
            return Ok(swap.status_rx.clone());
        }
        if let Some(record) = self.past.lock().unwrap().get(&offer_id) {
            // a closed watch still hands late subscribers the final value
            let (_tx, rx) = watch::channel(record.status);
            return Ok(rx);
        }
        Err(ProtocolError::NotFound(offer_id))
    }

    /// Cooperatively cancels a swap and waits for its terminal status.
    /// Cancelling an already-completed swap is a no-op returning its
    /// terminal status.
    pub async fn cancel(&self, offer_id: OfferId) -> Result<SwapStatus, ProtocolError> {
        let subscribed = {
            let ongoing = self.ongoing.lock().unwrap();
            ongoing.get(&offer_id).map(|swap| {
                swap.cancel_tx.send_replace(true);
                swap.status_rx.clone()
            })
        };
        let mut status_rx = match subscribed {
            Some(rx) => rx,
            None => {
                return self
                    .past
                    .lock()
                    .unwrap()
                    .get(&offer_id)
                    .map(|record| record.status)
                    .ok_or(ProtocolError::NotFound(offer_id));
            }
        };
        let status = loop {
            let status = *status_rx.borrow_and_update();
            if status.is_terminal() {
                break status;
            }
            if status_rx.changed().await.is_err() {
                break *status_rx.borrow();
            }
        };
        Ok(status)
    }
}

/// The engine's outward handle: offer management, starting swaps in either
/// role, status subscription and cancellation.
pub struct SwapService<C: EthChain, W: XmrWallet> {
    backend: Backend<C, W>,
    manager: Arc<SwapManager>,
    offers: Arc<OfferManager>,
    store: InfoStore,
}

impl<C: EthChain, W: XmrWallet> Clone for SwapService<C, W> {
    fn clone(&self) -> Self {
        SwapService {
            backend: self.backend.clone(),
            manager: self.manager.clone(),
            offers: self.offers.clone(),
            store: self.store.clone(),
        }
    }
}

impl<C: EthChain, W: XmrWallet> SwapService<C, W> {
    pub fn new(backend: Backend<C, W>) -> Result<Self, ProtocolError> {
        let store = InfoStore::new(backend.data_dir())?;
        let manager = Arc::new(SwapManager::new(store.clone())?);
        Ok(SwapService { backend, manager, offers: Arc::new(OfferManager::new()), store })
    }

    pub fn manager(&self) -> &SwapManager {
        &self.manager
    }

    pub fn backend(&self) -> &Backend<C, W> {
        &self.backend
    }

    pub fn store(&self) -> &InfoStore {
        &self.store
    }

    /// Publishes an offer to sell XMR at a fixed rate.
    pub fn make_offer(
        &self,
        min_amount: MoneroAmount,
        max_amount: MoneroAmount,
        exchange_rate: ExchangeRate,
    ) -> Offer {
        self.offers.make_offer(min_amount, max_amount, exchange_rate)
    }

    pub fn get_offers(&self) -> Vec<Offer> {
        self.offers.get_offers()
    }

    pub fn set_swap_timeout(&self, timeout: Duration) {
        self.backend.set_swap_timeout(timeout);
    }

    pub fn subscribe_status(
        &self,
        offer_id: OfferId,
    ) -> Result<watch::Receiver<SwapStatus>, ProtocolError> {
        self.manager.subscribe(offer_id)
    }

    pub async fn cancel(&self, offer_id: OfferId) -> Result<SwapStatus, ProtocolError> {
        self.manager.cancel(offer_id).await
    }

    /// Takes a peer's offer as the ETH-holder. `xmr_amount` is the XMR we
    /// want; the ETH we lock follows from the offer's rate.
    pub fn take_offer(
        &self,
        offer: Offer,
        xmr_amount: MoneroAmount,
        transport: Box<dyn MessageTransport>,
    ) -> Result<OfferId, ProtocolError> {
        if xmr_amount < offer.min_amount || xmr_amount > offer.max_amount {
            return Err(ProtocolError::InvalidState(format!(
                "{xmr_amount} is outside the offer bounds"
            )));
        }
        let eth_amount = offer
            .exchange_rate
            .eth_for(xmr_amount)
            .ok_or_else(|| ProtocolError::InvalidState("unrepresentable amount".into()))?;

        let (control, status_rx, cancel_tx) = SwapControl::new();
        let swap = TakerSwap::new(
            self.backend.clone(),
            transport,
            self.store.clone(),
            control,
            offer.id,
            xmr_amount,
            eth_amount,
        )?;

        let record = SwapRecord {
            offer_id: offer.id,
            role: SwapRole::Taker,
            status: SwapStatus::ExpectingKeys,
            info_path: self.store.info_path(offer.id),
            counterparty_eth_address: Default::default(),
            xmr_amount,
            eth_amount,
            exchange_rate: offer.exchange_rate,
            started_at: self.backend.now_unix(),
            completed_at: None,
        };
        self.manager.add_swap(record, status_rx, cancel_tx);

        let manager = self.manager.clone();
        let backend = self.backend.clone();
        let offer_id = offer.id;
        tokio::spawn(async move {
            let _ = swap.run().await;
            manager.complete_ongoing_swap(offer_id, backend.now_unix());
        });
        Ok(offer.id)
    }

    /// Accepts an incoming take of one of our offers, as the XMR-holder.
    /// The offer is consumed exactly once; a concurrent second take gets
    /// `NotFound`.
    pub fn handle_offer_taken(
        &self,
        offer_id: OfferId,
        transport: Box<dyn MessageTransport>,
    ) -> Result<OfferId, ProtocolError> {
        let offer = self.offers.take(offer_id).ok_or(ProtocolError::NotFound(offer_id))?;

        let (control, status_rx, cancel_tx) = SwapControl::new();
        let swap = match MakerSwap::new(
            self.backend.clone(),
            transport,
            self.store.clone(),
            control,
            offer,
        ) {
            Ok(swap) => swap,
            Err(e) => {
                self.offers.put_back(offer);
                return Err(e);
            }
        };

        let record = SwapRecord {
            offer_id,
            role: SwapRole::Maker,
            status: SwapStatus::ExpectingKeys,
            info_path: self.store.info_path(offer_id),
            counterparty_eth_address: Default::default(),
            xmr_amount: MoneroAmount::from_piconero(0),
            eth_amount: EtherAmount::from_wei(0),
            exchange_rate: offer.exchange_rate,
            started_at: self.backend.now_unix(),
            completed_at: None,
        };
        self.manager.add_swap(record, status_rx, cancel_tx);

        let manager = self.manager.clone();
        let offers = self.offers.clone();
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let status = swap.run().await;
            manager.complete_ongoing_swap(offer_id, backend.now_unix());
            // nothing moved, so the offer goes back on the book
            if status == SwapStatus::CompletedAbort {
                offers.put_back(offer);
            }
        });
        Ok(offer_id)
    }
}
