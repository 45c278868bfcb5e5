use crate::amount::{ExchangeRate, MoneroAmount};
use crate::types::{Offer, OfferId};
use log::*;
use rand_core::OsRng;
use std::collections::HashMap;
use std::sync::Mutex;

/// The maker's book of open offers. Taking an offer removes it atomically,
/// so a concurrent double-take consumes it exactly once.
#[derive(Default)]
pub struct OfferManager {
    offers: Mutex<HashMap<OfferId, Offer>>,
}

impl OfferManager {
    pub fn new() -> Self {
        OfferManager::default()
    }

    pub fn make_offer(
        &self,
        min_amount: MoneroAmount,
        max_amount: MoneroAmount,
        exchange_rate: ExchangeRate,
    ) -> Offer {
        let offer = Offer::new(&mut OsRng, min_amount, max_amount, exchange_rate);
        self.offers.lock().unwrap().insert(offer.id, offer);
        info!("new offer {}: {min_amount} to {max_amount} at {exchange_rate}", offer.id.name());
        offer
    }

    pub fn get_offers(&self) -> Vec<Offer> {
        self.offers.lock().unwrap().values().copied().collect()
    }

    /// Removes and returns the offer, or `None` if it was already taken.
    pub fn take(&self, id: OfferId) -> Option<Offer> {
        self.offers.lock().unwrap().remove(&id)
    }

    /// Returns an offer to the book, e.g. after an aborted swap in which
    /// nothing was locked.
    pub fn put_back(&self, offer: Offer) {
        debug!("offer {} returned to the book", offer.id.name());
        self.offers.lock().unwrap().insert(offer.id, offer);
    }

    pub fn len(&self) -> usize {
        self.offers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rate() -> ExchangeRate {
        ExchangeRate::from_eth_per_xmr("0.05").unwrap()
    }

    #[test]
    fn take_consumes_exactly_once() {
        let manager = OfferManager::new();
        let offer = manager.make_offer(
            MoneroAmount::from_xmr("0.1").unwrap(),
            MoneroAmount::from_xmr("2").unwrap(),
            rate(),
        );
        assert_eq!(manager.len(), 1);

        let first = manager.take(offer.id);
        let second = manager.take(offer.id);
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn put_back_restores_the_offer() {
        let manager = OfferManager::new();
        let offer = manager.make_offer(
            MoneroAmount::from_xmr("1").unwrap(),
            MoneroAmount::from_xmr("1").unwrap(),
            rate(),
        );
        let taken = manager.take(offer.id).unwrap();
        manager.put_back(taken);
        assert_eq!(manager.len(), 1);
        assert!(manager.take(offer.id).is_some());
    }
}
