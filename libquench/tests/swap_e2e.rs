//! End-to-end swap scenarios over the mock chain, the shared in-memory
//! XMR ledger and the framed in-memory transport. Time is the paused
//! tokio clock, so timeout scenarios run instantly and deterministically.

mod common;

use common::{eth, rate, wait_for_status, wait_past_recorded, wait_terminal, xmr, Harness, MAKER_ETH};
use libquench::contract::EthChain;
use libquench::message::{NotifyEthLocked, ProtocolMessage};
use libquench::protocol::keys::{CounterpartyKeys, SwapKeySet};
use libquench::transport::{memory_pair, MessageTransport};
use libquench::types::{EthAddress, Offer, SwapStatus};
use rand_core::OsRng;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn happy_path() {
    let h = Harness::new(Duration::from_secs(60));
    let offer = h.maker.make_offer(xmr("0.1"), xmr("10"), rate());
    assert_eq!(h.maker.get_offers().len(), 1);

    let (taker_side, maker_side) = memory_pair();
    let id = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side)).unwrap();
    h.maker.handle_offer_taken(offer.id, Box::new(maker_side)).unwrap();

    assert_eq!(wait_terminal(&h.taker, id).await, SwapStatus::CompletedSuccess);
    assert_eq!(wait_terminal(&h.maker, offer.id).await, SwapStatus::CompletedSuccess);

    // the maker's ETH balance grew by the locked value
    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(MAKER_ETH).await.unwrap(), eth("0.05"));

    // the taker controls the XMR: payout keys are on disk and the summed
    // address holds the locked amount
    let info = h.taker.store().load_info(id).unwrap();
    let payout = info.payout.expect("payout keys must be persisted");
    assert_eq!(info.lock_address.as_deref(), Some(payout.address.as_str()));
    assert_eq!(h.xmr.balance_of(&payout.address), xmr("1"));

    // the offer was consumed and both records are terminal
    wait_past_recorded(&h.maker, offer.id).await;
    wait_past_recorded(&h.taker, id).await;
    assert!(h.maker.get_offers().is_empty());
    assert_eq!(
        h.maker.manager().get_past_swap(offer.id).unwrap().status,
        SwapStatus::CompletedSuccess
    );
    assert_eq!(
        h.taker.manager().get_past_swap(id).unwrap().status,
        SwapStatus::CompletedSuccess
    );
}

#[tokio::test(start_paused = true)]
async fn taker_cancels_before_any_lock() {
    let h = Harness::new(Duration::from_secs(60));
    let offer = h.maker.make_offer(xmr("0.1"), xmr("10"), rate());

    let (taker_side, maker_side) = memory_pair();
    let id = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side)).unwrap();
    h.maker.handle_offer_taken(offer.id, Box::new(maker_side)).unwrap();

    let status = h.taker.cancel(id).await.unwrap();
    assert_eq!(status, SwapStatus::CompletedAbort);
    assert_eq!(wait_terminal(&h.maker, offer.id).await, SwapStatus::CompletedAbort);

    // nothing moved on chain
    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(common::TAKER_ETH).await.unwrap(), eth("1"));
    assert_eq!(observer.balance_of(MAKER_ETH).await.unwrap(), eth("0"));

    // the offer is back on the maker's book
    wait_past_recorded(&h.maker, offer.id).await;
    assert_eq!(h.maker.get_offers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn taker_cancels_after_eth_locked() {
    let h = Harness::new(Duration::from_secs(5));
    let offer = Offer::new(&mut OsRng, xmr("0.1"), xmr("2"), rate());

    let (taker_side, mut peer) = memory_pair();
    let id = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side)).unwrap();

    // manual maker: exchange keys, then stall before locking any XMR
    let Some(ProtocolMessage::SendKeys(_)) = peer.receive().await.unwrap() else {
        panic!("expected the taker's SendKeys");
    };
    let maker_keys = SwapKeySet::generate(&mut OsRng).unwrap();
    peer.send(ProtocolMessage::SendKeys(maker_keys.send_keys_message(
        offer.id,
        MAKER_ETH,
        Some(xmr("1")),
        None,
    )))
    .await
    .unwrap();
    let Some(ProtocolMessage::NotifyEthLocked(_)) = peer.receive().await.unwrap() else {
        panic!("expected NotifyETHLocked");
    };

    wait_for_status(&h.taker, id, SwapStatus::EthLocked).await;
    let status = h.taker.cancel(id).await.unwrap();
    assert_eq!(status, SwapStatus::CompletedRefund);

    // the escrowed ETH came back, and the refund was announced
    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(common::TAKER_ETH).await.unwrap(), eth("1"));
    let Some(ProtocolMessage::NotifyRefund(_)) = peer.receive().await.unwrap() else {
        panic!("expected NotifyRefund");
    };
}

#[tokio::test(start_paused = true)]
async fn maker_reclaims_after_taker_refund() {
    let h = Harness::new(Duration::from_secs(5));
    let offer = h.maker.make_offer(xmr("0.1"), xmr("2"), rate());

    let (mut peer, maker_side) = memory_pair();
    h.maker.handle_offer_taken(offer.id, Box::new(maker_side)).unwrap();

    // manual taker with its own chain account
    let taker_keys = SwapKeySet::generate(&mut OsRng).unwrap();
    let manual_chain = h.eth.connect(EthAddress([0xcc; 20]), eth("1"));
    peer.send(ProtocolMessage::SendKeys(taker_keys.send_keys_message(
        offer.id,
        manual_chain.account(),
        None,
        Some(eth("0.05")),
    )))
    .await
    .unwrap();
    let Some(ProtocolMessage::SendKeys(maker_msg)) = peer.receive().await.unwrap() else {
        panic!("expected the maker's SendKeys");
    };
    let maker_cp = CounterpartyKeys::verify(&maker_msg).unwrap();

    let receipt = manual_chain
        .new_swap(
            maker_cp.secp_public().keccak256(),
            taker_keys.secp_public().keccak256(),
            MAKER_ETH,
            Duration::from_secs(5),
            [9; 32],
            eth("0.05"),
        )
        .await
        .unwrap();
    peer.send(ProtocolMessage::NotifyEthLocked(NotifyEthLocked {
        address: manual_chain.contract_address(),
        contract_swap_id: receipt.swap_id,
    }))
    .await
    .unwrap();

    // the maker verifies the escrow and locks its XMR
    let Some(ProtocolMessage::NotifyXmrLock(lock)) = peer.receive().await.unwrap() else {
        panic!("expected NotifyXMRLock");
    };
    assert_eq!(h.xmr.balance_of(&lock.address), xmr("1"));

    // the taker bails out while the escrow is Pending and before t0,
    // revealing its spend scalar in the Refunded log
    manual_chain.refund(&receipt.swap, taker_keys.contract_secret()).await.unwrap();

    assert_eq!(wait_terminal(&h.maker, offer.id).await, SwapStatus::CompletedRefund);

    // the maker recovered the wallet holding the locked XMR
    let info = h.maker.store().load_info(offer.id).unwrap();
    let payout = info.payout.expect("reclaim keys must be persisted");
    assert_eq!(payout.address, lock.address);
    assert_eq!(h.xmr.balance_of(&payout.address), xmr("1"));
}

#[tokio::test(start_paused = true)]
async fn double_take_consumes_the_offer_once() {
    let mut h = Harness::new(Duration::from_secs(60));
    let offer = h.maker.make_offer(xmr("0.1"), xmr("10"), rate());
    let second_taker = h.extra_taker(EthAddress([0xdd; 20]), eth("1"));

    let (taker_side_1, maker_side_1) = memory_pair();
    let (taker_side_2, maker_side_2) = memory_pair();

    let id1 = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side_1)).unwrap();
    let id2 = second_taker.take_offer(offer, xmr("1"), Box::new(taker_side_2)).unwrap();

    let first = h.maker.handle_offer_taken(offer.id, Box::new(maker_side_1));
    let second = h.maker.handle_offer_taken(offer.id, Box::new(maker_side_2));
    assert!(first.is_ok());
    assert!(second.is_err(), "the second take must be rejected");

    assert_eq!(wait_terminal(&h.taker, id1).await, SwapStatus::CompletedSuccess);
    assert_eq!(wait_terminal(&second_taker, id2).await, SwapStatus::CompletedAbort);
    assert!(h.maker.get_offers().is_empty(), "the offer is consumed exactly once");

    // only one escrow's worth of ETH moved
    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(MAKER_ETH).await.unwrap(), eth("0.05"));
    assert_eq!(observer.balance_of(EthAddress([0xdd; 20])).await.unwrap(), eth("1"));
}

#[tokio::test(start_paused = true)]
async fn ten_concurrent_swaps() {
    let h = Harness::new(Duration::from_secs(60));
    let mut ids = Vec::new();
    for _ in 0..10 {
        let offer = h.maker.make_offer(xmr("0.1"), xmr("2"), rate());
        let (taker_side, maker_side) = memory_pair();
        let id = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side)).unwrap();
        h.maker.handle_offer_taken(offer.id, Box::new(maker_side)).unwrap();
        ids.push(id);
    }
    let offers_before = 10;
    for id in &ids {
        assert_eq!(wait_terminal(&h.taker, *id).await, SwapStatus::CompletedSuccess);
        assert_eq!(wait_terminal(&h.maker, *id).await, SwapStatus::CompletedSuccess);
    }
    assert_eq!(offers_before - h.maker.get_offers().len(), 10);

    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(MAKER_ETH).await.unwrap(), eth("0.5"));
    // ten payout wallets, each holding one locked XMR
    for id in &ids {
        let info = h.taker.store().load_info(*id).unwrap();
        assert_eq!(h.xmr.balance_of(&info.payout.unwrap().address), xmr("1"));
    }
}

#[tokio::test(start_paused = true)]
async fn unexpected_message_aborts_before_locking() {
    let h = Harness::new(Duration::from_secs(60));
    let offer = Offer::new(&mut OsRng, xmr("0.1"), xmr("2"), rate());

    let (taker_side, mut peer) = memory_pair();
    let id = h.taker.take_offer(offer, xmr("1"), Box::new(taker_side)).unwrap();

    let Some(ProtocolMessage::SendKeys(_)) = peer.receive().await.unwrap() else {
        panic!("expected the taker's SendKeys");
    };
    // keys are expected here, so a stray NotifyReady kills the session
    peer.send(ProtocolMessage::NotifyReady(libquench::message::NotifyReady {}))
        .await
        .unwrap();

    assert_eq!(wait_terminal(&h.taker, id).await, SwapStatus::CompletedAbort);
    let observer = h.eth.connect(EthAddress([0x99; 20]), eth("0"));
    assert_eq!(observer.balance_of(common::TAKER_ETH).await.unwrap(), eth("1"));
}
