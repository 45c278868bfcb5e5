#![allow(dead_code)]

//! Shared fixture for the end-to-end tests: two parties wired to one mock
//! ETH chain and one shared in-memory XMR ledger, with time driven by the
//! paused tokio runtime.

use libquench::amount::{EtherAmount, ExchangeRate, MoneroAmount};
use libquench::contract::mock::{MockEthChain, MockEthNetwork};
use libquench::error::ProtocolError;
use libquench::manager::SwapService;
use libquench::monero::dummy_impl::{DummyWallet, DummyXmrNetwork};
use libquench::protocol::backend::{Backend, SwapConfig};
use libquench::types::{Clock, EthAddress, MockClock, OfferId, SwapStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const MAKER_ETH: EthAddress = EthAddress([0xaa; 20]);
pub const TAKER_ETH: EthAddress = EthAddress([0xbb; 20]);

pub type TestService = SwapService<MockEthChain, DummyWallet>;

pub struct Harness {
    pub clock: Arc<MockClock>,
    pub eth: MockEthNetwork,
    pub xmr: Arc<DummyXmrNetwork>,
    pub maker: TestService,
    pub taker: TestService,
    // kept alive for the duration of the test
    _dirs: Vec<TempDir>,
}

pub fn rate() -> ExchangeRate {
    ExchangeRate::from_eth_per_xmr("0.05").unwrap()
}

pub fn xmr(s: &str) -> MoneroAmount {
    MoneroAmount::from_xmr(s).unwrap()
}

pub fn eth(s: &str) -> EtherAmount {
    EtherAmount::from_eth(s).unwrap()
}

impl Harness {
    /// Two services sharing one chain and one XMR ledger. The maker starts
    /// with 20 XMR and no ETH; the taker with 1 ETH and no XMR.
    pub fn new(swap_timeout: Duration) -> Self {
        env_logger::try_init().ok();
        let clock = Arc::new(MockClock::new(1_700_000_000));
        let eth_net = MockEthNetwork::new(clock.clone() as Arc<dyn Clock>);
        let xmr_net = DummyXmrNetwork::new();

        let maker_chain = eth_net.connect(MAKER_ETH, eth("0"));
        let taker_chain = eth_net.connect(TAKER_ETH, eth("1"));
        let maker_wallet = DummyWallet::new(xmr_net.clone(), "maker-primary", xmr("20"));
        let taker_wallet = DummyWallet::new(xmr_net.clone(), "taker-primary", xmr("0"));

        let mut dirs = Vec::new();
        let maker = service(maker_chain, maker_wallet, clock.clone(), swap_timeout, &mut dirs);
        let taker = service(taker_chain, taker_wallet, clock.clone(), swap_timeout, &mut dirs);

        Harness { clock, eth: eth_net, xmr: xmr_net, maker, taker, _dirs: dirs }
    }

    /// A further taker-side service, e.g. for racing two takers.
    pub fn extra_taker(&mut self, account: EthAddress, balance: EtherAmount) -> TestService {
        let chain = self.eth.connect(account, balance);
        let wallet = DummyWallet::new(self.xmr.clone(), "extra-taker-primary", xmr("0"));
        let mut dirs = Vec::new();
        let service = service(
            chain,
            wallet,
            self.clock.clone(),
            Duration::from_secs(600),
            &mut dirs,
        );
        self._dirs.append(&mut dirs);
        service
    }
}

fn service(
    chain: MockEthChain,
    wallet: DummyWallet,
    clock: Arc<MockClock>,
    swap_timeout: Duration,
    dirs: &mut Vec<TempDir>,
) -> TestService {
    let dir = tempfile::tempdir().unwrap();
    let config = SwapConfig {
        swap_timeout,
        poll_interval: Duration::from_millis(250),
        log_search_window: Duration::from_secs(10),
        refund_follow_up: 4 * swap_timeout,
        data_dir: dir.path().to_path_buf(),
        ..SwapConfig::default()
    };
    dirs.push(dir);
    let backend = Backend::new(chain, wallet, clock as Arc<dyn Clock>, config);
    SwapService::new(backend).unwrap()
}

/// Blocks until the swap's status stream yields a terminal value.
pub async fn wait_terminal(service: &TestService, offer_id: OfferId) -> SwapStatus {
    let mut rx = match service.subscribe_status(offer_id) {
        Ok(rx) => rx,
        Err(ProtocolError::NotFound(_)) => panic!("no swap for {}", offer_id.name()),
        Err(e) => panic!("subscribe failed: {e}"),
    };
    loop {
        let status = *rx.borrow_and_update();
        if status.is_terminal() {
            return status;
        }
        if rx.changed().await.is_err() {
            return *rx.borrow();
        }
    }
}

/// Blocks until the manager has moved the swap into the past log (the
/// bookkeeping step right after the terminal status is published).
pub async fn wait_past_recorded(service: &TestService, offer_id: OfferId) {
    while service.manager().get_past_swap(offer_id).is_none() {
        tokio::task::yield_now().await;
    }
}

/// Blocks until the swap reaches `wanted` (or panics on an earlier
/// terminal status).
pub async fn wait_for_status(service: &TestService, offer_id: OfferId, wanted: SwapStatus) {
    let mut rx = service.subscribe_status(offer_id).expect("swap must exist");
    loop {
        let status = *rx.borrow_and_update();
        if status == wanted {
            return;
        }
        if status.is_terminal() {
            panic!("swap ended {status} while waiting for {wanted}");
        }
        if rx.changed().await.is_err() {
            panic!("status stream closed while waiting for {wanted}");
        }
    }
}
