/* This file is part of Stornet (https://stornet.network)
 *
 * Copyright (C) 2024-2026 Stornet developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! End-to-end host database scenarios against mock collaborators.

use std::{collections::HashMap, fs, future::Future, path::PathBuf, sync::Arc, time::Instant};

use async_trait::async_trait;
use smol::{lock::Mutex, Executor};
use url::Url;

use stornet::{
    chain::{
        Block, ConsensusChange, ConsensusSet, ConsensusSubscriberPtr, Currency, FileContract,
        Hash, Transaction, TransactionBuilder, TransactionPool, UnlockConditions,
    },
    crypto::Keypair,
    hostdb::{
        announce::create_announcement,
        dial::HostDialer,
        entry::HostSettings,
        pool::{ContractRequest, WalletBackend, WalletShim},
        HostDb, HostDbPtr,
    },
    settings::{Settings, SettingsPtr},
    system::{msleep, ExecutorPtr},
    Error, Result,
};

/// Dialer whose world is a table of reachable hosts.
struct MockDialer {
    reachable: Mutex<HashMap<Url, HostSettings>>,
}

impl MockDialer {
    fn new() -> Arc<Self> {
        Arc::new(Self { reachable: Mutex::new(HashMap::new()) })
    }

    async fn put_host(&self, settings: HostSettings) {
        self.reachable.lock().await.insert(settings.address.clone(), settings);
    }

    async fn drop_host(&self, addr: &Url) {
        self.reachable.lock().await.remove(addr);
    }
}

#[async_trait]
impl HostDialer for MockDialer {
    async fn request_settings(&self, addr: &Url) -> Result<HostSettings> {
        match self.reachable.lock().await.get(addr) {
            Some(settings) => Ok(settings.clone()),
            None => Err(Error::ConnectFailed),
        }
    }

    async fn negotiate_contract(
        &self,
        addr: &Url,
        request: &ContractRequest,
    ) -> Result<Vec<Transaction>> {
        if !self.reachable.lock().await.contains_key(addr) {
            return Err(Error::ConnectFailed)
        }
        // The host accepts anything and returns the set as signed.
        Ok(request.transactions.clone())
    }
}

struct MockBuilder {
    txn: Transaction,
    funded: Currency,
}

#[async_trait]
impl TransactionBuilder for MockBuilder {
    fn add_arbitrary_data(&mut self, data: Vec<u8>) -> u64 {
        self.txn.arbitrary_data.push(data);
        self.txn.arbitrary_data.len() as u64 - 1
    }

    fn add_file_contract(&mut self, contract: FileContract) -> u64 {
        self.txn.file_contracts.push(contract);
        self.txn.file_contracts.len() as u64 - 1
    }

    async fn fund(&mut self, amount: Currency) -> Result<()> {
        self.funded += amount;
        Ok(())
    }

    async fn sign(&mut self, _whole: bool) -> Result<Vec<Transaction>> {
        if self.funded == 0 {
            return Err(Error::ContractNegotiation("signing an unfunded transaction".to_string()))
        }
        Ok(vec![self.txn.clone()])
    }

    fn view(&self) -> (Transaction, Vec<Transaction>) {
        (self.txn.clone(), vec![])
    }

    fn drop_builder(&mut self) {
        self.txn = Transaction::default();
        self.funded = 0;
    }
}

struct MockWallet;

#[async_trait]
impl WalletBackend for MockWallet {
    type Builder = MockBuilder;

    async fn next_address(&self) -> Result<UnlockConditions> {
        Ok(UnlockConditions {
            timelock: 0,
            required_signatures: 1,
            unlock_hash: Hash::digest(b"client address"),
        })
    }

    async fn start_transaction(&self) -> MockBuilder {
        MockBuilder { txn: Transaction::default(), funded: 0 }
    }
}

struct MockTpool {
    accepted: Mutex<Vec<Vec<Transaction>>>,
}

impl MockTpool {
    fn new() -> Arc<Self> {
        Arc::new(Self { accepted: Mutex::new(vec![]) })
    }
}

#[async_trait]
impl TransactionPool for MockTpool {
    async fn accept_transaction_set(&self, txns: Vec<Transaction>) -> Result<()> {
        self.accepted.lock().await.push(txns);
        Ok(())
    }
}

/// Hands changes to whatever subscribed, like the consensus set does.
struct MockConsensus {
    subscriber: Mutex<Option<ConsensusSubscriberPtr>>,
}

impl MockConsensus {
    fn new() -> Arc<Self> {
        Arc::new(Self { subscriber: Mutex::new(None) })
    }

    async fn send(&self, change: ConsensusChange) {
        let subscriber = self.subscriber.lock().await.clone().unwrap();
        subscriber.process_consensus_change(change).await;
    }
}

#[async_trait]
impl ConsensusSet for MockConsensus {
    async fn subscribe(&self, subscriber: ConsensusSubscriberPtr) -> Result<()> {
        *self.subscriber.lock().await = Some(subscriber);
        Ok(())
    }
}

/// Helper object wiring a host database to all its mocks.
struct HostDbTester {
    db: HostDbPtr,
    dialer: Arc<MockDialer>,
    tpool: Arc<MockTpool>,
    consensus: Arc<MockConsensus>,
}

impl HostDbTester {
    fn settings(name: &str) -> SettingsPtr {
        Arc::new(Settings {
            persist_dir: test_dir(name),
            scanning_workers: 4,
            sweep_interval_seconds: 1,
            min_scan_interval_seconds: 1,
            save_coalesce_seconds: 1,
            ..Default::default()
        })
    }

    fn new(settings: SettingsPtr) -> Self {
        let dialer = MockDialer::new();
        let tpool = MockTpool::new();
        let consensus = MockConsensus::new();

        let db = HostDb::new(
            WalletShim::new(Arc::new(MockWallet)),
            tpool.clone(),
            dialer.clone(),
            settings,
        )
        .unwrap();

        Self { db, dialer, tpool, consensus }
    }

    async fn start(&self, executor: ExecutorPtr) {
        self.db.clone().start(executor, self.consensus.clone()).await.unwrap();
    }

    /// Announce a host in a fresh block and return that block, so the
    /// test can also revert it.
    async fn announce(&self, settings: &HostSettings, keypair: &Keypair) -> Block {
        let block = Block {
            id: Hash::digest(settings.address.as_str().as_bytes()),
            transactions: vec![Transaction {
                arbitrary_data: vec![create_announcement(&settings.address, &keypair.secret)],
                ..Default::default()
            }],
        };
        self.consensus
            .send(ConsensusChange { reverted: vec![], applied: vec![block.clone()] })
            .await;
        block
    }

    /// Poll until the host shows up in the active set.
    async fn wait_active(&self, addr: &Url) -> bool {
        for _ in 0..50 {
            if self.db.active_hosts().await.iter().any(|h| h.address == *addr) {
                return true
            }
            msleep(100).await;
        }
        false
    }
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stornet-hostdb-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_host(n: usize, keypair: &Keypair) -> HostSettings {
    HostSettings {
        address: Url::parse(&format!("tcp://host{}.example:9981", n)).unwrap(),
        public_key: keypair.public,
        total_storage: 1 << 40,
        remaining_storage: 1 << 38,
        max_duration: 100_000,
        window_size: 144,
        price: 50,
        collateral: 10,
        accepting_contracts: true,
    }
}

/// Drive a test future on a fresh executor so background tasks make
/// progress while the test body awaits.
fn run_test<F>(test: impl FnOnce(ExecutorPtr) -> F)
where
    F: Future<Output = ()>,
{
    // Raise the level when debugging a test.
    let _ = simplelog::SimpleLogger::init(
        simplelog::LevelFilter::Off,
        simplelog::Config::default(),
    );

    let ex: ExecutorPtr = Arc::new(Executor::new());
    smol::block_on(ex.run(test(ex.clone())));
}

#[test]
fn test_announcement_to_active() {
    let settings = HostDbTester::settings("announce");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        // A reachable host and an unreachable one, announced together.
        let good_key = Keypair::random();
        let good = test_host(1, &good_key);
        tester.dialer.put_host(good.clone()).await;

        let bad_key = Keypair::random();
        let bad = test_host(2, &bad_key);

        tester.announce(&good, &good_key).await;
        tester.announce(&bad, &bad_key).await;
        assert_eq!(tester.db.block_height().await, 2);

        // The reachable host becomes active with its scanned settings.
        assert!(tester.wait_active(&good.address).await);
        let active = tester.db.active_hosts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].remaining_storage, good.remaining_storage);

        // The unreachable one stays known but inactive.
        let all = tester.db.all_hosts().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|h| h.address == bad.address));
        assert!(!tester.db.active_hosts().await.iter().any(|h| h.address == bad.address));

        tester.db.stop().await;
    });
}

#[test]
fn test_garbage_announcements_ignored() {
    let settings = HostDbTester::settings("garbage");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        // A block full of junk payloads and one announcement whose
        // signature does not match its address.
        let keypair = Keypair::random();
        let host = test_host(1, &keypair);
        let mut forged = create_announcement(&host.address, &keypair.secret);
        let last = forged.len() - 1;
        forged[last] ^= 0x01;

        let block = Block {
            id: Hash::digest(b"junk block"),
            transactions: vec![Transaction {
                arbitrary_data: vec![b"not an announcement".to_vec(), vec![], forged],
                ..Default::default()
            }],
        };
        tester.consensus.send(ConsensusChange { reverted: vec![], applied: vec![block] }).await;

        assert_eq!(tester.db.block_height().await, 1);
        assert!(tester.db.all_hosts().await.is_empty());

        tester.db.stop().await;
    });
}

#[test]
fn test_revert_forgets_unscanned_host() {
    let settings = HostDbTester::settings("revert");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        // Unreachable host: the scan fails, so a revert forgets it.
        let keypair = Keypair::random();
        let host = test_host(1, &keypair);
        let block = tester.announce(&host, &keypair).await;

        // Give the failing scan a moment to complete.
        msleep(300).await;
        assert_eq!(tester.db.all_hosts().await.len(), 1);

        tester.consensus.send(ConsensusChange { reverted: vec![block], applied: vec![] }).await;
        assert_eq!(tester.db.block_height().await, 0);
        assert!(tester.db.all_hosts().await.is_empty());

        tester.db.stop().await;
    });
}

#[test]
fn test_revert_keeps_scanned_host() {
    let settings = HostDbTester::settings("revert-scanned");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        let keypair = Keypair::random();
        let host = test_host(1, &keypair);
        tester.dialer.put_host(host.clone()).await;

        let block = tester.announce(&host, &keypair).await;
        assert!(tester.wait_active(&host.address).await);

        // A successful scan happened between announcement and revert,
        // so the host is retained.
        tester.consensus.send(ConsensusChange { reverted: vec![block], applied: vec![] }).await;
        assert_eq!(tester.db.all_hosts().await.len(), 1);

        tester.db.stop().await;
    });
}

#[test]
fn test_average_price() {
    let settings = HostDbTester::settings("price");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        assert_eq!(tester.db.average_price().await, 0);

        let key1 = Keypair::random();
        let mut host1 = test_host(1, &key1);
        host1.price = 40;
        tester.dialer.put_host(host1.clone()).await;
        tester.announce(&host1, &key1).await;

        let key2 = Keypair::random();
        let mut host2 = test_host(2, &key2);
        host2.price = 60;
        tester.dialer.put_host(host2.clone()).await;
        tester.announce(&host2, &key2).await;

        assert!(tester.wait_active(&host1.address).await);
        assert!(tester.wait_active(&host2.address).await);
        assert_eq!(tester.db.average_price().await, 50);

        tester.db.stop().await;
    });
}

#[test]
fn test_queue_backpressure() {
    let settings = HostDbTester::settings("backpressure");
    run_test(|_ex| async move {
        // The database is not started: no workers drain the queue, so
        // enqueues beyond its capacity must drop rather than block.
        let tester = HostDbTester::new(settings);

        let keypair = Keypair::random();
        let started = Instant::now();
        for n in 0..1100 {
            tester.db.insert_host(test_host(n, &keypair)).await;
        }
        assert!(started.elapsed().as_secs() < 10, "enqueue blocked on a full queue");

        // Every host is known regardless of whether its scan fit.
        assert_eq!(tester.db.all_hosts().await.len(), 1100);

        // Re-inserting a known host is a no-op.
        assert!(!tester.db.insert_host(test_host(0, &keypair)).await);
    });
}

#[test]
fn test_pool_and_renew() {
    let settings = HostDbTester::settings("pool");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        // Nothing active yet.
        assert!(matches!(tester.db.new_pool(4096, 100).await, Err(Error::NoHosts)));

        let keypair = Keypair::random();
        let host = test_host(1, &keypair);
        tester.dialer.put_host(host.clone()).await;
        tester.announce(&host, &keypair).await;
        assert!(tester.wait_active(&host.address).await);

        let pool = tester.db.new_pool(4096, 100).await.unwrap();
        assert_eq!(pool.contracts().len(), 1);
        assert_eq!(pool.hosts(), &[host.address.clone()]);
        assert_eq!(tester.tpool.accepted.lock().await.len(), 1);

        let id = pool.contracts()[0];
        assert_eq!(tester.db.contract_ids().await, vec![id]);

        // Renewal swaps the entry atomically.
        let new_id = tester.db.renew(id, 500).await.unwrap();
        assert_ne!(new_id, id);
        assert_eq!(tester.db.contract_ids().await, vec![new_id]);
        assert!(matches!(tester.db.renew(id, 600).await, Err(Error::ContractNotFound)));

        // A host that stops answering fails negotiation.
        tester.dialer.drop_host(&host.address).await;
        assert!(matches!(tester.db.new_pool(4096, 100).await, Err(Error::NoHosts)));

        tester.db.stop().await;
    });
}

#[test]
fn test_persistence_roundtrip() {
    let settings = HostDbTester::settings("persist");
    run_test(|ex| async move {
        let keypair = Keypair::random();
        let host = test_host(1, &keypair);

        {
            let tester = HostDbTester::new(settings.clone());
            tester.start(ex).await;

            tester.dialer.put_host(host.clone()).await;
            tester.announce(&host, &keypair).await;
            assert!(tester.wait_active(&host.address).await);

            let pool = tester.db.new_pool(4096, 100).await.unwrap();
            assert_eq!(pool.contracts().len(), 1);

            // stop() flushes state.
            tester.db.stop().await;
        }

        // A crash that only got as far as the temporary file must not
        // damage the state either.
        fs::write(settings.persist_dir.join("state.json.tmp"), b"half-written garbage").unwrap();

        let reloaded = HostDbTester::new(settings);
        assert_eq!(reloaded.db.block_height().await, 1);
        assert_eq!(reloaded.db.all_hosts().await.len(), 1);
        assert_eq!(reloaded.db.contract_ids().await.len(), 1);

        // The scanned host comes back eligible without waiting for a
        // fresh scan.
        assert_eq!(reloaded.db.active_hosts().await.len(), 1);
    });
}

#[test]
fn test_corrupt_state_is_fatal() {
    let settings = HostDbTester::settings("corrupt");
    fs::write(settings.persist_dir.join("state.json"), b"{ not json").unwrap();

    let result = HostDb::new(
        WalletShim::new(Arc::new(MockWallet)),
        MockTpool::new(),
        MockDialer::new(),
        settings,
    );
    assert!(matches!(result, Err(Error::CorruptPersistence(_))));
}

#[test]
fn test_random_hosts_distinct() {
    let settings = HostDbTester::settings("random");
    run_test(|ex| async move {
        let tester = HostDbTester::new(settings);
        tester.start(ex).await;

        let mut addrs = vec![];
        for n in 0..5 {
            let keypair = Keypair::random();
            let host = test_host(n, &keypair);
            tester.dialer.put_host(host.clone()).await;
            tester.announce(&host, &keypair).await;
            addrs.push(host.address.clone());
        }
        for addr in &addrs {
            assert!(tester.wait_active(addr).await);
        }

        // Without replacement: no duplicates, and asking for more than
        // exist returns them all.
        let picked = tester.db.random_hosts(10).await;
        assert_eq!(picked.len(), 5);
        let mut seen: Vec<_> = picked.iter().map(|e| e.address().clone()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);

        // The tree is intact afterwards.
        assert_eq!(tester.db.active_hosts().await.len(), 5);

        tester.db.stop().await;
    });
}
