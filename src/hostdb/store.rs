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

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use log::{info, warn};
use rand::rngs::OsRng;
use smol::lock::RwLock;
use url::Url;

use super::{
    dial::HostDialerPtr,
    entry::{HostEntry, HostSettings},
    pool::HostContract,
    scanner::{Scanner, ScannerPtr},
    tree::HostTree,
};
use crate::{
    chain::{BlockHeight, ConsensusSet, Currency, Hash, TransactionPool, UnlockConditions, Wallet},
    settings::SettingsPtr,
    system::{ExecutorPtr, StoppableTask, StoppableTaskPtr, Subscriber, SubscriberPtr, Subscription},
    Error, Result,
};

/// Atomic pointer to the host database.
pub type HostDbPtr = Arc<HostDb>;

/// Everything the coordinator guards with its single read/write lock.
/// The lock is taken for short critical sections only and never held
/// across network or disk I/O.
pub struct HostDbInner {
    /// All hosts ever learned of, keyed by announced address
    pub(super) hosts: HashMap<Url, HostEntry>,
    /// Selection tree holding the currently active hosts
    pub(super) tree: HostTree,
    /// Active contracts keyed by contract id
    pub(super) contracts: HashMap<Hash, HostContract>,
    /// Height of the last processed block
    pub(super) block_height: BlockHeight,
    /// Wallet address reused across negotiations
    pub(super) cached_address: Option<UnlockConditions>,
}

impl HostDbInner {
    /// Bring a host's tree membership in line with its weight and
    /// recent-failure flag. Call after anything that touches either.
    pub(super) fn reconcile_tree(&mut self, addr: &Url) {
        let Some(entry) = self.hosts.get_mut(addr) else {
            self.tree.remove(addr);
            return
        };

        let weight = entry.weight;
        let eligible = entry.eligible();
        let was_in_tree = entry.in_tree;
        entry.in_tree = eligible;

        if eligible && !was_in_tree {
            self.tree.insert(addr, weight);
        } else if !eligible && was_in_tree {
            self.tree.remove(addr);
        } else if eligible {
            self.tree.update_weight(addr, weight);
        }
    }
}

/// The host database. Learns hosts from chain announcements, keeps
/// their settings fresh through the scanner, weighs them, and hands
/// out weighted-random picks for contract formation.
pub struct HostDb {
    pub(super) inner: RwLock<HostDbInner>,
    pub(super) scanner: ScannerPtr,
    pub(super) wallet: Arc<dyn Wallet>,
    pub(super) tpool: Arc<dyn TransactionPool>,
    pub(super) dialer: HostDialerPtr,
    pub(super) settings: SettingsPtr,
    /// Notified on every structural change; drives the coalesced saver
    pub(super) store_subscriber: SubscriberPtr<()>,
    pub(super) saver: StoppableTaskPtr,
}

impl HostDb {
    /// Create a host database, loading any previously persisted state.
    /// A malformed state file is fatal; a missing one is an empty
    /// database.
    pub fn new(
        wallet: Arc<dyn Wallet>,
        tpool: Arc<dyn TransactionPool>,
        dialer: HostDialerPtr,
        settings: SettingsPtr,
    ) -> Result<HostDbPtr> {
        let state = super::persist::load_state(&settings)?;

        let mut inner = HostDbInner {
            hosts: HashMap::new(),
            tree: HostTree::new(),
            contracts: HashMap::new(),
            block_height: state.block_height,
            cached_address: None,
        };

        for mut entry in state.hosts {
            entry.update_weight();
            entry.in_tree = false;
            let addr = entry.address().clone();
            inner.hosts.insert(addr.clone(), entry);
            inner.reconcile_tree(&addr);
        }
        for contract in state.contracts {
            inner.contracts.insert(contract.id, contract);
        }

        let db = Arc::new(Self {
            inner: RwLock::new(inner),
            scanner: Scanner::new(dialer.clone(), settings.clone()),
            wallet,
            tpool,
            dialer,
            settings,
            store_subscriber: Subscriber::new(),
            saver: StoppableTask::new(),
        });
        db.scanner.db.init(db.clone());

        Ok(db)
    }

    /// Start the scanner and the saver, and subscribe to consensus
    /// changes. Announcements found in blocks flow into the database
    /// from here on.
    pub async fn start(
        self: Arc<Self>,
        executor: ExecutorPtr,
        consensus: Arc<dyn ConsensusSet>,
    ) -> Result<()> {
        info!(target: "hostdb::store::start()", "Starting host database");

        self.scanner.clone().start(executor.clone()).await;

        let subscription = self.store_subscriber.clone().subscribe().await;
        self.saver.clone().start(
            self.clone().run_saver(subscription),
            |result| async move {
                match result {
                    Ok(()) | Err(Error::ServiceStopped) => {}
                    Err(e) => warn!(target: "hostdb::store", "State saver exited: {}", e),
                }
            },
            Error::ServiceStopped,
            executor,
        );

        consensus.subscribe(self.clone()).await?;
        Ok(())
    }

    /// Stop the background tasks and flush state to disk.
    pub async fn stop(&self) {
        info!(target: "hostdb::store::stop()", "Stopping host database");
        self.scanner.stop().await;
        self.saver.stop().await;

        if let Err(e) = self.save_state().await {
            warn!(target: "hostdb::store::stop()", "Final state save failed: {}", e);
        }
    }

    /// Settings of every host currently eligible for selection, best
    /// weight first. Equal weights rank the longest-known host first.
    pub async fn active_hosts(&self) -> Vec<HostSettings> {
        let inner = self.inner.read().await;

        let mut active: Vec<&HostEntry> =
            inner.tree.addresses().filter_map(|addr| inner.hosts.get(addr)).collect();

        active.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
                .then_with(|| a.address().cmp(b.address()))
        });

        active.into_iter().map(|entry| entry.settings.clone()).collect()
    }

    /// Settings of every host the database has ever learned of,
    /// including unreachable ones.
    pub async fn all_hosts(&self) -> Vec<HostSettings> {
        let inner = self.inner.read().await;

        let mut all: Vec<&HostEntry> = inner.hosts.values().collect();
        all.sort_by(|a, b| a.address().cmp(b.address()));

        all.into_iter().map(|entry| entry.settings.clone()).collect()
    }

    /// Arithmetic mean of the storage price over active hosts, zero
    /// when none are active.
    pub async fn average_price(&self) -> Currency {
        let inner = self.inner.read().await;

        let prices: Vec<Currency> = inner
            .tree
            .addresses()
            .filter_map(|addr| inner.hosts.get(addr))
            .map(|entry| entry.settings.price)
            .collect();

        if prices.is_empty() {
            return 0
        }
        prices.iter().sum::<Currency>() / prices.len() as Currency
    }

    /// Up to `n` weighted-random picks without replacement. Picked
    /// hosts leave the tree for the duration of the call and are
    /// reinserted before it returns.
    pub async fn random_hosts(&self, n: usize) -> Vec<HostEntry> {
        let mut inner = self.inner.write().await;

        let mut picked = Vec::with_capacity(n);
        let mut removed = Vec::with_capacity(n);

        for _ in 0..n {
            let Ok(addr) = inner.tree.pick(&mut OsRng) else { break };
            let weight = inner.tree.remove(&addr).unwrap_or_default();
            if let Some(entry) = inner.hosts.get(&addr) {
                picked.push(entry.clone());
            }
            removed.push((addr, weight));
        }

        for (addr, weight) in removed {
            inner.tree.insert(&addr, weight);
        }

        picked
    }

    /// Seed a host by hand, as if it had been announced at the current
    /// height. Returns false if the address is already known.
    pub async fn insert_host(&self, settings: HostSettings) -> bool {
        let addr = settings.address.clone();

        {
            let mut inner = self.inner.write().await;
            if inner.hosts.contains_key(&addr) {
                return false
            }
            let height = inner.block_height;
            let entry =
                HostEntry::new(settings, height, self.settings.min_scan_interval_seconds);
            inner.hosts.insert(addr.clone(), entry);
        }

        self.scanner.queue_scan(&addr, true).await;
        self.store_subscriber.notify(()).await;
        true
    }

    /// Height of the last processed block.
    pub async fn block_height(&self) -> BlockHeight {
        self.inner.read().await.block_height
    }

    /// Subscribe to store-change notifications.
    pub async fn subscribe_store(&self) -> Subscription<()> {
        self.store_subscriber.clone().subscribe().await
    }
}
