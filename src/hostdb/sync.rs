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

use async_trait::async_trait;
use log::{debug, info};
use url::Url;

use super::{
    announce::decode_announcement,
    entry::{HostEntry, HostSettings},
    store::HostDb,
};
use crate::chain::{Block, ConsensusChange, ConsensusSubscriber};

impl HostDb {
    /// Undo one block's announcements. A host whose every announcement
    /// has been reverted is forgotten, unless a scan ever reached it.
    fn revert_block(inner: &mut super::store::HostDbInner, block: &Block) {
        inner.block_height = inner.block_height.saturating_sub(1);

        for txn in &block.transactions {
            for data in &txn.arbitrary_data {
                let Ok(announcement) = decode_announcement(data) else { continue };
                let addr = announcement.address;

                let Some(entry) = inner.hosts.get_mut(&addr) else { continue };
                entry.announcements = entry.announcements.saturating_sub(1);

                if entry.announcements == 0 && !entry.scanned {
                    debug!(
                        target: "hostdb::sync::revert_block()",
                        "Forgetting reverted host {}", addr,
                    );
                    inner.hosts.remove(&addr);
                    inner.reconcile_tree(&addr);
                }
            }
        }
    }

    /// Apply one block's announcements, collecting fresh addresses for
    /// immediate scanning.
    fn apply_block(
        inner: &mut super::store::HostDbInner,
        block: &Block,
        min_scan_interval: u64,
        fresh: &mut Vec<Url>,
    ) {
        inner.block_height += 1;
        let height = inner.block_height;

        for txn in &block.transactions {
            for data in &txn.arbitrary_data {
                // Unsigned, mis-signed or undecodable payloads are
                // silently ignored.
                let Ok(announcement) = decode_announcement(data) else { continue };
                let addr = announcement.address.clone();

                match inner.hosts.get_mut(&addr) {
                    Some(entry) => {
                        // Known host re-announcing itself. first_seen
                        // keeps its original height.
                        entry.announcements += 1;
                    }
                    None => {
                        info!(
                            target: "hostdb::sync::apply_block()",
                            "New host announced at height {}: {}", height, addr,
                        );
                        let settings =
                            HostSettings::announced(addr.clone(), announcement.public_key);
                        inner
                            .hosts
                            .insert(addr.clone(), HostEntry::new(settings, height, min_scan_interval));
                        fresh.push(addr);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ConsensusSubscriber for HostDb {
    /// Process one consensus change. New hosts are on the scan queue
    /// before this returns.
    async fn process_consensus_change(&self, change: ConsensusChange) {
        let mut fresh = vec![];

        {
            let mut inner = self.inner.write().await;

            for block in &change.reverted {
                Self::revert_block(&mut inner, block);
            }
            for block in &change.applied {
                Self::apply_block(
                    &mut inner,
                    block,
                    self.settings.min_scan_interval_seconds,
                    &mut fresh,
                );
            }

            // Contracts whose proof window has closed are settled on
            // chain and no longer ours to track.
            let height = inner.block_height;
            inner.contracts.retain(|id, contract| {
                let live = contract.file_contract.window_end >= height;
                if !live {
                    debug!(
                        target: "hostdb::sync::process_consensus_change()",
                        "Contract {} expired at height {}", id, height,
                    );
                }
                live
            });
        }

        for addr in &fresh {
            self.scanner.queue_scan(addr, true).await;
        }

        self.store_subscriber.notify(()).await;
    }
}
