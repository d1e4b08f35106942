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

use std::{path::PathBuf, sync::Arc};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{entry::HostEntry, pool::HostContract, store::HostDb};
use crate::{
    chain::BlockHeight,
    settings::SettingsPtr,
    system::{sleep, Subscription},
    util::file::{load_json_file, save_json_file_atomic},
    Error, Result,
};

/// Format version of the state blob.
pub const STATE_VERSION: u32 = 1;

/// Name of the state file inside the persist directory.
pub const STATE_FILE: &str = "state.json";

/// Everything worth surviving a restart: known hosts with their scan
/// history, active contracts, and the chain position they correspond
/// to.
#[derive(Serialize, Deserialize)]
pub struct SavedState {
    pub version: u32,
    pub block_height: BlockHeight,
    pub hosts: Vec<HostEntry>,
    pub contracts: Vec<HostContract>,
}

impl SavedState {
    pub fn empty() -> Self {
        Self { version: STATE_VERSION, block_height: 0, hosts: vec![], contracts: vec![] }
    }
}

pub(super) fn state_path(settings: &SettingsPtr) -> PathBuf {
    settings.persist_dir.join(STATE_FILE)
}

/// Load persisted state. A missing file is an empty database; a file
/// that exists but does not parse is fatal.
pub(super) fn load_state(settings: &SettingsPtr) -> Result<SavedState> {
    let path = state_path(settings);
    if !path.exists() {
        return Ok(SavedState::empty())
    }

    let state: SavedState = match load_json_file(&path) {
        Ok(state) => state,
        Err(Error::SerdeJson(e)) => return Err(Error::CorruptPersistence(e)),
        Err(e) => return Err(e),
    };

    if state.version != STATE_VERSION {
        return Err(Error::CorruptPersistence(format!(
            "unsupported state version {}",
            state.version
        )))
    }

    Ok(state)
}

impl HostDb {
    /// Snapshot the database and write it out atomically. The lock is
    /// released before the disk write.
    pub async fn save_state(&self) -> Result<()> {
        let state = {
            let inner = self.inner.read().await;

            let mut hosts: Vec<HostEntry> = inner.hosts.values().cloned().collect();
            hosts.sort_by(|a, b| a.address().cmp(b.address()));

            let mut contracts: Vec<HostContract> = inner.contracts.values().cloned().collect();
            contracts.sort_by_key(|c| c.id.0);

            SavedState {
                version: STATE_VERSION,
                block_height: inner.block_height,
                hosts,
                contracts,
            }
        };

        save_json_file_atomic(&state_path(&self.settings), &state)
    }

    /// Saver loop: wake on the first store change, let further changes
    /// pile up for the coalescing window, drain them, save once. A
    /// failed write is retried on the next change.
    pub(super) async fn run_saver(self: Arc<Self>, subscription: Subscription<()>) -> Result<()> {
        loop {
            subscription.receive().await;
            sleep(self.settings.save_coalesce_seconds).await;
            while subscription.try_receive().is_some() {}

            match self.save_state().await {
                Ok(()) => debug!(target: "hostdb::persist::run_saver()", "State saved"),
                Err(e) => warn!(
                    target: "hostdb::persist::run_saver()",
                    "State save failed, will retry on next change: {}", e,
                ),
            }
        }
    }
}
