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

/// Host announcement payloads: the signed `tag || address || key || sig`
/// blobs hosts embed in transactions to advertise themselves.
pub mod announce;

/// Outbound connections to hosts, behind the `HostDialer` trait so the
/// scanner and negotiator can be tested against fakes.
pub mod dial;

/// `HostEntry` and `HostSettings`: the per-host record, its reliability
/// counters, and the weight rule that turns them into a selection
/// probability.
pub mod entry;

/// Persistence of the whole database as one versioned JSON blob with
/// atomic replacement, plus the coalescing saver task.
pub mod persist;

/// Contract bookkeeping and formation: `HostContract`, `HostPool`
/// negotiation against weighted-random hosts, and renewals.
pub mod pool;

/// The scanner: a bounded queue of hosts due a probe, a fixed pool of
/// dialer workers, and a scheduler sweeping on an exponential per-host
/// cadence.
pub mod scanner;

/// The `HostDb` coordinator: owns the host map, the selection tree and
/// the contract map under one read/write lock, and exposes the public
/// query surface.
pub mod store;

/// The consensus consumer: digs host announcements out of applied
/// blocks, undoes them on reverts, and keeps the block height current.
pub mod sync;

/// The weighted host tree. Every node carries its subtree's total
/// weight, giving O(log n) insert, remove, update and weighted random
/// selection.
pub mod tree;

pub use dial::{HostDialer, HostDialerPtr, TcpHostDialer};
pub use entry::{HostEntry, HostSettings};
pub use pool::{HostContract, HostPool, WalletBackend, WalletShim};
pub use store::{HostDb, HostDbPtr};
