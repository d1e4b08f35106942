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

//! Stornet client library. The centerpiece is the [`hostdb`] module: a
//! database of storage hosts discovered from blockchain announcements,
//! continually scanned for liveness and pricing, and selected from at
//! random with probability proportional to a quality weight.

/// Minimal blockchain data types and collaborator interfaces
pub mod chain;

/// Cryptographic primitives (secp256k1 keys, EC-Schnorr signatures)
pub mod crypto;

/// Error enum and crate-wide result type
pub mod error;

/// Host database: discovery, scanning, weighted selection, contracts
pub mod hostdb;

/// Runtime tunables
pub mod settings;

/// Async runtime utilities
pub mod system;

/// Utility functions
pub mod util;

pub use error::{Error, Result};
pub use hostdb::store::{HostDb, HostDbPtr};
