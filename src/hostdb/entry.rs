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

use darkfi_serial::{SerialDecodable, SerialEncodable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::{BlockHeight, Currency},
    crypto::PublicKey,
};

/// Reliability assigned to a host on its first announcement.
pub const START_RELIABILITY: f64 = 10.0;

/// Ceiling reached by repeated successful scans.
pub const MAX_RELIABILITY: f64 = 25.0;

/// Reliability gained per successful scan.
pub const RELIABILITY_UP: f64 = 1.0;

/// Reliability lost per failed scan. A failure costs two successes.
pub const RELIABILITY_DOWN: f64 = 2.0;

/// Exponent applied to the storage price when computing weight.
const PRICE_EXPONENT: i32 = 3;

/// Floor substituted for a zero advertised price.
const PRICE_FLOOR: Currency = 1;

/// Parameters a host advertises about itself, refreshed on every
/// successful scan. This struct is also the settings RPC response
/// frame.
#[derive(
    Clone, PartialEq, Debug, SerialEncodable, SerialDecodable, Serialize, Deserialize,
)]
pub struct HostSettings {
    /// Network location of the host
    pub address: Url,
    /// Key announcements and contract revisions are signed with
    pub public_key: PublicKey,
    /// Total storage offered, in bytes
    pub total_storage: u64,
    /// Storage still unsold, in bytes
    pub remaining_storage: u64,
    /// Longest contract duration accepted, in blocks
    pub max_duration: BlockHeight,
    /// Length of the storage-proof window, in blocks
    pub window_size: BlockHeight,
    /// Price per byte per block
    pub price: Currency,
    /// Collateral per byte per block
    pub collateral: Currency,
    /// Whether the host takes new contracts at all
    pub accepting_contracts: bool,
}

impl HostSettings {
    /// Placeholder settings for a host known only from its
    /// announcement. Everything interesting is zero until the first
    /// successful scan.
    pub fn announced(address: Url, public_key: PublicKey) -> Self {
        Self {
            address,
            public_key,
            total_storage: 0,
            remaining_storage: 0,
            max_duration: 0,
            window_size: 0,
            price: 0,
            collateral: 0,
            accepting_contracts: false,
        }
    }
}

/// Everything the database knows about one host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostEntry {
    pub settings: HostSettings,
    /// Block height of the first announcement
    pub first_seen: BlockHeight,
    /// Number of unreverted announcements referencing this host
    pub announcements: u64,
    /// Whether any scan ever succeeded. Scanned hosts survive chain
    /// reverts of their announcements.
    pub scanned: bool,
    pub reliability: f64,
    /// Whether the most recent scan failed
    pub recent_failure: bool,
    /// Unix time of the last completed scan, 0 if never scanned
    pub last_scan: u64,
    /// Current re-scan interval in seconds
    pub scan_interval: u64,
    /// Derived quality score, recomputed on every settings or
    /// reliability change
    #[serde(skip)]
    pub weight: f64,
    /// Whether the host currently sits in the selection tree
    #[serde(skip)]
    pub in_tree: bool,
}

impl HostEntry {
    pub fn new(settings: HostSettings, first_seen: BlockHeight, scan_interval: u64) -> Self {
        let mut entry = Self {
            settings,
            first_seen,
            announcements: 1,
            scanned: false,
            reliability: START_RELIABILITY,
            recent_failure: false,
            last_scan: 0,
            scan_interval,
            weight: 0.0,
            in_tree: false,
        };
        entry.update_weight();
        entry
    }

    pub fn address(&self) -> &Url {
        &self.settings.address
    }

    /// Quality score. Zero whenever the host cannot take a contract at
    /// all; otherwise better reliability and more free space raise it,
    /// a higher price lowers it.
    pub fn update_weight(&mut self) {
        self.weight = entry_weight(&self.settings, self.reliability);
    }

    /// Whether the host should currently be selectable.
    pub fn eligible(&self) -> bool {
        self.weight > 0.0 && !self.recent_failure
    }

    /// Fold a successful scan into the entry.
    pub fn scan_succeeded(&mut self, mut settings: HostSettings, now: u64, min_interval: u64) {
        // A host cannot have more space free than it has in total.
        settings.remaining_storage = settings.remaining_storage.min(settings.total_storage);
        self.settings = settings;
        self.scanned = true;
        self.recent_failure = false;
        self.reliability = (self.reliability + RELIABILITY_UP).min(MAX_RELIABILITY);
        self.last_scan = now;
        self.scan_interval = min_interval;
        self.update_weight();
    }

    /// Fold a failed scan into the entry.
    pub fn scan_failed(&mut self, now: u64, max_interval: u64) {
        self.recent_failure = true;
        self.reliability = (self.reliability - RELIABILITY_DOWN).max(0.0);
        self.last_scan = now;
        self.scan_interval = (self.scan_interval * 2).min(max_interval);
        self.update_weight();
    }

    /// Whether the host is due for a re-scan at time `now`.
    pub fn scan_due(&self, now: u64) -> bool {
        now.saturating_sub(self.last_scan) > self.scan_interval
    }
}

/// The weight rule. Kept as a free function so the tree tests can
/// exercise it directly.
pub fn entry_weight(settings: &HostSettings, reliability: f64) -> f64 {
    if !settings.accepting_contracts || reliability <= 0.0 || settings.remaining_storage == 0 {
        return 0.0
    }

    let price = settings.price.max(PRICE_FLOOR) as f64;
    reliability * reliability * settings.remaining_storage as f64 / price.powi(PRICE_EXPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn test_settings() -> HostSettings {
        HostSettings {
            address: Url::parse("tcp://host.example:9981").unwrap(),
            public_key: Keypair::random().public,
            total_storage: 1 << 40,
            remaining_storage: 1 << 38,
            max_duration: 10_000,
            window_size: 144,
            price: 50,
            collateral: 10,
            accepting_contracts: true,
        }
    }

    #[test]
    fn test_weight_gating() {
        let settings = test_settings();
        assert!(entry_weight(&settings, 10.0) > 0.0);

        let mut closed = settings.clone();
        closed.accepting_contracts = false;
        assert_eq!(entry_weight(&closed, 10.0), 0.0);

        let mut full = settings.clone();
        full.remaining_storage = 0;
        assert_eq!(entry_weight(&full, 10.0), 0.0);

        assert_eq!(entry_weight(&settings, 0.0), 0.0);
    }

    #[test]
    fn test_weight_monotonicity() {
        let settings = test_settings();

        // Nondecreasing in reliability
        assert!(entry_weight(&settings, 20.0) >= entry_weight(&settings, 10.0));

        // Nondecreasing in remaining storage
        let mut roomier = settings.clone();
        roomier.remaining_storage *= 2;
        assert!(entry_weight(&roomier, 10.0) >= entry_weight(&settings, 10.0));

        // Nonincreasing in price
        let mut pricier = settings.clone();
        pricier.price *= 10;
        assert!(entry_weight(&pricier, 10.0) <= entry_weight(&settings, 10.0));
    }

    #[test]
    fn test_reliability_sequence() {
        let mut entry = HostEntry::new(test_settings(), 1, 1800);
        let start = entry.reliability;

        // K successes alone leave reliability at or above the start.
        for _ in 0..5 {
            entry.scan_succeeded(test_settings(), 0, 1800);
        }
        assert!(entry.reliability >= start);
        let peak_weight = entry.weight;

        // K successes followed by K failures leave it at or below.
        for _ in 0..5 {
            entry.scan_failed(0, 7 * 24 * 3600);
        }
        assert!(entry.reliability <= start);
        assert!(entry.weight <= peak_weight);
        assert!(entry.recent_failure);
        assert!(!entry.eligible());
    }

    #[test]
    fn test_scan_interval_backoff() {
        let max = 7 * 24 * 3600;
        let mut entry = HostEntry::new(test_settings(), 1, 1800);
        assert_eq!(entry.scan_interval, 1800);

        for _ in 0..16 {
            entry.scan_failed(0, max);
        }
        assert_eq!(entry.scan_interval, max);

        entry.scan_succeeded(test_settings(), 0, 1800);
        assert_eq!(entry.scan_interval, 1800);
    }

    #[test]
    fn test_scan_due() {
        let mut entry = HostEntry::new(test_settings(), 1, 1800);
        entry.last_scan = 1000;
        assert!(!entry.scan_due(1000 + 1800));
        assert!(entry.scan_due(1000 + 1801));
    }
}
