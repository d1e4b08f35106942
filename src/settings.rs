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

use serde::Deserialize;

/// Atomic pointer to hostdb settings.
pub type SettingsPtr = Arc<Settings>;

/// Default settings for the host database. Can be manually configured.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory where the persisted state file lives
    pub persist_dir: PathBuf,
    /// Number of concurrent scanning workers
    pub scanning_workers: usize,
    /// Capacity of the scan queue
    pub scan_pool_size: usize,
    /// Capacity of the urgent lane for freshly announced hosts
    pub urgent_pool_size: usize,
    /// Outbound dial timeout
    pub connect_timeout_seconds: u64,
    /// Read deadline for a settings response
    pub read_timeout_seconds: u64,
    /// How often the scheduler sweeps for hosts due a re-scan
    pub sweep_interval_seconds: u64,
    /// Re-scan interval after a successful scan
    pub min_scan_interval_seconds: u64,
    /// Re-scan interval cap reached by doubling on consecutive failures
    pub max_scan_interval_seconds: u64,
    /// Coalescing window for state saves
    pub save_coalesce_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("."),
            scanning_workers: 8,
            scan_pool_size: 1000,
            urgent_pool_size: 32,
            connect_timeout_seconds: 60,
            read_timeout_seconds: 30,
            sweep_interval_seconds: 600,
            min_scan_interval_seconds: 1800,
            max_scan_interval_seconds: 7 * 24 * 3600,
            save_coalesce_seconds: 2,
        }
    }
}

/// Configuration-file overlay for [`Settings`]. Absent fields keep
/// their defaults.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsOpt {
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,

    /// Scanning worker pool size
    #[serde(default)]
    pub scanning_workers: Option<usize>,

    #[serde(default)]
    pub scan_pool_size: Option<usize>,
    #[serde(default)]
    pub urgent_pool_size: Option<usize>,
    #[serde(default)]
    pub connect_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub read_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub sweep_interval_seconds: Option<u64>,
    #[serde(default)]
    pub min_scan_interval_seconds: Option<u64>,
    #[serde(default)]
    pub max_scan_interval_seconds: Option<u64>,
    #[serde(default)]
    pub save_coalesce_seconds: Option<u64>,
}

impl From<SettingsOpt> for Settings {
    fn from(opt: SettingsOpt) -> Self {
        let defaults = Settings::default();
        Self {
            persist_dir: opt.persist_dir.unwrap_or(defaults.persist_dir),
            // Fewer than four workers makes one slow dial stall the whole
            // sweep, so the pool never shrinks below that.
            scanning_workers: opt
                .scanning_workers
                .unwrap_or(defaults.scanning_workers)
                .max(4),
            scan_pool_size: opt.scan_pool_size.unwrap_or(defaults.scan_pool_size),
            urgent_pool_size: opt.urgent_pool_size.unwrap_or(defaults.urgent_pool_size),
            connect_timeout_seconds: opt
                .connect_timeout_seconds
                .unwrap_or(defaults.connect_timeout_seconds),
            read_timeout_seconds: opt.read_timeout_seconds.unwrap_or(defaults.read_timeout_seconds),
            sweep_interval_seconds: opt
                .sweep_interval_seconds
                .unwrap_or(defaults.sweep_interval_seconds),
            min_scan_interval_seconds: opt
                .min_scan_interval_seconds
                .unwrap_or(defaults.min_scan_interval_seconds),
            max_scan_interval_seconds: opt
                .max_scan_interval_seconds
                .unwrap_or(defaults.max_scan_interval_seconds),
            save_coalesce_seconds: opt
                .save_coalesce_seconds
                .unwrap_or(defaults.save_coalesce_seconds),
        }
    }
}
