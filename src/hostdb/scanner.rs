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

use std::{collections::HashSet, sync::Arc};

use futures::FutureExt;
use log::{debug, info, warn};
use smol::{channel, lock::Mutex};
use url::Url;

use super::{dial::HostDialerPtr, store::HostDb};
use crate::{
    settings::SettingsPtr,
    system::{sleep, ExecutorPtr, LazyWeak, StoppableTask, StoppableTaskPtr},
    util::unix_timestamp,
    Error, Result,
};

pub type ScannerPtr = Arc<Scanner>;

/// Keeps host entries fresh. A bounded queue feeds a fixed pool of
/// worker tasks that dial hosts for their settings; a scheduler task
/// sweeps periodically and enqueues every host due a re-scan. Freshly
/// announced hosts go through a small urgent lane that workers drain
/// first.
pub struct Scanner {
    /// Weak pointer to the parent database
    pub(super) db: LazyWeak<HostDb>,
    dialer: HostDialerPtr,
    settings: SettingsPtr,

    queue_send: channel::Sender<Url>,
    queue_recv: channel::Receiver<Url>,
    urgent_send: channel::Sender<Url>,
    urgent_recv: channel::Receiver<Url>,

    /// Hosts queued or in flight. A host is never scanned twice
    /// concurrently.
    pending: Mutex<HashSet<Url>>,

    workers: Mutex<Vec<StoppableTaskPtr>>,
    scheduler: StoppableTaskPtr,
}

impl Scanner {
    pub fn new(dialer: HostDialerPtr, settings: SettingsPtr) -> ScannerPtr {
        let (queue_send, queue_recv) = channel::bounded(settings.scan_pool_size);
        let (urgent_send, urgent_recv) = channel::bounded(settings.urgent_pool_size);

        Arc::new(Self {
            db: LazyWeak::new(),
            dialer,
            settings,
            queue_send,
            queue_recv,
            urgent_send,
            urgent_recv,
            pending: Mutex::new(HashSet::new()),
            workers: Mutex::new(Vec::new()),
            scheduler: StoppableTask::new(),
        })
    }

    pub async fn start(self: Arc<Self>, executor: ExecutorPtr) {
        info!(
            target: "hostdb::scanner::start()",
            "Starting {} scanning workers", self.settings.scanning_workers,
        );

        let mut workers = self.workers.lock().await;
        for id in 0..self.settings.scanning_workers {
            let task = StoppableTask::new();
            task.clone().start(
                self.clone().run_worker(id),
                move |result| async move {
                    match result {
                        Ok(()) | Err(Error::ServiceStopped) => {}
                        Err(e) => warn!(
                            target: "hostdb::scanner",
                            "Scanning worker #{} exited: {}", id, e,
                        ),
                    }
                },
                Error::ServiceStopped,
                executor.clone(),
            );
            workers.push(task);
        }

        self.scheduler.clone().start(
            self.clone().run_scheduler(),
            |result| async move {
                match result {
                    Ok(()) | Err(Error::ServiceStopped) => {}
                    Err(e) => {
                        warn!(target: "hostdb::scanner", "Scan scheduler exited: {}", e)
                    }
                }
            },
            Error::ServiceStopped,
            executor,
        );
    }

    pub async fn stop(&self) {
        debug!(target: "hostdb::scanner::stop()", "Stopping scanner");
        self.scheduler.stop().await;
        for worker in self.workers.lock().await.iter() {
            worker.stop().await;
        }
    }

    /// Put a host on the scan queue. Urgent scans (fresh announcements)
    /// go through the urgent lane so they are picked up ahead of the
    /// backlog. Returns false without blocking if the host is already
    /// queued or the queue is full; a dropped host is caught by the
    /// next scheduler sweep.
    pub async fn queue_scan(&self, addr: &Url, urgent: bool) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.contains(addr) {
            return false
        }

        let sent = if urgent {
            self.urgent_send.try_send(addr.clone()).is_ok() ||
                self.queue_send.try_send(addr.clone()).is_ok()
        } else {
            self.queue_send.try_send(addr.clone()).is_ok()
        };

        if sent {
            pending.insert(addr.clone());
        } else {
            debug!(target: "hostdb::scanner::queue_scan()", "Scan queue full, dropping {}", addr);
        }
        sent
    }

    async fn run_worker(self: Arc<Self>, id: usize) -> Result<()> {
        debug!(target: "hostdb::scanner", "Scanning worker #{} running", id);
        loop {
            let addr = match self.urgent_recv.try_recv() {
                Ok(addr) => addr,
                Err(_) => {
                    futures::select! {
                        addr = self.urgent_recv.recv().fuse() => addr?,
                        addr = self.queue_recv.recv().fuse() => addr?,
                    }
                }
            };

            self.scan(&addr).await;
            self.pending.lock().await.remove(&addr);
        }
    }

    /// One scan: dial with no lock held, then fold the outcome into
    /// the entry and reconcile its tree membership under the write
    /// lock.
    async fn scan(&self, addr: &Url) {
        let result = self.dialer.request_settings(addr).await;
        let db = self.db.upgrade();
        let now = unix_timestamp();

        {
            let mut inner = db.inner.write().await;
            let Some(entry) = inner.hosts.get_mut(addr) else {
                // Reverted away while we were dialing.
                return
            };

            match result {
                Ok(mut settings) => {
                    debug!(target: "hostdb::scanner::scan()", "Scan of {} succeeded", addr);
                    // The entry is keyed by the announced address;
                    // whatever the host claims inside its settings
                    // frame does not move it.
                    settings.address = addr.clone();
                    entry.scan_succeeded(
                        settings,
                        now,
                        self.settings.min_scan_interval_seconds,
                    );
                }
                Err(e) => {
                    debug!(target: "hostdb::scanner::scan()", "Scan of {} failed: {}", addr, e);
                    entry.scan_failed(now, self.settings.max_scan_interval_seconds);
                }
            }

            inner.reconcile_tree(addr);
        }

        db.store_subscriber.notify(()).await;
    }

    /// Sweep all known hosts and enqueue the ones due a re-scan, then
    /// sleep until the next sweep.
    async fn run_scheduler(self: Arc<Self>) -> Result<()> {
        loop {
            let db = self.db.upgrade();
            let now = unix_timestamp();

            let due: Vec<Url> = {
                let inner = db.inner.read().await;
                inner
                    .hosts
                    .values()
                    .filter(|entry| entry.scan_due(now))
                    .map(|entry| entry.address().clone())
                    .collect()
            };

            if !due.is_empty() {
                debug!(
                    target: "hostdb::scanner::run_scheduler()",
                    "Sweep found {} hosts due a scan", due.len(),
                );
            }

            for addr in due {
                self.queue_scan(&addr, false).await;
            }

            sleep(self.settings.sweep_interval_seconds).await;
        }
    }
}
