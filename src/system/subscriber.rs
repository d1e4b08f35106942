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

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use smol::{channel, lock::Mutex};

pub type SubscriberPtr<T> = Arc<Subscriber<T>>;

pub type SubscriptionId = u64;

/// One subscriber's receiving end of a [`Subscriber`].
pub struct Subscription<T> {
    id: SubscriptionId,
    recv_queue: channel::Receiver<T>,
    parent: Arc<Subscriber<T>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Wait for the next notification.
    pub async fn receive(&self) -> T {
        match self.recv_queue.recv().await {
            Ok(message) => message,
            Err(err) => {
                panic!("Subscription::receive() recv_queue failed! {}", err)
            }
        }
    }

    /// Drain a pending notification without waiting, if one is queued.
    pub fn try_receive(&self) -> Option<T> {
        self.recv_queue.try_recv().ok()
    }

    // Must be called manually since async Drop is not possible in Rust
    pub async fn unsubscribe(&self) {
        self.parent.clone().unsubscribe(self.id).await
    }
}

/// Simple broadcast (publish-subscribe) class
pub struct Subscriber<T> {
    subs: Mutex<HashMap<SubscriptionId, channel::Sender<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { subs: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) })
    }

    pub async fn subscribe(self: Arc<Self>) -> Subscription<T> {
        let (sender, recv_queue) = channel::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subs.lock().await.insert(id, sender);

        Subscription { id, recv_queue, parent: self.clone() }
    }

    async fn unsubscribe(self: Arc<Self>, id: SubscriptionId) {
        self.subs.lock().await.remove(&id);
    }

    pub async fn notify(&self, message: T) {
        for sub in self.subs.lock().await.values() {
            // A subscription dropped without unsubscribing is not fatal.
            let _ = sub.send(message.clone()).await;
        }
    }
}
