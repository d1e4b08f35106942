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

use std::{sync::Arc, time::Duration};

use smol::Timer;

/// Parent-child pointer helper avoiding `Mutex<Option<Arc<T>>>` boilerplate
pub mod lazy_weak;

/// A background task that can be prematurely stopped at any time
pub mod stoppable_task;

/// Simple broadcast (publish-subscribe) utility
pub mod subscriber;

pub use lazy_weak::LazyWeak;
pub use stoppable_task::{StoppableTask, StoppableTaskPtr};
pub use subscriber::{Subscriber, SubscriberPtr, Subscription};

/// Executor pointer shared by all background tasks
pub type ExecutorPtr = Arc<smol::Executor<'static>>;

/// Sleep for any number of seconds.
pub async fn sleep(seconds: u64) {
    Timer::after(Duration::from_secs(seconds)).await;
}

/// Sleep for any number of milliseconds.
pub async fn msleep(millis: u64) {
    Timer::after(Duration::from_millis(millis)).await;
}
