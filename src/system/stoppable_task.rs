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

use std::sync::Arc;

use smol::{
    channel,
    future::{self, Future},
};

use super::ExecutorPtr;

pub type StoppableTaskPtr = Arc<StoppableTask>;

/// A task that can be prematurely stopped at any time.
///
/// ```ignore
///     let task = StoppableTask::new();
///     task.clone().start(
///         my_method(),
///         |result| self_.handle_stop(result),
///         Error::MyStopError,
///         executor,
///     );
/// ```
///
/// Then at any time we can call `task.stop()` to close the task.
pub struct StoppableTask {
    stop_send: channel::Sender<()>,
    stop_recv: channel::Receiver<()>,
    // The stop barrier releases stop() once the process has fully wound down.
    done_send: channel::Sender<()>,
    done_recv: channel::Receiver<()>,
}

impl StoppableTask {
    pub fn new() -> Arc<Self> {
        let (stop_send, stop_recv) = channel::bounded(1);
        let (done_send, done_recv) = channel::bounded(1);
        Arc::new(Self { stop_send, stop_recv, done_send, done_recv })
    }

    /// Stops the task. Will return when the process has fully closed.
    pub async fn stop(&self) {
        // Ignore any errors from this send
        let _ = self.stop_send.send(()).await;
        let _ = self.done_recv.recv().await;
    }

    /// Starts the task.
    ///
    /// * `main` is a function of the type `async fn foo() -> Result<()>`
    /// * `stop_handler` is a function of the type `async fn handle_stop(result: Result<()>)`
    /// * `stop_value` is the error passed to `stop_handler` when `task.stop()` is called
    pub fn start<MainFut, StopFut, StopFn, Error>(
        self: Arc<Self>,
        main: MainFut,
        stop_handler: StopFn,
        stop_value: Error,
        executor: ExecutorPtr,
    ) where
        MainFut: Future<Output = std::result::Result<(), Error>> + Send + 'static,
        StopFut: Future<Output = ()> + Send,
        StopFn: FnOnce(std::result::Result<(), Error>) -> StopFut + Send + 'static,
        Error: std::error::Error + Send + 'static,
    {
        executor
            .spawn(async move {
                let stop_fut = async {
                    let _ = self.stop_recv.recv().await;
                    Err(stop_value)
                };

                let result = future::or(main, stop_fut).await;
                stop_handler(result).await;
                // Release the barrier, then close it so repeated
                // stop() calls return immediately.
                let _ = self.done_send.send(()).await;
                self.done_send.close();
            })
            .detach();
    }
}
