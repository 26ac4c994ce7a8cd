// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The background loader thread.
//!
//! One long-lived worker receives work items over two bounded channels
//! (high priority drained first), reads the file through the filesystem
//! collaborator, decodes the container, and runs the factory's
//! worker-safe parse phase. Results are written back into the shared
//! request pool under its mutex; the condvar wakes any caller blocked in
//! `end_load`. Nothing device-affine ever runs here.
//!
//! Shutdown is cooperative: dropping the senders ends the receive loop,
//! and [`LoaderThread::stop`] joins the worker. A request cancelled
//! mid-flight still runs to completion; the pool discards its result.

use crate::pool::{LoadPriority, RequestPool};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use lode_core::container::Container;
use lode_core::error::{LoadError, PoolError};
use lode_core::fs::FileSystem;
use lode_data::registry::ErasedFactory;
use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// State shared between the facade and the worker: the request pool and
/// the condvar that signals resolutions.
pub(crate) struct Shared {
    pub pool: Mutex<RequestPool>,
    pub resolved: Condvar,
}

/// One unit of work for the loader thread.
pub(crate) struct WorkItem {
    pub index: u32,
    pub generation: u32,
    pub path: String,
    pub factory: Arc<dyn ErasedFactory>,
}

pub(crate) struct LoaderThread {
    high_tx: Option<Sender<WorkItem>>,
    normal_tx: Option<Sender<WorkItem>>,
    handle: Option<thread::JoinHandle<()>>,
    queue_capacity: usize,
}

impl LoaderThread {
    /// Spawns the worker. `queue_capacity` bounds each priority channel
    /// and matches the request pool capacity, so a dispatch for a
    /// successfully claimed slot cannot find a full queue.
    pub fn spawn(shared: Arc<Shared>, fs: Arc<dyn FileSystem>, queue_capacity: usize) -> Self {
        let (high_tx, high_rx) = bounded(queue_capacity);
        let (normal_tx, normal_rx) = bounded(queue_capacity);
        let handle = thread::spawn(move || worker_loop(shared, fs, high_rx, normal_rx));
        Self {
            high_tx: Some(high_tx),
            normal_tx: Some(normal_tx),
            handle: Some(handle),
            queue_capacity,
        }
    }

    /// Hands a work item to the worker without blocking.
    pub fn dispatch(&self, item: WorkItem, priority: LoadPriority) -> Result<(), PoolError> {
        let tx = match priority {
            LoadPriority::High => self.high_tx.as_ref(),
            LoadPriority::Normal => self.normal_tx.as_ref(),
        };
        let exhausted = PoolError::Exhausted {
            capacity: self.queue_capacity,
        };
        tx.ok_or(exhausted)?
            .try_send(item)
            .map_err(|_| exhausted)
    }

    /// Stops the worker: closes both queues and joins.
    pub fn stop(&mut self) {
        self.high_tx.take();
        self.normal_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoaderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    shared: Arc<Shared>,
    fs: Arc<dyn FileSystem>,
    high_rx: Receiver<WorkItem>,
    normal_rx: Receiver<WorkItem>,
) {
    log::info!("resource loader thread started");
    while let Some(item) = next_item(&high_rx, &normal_rx) {
        process(&shared, fs.as_ref(), item);
    }
    log::info!("resource loader thread stopped");
}

/// Receives the next work item, draining high priority before normal.
/// Returns `None` once both channels are closed and empty.
fn next_item(high_rx: &Receiver<WorkItem>, normal_rx: &Receiver<WorkItem>) -> Option<WorkItem> {
    match high_rx.try_recv() {
        Ok(item) => return Some(item),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
    }
    select! {
        recv(high_rx) -> msg => match msg {
            Ok(item) => Some(item),
            Err(_) => normal_rx.recv().ok(),
        },
        recv(normal_rx) -> msg => match msg {
            Ok(item) => Some(item),
            Err(_) => high_rx.recv().ok(),
        },
    }
}

fn process(shared: &Shared, fs: &dyn FileSystem, item: WorkItem) {
    {
        let mut pool = shared.pool.lock().unwrap();
        if !pool.begin_work(item.index, item.generation) {
            // Stale or abandoned before work started; skip the read.
            return;
        }
    }

    // I/O and decode run outside the lock.
    let result = read_and_parse(fs, item.factory.as_ref(), &item.path);
    if let Err(err) = &result {
        log::warn!("failed to load '{}': {err}", item.path);
    }

    let mut pool = shared.pool.lock().unwrap();
    pool.complete(item.index, item.generation, result);
    drop(pool);
    shared.resolved.notify_all();
}

/// Reads, decodes, and runs the worker-safe parse phase for one file.
/// Shared with the synchronous load path, which runs it on the calling
/// thread instead.
pub(crate) fn read_and_parse(
    fs: &dyn FileSystem,
    factory: &dyn ErasedFactory,
    path: &str,
) -> Result<Box<dyn Any + Send>, LoadError> {
    let bytes = fs.read_all(path)?;
    let container = Container::decode(&bytes)?;
    Ok(factory.parse_erased(&container)?)
}
