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

//! The resource manager facade.
//!
//! [`ResourceManager`] owns the factory registry, the reference-counted
//! cache, and the background loader, and is the single entry point for
//! loading, polling, and unloading resources. It is not `Sync`: all of
//! its methods run on the thread that owns it, which is also the only
//! thread where factories finalize and destroy instances. The loader
//! thread only ever reads files and runs the worker-safe parse phase.
//!
//! Asynchronous results are harvested either by blocking in
//! [`ResourceManager::end_load`] or by calling
//! [`ResourceManager::update`] once per frame, which also runs the
//! deferred destructions of entries whose reference count reached zero.

use crate::loader::{read_and_parse, LoaderThread, Shared, WorkItem};
use crate::pool::{Detached, Enqueued, LoadPriority, RequestPool, RequestState, TicketId};
use lode_core::context::FinalizeContext;
use lode_core::error::{CacheError, ConstructError, LoadError, PoolError, RegistryError};
use lode_core::fs::FileSystem;
use lode_core::resource::{normalize_path, FourCc, Resource, ResourceKey};
use lode_data::cache::{CacheSlot, ResourceCache};
use lode_data::registry::{FactoryRegistry, ResourceFactory};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};

/// Sizing knobs for a [`ResourceManager`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceManagerConfig {
    /// Maximum number of live cache entries.
    pub max_resources: usize,
    /// Maximum number of in-flight load requests.
    pub max_requests: usize,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            max_resources: 1000,
            max_requests: 128,
        }
    }
}

/// A pending asynchronous load of an `R`.
///
/// Redeem it with [`ResourceManager::end_load`] or give it up with
/// [`ResourceManager::cancel`]; both consume the ticket.
#[must_use = "redeem the ticket with end_load or give it up with cancel"]
pub struct LoadTicket<R: Resource> {
    id: TicketId,
    key: ResourceKey,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> LoadTicket<R> {
    fn new(id: TicketId, key: ResourceKey) -> Self {
        Self {
            id,
            key,
            _marker: PhantomData,
        }
    }

    /// The identity this ticket will resolve to.
    pub fn key(&self) -> ResourceKey {
        self.key
    }
}

/// An owned reference to a cached `R`.
///
/// Each handle accounts for one unit of the entry's reference count.
/// Handles are deliberately not `Clone`: acquiring another reference
/// goes through the manager, and returning one goes through
/// [`ResourceManager::unload`], which consumes the handle.
pub struct ResHandle<R: Resource> {
    slot: CacheSlot,
    key: ResourceKey,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> ResHandle<R> {
    fn new(slot: CacheSlot, key: ResourceKey) -> Self {
        Self {
            slot,
            key,
            _marker: PhantomData,
        }
    }

    /// The identity of the referenced resource.
    pub fn key(&self) -> ResourceKey {
        self.key
    }
}

pub struct ResourceManager {
    registry: FactoryRegistry,
    cache: ResourceCache,
    ctx: FinalizeContext,
    shared: Arc<Shared>,
    loader: LoaderThread,
    fs: Arc<dyn FileSystem>,
}

impl ResourceManager {
    pub fn new(config: ResourceManagerConfig, fs: Arc<dyn FileSystem>) -> Self {
        let shared = Arc::new(Shared {
            pool: Mutex::new(RequestPool::new(config.max_requests)),
            resolved: Condvar::new(),
        });
        let loader = LoaderThread::spawn(shared.clone(), fs.clone(), config.max_requests);
        log::info!(
            "resource manager up ({} cache slots, {} request slots)",
            config.max_resources,
            config.max_requests
        );
        Self {
            registry: FactoryRegistry::new(),
            cache: ResourceCache::with_capacity(config.max_resources),
            ctx: FinalizeContext::new(),
            shared,
            loader,
            fs,
        }
    }

    /// Registers the factory for `F::Output`'s type tag.
    pub fn register_factory<F: ResourceFactory>(&mut self, factory: F) -> Result<(), RegistryError> {
        self.registry.register(factory)
    }

    /// Removes the factory for `tag`. In-flight parses keep their own
    /// reference to the factory and finish normally.
    pub fn unregister_factory(&mut self, tag: FourCc) -> bool {
        self.registry.unregister(tag)
    }

    /// Shared state for factory finalize and destroy hooks (device
    /// handles, allocators, and the like).
    pub fn finalize_context_mut(&mut self) -> &mut FinalizeContext {
        &mut self.ctx
    }

    /// Loads `path` on the calling thread, returning a handle to the
    /// cached instance. A cache hit takes another reference without
    /// touching the filesystem. Failures are logged and yield `None`.
    pub fn load_sync<R: Resource>(&mut self, path: &str) -> Option<ResHandle<R>> {
        let key = ResourceKey::new::<R>(path);
        if let Some(slot) = self.cache.acquire(key) {
            return Some(ResHandle::new(slot, key));
        }

        let Some(factory) = self.registry.lookup(R::TYPE_TAG) else {
            log::warn!("no factory registered for resource type '{}'", R::TYPE_TAG);
            return None;
        };
        let normalized = normalize_path(path);
        let payload = match read_and_parse(self.fs.as_ref(), factory.as_ref(), &normalized) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("failed to load '{normalized}': {err}");
                return None;
            }
        };
        match self.finalize_and_insert(key, payload) {
            Ok(slot) => Some(ResHandle::new(slot, key)),
            Err(err) => {
                log::warn!("failed to install '{normalized}': {err}");
                None
            }
        }
    }

    /// Queues an asynchronous load of `path`.
    ///
    /// A request already in flight for the same identity is shared
    /// rather than duplicated, and a cache hit resolves the ticket
    /// immediately. A missing factory also resolves immediately, to
    /// `Failed`. The only synchronous error is an exhausted request
    /// pool.
    pub fn begin_load<R: Resource>(
        &mut self,
        path: &str,
        priority: LoadPriority,
    ) -> Result<LoadTicket<R>, PoolError> {
        let key = ResourceKey::new::<R>(path);

        if let Some(slot) = self.cache.acquire(key) {
            let outcome = self.shared.pool.lock().unwrap().insert_hit(key, slot);
            return match outcome {
                Ok(id) => Ok(LoadTicket::new(id, key)),
                Err(err) => {
                    // Roll back the reference the pseudo-request would
                    // have held.
                    self.release_logged(slot, key);
                    Err(err)
                }
            };
        }

        let factory = self.registry.lookup(R::TYPE_TAG);
        let mut pool = self.shared.pool.lock().unwrap();
        let Some(factory) = factory else {
            log::warn!("no factory registered for resource type '{}'", R::TYPE_TAG);
            let id = pool.insert_failed(key, LoadError::NoFactory(R::TYPE_TAG))?;
            return Ok(LoadTicket::new(id, key));
        };

        match pool.enqueue(key)? {
            Enqueued::Attached(id) => Ok(LoadTicket::new(id, key)),
            Enqueued::New(id) => {
                drop(pool);
                let item = WorkItem {
                    index: id.index,
                    generation: id.generation,
                    path: normalize_path(path),
                    factory,
                };
                if let Err(err) = self.loader.dispatch(item, priority) {
                    self.shared.pool.lock().unwrap().discard_queued(id);
                    return Err(err);
                }
                Ok(LoadTicket::new(id, key))
            }
        }
    }

    /// Blocks until `ticket` resolves and returns a handle on success.
    /// Failures were already logged when they resolved; they yield
    /// `None`. Consumes the ticket either way.
    pub fn end_load<R: Resource>(&mut self, ticket: LoadTicket<R>) -> Option<ResHandle<R>> {
        let taken = {
            let mut pool = self.shared.pool.lock().unwrap();
            loop {
                match pool.state_of(ticket.id) {
                    None => {
                        log::warn!("end_load on a stale load ticket for '{}'", ticket.key);
                        return None;
                    }
                    Some(RequestState::Queued) | Some(RequestState::InProgress) => {
                        pool = self.shared.resolved.wait(pool).unwrap();
                    }
                    Some(RequestState::Ready) => break pool.take_ready_one(ticket.id),
                    Some(RequestState::Failed) | Some(RequestState::Installed) => break None,
                }
            }
        };

        // Finalize outside the pool lock; the loader thread never waits
        // on this step.
        if let Some((key, payload)) = taken {
            let outcome = self.install(key, payload);
            self.shared.pool.lock().unwrap().finish_install(ticket.id, outcome);
        }

        let installed = self.shared.pool.lock().unwrap().installed_slot(ticket.id);
        let handle = installed.and_then(|slot| match self.cache.retain(slot) {
            Ok(_) => Some(ResHandle::new(slot, ticket.key)),
            Err(err) => {
                log::warn!(
                    "resolved load of '{}' hit a stale cache slot: {err}",
                    ticket.key
                );
                None
            }
        });
        self.detach_and_release(ticket.id, ticket.key);
        handle
    }

    /// The current state of a pending load.
    pub fn ticket_state<R: Resource>(&self, ticket: &LoadTicket<R>) -> RequestState {
        let pool = self.shared.pool.lock().unwrap();
        // A held ticket keeps its slot alive, so this cannot be stale.
        pool.state_of(ticket.id).unwrap_or(RequestState::Failed)
    }

    /// Gives up on a pending load. A request nobody else shares is
    /// cancelled: if it has not started it never runs, and if it is in
    /// flight its result is discarded.
    pub fn cancel<R: Resource>(&mut self, ticket: LoadTicket<R>) {
        self.detach_and_release(ticket.id, ticket.key);
    }

    /// Borrows the resource behind `handle`.
    pub fn get<'a, R: Resource>(&'a self, handle: &ResHandle<R>) -> Option<&'a R> {
        self.cache.get(handle.slot)
    }

    /// Returns one reference. When the last reference goes, the entry
    /// is queued for destruction at the next [`ResourceManager::update`].
    pub fn unload<R: Resource>(&mut self, handle: ResHandle<R>) {
        self.release_logged(handle.slot, handle.key);
    }

    /// Per-frame maintenance: installs every parsed result the loader
    /// has produced, then destroys entries whose reference count
    /// reached zero. This is the only place destruction runs.
    pub fn update(&mut self) {
        let ready = self.shared.pool.lock().unwrap().take_ready();
        for (id, key, payload) in ready {
            let outcome = self.install(key, payload);
            self.shared.pool.lock().unwrap().finish_install(id, outcome);
        }
        self.cache.drain_pending_destructions(&self.registry, &mut self.ctx);
    }

    /// Number of in-flight load requests.
    pub fn active_requests(&self) -> usize {
        self.shared.pool.lock().unwrap().active()
    }

    /// Number of live cache entries.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Finalizes an async payload and installs it, logging failures.
    fn install(&mut self, key: ResourceKey, payload: Box<dyn Any + Send>) -> Result<CacheSlot, LoadError> {
        let outcome = self.finalize_and_insert(key, payload);
        if let Err(err) = &outcome {
            log::warn!("failed to install '{key}': {err}");
        }
        outcome
    }

    fn finalize_and_insert(
        &mut self,
        key: ResourceKey,
        payload: Box<dyn Any + Send>,
    ) -> Result<CacheSlot, LoadError> {
        // A synchronous load may have installed this identity while the
        // request was in flight; adopt the existing instance and let the
        // un-finalized payload drop.
        if let Some(slot) = self.cache.acquire(key) {
            return Ok(slot);
        }
        if self.cache.len() >= self.cache.capacity() {
            return Err(construct_failed(format!(
                "resource cache is full ({} slots)",
                self.cache.capacity()
            )));
        }
        let factory = self
            .registry
            .lookup(key.type_tag)
            .ok_or(LoadError::NoFactory(key.type_tag))?;
        let instance = factory.finalize_erased(payload, &mut self.ctx)?;
        match self.cache.insert(key, instance) {
            Ok(slot) => Ok(slot),
            Err(CacheError::AlreadyPresent(_)) => {
                // Unreachable on a single owner thread, but harmless.
                self.cache
                    .acquire(key)
                    .ok_or_else(|| construct_failed("cache entry vanished during install".into()))
            }
            Err(err) => Err(construct_failed(err.to_string())),
        }
    }

    /// Detaches one waiter and, when that frees the slot, returns the
    /// cache reference the pool was holding.
    fn detach_and_release(&mut self, id: TicketId, key: ResourceKey) {
        let detached = self.shared.pool.lock().unwrap().detach(id);
        if let Detached::FreedWithCacheRef(slot) = detached {
            self.release_logged(slot, key);
        }
    }

    fn release_logged(&mut self, slot: CacheSlot, key: ResourceKey) {
        if let Err(err) = self.cache.release(slot) {
            log::warn!("release of '{key}' failed: {err}");
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.loader.stop();
        self.cache.drain_pending_destructions(&self.registry, &mut self.ctx);
        if !self.cache.is_empty() {
            log::warn!(
                "{} resources still referenced at shutdown",
                self.cache.len()
            );
        }
    }
}

fn construct_failed(details: String) -> LoadError {
    LoadError::Construct(ConstructError::FinalizeFailed(details))
}
