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

//! The bounded pool of in-flight load requests.
//!
//! Slots follow `Free → Queued → InProgress → {Ready | Failed} →
//! Installed → Free`; a cache-hit pseudo-request enters directly in a
//! resolved state. The pool is the only state shared with the loader
//! thread and every method here runs with the pool mutex held by the
//! caller; none of them block or perform I/O.
//!
//! Requests for the same identity coalesce: later callers attach to the
//! in-flight slot (`waiters + 1`) instead of issuing a duplicate read.
//! Cancellation is cooperative — when the last waiter detaches from an
//! unresolved request the slot is only marked abandoned, and the worker
//! discards the result and frees the slot when it gets there.

use lode_core::error::{LoadError, PoolError};
use lode_core::resource::ResourceKey;
use lode_data::cache::CacheSlot;
use std::any::Any;
use std::collections::HashMap;

/// Identifies one caller's attachment to a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TicketId {
    pub index: u32,
    pub generation: u32,
}

/// Externally visible state of a load request, for polling callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting for the loader thread.
    Queued,
    /// The loader thread is reading and parsing the file.
    InProgress,
    /// Parsed, waiting for the owner thread to finalize and install.
    Ready,
    /// Resolution failed; `end_load` will yield nothing.
    Failed,
    /// Finalized and live in the cache.
    Installed,
}

/// Priority class of a load request. `High` requests are drained before
/// `Normal` ones; there is no ordering guarantee within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPriority {
    /// Drained before any `Normal` request.
    High,
    /// Default class.
    #[default]
    Normal,
}

pub(crate) enum SlotState {
    Queued,
    InProgress,
    /// Parsed payload awaiting the owner-thread finalize step.
    Ready(Box<dyn Any + Send>),
    /// Payload taken out for finalize; transient, owner thread only.
    Finalizing,
    /// Finalized and cached; the slot holds one cache reference until
    /// the last waiter detaches.
    Installed(CacheSlot),
    /// Cache-hit pseudo-request; resolved from the start.
    Hit(CacheSlot),
    Failed(LoadError),
}

struct RequestSlot {
    generation: u32,
    /// `None` is the `Free` state.
    state: Option<SlotState>,
    key: ResourceKey,
    waiters: u32,
    /// Every waiter detached before resolution; the worker frees the
    /// slot when it observes this.
    abandoned: bool,
}

/// Outcome of [`RequestPool::enqueue`].
pub(crate) enum Enqueued {
    /// A fresh slot; the caller must dispatch a work item.
    New(TicketId),
    /// Attached to an existing request for the same identity.
    Attached(TicketId),
}

/// What the facade must do after a waiter detached.
#[must_use]
pub(crate) enum Detached {
    /// Other waiters (or the worker) still hold the slot.
    StillHeld,
    /// Slot freed; the pool's cache reference must be released.
    FreedWithCacheRef(CacheSlot),
    /// Slot freed; nothing else to do.
    Freed,
}

pub(crate) struct RequestPool {
    slots: Vec<RequestSlot>,
    free: Vec<u32>,
    /// Coalescing table for real (non-pseudo) requests.
    by_key: HashMap<ResourceKey, u32, ahash::RandomState>,
    capacity: usize,
}

impl RequestPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::default(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots not currently `Free`.
    pub fn active(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Queues a load for `key`, coalescing with an in-flight request for
    /// the same identity.
    pub fn enqueue(&mut self, key: ResourceKey) -> Result<Enqueued, PoolError> {
        if let Some(&index) = self.by_key.get(&key) {
            let slot = &mut self.slots[index as usize];
            slot.waiters += 1;
            return Ok(Enqueued::Attached(TicketId {
                index,
                generation: slot.generation,
            }));
        }
        let id = self.alloc(key, SlotState::Queued)?;
        self.by_key.insert(key, id.index);
        Ok(Enqueued::New(id))
    }

    /// Creates an already-resolved pseudo-request for a cache hit. The
    /// pool holds `cache_slot` as its own reference until the waiter
    /// detaches.
    pub fn insert_hit(
        &mut self,
        key: ResourceKey,
        cache_slot: CacheSlot,
    ) -> Result<TicketId, PoolError> {
        self.alloc(key, SlotState::Hit(cache_slot))
    }

    /// Creates an already-failed request, used when no factory is
    /// registered for the requested type.
    pub fn insert_failed(&mut self, key: ResourceKey, err: LoadError) -> Result<TicketId, PoolError> {
        self.alloc(key, SlotState::Failed(err))
    }

    /// Maps a ticket to its externally visible state. `None` means the
    /// ticket is stale (the slot was freed or recycled).
    pub fn state_of(&self, id: TicketId) -> Option<RequestState> {
        let slot = self.slot(id)?;
        Some(match slot.state.as_ref()? {
            SlotState::Queued => RequestState::Queued,
            SlotState::InProgress | SlotState::Finalizing => RequestState::InProgress,
            SlotState::Ready(_) => RequestState::Ready,
            SlotState::Installed(_) | SlotState::Hit(_) => RequestState::Installed,
            SlotState::Failed(_) => RequestState::Failed,
        })
    }

    /// Worker-side claim of a queued slot. Returns `false` when the work
    /// item is stale or the request was abandoned (the slot is freed
    /// here in that case) — the worker skips the read entirely.
    pub fn begin_work(&mut self, index: u32, generation: u32) -> bool {
        let Some(slot) = self.slot_mut(TicketId { index, generation }) else {
            return false;
        };
        if !matches!(slot.state, Some(SlotState::Queued)) {
            return false;
        }
        if slot.abandoned {
            self.free_slot(index);
            return false;
        }
        slot.state = Some(SlotState::InProgress);
        true
    }

    /// Worker-side completion. A result for an abandoned request is
    /// discarded and the slot freed; otherwise the slot becomes `Ready`
    /// or `Failed`.
    pub fn complete(
        &mut self,
        index: u32,
        generation: u32,
        result: Result<Box<dyn Any + Send>, LoadError>,
    ) {
        let Some(slot) = self.slot_mut(TicketId { index, generation }) else {
            return;
        };
        if !matches!(slot.state, Some(SlotState::InProgress)) {
            return;
        }
        if slot.abandoned {
            self.free_slot(index);
            return;
        }
        slot.state = Some(match result {
            Ok(payload) => SlotState::Ready(payload),
            Err(err) => SlotState::Failed(err),
        });
    }

    /// Takes every `Ready` payload for owner-thread finalization,
    /// leaving the slots in the transient `Finalizing` state.
    pub fn take_ready(&mut self) -> Vec<(TicketId, ResourceKey, Box<dyn Any + Send>)> {
        let mut ready = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if matches!(slot.state, Some(SlotState::Ready(_))) {
                let Some(SlotState::Ready(payload)) =
                    slot.state.replace(SlotState::Finalizing)
                else {
                    continue;
                };
                ready.push((
                    TicketId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    slot.key,
                    payload,
                ));
            }
        }
        ready
    }

    /// Takes one specific `Ready` payload (the blocking `end_load` path).
    pub fn take_ready_one(&mut self, id: TicketId) -> Option<(ResourceKey, Box<dyn Any + Send>)> {
        let slot = self.slot_mut(id)?;
        if !matches!(slot.state, Some(SlotState::Ready(_))) {
            return None;
        }
        let Some(SlotState::Ready(payload)) = slot.state.replace(SlotState::Finalizing) else {
            return None;
        };
        Some((slot.key, payload))
    }

    /// Concludes a `Finalizing` slot with the install outcome.
    pub fn finish_install(&mut self, id: TicketId, outcome: Result<CacheSlot, LoadError>) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        if !matches!(slot.state, Some(SlotState::Finalizing)) {
            return;
        }
        slot.state = Some(match outcome {
            Ok(cache_slot) => SlotState::Installed(cache_slot),
            Err(err) => SlotState::Failed(err),
        });
    }

    /// The cache slot a resolved request installed into or hit.
    pub fn installed_slot(&self, id: TicketId) -> Option<CacheSlot> {
        match self.slot(id)?.state.as_ref()? {
            SlotState::Installed(slot) | SlotState::Hit(slot) => Some(*slot),
            _ => None,
        }
    }

    /// Detaches one waiter from the slot. When the last waiter leaves a
    /// resolved slot it is freed; when it leaves an unresolved slot the
    /// slot is marked abandoned for the worker to reap.
    pub fn detach(&mut self, id: TicketId) -> Detached {
        let Some(slot) = self.slot_mut(id) else {
            log::warn!("detach on a stale load ticket");
            return Detached::StillHeld;
        };
        slot.waiters = slot.waiters.saturating_sub(1);
        if slot.waiters > 0 {
            return Detached::StillHeld;
        }
        match slot.state.as_ref() {
            Some(SlotState::Queued) | Some(SlotState::InProgress) => {
                // The worker owns the slot now; drop the coalescing entry
                // so a fresh request for this key is not attached to a
                // request nobody is waiting for.
                slot.abandoned = true;
                let key = slot.key;
                if self.by_key.get(&key) == Some(&id.index) {
                    self.by_key.remove(&key);
                }
                Detached::StillHeld
            }
            Some(SlotState::Installed(cache_slot)) | Some(SlotState::Hit(cache_slot)) => {
                let cache_slot = *cache_slot;
                self.free_slot(id.index);
                Detached::FreedWithCacheRef(cache_slot)
            }
            Some(SlotState::Ready(_)) | Some(SlotState::Failed(_)) => {
                // A discarded parsed payload has not touched the device;
                // dropping it here is safe.
                self.free_slot(id.index);
                Detached::Freed
            }
            Some(SlotState::Finalizing) | None => Detached::StillHeld,
        }
    }

    /// Frees a freshly queued slot whose work item could not be handed
    /// to the loader thread. No worker will ever observe it, so the
    /// abandonment protocol of [`RequestPool::detach`] does not apply.
    pub fn discard_queued(&mut self, id: TicketId) {
        let queued = self
            .slot(id)
            .is_some_and(|slot| matches!(slot.state, Some(SlotState::Queued)));
        if queued {
            self.free_slot(id.index);
        }
    }

    fn alloc(&mut self, key: ResourceKey, state: SlotState) -> Result<TicketId, PoolError> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else if self.slots.len() < self.capacity {
            let index = self.slots.len() as u32;
            self.slots.push(RequestSlot {
                generation: 0,
                state: None,
                key,
                waiters: 0,
                abandoned: false,
            });
            index
        } else {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        };

        let slot = &mut self.slots[index as usize];
        slot.state = Some(state);
        slot.key = key;
        slot.waiters = 1;
        slot.abandoned = false;
        Ok(TicketId {
            index,
            generation: slot.generation,
        })
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.state = None;
        slot.abandoned = false;
        slot.waiters = 0;
        slot.generation = slot.generation.wrapping_add(1);
        let key = slot.key;
        if self.by_key.get(&key) == Some(&index) {
            self.by_key.remove(&key);
        }
        self.free.push(index);
    }

    fn slot(&self, id: TicketId) -> Option<&RequestSlot> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation).then_some(slot)
    }

    fn slot_mut(&mut self, id: TicketId) -> Option<&mut RequestSlot> {
        let slot = self.slots.get_mut(id.index as usize)?;
        (slot.generation == id.generation).then_some(slot)
    }
}
