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

//! The canonical table of live resources.
//!
//! The cache owns every live instance and its reference count; callers
//! hold [`CacheSlot`] handles — plain `(index, generation)` pairs, never
//! pointers — so lifetime is enforced by the arena rather than by
//! caller discipline. An entry whose count reaches zero leaves the table
//! immediately but its payload is only destroyed later, inside
//! [`drain_pending_destructions`](ResourceCache::drain_pending_destructions),
//! which the facade guarantees runs on the thread that owns device state.

use crate::registry::FactoryRegistry;
use lode_core::context::FinalizeContext;
use lode_core::error::CacheError;
use lode_core::resource::{FourCc, Resource, ResourceKey};
use std::any::Any;
use std::collections::HashMap;

/// A non-owning handle to a cached resource.
///
/// A slot whose entry has been destroyed (or recycled for another
/// resource) is detected by the generation check; access through a stale
/// slot returns `None` or [`CacheError::StaleHandle`], never the wrong
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheSlot {
    index: u32,
    generation: u32,
}

struct CacheEntry {
    key: ResourceKey,
    ref_count: u32,
    payload: Box<dyn Any + Send + Sync>,
}

/// The resource cache: identity table, slot arena, and the deferred
/// destruction list.
pub struct ResourceCache {
    /// Generation and (if alive) entry for every slot ever created.
    slots: Vec<(u32, Option<CacheEntry>)>,
    /// Slot indices available for reuse.
    free: Vec<u32>,
    /// Identity table: at most one live entry per key.
    by_key: HashMap<ResourceKey, u32, ahash::RandomState>,
    /// Payloads whose count reached zero since the last drain.
    pending_destroy: Vec<(FourCc, Box<dyn Any + Send + Sync>)>,
    capacity: usize,
}

impl ResourceCache {
    /// Creates a cache that holds at most `capacity` live entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::default(),
            pending_destroy: Vec::new(),
            capacity,
        }
    }

    /// Looks up `key` and bumps its reference count on a hit.
    pub fn acquire(&mut self, key: ResourceKey) -> Option<CacheSlot> {
        let index = *self.by_key.get(&key)?;
        let (generation, entry) = &mut self.slots[index as usize];
        let entry = entry.as_mut()?;
        entry.ref_count += 1;
        Some(CacheSlot {
            index,
            generation: *generation,
        })
    }

    /// Inserts a new instance under `key` with a reference count of one.
    ///
    /// Fails with [`CacheError::AlreadyPresent`] if the identity is
    /// already live — the existing instance is never overwritten.
    pub fn insert(
        &mut self,
        key: ResourceKey,
        payload: Box<dyn Any + Send + Sync>,
    ) -> Result<CacheSlot, CacheError> {
        if self.by_key.contains_key(&key) {
            return Err(CacheError::AlreadyPresent(key));
        }
        if self.by_key.len() >= self.capacity {
            return Err(CacheError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let entry = CacheEntry {
            key,
            ref_count: 1,
            payload,
        };
        let slot = if let Some(index) = self.free.pop() {
            let (generation, slot_entry) = &mut self.slots[index as usize];
            *generation += 1;
            *slot_entry = Some(entry);
            CacheSlot {
                index,
                generation: *generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push((0, Some(entry)));
            CacheSlot {
                index,
                generation: 0,
            }
        };
        self.by_key.insert(key, slot.index);
        Ok(slot)
    }

    /// The configured maximum number of live entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bumps the reference count of an already-held entry.
    pub fn retain(&mut self, slot: CacheSlot) -> Result<u32, CacheError> {
        let entry = self.entry_mut(slot).ok_or(CacheError::StaleHandle)?;
        entry.ref_count += 1;
        Ok(entry.ref_count)
    }

    /// Drops one reference, returning the remaining count.
    ///
    /// At zero the entry leaves the identity table and its payload is
    /// queued for destruction at the next drain — never destroyed here.
    pub fn release(&mut self, slot: CacheSlot) -> Result<u32, CacheError> {
        let entry = self.entry_mut(slot).ok_or(CacheError::StaleHandle)?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(entry.ref_count);
        }

        let (_, slot_entry) = &mut self.slots[slot.index as usize];
        // ref_count hit zero; pull the entry out and retire the slot.
        if let Some(entry) = slot_entry.take() {
            self.by_key.remove(&entry.key);
            self.pending_destroy.push((entry.key.type_tag, entry.payload));
            self.free.push(slot.index);
        }
        Ok(0)
    }

    /// Borrows the instance behind `slot` as `T`.
    pub fn get<T: Resource>(&self, slot: CacheSlot) -> Option<&T> {
        self.entry(slot)?.payload.downcast_ref::<T>()
    }

    /// The identity of the entry behind `slot`, if it is still live.
    pub fn key_of(&self, slot: CacheSlot) -> Option<ResourceKey> {
        Some(self.entry(slot)?.key)
    }

    /// The current reference count behind `slot`, if it is still live.
    pub fn ref_count(&self, slot: CacheSlot) -> Option<u32> {
        Some(self.entry(slot)?.ref_count)
    }

    /// Whether an entry for `key` is live.
    pub fn contains(&self, key: ResourceKey) -> bool {
        self.by_key.contains_key(&key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of payloads waiting for the next drain.
    pub fn pending_destructions(&self) -> usize {
        self.pending_destroy.len()
    }

    /// Destroys every payload that reached a zero count since the last
    /// drain, through its type's factory.
    ///
    /// Must be called from the thread that owns device state. A payload
    /// whose factory has been unregistered in the meantime is dropped
    /// through its normal `Drop` with a warning.
    pub fn drain_pending_destructions(
        &mut self,
        registry: &FactoryRegistry,
        ctx: &mut FinalizeContext,
    ) -> usize {
        let pending = std::mem::take(&mut self.pending_destroy);
        let count = pending.len();
        for (tag, payload) in pending {
            match registry.lookup(tag) {
                Some(factory) => factory.destroy_erased(payload, ctx),
                None => {
                    log::warn!("no factory for type '{tag}' at destruction time; dropping payload");
                }
            }
        }
        count
    }

    fn entry(&self, slot: CacheSlot) -> Option<&CacheEntry> {
        let (generation, entry) = self.slots.get(slot.index as usize)?;
        if *generation != slot.generation {
            return None;
        }
        entry.as_ref()
    }

    fn entry_mut(&mut self, slot: CacheSlot) -> Option<&mut CacheEntry> {
        let (generation, entry) = self.slots.get_mut(slot.index as usize)?;
        if *generation != slot.generation {
            return None;
        }
        entry.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResourceFactory;
    use lode_core::container::Container;
    use lode_core::error::ConstructError;
    use lode_core::resource::FourCc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Gadget {
        id: u32,
    }
    impl Resource for Gadget {
        const TYPE_TAG: FourCc = FourCc::new(*b"GDGT");
    }

    struct GadgetFactory {
        destroyed: Arc<AtomicUsize>,
    }
    impl ResourceFactory for GadgetFactory {
        type Output = Gadget;
        type Parsed = Gadget;

        fn parse(&self, _container: &Container) -> Result<Gadget, ConstructError> {
            Ok(Gadget { id: 0 })
        }

        fn finalize(
            &self,
            parsed: Gadget,
            _ctx: &mut FinalizeContext,
        ) -> Result<Gadget, ConstructError> {
            Ok(parsed)
        }

        fn destroy(&self, _instance: Gadget, _ctx: &mut FinalizeContext) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn key(path: &str) -> ResourceKey {
        ResourceKey::new::<Gadget>(path)
    }

    #[test]
    fn double_insert_fails_and_leaves_refcount_unchanged() {
        let mut cache = ResourceCache::with_capacity(8);
        let slot = cache.insert(key("a"), Box::new(Gadget { id: 1 })).unwrap();
        assert_eq!(cache.ref_count(slot), Some(1));

        assert_eq!(
            cache.insert(key("a"), Box::new(Gadget { id: 2 })),
            Err(CacheError::AlreadyPresent(key("a")))
        );
        assert_eq!(cache.ref_count(slot), Some(1));
        assert_eq!(cache.get::<Gadget>(slot).unwrap().id, 1);
    }

    #[test]
    fn acquire_bumps_and_release_defers_destruction_to_drain() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let mut registry = FactoryRegistry::new();
        registry
            .register(GadgetFactory {
                destroyed: destroyed.clone(),
            })
            .unwrap();
        let mut ctx = FinalizeContext::new();

        let mut cache = ResourceCache::with_capacity(8);
        let slot = cache.insert(key("a"), Box::new(Gadget { id: 1 })).unwrap();
        let second = cache.acquire(key("a")).unwrap();
        assert_eq!(slot, second);
        assert_eq!(cache.ref_count(slot), Some(2));

        assert_eq!(cache.release(slot).unwrap(), 1);
        assert_eq!(cache.release(slot).unwrap(), 0);
        assert!(!cache.contains(key("a")));
        assert_eq!(cache.pending_destructions(), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        assert_eq!(cache.drain_pending_destructions(&registry, &mut ctx), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        // A second drain has nothing left: destruction happened once.
        assert_eq!(cache.drain_pending_destructions(&registry, &mut ctx), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_handles_are_detected_after_release_and_reuse() {
        let mut cache = ResourceCache::with_capacity(8);
        let slot = cache.insert(key("a"), Box::new(Gadget { id: 1 })).unwrap();
        cache.release(slot).unwrap();

        // Released: the count can never go negative through this handle.
        assert_eq!(cache.release(slot), Err(CacheError::StaleHandle));
        assert_eq!(cache.retain(slot), Err(CacheError::StaleHandle));
        assert!(cache.get::<Gadget>(slot).is_none());

        // The slot is recycled for a different identity; the old handle
        // must not alias the new entry.
        let reused = cache.insert(key("b"), Box::new(Gadget { id: 2 })).unwrap();
        assert_ne!(slot, reused);
        assert!(cache.get::<Gadget>(slot).is_none());
        assert_eq!(cache.get::<Gadget>(reused).unwrap().id, 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cache = ResourceCache::with_capacity(1);
        cache.insert(key("a"), Box::new(Gadget { id: 1 })).unwrap();
        assert_eq!(
            cache.insert(key("b"), Box::new(Gadget { id: 2 })),
            Err(CacheError::CapacityExceeded { capacity: 1 })
        );
    }

    #[test]
    fn drain_without_factory_drops_the_payload() {
        let registry = FactoryRegistry::new();
        let mut ctx = FinalizeContext::new();
        let mut cache = ResourceCache::with_capacity(8);

        let slot = cache.insert(key("a"), Box::new(Gadget { id: 1 })).unwrap();
        cache.release(slot).unwrap();
        assert_eq!(cache.drain_pending_destructions(&registry, &mut ctx), 1);
        assert_eq!(cache.pending_destructions(), 0);
    }
}
