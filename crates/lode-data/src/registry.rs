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

//! The type registry mapping four-byte type tags to resource factories.
//!
//! Construction is split into two phases. `parse` runs on the loader
//! thread and may do the heavy decoding work; `finalize` runs on the
//! owning application thread and is the only phase allowed to touch
//! device-affine state. Factories that need no device work make
//! `Parsed = Output` and pass the value through.

use lode_core::container::Container;
use lode_core::context::FinalizeContext;
use lode_core::error::{ConstructError, RegistryError};
use lode_core::resource::{FourCc, Resource};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// The per-type construction logic for one resource type.
pub trait ResourceFactory: Send + Sync + 'static {
    /// The resource type this factory produces.
    type Output: Resource;
    /// The worker-safe intermediate produced by [`parse`](Self::parse).
    type Parsed: Send + 'static;

    /// Turns a decoded container into the intermediate representation.
    ///
    /// Runs on the loader thread; must not touch device-affine state.
    fn parse(&self, container: &Container) -> Result<Self::Parsed, ConstructError>;

    /// Turns the intermediate into the live instance.
    ///
    /// Runs on the owning application thread; this is where device
    /// objects get created.
    fn finalize(
        &self,
        parsed: Self::Parsed,
        ctx: &mut FinalizeContext,
    ) -> Result<Self::Output, ConstructError>;

    /// Tears down an instance. Runs on the owning application thread,
    /// only from the cache's deferred-destruction drain.
    fn destroy(&self, instance: Self::Output, ctx: &mut FinalizeContext) {
        let _ = (instance, ctx);
    }
}

/// Object-safe view of a [`ResourceFactory`], so the registry can store
/// factories for arbitrary resource types and the loader thread can run
/// the parse phase without knowing the concrete type.
pub trait ErasedFactory: Send + Sync {
    /// Type-erased [`ResourceFactory::parse`].
    fn parse_erased(&self, container: &Container) -> Result<Box<dyn Any + Send>, ConstructError>;

    /// Type-erased [`ResourceFactory::finalize`].
    fn finalize_erased(
        &self,
        parsed: Box<dyn Any + Send>,
        ctx: &mut FinalizeContext,
    ) -> Result<Box<dyn Any + Send + Sync>, ConstructError>;

    /// Type-erased [`ResourceFactory::destroy`].
    fn destroy_erased(&self, instance: Box<dyn Any + Send + Sync>, ctx: &mut FinalizeContext);
}

/// Wraps a typed factory and implements the erased interface by
/// downcasting at the boundaries.
struct FactoryWrapper<F: ResourceFactory> {
    factory: F,
    _marker: PhantomData<fn() -> F::Output>,
}

impl<F: ResourceFactory> ErasedFactory for FactoryWrapper<F> {
    fn parse_erased(&self, container: &Container) -> Result<Box<dyn Any + Send>, ConstructError> {
        let parsed = self.factory.parse(container)?;
        Ok(Box::new(parsed))
    }

    fn finalize_erased(
        &self,
        parsed: Box<dyn Any + Send>,
        ctx: &mut FinalizeContext,
    ) -> Result<Box<dyn Any + Send + Sync>, ConstructError> {
        let parsed = parsed
            .downcast::<F::Parsed>()
            .map_err(|_| ConstructError::TypeMismatch {
                expected: std::any::type_name::<F::Parsed>(),
            })?;
        let instance = self.factory.finalize(*parsed, ctx)?;
        Ok(Box::new(instance))
    }

    fn destroy_erased(&self, instance: Box<dyn Any + Send + Sync>, ctx: &mut FinalizeContext) {
        match instance.downcast::<F::Output>() {
            Ok(instance) => self.factory.destroy(*instance, ctx),
            Err(_) => log::warn!(
                "destroy for '{}' received a payload of the wrong type; dropping it",
                F::Output::TYPE_TAG
            ),
        }
    }
}

/// The registry: at most one factory per type tag.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<FourCc, Arc<dyn ErasedFactory>, ahash::RandomState>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for its output type's tag.
    ///
    /// Fails with [`RegistryError::DuplicateType`] if the tag is taken;
    /// the existing registration is left untouched.
    pub fn register<F: ResourceFactory>(&mut self, factory: F) -> Result<(), RegistryError> {
        let tag = F::Output::TYPE_TAG;
        if self.factories.contains_key(&tag) {
            log::warn!("factory for type '{tag}' is already registered");
            return Err(RegistryError::DuplicateType(tag));
        }
        self.factories.insert(
            tag,
            Arc::new(FactoryWrapper {
                factory,
                _marker: PhantomData,
            }),
        );
        Ok(())
    }

    /// Removes the factory for `tag`, returning whether one was present.
    ///
    /// Cached instances of the type stay alive; unregistering only
    /// prevents new constructions.
    pub fn unregister(&mut self, tag: FourCc) -> bool {
        self.factories.remove(&tag).is_some()
    }

    /// Looks up the factory for `tag`.
    ///
    /// The returned handle keeps the factory alive even if it is
    /// unregistered while a load is in flight.
    pub fn lookup(&self, tag: FourCc) -> Option<Arc<dyn ErasedFactory>> {
        self.factories.get(&tag).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Label(String);
    impl Resource for Label {
        const TYPE_TAG: FourCc = FourCc::new(*b"LABL");
    }

    struct LabelFactory;
    impl ResourceFactory for LabelFactory {
        type Output = Label;
        type Parsed = String;

        fn parse(&self, container: &Container) -> Result<String, ConstructError> {
            let bytes = container
                .section_bytes(0)
                .ok_or(ConstructError::MissingSection {
                    expected: "label text section",
                })?;
            String::from_utf8(bytes.to_vec()).map_err(|err| ConstructError::MalformedSection {
                section: 0,
                details: err.to_string(),
            })
        }

        fn finalize(
            &self,
            parsed: String,
            _ctx: &mut FinalizeContext,
        ) -> Result<Label, ConstructError> {
            Ok(Label(parsed))
        }
    }

    fn label_container(text: &str) -> Container {
        Container {
            sections: vec![lode_core::container::Section {
                class: lode_core::container::AllocatorClass::Main,
                allocator_id: 0,
                offset: 0,
                len: text.len() as u32,
            }],
            strings: vec![],
            blob: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn parse_then_finalize_produces_the_instance() {
        let mut registry = FactoryRegistry::new();
        registry.register(LabelFactory).unwrap();

        let factory = registry.lookup(Label::TYPE_TAG).unwrap();
        let parsed = factory.parse_erased(&label_container("hi")).unwrap();

        let mut ctx = FinalizeContext::new();
        let instance = factory.finalize_erased(parsed, &mut ctx).unwrap();
        let label = instance.downcast::<Label>().unwrap();
        assert_eq!(*label, Label("hi".to_string()));
    }

    #[test]
    fn duplicate_registration_is_rejected_and_first_stays_authoritative() {
        let mut registry = FactoryRegistry::new();
        registry.register(LabelFactory).unwrap();

        assert_eq!(
            registry.register(LabelFactory),
            Err(RegistryError::DuplicateType(Label::TYPE_TAG))
        );
        assert!(registry.lookup(Label::TYPE_TAG).is_some());
    }

    #[test]
    fn unregister_prevents_new_lookups_but_keeps_live_handles() {
        let mut registry = FactoryRegistry::new();
        registry.register(LabelFactory).unwrap();

        let held = registry.lookup(Label::TYPE_TAG).unwrap();
        assert!(registry.unregister(Label::TYPE_TAG));
        assert!(registry.lookup(Label::TYPE_TAG).is_none());
        assert!(!registry.unregister(Label::TYPE_TAG));

        // The held handle still parses: an in-flight load finishes.
        assert!(held.parse_erased(&label_container("late")).is_ok());
    }

    #[test]
    fn mismatched_payload_is_a_construct_error() {
        let mut registry = FactoryRegistry::new();
        registry.register(LabelFactory).unwrap();

        let factory = registry.lookup(Label::TYPE_TAG).unwrap();
        let mut ctx = FinalizeContext::new();
        let wrong: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert!(matches!(
            factory.finalize_erased(wrong, &mut ctx),
            Err(ConstructError::TypeMismatch { .. })
        ));
    }
}
