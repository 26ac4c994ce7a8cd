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

//! Construction-time dependency injection for resource factories.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A `TypeId`-keyed bag of construction-time dependencies.
///
/// Factories' finalize and destroy steps often need handles owned
/// elsewhere — a graphics device, an audio mixer. The context threads
/// those through the registry without the registry knowing their
/// concrete types: the owner inserts them once, factories look them up
/// by type.
///
/// The context lives on the owning application thread and is only ever
/// handed to device-affine factory steps, never to the loader thread.
#[derive(Default)]
pub struct FinalizeContext {
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl FinalizeContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a dependency, replacing any previous value of the same type.
    pub fn insert<T: 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Looks up a dependency by type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Looks up a dependency by type, mutably.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Removes and returns a dependency by type.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}
