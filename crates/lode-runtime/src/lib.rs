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

//! Asynchronous resource loading for `lode`.
//!
//! This crate ties the pieces together: the [`ResourceManager`] facade
//! owns the factory registry and the reference-counted cache from
//! `lode-data`, and drives a single background loader thread that reads
//! and parses container files off the owner thread. Finalization and
//! destruction always run on the owner thread.
//!
//! ```no_run
//! use lode_core::resource::{FourCc, Resource};
//! use lode_io::DiskFileSystem;
//! use lode_runtime::{LoadPriority, ResourceManager, ResourceManagerConfig};
//! use std::sync::Arc;
//!
//! struct Mesh;
//! impl Resource for Mesh {
//!     const TYPE_TAG: FourCc = FourCc::new(*b"MESH");
//! }
//!
//! let fs = Arc::new(DiskFileSystem::new("assets"));
//! let mut manager = ResourceManager::new(ResourceManagerConfig::default(), fs);
//! // manager.register_factory(MeshFactory::new())?;
//! let ticket = manager.begin_load::<Mesh>("meshes/crate.lode", LoadPriority::Normal)?;
//! let handle = manager.end_load(ticket);
//! # Ok::<(), lode_core::error::PoolError>(())
//! ```

mod loader;
mod manager;
mod pool;

pub use manager::{LoadTicket, ResHandle, ResourceManager, ResourceManagerConfig};
pub use pool::{LoadPriority, RequestState};
