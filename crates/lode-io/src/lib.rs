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

//! Concrete [`FileSystem`](lode_core::fs::FileSystem) implementations.
//!
//! [`DiskFileSystem`] serves files from a root directory on disk and is
//! the production collaborator. [`MemoryFileSystem`] serves files from an
//! in-memory map and exists for tests and tools that need byte-exact
//! control over what a load sees.

mod disk;
mod memory;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;
