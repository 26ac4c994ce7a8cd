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

//! Foundational contracts for the lode resource system.
//!
//! This crate defines the "common language" shared by every other crate in
//! the workspace: the [`Resource`](resource::Resource) marker trait, the
//! identity types used to key the cache, the binary container codec, the
//! error hierarchy, and the collaborator interfaces (filesystem and
//! finalize-context). It has no knowledge of how resources are cached,
//! scheduled, or loaded — those concerns live in `lode-data` and
//! `lode-runtime`.

pub mod container;
pub mod context;
pub mod error;
pub mod fs;
pub mod resource;
