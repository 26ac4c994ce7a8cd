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

//! The filesystem collaborator interface.

use std::io;

/// Supplies raw file bytes to the resource system.
///
/// The core treats reads as synchronous and blocking; the loader thread
/// is the only place a read is allowed to stall. Implementations must be
/// shareable across the frame loop and the loader thread.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of `path`.
    fn read_all(&self, path: &str) -> io::Result<Vec<u8>>;
}
