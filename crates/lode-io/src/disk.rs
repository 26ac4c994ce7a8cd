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

use lode_core::fs::FileSystem;
use lode_core::resource::normalize_path;
use std::io;
use std::path::PathBuf;

/// A [`FileSystem`] rooted at a directory on disk.
///
/// Resource paths are normalized and resolved relative to the root.
/// Reads are blocking; the loader thread is the intended caller.
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    /// Creates a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this filesystem resolves against.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl FileSystem for DiskFileSystem {
    fn read_all(&self, path: &str) -> io::Result<Vec<u8>> {
        let full = self.root.join(normalize_path(path));
        log::trace!("reading '{}'", full.display());
        std::fs::read(full)
    }
}
