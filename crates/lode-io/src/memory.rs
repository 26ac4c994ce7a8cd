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
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

/// An in-memory [`FileSystem`] for tests and tooling.
///
/// Paths are normalized on insert and lookup, so the same aliasing rules
/// apply as on disk. Files can be added after the filesystem has been
/// shared with a loader thread.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFileSystem {
    /// Creates an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(normalize_path(path), bytes.into());
    }

    /// Removes a file, returning its contents if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().remove(&normalize_path(path))
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_all(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such file: '{path}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_read_and_remove() {
        let fs = MemoryFileSystem::new();
        fs.insert("a\\b.lrc", b"data".to_vec());

        assert_eq!(fs.read_all("a/b.lrc").unwrap(), b"data");
        assert_eq!(fs.remove("./a/b.lrc").unwrap(), b"data");
        assert_eq!(
            fs.read_all("a/b.lrc").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
