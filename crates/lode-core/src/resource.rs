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

//! Resource identity primitives.
//!
//! A cached resource is named by a [`ResourceKey`]: the stable 64-bit hash
//! of its normalized file path paired with the four-byte type tag of the
//! resource type. Two keys are equal iff both fields match, so the same
//! file loaded as two different types yields two distinct cache entries.

use std::fmt;
use std::hash::BuildHasher;

/// A four-byte type tag identifying a resource type on disk and in the
/// factory registry.
///
/// Tags are conventionally printable ASCII (`b"MESH"`, `b"SHDR"`, ...) but
/// nothing enforces that; non-printable bytes display as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Creates a tag from its four raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the tag.
    pub const fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            for b in self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}",
                self.0[0], self.0[1], self.0[2], self.0[3]
            )
        }
    }
}

/// A marker trait for types that can be managed by the resource system.
///
/// The supertraits enforce the guarantees background loading relies on:
/// `Send + Sync` so instances can be shared with the frame loop after
/// construction, and `'static` so they can be stored for the lifetime of
/// the cache.
///
/// [`TYPE_TAG`](Resource::TYPE_TAG) binds the type to the four-byte tag
/// used in container files and in the factory registry.
pub trait Resource: Send + Sync + 'static {
    /// The on-disk type tag for this resource type.
    const TYPE_TAG: FourCc;
}

/// The identity of a cached resource: `(path hash, type tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Stable 64-bit hash of the normalized file path.
    pub path_hash: u64,
    /// Four-byte tag of the resource type.
    pub type_tag: FourCc,
}

impl ResourceKey {
    /// Builds the key for loading `path` as resource type `R`.
    pub fn new<R: Resource>(path: &str) -> Self {
        Self {
            path_hash: hash_path(path),
            type_tag: R::TYPE_TAG,
        }
    }

    /// Builds a key from an already-computed hash and tag.
    pub const fn from_parts(path_hash: u64, type_tag: FourCc) -> Self {
        Self {
            path_hash,
            type_tag,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.type_tag, self.path_hash)
    }
}

/// Normalizes a resource path before hashing.
///
/// Backslashes become forward slashes and a leading `./` is stripped, so
/// `.\\textures\\wall.lrc` and `textures/wall.lrc` name the same resource.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

/// Hashes a (normalized) resource path to its stable 64-bit identity hash.
///
/// The hasher is seeded with fixed values so the hash is deterministic for
/// the lifetime of the process; it is never persisted to disk.
pub fn hash_path(path: &str) -> u64 {
    const SEEDS: [u64; 4] = [
        0x6c6f_6465_0000_0001,
        0x9e37_79b9_7f4a_7c15,
        0xd1b5_4a32_d192_ed03,
        0x2545_f491_4f6c_dd1d,
    ];
    let state = ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
    state.hash_one(normalize_path(path).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    impl Resource for Probe {
        const TYPE_TAG: FourCc = FourCc::new(*b"PROB");
    }

    #[test]
    fn separators_and_dot_prefix_are_normalized() {
        assert_eq!(hash_path("models\\crate.lrc"), hash_path("models/crate.lrc"));
        assert_eq!(hash_path("./models/crate.lrc"), hash_path("models/crate.lrc"));
        assert_ne!(hash_path("models/crate.lrc"), hash_path("models/box.lrc"));
    }

    #[test]
    fn key_equality_requires_both_fields() {
        let a = ResourceKey::new::<Probe>("a.lrc");
        let b = ResourceKey::new::<Probe>("a.lrc");
        assert_eq!(a, b);

        let other_tag = ResourceKey::from_parts(a.path_hash, FourCc::new(*b"OTHR"));
        assert_ne!(a, other_tag);

        let other_path = ResourceKey::from_parts(hash_path("b.lrc"), a.type_tag);
        assert_ne!(a, other_path);
    }

    #[test]
    fn fourcc_displays_ascii_or_hex() {
        assert_eq!(FourCc::new(*b"MESH").to_string(), "MESH");
        assert_eq!(FourCc::new([0x01, 0x02, 0x03, 0x04]).to_string(), "01020304");
    }
}
