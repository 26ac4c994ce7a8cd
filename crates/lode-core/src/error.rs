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

//! Defines the hierarchy of error types for the resource system.
//!
//! Decode and construct failures are never fatal: they resolve a load
//! request to `Failed` and are reported through the `log` facade.
//! [`RegistryError`] and [`PoolError`] are configuration errors returned
//! synchronously to the caller that triggered them.

use crate::resource::{FourCc, ResourceKey};
use std::fmt;

/// An error produced while decoding a binary resource container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The file does not start with the container magic.
    BadMagic {
        /// The four bytes found where the magic was expected.
        found: [u8; 4],
    },
    /// The container version is not supported by this decoder.
    UnsupportedVersion {
        /// The version found in the header.
        found: u16,
    },
    /// The byte order marker does not resolve to little-endian.
    UnsupportedByteOrder {
        /// The marker value as read little-endian.
        found: u16,
    },
    /// The input ended before a header or table could be read completely.
    Truncated {
        /// Number of bytes the decoder needed.
        expected: usize,
        /// Number of bytes that were available.
        available: usize,
    },
    /// A section descriptor references bytes outside the data blob.
    SectionOutOfRange {
        /// Index of the offending section.
        section: usize,
    },
    /// A string item references bytes outside the data blob.
    StringOutOfRange {
        /// Index of the offending string item.
        entry: usize,
    },
    /// A string item has its reserved bit set.
    ReservedBits {
        /// Index of the offending string item.
        entry: usize,
    },
    /// Bytes remain after the data blob; the container would not
    /// round-trip byte-identically.
    TrailingBytes {
        /// Number of unexpected trailing bytes.
        count: usize,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadMagic { found } => {
                write!(f, "bad container magic: {found:02x?}")
            }
            FormatError::UnsupportedVersion { found } => {
                write!(f, "unsupported container version {found}")
            }
            FormatError::UnsupportedByteOrder { found } => {
                write!(f, "unsupported byte order marker {found:#06x}")
            }
            FormatError::Truncated {
                expected,
                available,
            } => {
                write!(f, "truncated container: needed {expected} bytes, had {available}")
            }
            FormatError::SectionOutOfRange { section } => {
                write!(f, "section {section} references bytes outside the data blob")
            }
            FormatError::StringOutOfRange { entry } => {
                write!(f, "string item {entry} references bytes outside the data blob")
            }
            FormatError::ReservedBits { entry } => {
                write!(f, "string item {entry} has its reserved bit set")
            }
            FormatError::TrailingBytes { count } => {
                write!(f, "{count} trailing bytes after the data blob")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// A factory-level failure while turning a decoded container into an
/// in-memory instance.
#[derive(Debug)]
pub enum ConstructError {
    /// A section the factory requires is absent from the container.
    MissingSection {
        /// Description of what the factory was looking for.
        expected: &'static str,
    },
    /// A section was present but its contents could not be interpreted.
    MalformedSection {
        /// Index of the offending section.
        section: usize,
        /// Factory-specific detail message.
        details: String,
    },
    /// The owner-thread finalize step failed (e.g. the device rejected
    /// the parsed data).
    FinalizeFailed(String),
    /// A type-erased payload did not downcast to the factory's type.
    /// Indicates a registry misconfiguration, not bad data.
    TypeMismatch {
        /// Name of the type the factory expected.
        expected: &'static str,
    },
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::MissingSection { expected } => {
                write!(f, "container is missing a required section: {expected}")
            }
            ConstructError::MalformedSection { section, details } => {
                write!(f, "malformed section {section}: {details}")
            }
            ConstructError::FinalizeFailed(details) => {
                write!(f, "finalize step failed: {details}")
            }
            ConstructError::TypeMismatch { expected } => {
                write!(f, "payload is not of the expected type {expected}")
            }
        }
    }
}

impl std::error::Error for ConstructError {}

/// An error raised by the factory registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A factory is already registered for this type tag; the existing
    /// registration stays authoritative.
    DuplicateType(FourCc),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateType(tag) => {
                write!(f, "a factory is already registered for type '{tag}'")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// An error raised by the resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// An entry with this identity already exists; at most one live
    /// instance per identity is an invariant and is never overwritten.
    AlreadyPresent(ResourceKey),
    /// The handle's generation does not match the slot: the entry it
    /// referred to is gone. Usually a double-release.
    StaleHandle,
    /// The cache is at its configured capacity.
    CapacityExceeded {
        /// The configured maximum number of live entries.
        capacity: usize,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::AlreadyPresent(key) => {
                write!(f, "resource {key} is already cached")
            }
            CacheError::StaleHandle => write!(f, "stale cache handle"),
            CacheError::CapacityExceeded { capacity } => {
                write!(f, "resource cache is full ({capacity} entries)")
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// An error raised by the request pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every request slot is in use; the caller may retry after a
    /// frame's worth of requests has been consumed.
    Exhausted {
        /// The configured pool capacity.
        capacity: usize,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted { capacity } => {
                write!(f, "request pool is exhausted ({capacity} slots)")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// The resolution error of a load request: everything that can go wrong
/// between reading the file and finalizing the instance.
#[derive(Debug)]
pub enum LoadError {
    /// The filesystem collaborator could not produce the file's bytes.
    Io(std::io::Error),
    /// The file's bytes are not a valid container.
    Format(FormatError),
    /// The matching factory rejected the decoded container.
    Construct(ConstructError),
    /// No factory is registered for this type tag.
    NoFactory(FourCc),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(err) => write!(f, "i/o error: {err}"),
            LoadError::Format(err) => write!(f, "format error: {err}"),
            LoadError::Construct(err) => write!(f, "construct error: {err}"),
            LoadError::NoFactory(tag) => {
                write!(f, "no factory registered for type '{tag}'")
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(err) => Some(err),
            LoadError::Format(err) => Some(err),
            LoadError::Construct(err) => Some(err),
            LoadError::NoFactory(_) => None,
        }
    }
}

impl From<FormatError> for LoadError {
    fn from(err: FormatError) -> Self {
        LoadError::Format(err)
    }
}

impl From<ConstructError> for LoadError {
    fn from(err: ConstructError) -> Self {
        LoadError::Construct(err)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::Io(err)
    }
}
