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

//! The binary resource container format.
//!
//! A container file is laid out as: header, section table, string table,
//! raw data blob. All multi-byte integers are little-endian; bit-field
//! extraction uses unsigned masks only.
//!
//! ```text
//! ContainerHeader   (20 bytes)  magic, version, byte order, counts, blob len
//! SectionDescriptor ( 9 bytes)  control byte + byte range, x section_count
//! StringItem        ( 8 bytes)  packed descriptor + offset, x string_count
//! blob              (blob_len bytes)
//! ```
//!
//! [`Container::decode`] is a pure function of its input bytes — no I/O,
//! no shared state — and is safe to run on any thread. [`Container::encode`]
//! is its inverse: for conforming input, `encode(decode(bytes)) == bytes`.
//!
//! String items pack their fields disjointly: type in bits 31–30, the
//! byte-length multiplier flag in bit 29, bit 28 reserved (must be zero),
//! text length in bits 27–0. Keeping every field in its own bit range is
//! deliberate and pinned by tests.

use crate::error::FormatError;

/// The four magic bytes at the start of every container file.
pub const CONTAINER_MAGIC: [u8; 4] = *b"LODE";

/// The only container version this decoder understands.
pub const SUPPORTED_VERSION: u16 = 1;

/// Byte order marker as written by a little-endian writer. A big-endian
/// writer would produce `0xFEFF` here when read little-endian, which the
/// decoder rejects.
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;

const HEADER_LEN: usize = 20;
const SECTION_LEN: usize = 9;
const STRING_LEN: usize = 8;

const ALLOC_CLASS_SHIFT: u32 = 6;
const ALLOC_ID_MASK: u8 = 0x3f;

const STRING_TYPE_MASK: u32 = 0xc000_0000;
const STRING_TYPE_SHIFT: u32 = 30;
const STRING_WIDE_MASK: u32 = 0x2000_0000;
const STRING_RESERVED_MASK: u32 = 0x1000_0000;
const STRING_LENGTH_MASK: u32 = 0x0fff_ffff;

/// Which memory pool a section's bytes are destined for. Encoded in the
/// top two bits of a section's control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorClass {
    /// General-purpose main memory.
    Main,
    /// Memory that will be handed to the rendering device.
    Device,
    /// Short-lived scratch memory, discarded after finalize.
    Scratch,
    /// Reserved for future use.
    Reserved,
}

impl AllocatorClass {
    /// Decodes the class from its two-bit field value.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => AllocatorClass::Main,
            1 => AllocatorClass::Device,
            2 => AllocatorClass::Scratch,
            _ => AllocatorClass::Reserved,
        }
    }

    /// Returns the two-bit field value for this class.
    pub const fn to_bits(self) -> u8 {
        match self {
            AllocatorClass::Main => 0,
            AllocatorClass::Device => 1,
            AllocatorClass::Scratch => 2,
            AllocatorClass::Reserved => 3,
        }
    }
}

/// The text encoding of a string table entry. Encoded in bits 31–30 of
/// the packed string descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringType {
    /// One byte per character, 7-bit ASCII.
    Ascii,
    /// UTF-8; text length counts bytes.
    Utf8,
    /// UTF-16; pairs with the wide flag so text length counts code units.
    Utf16,
    /// Reserved for future use.
    Reserved,
}

impl StringType {
    /// Decodes the type from its two-bit field value.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x03 {
            0 => StringType::Ascii,
            1 => StringType::Utf8,
            2 => StringType::Utf16,
            _ => StringType::Reserved,
        }
    }

    /// Returns the two-bit field value for this type.
    pub const fn to_bits(self) -> u32 {
        match self {
            StringType::Ascii => 0,
            StringType::Utf8 => 1,
            StringType::Utf16 => 2,
            StringType::Reserved => 3,
        }
    }
}

/// One decoded section descriptor: a byte range in the blob tagged with
/// the allocation strategy its bytes belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Which memory pool the section routes to.
    pub class: AllocatorClass,
    /// Pool-specific sub-identifier (0–63).
    pub allocator_id: u8,
    /// Byte offset of the section's data inside the blob.
    pub offset: u32,
    /// Byte length of the section's data.
    pub len: u32,
}

impl Section {
    /// Rebuilds the packed control byte: class in bits 7–6, id in bits
    /// 5–0. The two fields occupy disjoint bit ranges, so decoding is
    /// unambiguous.
    pub const fn control_byte(&self) -> u8 {
        (self.class.to_bits() << ALLOC_CLASS_SHIFT) | (self.allocator_id & ALLOC_ID_MASK)
    }

    /// Decodes a control byte into its class and id fields.
    pub const fn split_control_byte(byte: u8) -> (AllocatorClass, u8) {
        (
            AllocatorClass::from_bits(byte >> ALLOC_CLASS_SHIFT),
            byte & ALLOC_ID_MASK,
        )
    }
}

/// One decoded string table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringEntry {
    /// Text encoding of the payload.
    pub string_type: StringType,
    /// Byte-length multiplier flag: `true` means two bytes per unit of
    /// text length (UTF-16 code units), `false` means one.
    pub wide: bool,
    /// Text length in encoding units (bits 27–0 of the packed word).
    pub text_len: u32,
    /// Byte offset of the string payload inside the blob.
    pub offset: u32,
}

impl StringEntry {
    /// Byte length of the payload: text length times the multiplier.
    pub const fn byte_len(&self) -> u32 {
        self.text_len * self.length_multiplier()
    }

    /// The byte-per-unit multiplier derived from the wide flag.
    pub const fn length_multiplier(&self) -> u32 {
        if self.wide {
            2
        } else {
            1
        }
    }

    /// Rebuilds the packed 32-bit descriptor word.
    pub const fn packed(&self) -> u32 {
        (self.string_type.to_bits() << STRING_TYPE_SHIFT)
            | (if self.wide { STRING_WIDE_MASK } else { 0 })
            | (self.text_len & STRING_LENGTH_MASK)
    }

    fn unpack(word: u32, entry: usize) -> Result<(StringType, bool, u32), FormatError> {
        if word & STRING_RESERVED_MASK != 0 {
            return Err(FormatError::ReservedBits { entry });
        }
        Ok((
            StringType::from_bits(word >> STRING_TYPE_SHIFT),
            word & STRING_WIDE_MASK != 0,
            word & STRING_LENGTH_MASK,
        ))
    }
}

/// A fully decoded resource container: section views, string table, and
/// the raw data blob they index into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Section descriptors in file order.
    pub sections: Vec<Section>,
    /// String table entries in file order.
    pub strings: Vec<StringEntry>,
    /// The raw data blob referenced by section and string byte ranges.
    pub blob: Vec<u8>,
}

impl Container {
    /// Decodes a container from its raw bytes.
    ///
    /// Pure and allocation-only: safe to call from the loader thread.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);

        let magic: [u8; 4] = reader.take(4)?.try_into().unwrap_or_default();
        if magic != CONTAINER_MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }
        let version = reader.read_u16()?;
        if version != SUPPORTED_VERSION {
            return Err(FormatError::UnsupportedVersion { found: version });
        }
        let byte_order = reader.read_u16()?;
        if byte_order != BYTE_ORDER_MARK {
            return Err(FormatError::UnsupportedByteOrder { found: byte_order });
        }
        let section_count = reader.read_u32()? as usize;
        let string_count = reader.read_u32()? as usize;
        let blob_len = reader.read_u32()? as usize;

        let mut sections = Vec::with_capacity(section_count.min(1024));
        for index in 0..section_count {
            let control = reader.read_u8()?;
            let (class, allocator_id) = Section::split_control_byte(control);
            let offset = reader.read_u32()?;
            let len = reader.read_u32()?;
            if offset as u64 + len as u64 > blob_len as u64 {
                return Err(FormatError::SectionOutOfRange { section: index });
            }
            sections.push(Section {
                class,
                allocator_id,
                offset,
                len,
            });
        }

        let mut strings = Vec::with_capacity(string_count.min(1024));
        for entry in 0..string_count {
            let packed = reader.read_u32()?;
            let (string_type, wide, text_len) = StringEntry::unpack(packed, entry)?;
            let offset = reader.read_u32()?;
            let item = StringEntry {
                string_type,
                wide,
                text_len,
                offset,
            };
            if offset as u64 + item.byte_len() as u64 > blob_len as u64 {
                return Err(FormatError::StringOutOfRange { entry });
            }
            strings.push(item);
        }

        let blob = reader.take(blob_len)?.to_vec();
        let remaining = reader.remaining();
        if remaining != 0 {
            return Err(FormatError::TrailingBytes { count: remaining });
        }

        Ok(Self {
            sections,
            strings,
            blob,
        })
    }

    /// Encodes the container back to its byte-exact wire form.
    pub fn encode(&self) -> Vec<u8> {
        let total = HEADER_LEN
            + self.sections.len() * SECTION_LEN
            + self.strings.len() * STRING_LEN
            + self.blob.len();
        let mut out = Vec::with_capacity(total);

        out.extend_from_slice(&CONTAINER_MAGIC);
        out.extend_from_slice(&SUPPORTED_VERSION.to_le_bytes());
        out.extend_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
        out.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.blob.len() as u32).to_le_bytes());

        for section in &self.sections {
            out.push(section.control_byte());
            out.extend_from_slice(&section.offset.to_le_bytes());
            out.extend_from_slice(&section.len.to_le_bytes());
        }
        for string in &self.strings {
            out.extend_from_slice(&string.packed().to_le_bytes());
            out.extend_from_slice(&string.offset.to_le_bytes());
        }
        out.extend_from_slice(&self.blob);
        out
    }

    /// The bytes of section `index`, or `None` if out of bounds.
    pub fn section_bytes(&self, index: usize) -> Option<&[u8]> {
        let section = self.sections.get(index)?;
        let start = section.offset as usize;
        let end = start.checked_add(section.len as usize)?;
        self.blob.get(start..end)
    }

    /// The payload bytes of string table entry `index`, or `None` if out
    /// of bounds.
    pub fn string_bytes(&self, index: usize) -> Option<&[u8]> {
        let entry = self.strings.get(index)?;
        let start = entry.offset as usize;
        let end = start.checked_add(entry.byte_len() as usize)?;
        self.blob.get(start..end)
    }

    /// Returns the first section with the given allocator class, if any.
    pub fn find_section(&self, class: AllocatorClass) -> Option<usize> {
        self.sections.iter().position(|s| s.class == class)
    }
}

/// A little-endian byte cursor over the input slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let available = self.bytes.len() - self.pos;
        if len > available {
            return Err(FormatError::Truncated {
                expected: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, FormatError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, FormatError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_container() -> Container {
        Container {
            sections: vec![
                Section {
                    class: AllocatorClass::Main,
                    allocator_id: 7,
                    offset: 0,
                    len: 4,
                },
                Section {
                    class: AllocatorClass::Device,
                    allocator_id: 63,
                    offset: 4,
                    len: 6,
                },
            ],
            strings: vec![
                StringEntry {
                    string_type: StringType::Utf8,
                    wide: false,
                    text_len: 5,
                    offset: 4,
                },
                StringEntry {
                    string_type: StringType::Utf16,
                    wide: true,
                    text_len: 2,
                    offset: 0,
                },
            ],
            blob: b"\x10\x20\x30\x40hello\x00".to_vec(),
        }
    }

    #[test]
    fn round_trips_byte_identically() {
        let container = sample_container();
        let bytes = container.encode();
        let decoded = Container::decode(&bytes).unwrap();
        assert_eq!(decoded, container);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_container().encode();
        bytes[0] = b'X';
        assert!(matches!(
            Container::decode(&bytes),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = sample_container().encode();
        bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::UnsupportedVersion { found: 2 })
        );
    }

    #[test]
    fn rejects_big_endian_byte_order_mark() {
        let mut bytes = sample_container().encode();
        bytes[6..8].copy_from_slice(&0xFEFFu16.to_le_bytes());
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::UnsupportedByteOrder { found: 0xFEFF })
        );
    }

    #[test]
    fn rejects_truncated_section_table() {
        let bytes = sample_container().encode();
        assert!(matches!(
            Container::decode(&bytes[..HEADER_LEN + 3]),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_section_range_outside_blob() {
        let mut container = sample_container();
        container.sections[0].len = container.blob.len() as u32 + 1;
        let bytes = container.encode();
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::SectionOutOfRange { section: 0 })
        );
    }

    #[test]
    fn rejects_string_range_outside_blob() {
        let mut container = sample_container();
        container.strings[1].offset = container.blob.len() as u32 - 1;
        let bytes = container.encode();
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::StringOutOfRange { entry: 1 })
        );
    }

    #[test]
    fn rejects_reserved_string_bit() {
        let container = sample_container();
        let mut bytes = container.encode();
        let string_table = HEADER_LEN + container.sections.len() * SECTION_LEN;
        let mut packed =
            u32::from_le_bytes(bytes[string_table..string_table + 4].try_into().unwrap());
        packed |= STRING_RESERVED_MASK;
        bytes[string_table..string_table + 4].copy_from_slice(&packed.to_le_bytes());
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::ReservedBits { entry: 0 })
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample_container().encode();
        bytes.push(0);
        assert_eq!(
            Container::decode(&bytes),
            Err(FormatError::TrailingBytes { count: 1 })
        );
    }

    // Type, multiplier, reserved, and length must never share bits; a
    // wide UTF-16 entry exercises all of them at once.
    #[test]
    fn string_item_fields_are_disjoint() {
        assert_eq!(STRING_TYPE_MASK & STRING_WIDE_MASK, 0);
        assert_eq!(STRING_TYPE_MASK & STRING_RESERVED_MASK, 0);
        assert_eq!(STRING_TYPE_MASK & STRING_LENGTH_MASK, 0);
        assert_eq!(STRING_WIDE_MASK & STRING_RESERVED_MASK, 0);
        assert_eq!(STRING_WIDE_MASK & STRING_LENGTH_MASK, 0);
        assert_eq!(STRING_RESERVED_MASK & STRING_LENGTH_MASK, 0);

        // A wide UTF-16 entry keeps both its type and its multiplier.
        let entry = StringEntry {
            string_type: StringType::Utf16,
            wide: true,
            text_len: 3,
            offset: 0,
        };
        let (ty, wide, len) = StringEntry::unpack(entry.packed(), 0).unwrap();
        assert_eq!(ty, StringType::Utf16);
        assert!(wide);
        assert_eq!(len, 3);
        assert_eq!(entry.byte_len(), 6);
    }

    #[test]
    fn section_control_byte_fields_are_disjoint() {
        let (class, id) = Section::split_control_byte(0b11_111111);
        assert_eq!(class, AllocatorClass::Reserved);
        assert_eq!(id, 63);
        let (class, id) = Section::split_control_byte(0b01_000001);
        assert_eq!(class, AllocatorClass::Device);
        assert_eq!(id, 1);
    }

    #[test]
    fn section_and_string_views_slice_the_blob() {
        let container = sample_container();
        assert_eq!(container.section_bytes(0).unwrap(), b"\x10\x20\x30\x40");
        assert_eq!(container.section_bytes(1).unwrap(), b"hello\x00");
        assert_eq!(container.string_bytes(0).unwrap(), b"hello");
        assert_eq!(container.string_bytes(1).unwrap(), b"\x10\x20\x30\x40");
        assert!(container.section_bytes(2).is_none());
    }

    #[test]
    fn empty_container_round_trips() {
        let container = Container {
            sections: vec![],
            strings: vec![],
            blob: vec![],
        };
        let bytes = container.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Container::decode(&bytes).unwrap(), container);
    }
}
