//! Item codec
//!
//! Encodes a vault's slots as a tagged binary structure and optionally
//! zlib-compresses the result:
//!
//! ```text
//! Compound "Items"
//!   List "ItemList" of Compound
//!     Int "slot", Int "id", Int "meta", Int "count", ByteArray "auxTag" (optional)
//! ```
//!
//! Decoding is lenient per element: an element with a missing, mistyped or
//! out-of-range field, or a slot index already seen, is dropped and logged
//! instead of failing the whole inventory. Damage to the outer structure is
//! still a [`SerializationError`].

pub mod tag;

use crate::core::config::StorageConfig;
use crate::core::error::SerializationError;
use crate::types::ItemSlot;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::io::{Read, Write};
use tag::{Tag, TagType};

/// Name of the root compound
pub const ROOT_TAG: &str = "Items";
/// Name of the slot list inside the root compound
pub const LIST_TAG: &str = "ItemList";

/// Largest decompressed inventory the decoder will inflate
pub const MAX_DECODED_LEN: u64 = 16 * 1024 * 1024;

const FIELD_SLOT: &str = "slot";
const FIELD_ID: &str = "id";
const FIELD_META: &str = "meta";
const FIELD_COUNT: &str = "count";
const FIELD_AUX: &str = "auxTag";

/// Encoder/decoder for vault contents
#[derive(Debug, Clone, Copy)]
pub struct ItemCodec {
    compression: Option<Compression>,
}

impl Default for ItemCodec {
    fn default() -> Self {
        Self {
            compression: Some(Compression::default()),
        }
    }
}

impl ItemCodec {
    /// Codec that compresses at `level` (0-9)
    pub fn compressed(level: u32) -> Self {
        Self {
            compression: Some(Compression::new(level.min(9))),
        }
    }

    /// Codec that writes raw tags
    pub fn uncompressed() -> Self {
        Self { compression: None }
    }

    /// Build a codec from storage settings
    pub fn from_config(config: &StorageConfig) -> Self {
        if config.enable_compression {
            Self::compressed(config.compression_level)
        } else {
            Self::uncompressed()
        }
    }

    /// Encode slots in the given order
    pub fn encode(&self, slots: &[ItemSlot]) -> Result<Vec<u8>, SerializationError> {
        let items = slots.iter().map(slot_to_tag).collect();
        let root = Tag::Compound(vec![(
            LIST_TAG.to_string(),
            Tag::List(TagType::Compound, items),
        )]);

        let mut raw = Vec::with_capacity(64 + slots.len() * 48);
        tag::write_named(&mut raw, ROOT_TAG, &root);

        match self.compression {
            Some(level) => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), level);
                encoder.write_all(&raw)?;
                Ok(encoder.finish()?)
            }
            None => Ok(raw),
        }
    }

    /// Decode slots, accepting both compressed and raw input
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<ItemSlot>, SerializationError> {
        let raw = inflate(bytes)?;
        let mut cursor = raw.as_slice();
        let (name, root) = tag::read_named(&mut cursor)?;
        if name != ROOT_TAG {
            return Err(SerializationError::InvalidStructure(format!(
                "root tag is {:?}, expected {:?}",
                name, ROOT_TAG
            )));
        }
        let items = match root.get(LIST_TAG) {
            Some(Tag::List(TagType::Compound, items)) => items,
            // an empty list may have been written with element type End
            Some(Tag::List(TagType::End, _)) => return Ok(Vec::new()),
            Some(other) => {
                return Err(SerializationError::InvalidStructure(format!(
                    "{} has type {:?}",
                    LIST_TAG,
                    other.tag_type()
                )))
            }
            None => {
                return Err(SerializationError::InvalidStructure(format!(
                    "missing {}",
                    LIST_TAG
                )))
            }
        };

        let mut seen = HashSet::with_capacity(items.len());
        let mut slots = Vec::with_capacity(items.len());
        let mut dropped = 0usize;
        for (index, item) in items.iter().enumerate() {
            match tag_to_slot(item) {
                Some(slot) if seen.insert(slot.slot) => slots.push(slot),
                Some(slot) => {
                    tracing::warn!(index, slot = slot.slot, "dropping duplicate item slot");
                    dropped += 1;
                }
                None => {
                    tracing::warn!(index, "dropping unreadable item entry");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, kept = slots.len(), "inventory decoded with losses");
        }
        Ok(slots)
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, SerializationError> {
    match bytes.first() {
        None => Err(SerializationError::UnexpectedEnd("inventory")),
        Some(&b) if b == TagType::Compound as u8 => Ok(bytes.to_vec()),
        // zlib CMF byte for deflate with a 32K window
        Some(0x78) => {
            let mut raw = Vec::new();
            ZlibDecoder::new(bytes)
                .take(MAX_DECODED_LEN + 1)
                .read_to_end(&mut raw)?;
            if raw.len() as u64 > MAX_DECODED_LEN {
                return Err(SerializationError::InvalidStructure(format!(
                    "inventory inflates past {} bytes",
                    MAX_DECODED_LEN
                )));
            }
            Ok(raw)
        }
        Some(other) => Err(SerializationError::InvalidStructure(format!(
            "unrecognized leading byte {:#04x}",
            other
        ))),
    }
}

fn slot_to_tag(slot: &ItemSlot) -> Tag {
    let mut fields = vec![
        (FIELD_SLOT.to_string(), Tag::Int(slot.slot.into())),
        (FIELD_ID.to_string(), Tag::Int(slot.id)),
        (FIELD_META.to_string(), Tag::Int(slot.meta)),
        (FIELD_COUNT.to_string(), Tag::Int(slot.count.into())),
    ];
    if let Some(aux) = &slot.aux_tag {
        fields.push((FIELD_AUX.to_string(), Tag::ByteArray(aux.clone())));
    }
    Tag::Compound(fields)
}

fn tag_to_slot(tag: &Tag) -> Option<ItemSlot> {
    if !matches!(tag, Tag::Compound(_)) {
        return None;
    }
    let slot = u16::try_from(tag.get(FIELD_SLOT)?.as_i32()?).ok()?;
    let id = tag.get(FIELD_ID)?.as_i32()?;
    let meta = tag.get(FIELD_META)?.as_i32()?;
    let count = u8::try_from(tag.get(FIELD_COUNT)?.as_i32()?).ok()?;
    let aux_tag = match tag.get(FIELD_AUX) {
        None => None,
        Some(Tag::ByteArray(bytes)) => Some(bytes.clone()),
        Some(_) => return None,
    };
    Some(ItemSlot {
        slot,
        id,
        meta,
        count,
        aux_tag,
    })
}
