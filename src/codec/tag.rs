//! Named binary tags.
//!
//! Big-endian, NBT-style layout: a named tag is a type byte, a u16-prefixed
//! UTF-8 name and a payload. Compounds are terminated by an `End` byte, lists
//! carry an element type and an i32 length.

use crate::core::error::SerializationError;
use bytes::{Buf, BufMut};

/// Deepest compound/list nesting the reader accepts
pub const MAX_DEPTH: usize = 512;

/// Tag type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagType {
    /// Compound terminator / type of an empty list
    End = 0,
    /// Signed 8-bit integer
    Byte = 1,
    /// Signed 16-bit integer
    Short = 2,
    /// Signed 32-bit integer
    Int = 3,
    /// Signed 64-bit integer
    Long = 4,
    /// 32-bit float
    Float = 5,
    /// 64-bit float
    Double = 6,
    /// Length-prefixed bytes
    ByteArray = 7,
    /// Length-prefixed UTF-8
    String = 8,
    /// Homogeneous list
    List = 9,
    /// Named children terminated by `End`
    Compound = 10,
    /// Length-prefixed i32 values
    IntArray = 11,
    /// Length-prefixed i64 values
    LongArray = 12,
}

impl TagType {
    /// Parse a type byte
    pub fn from_u8(value: u8) -> Result<Self, SerializationError> {
        Ok(match value {
            0 => TagType::End,
            1 => TagType::Byte,
            2 => TagType::Short,
            3 => TagType::Int,
            4 => TagType::Long,
            5 => TagType::Float,
            6 => TagType::Double,
            7 => TagType::ByteArray,
            8 => TagType::String,
            9 => TagType::List,
            10 => TagType::Compound,
            11 => TagType::IntArray,
            12 => TagType::LongArray,
            other => return Err(SerializationError::UnknownTag(other)),
        })
    }
}

/// A tag payload
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// Signed 8-bit integer
    Byte(i8),
    /// Signed 16-bit integer
    Short(i16),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Raw bytes
    ByteArray(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Homogeneous list; the element type is kept so empty lists round-trip
    List(TagType, Vec<Tag>),
    /// Named children in insertion order
    Compound(Vec<(String, Tag)>),
    /// i32 values
    IntArray(Vec<i32>),
    /// i64 values
    LongArray(Vec<i64>),
}

impl Tag {
    /// Type identifier of this payload
    pub fn tag_type(&self) -> TagType {
        match self {
            Tag::Byte(_) => TagType::Byte,
            Tag::Short(_) => TagType::Short,
            Tag::Int(_) => TagType::Int,
            Tag::Long(_) => TagType::Long,
            Tag::Float(_) => TagType::Float,
            Tag::Double(_) => TagType::Double,
            Tag::ByteArray(_) => TagType::ByteArray,
            Tag::String(_) => TagType::String,
            Tag::List(..) => TagType::List,
            Tag::Compound(_) => TagType::Compound,
            Tag::IntArray(_) => TagType::IntArray,
            Tag::LongArray(_) => TagType::LongArray,
        }
    }

    /// Look up a child of a compound by name
    pub fn get(&self, name: &str) -> Option<&Tag> {
        match self {
            Tag::Compound(children) => children
                .iter()
                .find(|(child, _)| child == name)
                .map(|(_, tag)| tag),
            _ => None,
        }
    }

    /// Integer value of any integral tag no wider than 32 bits
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Tag::Byte(v) => Some(v.into()),
            Tag::Short(v) => Some(v.into()),
            Tag::Int(v) => Some(v),
            _ => None,
        }
    }
}

/// Write `tag` with a name header
pub fn write_named<B: BufMut>(buf: &mut B, name: &str, tag: &Tag) {
    buf.put_u8(tag.tag_type() as u8);
    write_string(buf, name);
    write_payload(buf, tag);
}

fn write_string<B: BufMut>(buf: &mut B, value: &str) {
    // names and strings are u16-prefixed; anything longer is truncated at a char boundary
    let mut end = value.len().min(u16::MAX as usize);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u16(end as u16);
    buf.put_slice(&value.as_bytes()[..end]);
}

fn write_payload<B: BufMut>(buf: &mut B, tag: &Tag) {
    match tag {
        Tag::Byte(v) => buf.put_i8(*v),
        Tag::Short(v) => buf.put_i16(*v),
        Tag::Int(v) => buf.put_i32(*v),
        Tag::Long(v) => buf.put_i64(*v),
        Tag::Float(v) => buf.put_f32(*v),
        Tag::Double(v) => buf.put_f64(*v),
        Tag::ByteArray(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        Tag::String(s) => write_string(buf, s),
        Tag::List(element, items) => {
            buf.put_u8(*element as u8);
            buf.put_i32(items.len() as i32);
            for item in items {
                write_payload(buf, item);
            }
        }
        Tag::Compound(children) => {
            for (name, child) in children {
                write_named(buf, name, child);
            }
            buf.put_u8(TagType::End as u8);
        }
        Tag::IntArray(values) => {
            buf.put_i32(values.len() as i32);
            for v in values {
                buf.put_i32(*v);
            }
        }
        Tag::LongArray(values) => {
            buf.put_i32(values.len() as i32);
            for v in values {
                buf.put_i64(*v);
            }
        }
    }
}

/// Read one named tag from the front of `buf`
pub fn read_named<B: Buf>(buf: &mut B) -> Result<(String, Tag), SerializationError> {
    need(buf, 1, "tag type")?;
    let tag_type = TagType::from_u8(buf.get_u8())?;
    if tag_type == TagType::End {
        return Err(SerializationError::InvalidStructure(
            "named tag may not be End".to_string(),
        ));
    }
    let name = read_string(buf)?;
    let tag = read_payload(buf, tag_type, 0)?;
    Ok((name, tag))
}

fn need<B: Buf>(buf: &B, len: usize, what: &'static str) -> Result<(), SerializationError> {
    if buf.remaining() < len {
        Err(SerializationError::UnexpectedEnd(what))
    } else {
        Ok(())
    }
}

fn read_len<B: Buf>(buf: &mut B, element_size: usize, what: &'static str) -> Result<usize, SerializationError> {
    need(buf, 4, what)?;
    let len = buf.get_i32();
    if len < 0 {
        return Err(SerializationError::InvalidStructure(format!(
            "negative length {} for {}",
            len, what
        )));
    }
    let len = len as usize;
    // every element occupies at least `element_size` bytes, so longer claims are truncated data
    need(buf, len.saturating_mul(element_size.max(1)), what)?;
    Ok(len)
}

fn read_string<B: Buf>(buf: &mut B) -> Result<String, SerializationError> {
    need(buf, 2, "string length")?;
    let len = buf.get_u16() as usize;
    need(buf, len, "string")?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes)
        .map_err(|e| SerializationError::InvalidStructure(format!("invalid UTF-8: {}", e)))
}

fn read_payload<B: Buf>(buf: &mut B, tag_type: TagType, depth: usize) -> Result<Tag, SerializationError> {
    if depth > MAX_DEPTH {
        return Err(SerializationError::TooDeep(MAX_DEPTH));
    }
    Ok(match tag_type {
        TagType::End => {
            return Err(SerializationError::InvalidStructure(
                "unexpected End payload".to_string(),
            ))
        }
        TagType::Byte => {
            need(buf, 1, "byte")?;
            Tag::Byte(buf.get_i8())
        }
        TagType::Short => {
            need(buf, 2, "short")?;
            Tag::Short(buf.get_i16())
        }
        TagType::Int => {
            need(buf, 4, "int")?;
            Tag::Int(buf.get_i32())
        }
        TagType::Long => {
            need(buf, 8, "long")?;
            Tag::Long(buf.get_i64())
        }
        TagType::Float => {
            need(buf, 4, "float")?;
            Tag::Float(buf.get_f32())
        }
        TagType::Double => {
            need(buf, 8, "double")?;
            Tag::Double(buf.get_f64())
        }
        TagType::ByteArray => {
            let len = read_len(buf, 1, "byte array")?;
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            Tag::ByteArray(bytes)
        }
        TagType::String => Tag::String(read_string(buf)?),
        TagType::List => {
            need(buf, 1, "list element type")?;
            let element = TagType::from_u8(buf.get_u8())?;
            let len = read_len(buf, 1, "list")?;
            if element == TagType::End && len > 0 {
                return Err(SerializationError::InvalidStructure(
                    "non-empty list of End".to_string(),
                ));
            }
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_payload(buf, element, depth + 1)?);
            }
            Tag::List(element, items)
        }
        TagType::Compound => {
            let mut children = Vec::new();
            loop {
                need(buf, 1, "compound entry")?;
                let child_type = TagType::from_u8(buf.get_u8())?;
                if child_type == TagType::End {
                    break;
                }
                let name = read_string(buf)?;
                let child = read_payload(buf, child_type, depth + 1)?;
                children.push((name, child));
            }
            Tag::Compound(children)
        }
        TagType::IntArray => {
            let len = read_len(buf, 4, "int array")?;
            Tag::IntArray((0..len).map(|_| buf.get_i32()).collect())
        }
        TagType::LongArray => {
            let len = read_len(buf, 8, "long array")?;
            Tag::LongArray((0..len).map(|_| buf.get_i64()).collect())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tag {
        Tag::Compound(vec![
            ("b".to_string(), Tag::Byte(-3)),
            ("s".to_string(), Tag::Short(300)),
            ("l".to_string(), Tag::Long(-1)),
            ("f".to_string(), Tag::Float(1.5)),
            ("d".to_string(), Tag::Double(2.25)),
            ("str".to_string(), Tag::String("héllo".to_string())),
            ("ia".to_string(), Tag::IntArray(vec![1, -2, 3])),
            ("la".to_string(), Tag::LongArray(vec![i64::MAX])),
            ("empty".to_string(), Tag::List(TagType::End, vec![])),
            (
                "nested".to_string(),
                Tag::List(TagType::Compound, vec![Tag::Compound(vec![])]),
            ),
        ])
    }

    #[test]
    fn test_every_tag_type_reads_back() {
        let mut buf = Vec::new();
        write_named(&mut buf, "root", &sample());
        let (name, tag) = read_named(&mut buf.as_slice()).unwrap();
        assert_eq!(name, "root");
        assert_eq!(tag, sample());
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut buf = Vec::new();
        write_named(&mut buf, "root", &sample());
        for cut in [0, 1, 5, buf.len() / 2, buf.len() - 1] {
            let result = read_named(&mut &buf[..cut]);
            assert!(result.is_err(), "cut at {} should fail", cut);
        }
    }

    #[test]
    fn test_oversized_length_is_rejected_without_allocating() {
        // ByteArray claiming i32::MAX bytes
        let mut buf = vec![TagType::ByteArray as u8, 0, 1, b'x'];
        buf.extend_from_slice(&i32::MAX.to_be_bytes());
        let err = read_named(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SerializationError::UnexpectedEnd(_)));
    }

    #[test]
    fn test_depth_limit() {
        let mut tag = Tag::List(TagType::Compound, vec![Tag::Compound(vec![])]);
        for _ in 0..(MAX_DEPTH + 2) {
            tag = Tag::List(TagType::List, vec![tag]);
        }
        let mut buf = Vec::new();
        write_named(&mut buf, "deep", &tag);
        let err = read_named(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SerializationError::TooDeep(_)));
    }

    #[test]
    fn test_unknown_type_byte() {
        let buf = [99u8, 0, 0];
        let err = read_named(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, SerializationError::UnknownTag(99)));
    }
}
