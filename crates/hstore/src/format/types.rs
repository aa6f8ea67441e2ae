//! Variable type codes and their fixed widths.

use std::fmt::Write as _;

/// Type code of a tag, as stored in the `type` field of a packed tag record.
///
/// The numeric values are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeCode {
    /// Unsigned byte.
    Byte = 1,
    /// Signed byte.
    SByte = 2,
    /// Single character.
    Char = 3,
    /// Unsigned 16-bit word.
    Word = 4,
    /// Signed 16-bit integer.
    Short = 5,
    /// Unsigned 32-bit word.
    DWord = 6,
    /// Signed 32-bit integer.
    Int = 7,
    /// Four-byte boolean.
    Bool = 8,
    /// 32-bit float.
    Float = 9,
    /// 64-bit float.
    Double = 10,
    /// Eight-bit bitfield.
    Bitfield = 11,
    /// Fixed-length, NUL-padded string; the tag count is its byte length.
    String = 12,
    /// Array of unknown contents.
    Array = 13,
    /// Structure of fixed length.
    Struct = 14,
    /// Configuration store key.
    Key = 15,
    /// Configuration store link.
    Link = 16,
    /// Signed 64-bit integer.
    Int64 = 17,
    /// Unsigned 64-bit integer.
    UInt64 = 18,
}

impl TypeCode {
    /// Creates a TypeCode from its on-disk value.
    pub fn from_u32(value: u32) -> Option<Self> {
        let code = match value {
            1 => Self::Byte,
            2 => Self::SByte,
            3 => Self::Char,
            4 => Self::Word,
            5 => Self::Short,
            6 => Self::DWord,
            7 => Self::Int,
            8 => Self::Bool,
            9 => Self::Float,
            10 => Self::Double,
            11 => Self::Bitfield,
            12 => Self::String,
            13 => Self::Array,
            14 => Self::Struct,
            15 => Self::Key,
            16 => Self::Link,
            17 => Self::Int64,
            18 => Self::UInt64,
            _ => return None,
        };
        Some(code)
    }

    /// Returns the on-disk value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Width in bytes of one element.
    ///
    /// Strings report 0 here; their width is the tag count (see [`Tag::element_width`]).
    ///
    /// [`Tag::element_width`]: crate::format::Tag::element_width
    pub fn element_size(self) -> usize {
        match self {
            Self::Byte | Self::SByte | Self::Char | Self::Bitfield => 1,
            Self::Word | Self::Short => 2,
            Self::DWord | Self::Int | Self::Bool | Self::Float => 4,
            Self::Double | Self::Int64 | Self::UInt64 => 8,
            Self::String | Self::Array | Self::Struct | Self::Key | Self::Link => 0,
        }
    }

    /// Display name used by dumps and enumerations.
    pub fn name(self) -> &'static str {
        match self {
            Self::Byte => "BYTE",
            Self::SByte => "SBYTE",
            Self::Char => "CHAR",
            Self::Word => "UINT16",
            Self::Short => "INT16",
            Self::DWord => "UINT32",
            Self::Int => "INT32",
            Self::Bool => "BOOL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Bitfield => "BITFIELD",
            Self::String => "STRING",
            Self::Array => "ARRAY",
            Self::Struct => "STRUCT",
            Self::Key => "KEY",
            Self::Link => "LINK",
            Self::Int64 => "INT64",
            Self::UInt64 => "UINT64",
        }
    }

    /// Widens one element to `f64`.
    ///
    /// Returns 0 for strings, zero-width codes and slices shorter than the element.
    pub fn widen(self, bytes: &[u8]) -> f64 {
        match self {
            Self::Byte | Self::Bitfield => bytes.first().map_or(0.0, |&b| b as f64),
            Self::SByte | Self::Char => bytes.first().map_or(0.0, |&b| b as i8 as f64),
            Self::Word => le::<2>(bytes).map_or(0.0, |b| u16::from_le_bytes(b) as f64),
            Self::Short => le::<2>(bytes).map_or(0.0, |b| i16::from_le_bytes(b) as f64),
            Self::DWord | Self::Bool => le::<4>(bytes).map_or(0.0, |b| u32::from_le_bytes(b) as f64),
            Self::Int => le::<4>(bytes).map_or(0.0, |b| i32::from_le_bytes(b) as f64),
            Self::Float => le::<4>(bytes).map_or(0.0, |b| f32::from_le_bytes(b) as f64),
            Self::Double => le::<8>(bytes).map_or(0.0, f64::from_le_bytes),
            Self::Int64 => le::<8>(bytes).map_or(0.0, |b| i64::from_le_bytes(b) as f64),
            Self::UInt64 => le::<8>(bytes).map_or(0.0, |b| u64::from_le_bytes(b) as f64),
            Self::String | Self::Array | Self::Struct | Self::Key | Self::Link => 0.0,
        }
    }

    /// Formats one element the way the text dump prints it.
    pub fn format(self, bytes: &[u8]) -> String {
        match self {
            Self::String => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
            Self::Char => bytes
                .first()
                .map(|&b| (b as char).to_string())
                .unwrap_or_default(),
            Self::Bool => {
                if self.widen(bytes) != 0.0 {
                    "y".to_string()
                } else {
                    "n".to_string()
                }
            }
            Self::Bitfield => bytes
                .first()
                .map(|b| format!("{b:08b}"))
                .unwrap_or_default(),
            Self::Float => le::<4>(bytes)
                .map(|b| format!("{}", f32::from_le_bytes(b)))
                .unwrap_or_default(),
            Self::Double => le::<8>(bytes)
                .map(|b| format!("{}", f64::from_le_bytes(b)))
                .unwrap_or_default(),
            Self::Int64 => le::<8>(bytes)
                .map(|b| i64::from_le_bytes(b).to_string())
                .unwrap_or_default(),
            Self::UInt64 => le::<8>(bytes)
                .map(|b| u64::from_le_bytes(b).to_string())
                .unwrap_or_default(),
            Self::Byte | Self::SByte | Self::Word | Self::Short | Self::DWord | Self::Int => {
                format!("{}", self.widen(bytes) as i64)
            }
            Self::Array | Self::Struct | Self::Key | Self::Link => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    let _ = write!(out, "{b:02x}");
                }
                out
            }
        }
    }
}

impl std::fmt::Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn le<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_roundtrips_through_u32() {
        for value in 1..=18u32 {
            let code = TypeCode::from_u32(value).unwrap();
            assert_eq!(code.as_u32(), value);
        }
        assert!(TypeCode::from_u32(0).is_none());
        assert!(TypeCode::from_u32(19).is_none());
    }

    #[test]
    fn test_element_sizes_match_disk_table() {
        let expected = [1, 1, 1, 2, 2, 4, 4, 4, 4, 8, 1, 0, 0, 0, 0, 0, 8, 8];
        for (i, size) in expected.iter().enumerate() {
            let code = TypeCode::from_u32(i as u32 + 1).unwrap();
            assert_eq!(code.element_size(), *size, "size of {}", code);
        }
    }

    #[test]
    fn test_widen_signed_and_unsigned() {
        assert_eq!(TypeCode::Byte.widen(&[0xff]), 255.0);
        assert_eq!(TypeCode::SByte.widen(&[0xff]), -1.0);
        assert_eq!(TypeCode::Short.widen(&(-2i16).to_le_bytes()), -2.0);
        assert_eq!(TypeCode::Word.widen(&65535u16.to_le_bytes()), 65535.0);
        assert_eq!(TypeCode::Int.widen(&(-7i32).to_le_bytes()), -7.0);
        assert_eq!(TypeCode::Float.widen(&1.5f32.to_le_bytes()), 1.5);
        assert_eq!(TypeCode::Double.widen(&2.25f64.to_le_bytes()), 2.25);
        assert_eq!(TypeCode::String.widen(b"abc"), 0.0);
    }

    #[test]
    fn test_widen_short_slice_is_zero() {
        assert_eq!(TypeCode::Double.widen(&[1, 2, 3]), 0.0);
        assert_eq!(TypeCode::Int.widen(&[]), 0.0);
    }

    #[test]
    fn test_format_string_stops_at_nul() {
        assert_eq!(TypeCode::String.format(b"run\0\0\0"), "run");
        assert_eq!(TypeCode::Bool.format(&1u32.to_le_bytes()), "y");
        assert_eq!(TypeCode::Int.format(&(-3i32).to_le_bytes()), "-3");
    }
}
