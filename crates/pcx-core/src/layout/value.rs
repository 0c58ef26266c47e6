use std::fmt;

use serde::Serialize;

use super::kind::FieldKind;

/// A field's bytes interpreted according to its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Raw little-endian value of a hex field
    Hex { raw: u64, size: usize },
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Vector(Vec<f32>),
    VectorD(Vec<f64>),
    Matrix {
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    },
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Integer value when the field can hold a pointer.
    pub fn as_pointer(&self) -> Option<u64> {
        match self {
            Self::Hex { raw, size } if *size >= 4 => Some(*raw),
            Self::UInt(v) => Some(*v),
            Self::Int(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Signed view of a hex value, sign-extended from its width.
    pub fn hex_as_signed(&self) -> Option<i64> {
        match self {
            Self::Hex { raw, size } => {
                let shift = 64 - (*size as u32 * 8);
                Some(((*raw << shift) as i64) >> shift)
            }
            _ => None,
        }
    }

    /// Float view of a 4-byte hex value.
    pub fn hex_as_float(&self) -> Option<f32> {
        match self {
            Self::Hex { raw, size: 4 } => Some(f32::from_bits(*raw as u32)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex { raw, size } => write!(f, "0x{:0width$X}", raw, width = size * 2),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.3}"),
            Self::Double(v) => write!(f, "{v:.3}"),
            Self::Vector(values) => write_tuple(f, values.iter().map(|v| format!("{v:.3}"))),
            Self::VectorD(values) => write_tuple(f, values.iter().map(|v| format!("{v:.3}"))),
            Self::Matrix { cols, values, .. } => {
                for (row, chunk) in values.chunks(*cols).enumerate() {
                    if row > 0 {
                        write!(f, " ")?;
                    }
                    write_tuple(f, chunk.iter().map(|v| format!("{v:.3}")))?;
                }
                Ok(())
            }
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

fn write_tuple(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
    let items: Vec<String> = items.collect();
    write!(f, "({})", items.join(", "))
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn f32s(bytes: &[u8], count: usize) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .take(count)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn f64s(bytes: &[u8], count: usize) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .take(count)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

fn decode_utf8(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn decode_utf16(bytes: &[u8]) -> String {
    let end = bytes
        .chunks_exact(2)
        .position(|c| c[0] == 0 && c[1] == 0)
        .map(|units| units * 2)
        .unwrap_or(bytes.len() & !1);
    let (text, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(&bytes[..end]);
    text.into_owned()
}

fn decode_utf32(bytes: &[u8]) -> String {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .take_while(|&unit| unit != 0)
        .map(|unit| char::from_u32(unit).unwrap_or('?'))
        .collect()
}

impl FieldKind {
    /// Interpret `bytes` as this kind. Returns `None` if too short.
    pub fn decode(&self, bytes: &[u8]) -> Option<FieldValue> {
        let size = self.size();
        let bytes = bytes.get(..size)?;

        let value = match self {
            Self::Hex8 | Self::Hex16 | Self::Hex32 | Self::Hex64 => FieldValue::Hex {
                raw: le_u64(bytes),
                size,
            },
            Self::Int8 => FieldValue::Int(bytes[0] as i8 as i64),
            Self::Int16 => FieldValue::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            Self::Int32 => FieldValue::Int(le_u64(bytes) as u32 as i32 as i64),
            Self::Int64 => FieldValue::Int(le_u64(bytes) as i64),
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 => {
                FieldValue::UInt(le_u64(bytes))
            }
            Self::Float => FieldValue::Float(f32::from_bits(le_u64(bytes) as u32)),
            Self::Double => FieldValue::Double(f64::from_bits(le_u64(bytes))),
            Self::Vector4 | Self::Vector3 | Self::Vector2 => FieldValue::Vector(f32s(bytes, size / 4)),
            Self::Vector4d | Self::Vector3d | Self::Vector2d => {
                FieldValue::VectorD(f64s(bytes, size / 8))
            }
            Self::Matrix4x4 => matrix(bytes, 4, 4),
            Self::Matrix3x4 => matrix(bytes, 3, 4),
            Self::Matrix3x3 => matrix(bytes, 3, 3),
            Self::Bool => FieldValue::Bool(bytes[0] != 0),
            Self::Utf8 => FieldValue::Text(decode_utf8(bytes)),
            Self::Utf16 => FieldValue::Text(decode_utf16(bytes)),
            Self::Utf32 => FieldValue::Text(decode_utf32(bytes)),
        };
        Some(value)
    }
}

fn matrix(bytes: &[u8], rows: usize, cols: usize) -> FieldValue {
    FieldValue::Matrix {
        rows,
        cols,
        values: f32s(bytes, rows * cols),
    }
}
