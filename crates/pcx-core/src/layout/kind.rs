use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

use crate::memory::PointerWidth;

/// Interpretation of a field's bytes.
///
/// Order matters: every kind after `Hex64` is a typed (non-padding) kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    FromRepr,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum FieldKind {
    Hex8 = 0,
    Hex16,
    Hex32,
    Hex64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Vector4,
    Vector3,
    Vector2,
    Vector4d,
    Vector3d,
    Vector2d,
    Matrix4x4,
    Matrix3x4,
    Matrix3x3,
    Bool,
    #[strum(serialize = "UTF8")]
    Utf8,
    #[strum(serialize = "UTF16")]
    Utf16,
    #[strum(serialize = "UTF32")]
    Utf32,
}

/// Static per-kind metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub size: usize,
    /// Display color as RGB
    pub color: (u8, u8, u8),
    /// C++ type used when exporting a definition
    pub code_type: Option<&'static str>,
    /// Element count for fixed text arrays
    pub array_len: Option<usize>,
}

const HEX_COLOR: (u8, u8, u8) = (255, 255, 255);
const INT_COLOR: (u8, u8, u8) = (255, 200, 0);
const UINT_COLOR: (u8, u8, u8) = (7, 247, 163);
const VECTOR_COLOR: (u8, u8, u8) = (115, 255, 124);
const VECTOR_D_COLOR: (u8, u8, u8) = (95, 235, 104);
const MATRIX_COLOR: (u8, u8, u8) = (3, 252, 144);
const TEXT_COLOR: (u8, u8, u8) = (252, 186, 3);

/// Fixed byte length of the text kinds
pub const TEXT_BYTES: usize = 64;

const fn entry(size: usize, color: (u8, u8, u8), code_type: Option<&'static str>) -> KindInfo {
    KindInfo {
        size,
        color,
        code_type,
        array_len: None,
    }
}

const fn text(code_type: &'static str, unit: usize) -> KindInfo {
    KindInfo {
        size: TEXT_BYTES,
        color: TEXT_COLOR,
        code_type: Some(code_type),
        array_len: Some(TEXT_BYTES / unit),
    }
}

/// Indexed by `FieldKind as usize`.
static KIND_TABLE: [KindInfo; 27] = [
    entry(1, HEX_COLOR, None),
    entry(2, HEX_COLOR, None),
    entry(4, HEX_COLOR, None),
    entry(8, HEX_COLOR, None),
    entry(1, INT_COLOR, Some("int8_t")),
    entry(2, INT_COLOR, Some("int16_t")),
    entry(4, INT_COLOR, Some("int")),
    entry(8, INT_COLOR, Some("int64_t")),
    entry(1, UINT_COLOR, Some("uint8_t")),
    entry(2, UINT_COLOR, Some("uint16_t")),
    entry(4, UINT_COLOR, Some("uint32_t")),
    entry(8, UINT_COLOR, Some("uint64_t")),
    entry(4, (225, 143, 255), Some("float")),
    entry(8, (187, 0, 255), Some("double")),
    entry(16, VECTOR_COLOR, Some("Vector4")),
    entry(12, VECTOR_COLOR, Some("Vector3")),
    entry(8, VECTOR_COLOR, Some("Vector2")),
    entry(32, VECTOR_D_COLOR, Some("Vector4d")),
    entry(24, VECTOR_D_COLOR, Some("Vector3d")),
    entry(16, VECTOR_D_COLOR, Some("Vector2d")),
    entry(64, MATRIX_COLOR, Some("matrix4x4_t")),
    entry(48, MATRIX_COLOR, Some("matrix3x4_t")),
    entry(36, MATRIX_COLOR, Some("matrix3x3_t")),
    entry(1, (0, 183, 255), Some("bool")),
    text("char", 1),
    text("wchar_t", 2),
    text("char32_t", 4),
];

impl FieldKind {
    pub fn info(&self) -> &'static KindInfo {
        &KIND_TABLE[*self as usize]
    }

    pub fn size(&self) -> usize {
        self.info().size
    }

    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// Raw hex kinds act as padding when unnamed.
    pub fn is_hex(&self) -> bool {
        *self <= Self::Hex64
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Utf8 | Self::Utf16 | Self::Utf32)
    }

    /// Hex kind of the given byte size (1, 2, 4 or 8).
    pub fn hex_of_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(Self::Hex8),
            2 => Some(Self::Hex16),
            4 => Some(Self::Hex32),
            8 => Some(Self::Hex64),
            _ => None,
        }
    }

    /// Hex kind matching the target's pointer width.
    pub fn pointer_hex(width: PointerWidth) -> Self {
        match width {
            PointerWidth::X32 => Self::Hex32,
            PointerWidth::X64 => Self::Hex64,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::from_repr(value)
    }
}

/// Greedy 8/4/2/1 hex chunks covering `bytes`.
pub fn hex_chunks(mut bytes: usize) -> Vec<FieldKind> {
    let mut chunks = Vec::new();
    for (size, kind) in [
        (8, FieldKind::Hex64),
        (4, FieldKind::Hex32),
        (2, FieldKind::Hex16),
        (1, FieldKind::Hex8),
    ] {
        while bytes >= size {
            chunks.push(kind);
            bytes -= size;
        }
    }
    chunks
}
