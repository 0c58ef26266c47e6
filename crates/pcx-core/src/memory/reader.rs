use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{Error, Result};

/// Pointer width of the attached process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointerWidth {
    X32,
    #[default]
    X64,
}

impl PointerWidth {
    pub fn from_is_x32(is_x32: bool) -> Self {
        if is_x32 { Self::X32 } else { Self::X64 }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::X32 => 4,
            Self::X64 => 8,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MemoryState {
    Commit,
    Reserve,
    Free,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MemoryType {
    Private,
    Mapped,
    Image,
}

/// Result of a region query against the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub state: MemoryState,
    pub kind: MemoryType,
    pub protect: u32,
}

impl RegionInfo {
    /// Committed private memory is treated as heap.
    pub fn is_heap(&self) -> bool {
        self.state == MemoryState::Commit && self.kind == MemoryType::Private
    }
}

/// Source of target process memory.
pub trait ReadMemory {
    /// Read exactly `size` bytes at `address`.
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Read a large span in one request (module images, export tables).
    fn read_span(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_bytes(address, size)
    }

    fn read_u8(&self, address: u64) -> Result<u8> {
        Ok(read_array::<1, _>(self, address)?[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(self, address)?))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(read_array(self, address)?))
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        Ok(i32::from_le_bytes(read_array(self, address)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(self, address)?))
    }

    fn read_pointer(&self, address: u64, width: PointerWidth) -> Result<u64> {
        match width {
            PointerWidth::X32 => self.read_u32(address).map(u64::from),
            PointerWidth::X64 => self.read_u64(address),
        }
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    fn read_cstring(&self, address: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes(address, max_len)?;
        Ok(cstring_from_bytes(&bytes))
    }
}

/// Address-space queries needed for pointer classification.
pub trait QueryMemory {
    fn query_region(&self, address: u64) -> Result<RegionInfo>;
}

fn read_array<const N: usize, R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Result<[u8; N]> {
    let bytes = reader.read_bytes(address, N)?;
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::MemoryReadFailed {
            address,
            message: format!("short read: {} of {} bytes", bytes.len(), N),
        })
}

/// Decode bytes up to the first NUL as lossy UTF-8.
pub fn cstring_from_bytes(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
