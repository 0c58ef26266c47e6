//! Minimal PE header walking over remote memory.
//!
//! Only the pieces needed for pointer annotation are read: the section
//! table and the export directory.

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, Section, cstring_from_bytes};

/// Bytes fetched for the DOS/NT headers and section table
pub const HEADER_SPAN: usize = 4096;

const DOS_MAGIC: u16 = 0x5A4D;
const NT_SIGNATURE: u32 = 0x0000_4550;
const OPTIONAL_MAGIC_PE32: u16 = 0x10B;
const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x20B;
const SECTION_HEADER_SIZE: usize = 40;
const EXPORT_DIRECTORY_SIZE: usize = 40;
const MAX_EXPORT_NAMES: u32 = 0x10000;
const MAX_EXPORT_NAME_LEN: usize = 256;

/// An exported symbol resolved to an absolute address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub address: u64,
}

struct Headers {
    bytes: Vec<u8>,
    nt_offset: usize,
}

impl Headers {
    fn read<R: ReadMemory + ?Sized>(reader: &R, module_base: u64) -> Result<Self> {
        let bytes = reader.read_span(module_base, HEADER_SPAN)?;
        let malformed = |message: &str| Error::MemoryReadFailed {
            address: module_base,
            message: message.to_string(),
        };

        if le_u16(&bytes, 0) != Some(DOS_MAGIC) {
            return Err(malformed("missing DOS signature"));
        }
        let nt_offset =
            le_u32(&bytes, 0x3C).ok_or_else(|| malformed("truncated DOS header"))? as usize;
        if le_u32(&bytes, nt_offset) != Some(NT_SIGNATURE) {
            return Err(malformed("missing NT signature"));
        }

        Ok(Self { bytes, nt_offset })
    }

    fn section_count(&self) -> usize {
        le_u16(&self.bytes, self.nt_offset + 6).unwrap_or(0) as usize
    }

    fn optional_header_offset(&self) -> usize {
        self.nt_offset + 24
    }

    fn optional_header_size(&self) -> usize {
        le_u16(&self.bytes, self.nt_offset + 20).unwrap_or(0) as usize
    }

    /// (rva, size) of the export data directory
    fn export_directory(&self) -> Option<(u32, u32)> {
        let optional = self.optional_header_offset();
        let directories = match le_u16(&self.bytes, optional)? {
            OPTIONAL_MAGIC_PE32 => optional + 96,
            OPTIONAL_MAGIC_PE32_PLUS => optional + 112,
            _ => return None,
        };
        Some((
            le_u32(&self.bytes, directories)?,
            le_u32(&self.bytes, directories + 4)?,
        ))
    }
}

/// Read the section table of the module mapped at `module_base`.
pub fn read_sections<R: ReadMemory + ?Sized>(reader: &R, module_base: u64) -> Result<Vec<Section>> {
    let headers = Headers::read(reader, module_base)?;
    let table = headers.optional_header_offset() + headers.optional_header_size();

    let sections = (0..headers.section_count())
        .map_while(|i| {
            let entry = headers
                .bytes
                .get(table + i * SECTION_HEADER_SIZE..table + (i + 1) * SECTION_HEADER_SIZE)?;
            Some(Section {
                name: cstring_from_bytes(&entry[..8]),
                base: module_base + u64::from(le_u32(entry, 12)?),
                size: u64::from(le_u32(entry, 8)?),
            })
        })
        .collect();

    Ok(sections)
}

/// Read the named exports of the module mapped at `module_base`.
///
/// Forwarded exports are skipped. Names are taken from one read of the
/// export directory span when they fall inside it.
pub fn read_exports<R: ReadMemory + ?Sized>(reader: &R, module_base: u64) -> Result<Vec<Export>> {
    let headers = Headers::read(reader, module_base)?;
    let Some((dir_rva, dir_size)) = headers.export_directory() else {
        return Ok(Vec::new());
    };
    if dir_rva == 0 || dir_size == 0 {
        return Ok(Vec::new());
    }
    let dir_end = dir_rva.checked_add(dir_size).ok_or_else(|| Error::MemoryReadFailed {
        address: module_base,
        message: format!("export directory {:#x}+{:#x} overflows", dir_rva, dir_size),
    })?;

    let dir_span = reader.read_span(
        module_base + u64::from(dir_rva),
        (dir_size as usize).max(EXPORT_DIRECTORY_SIZE),
    )?;
    let field = |offset: usize| {
        le_u32(&dir_span, offset).ok_or_else(|| Error::MemoryReadFailed {
            address: module_base + u64::from(dir_rva),
            message: "truncated export directory".to_string(),
        })
    };
    let function_count = field(20)?.min(MAX_EXPORT_NAMES);
    let name_count = field(24)?.min(MAX_EXPORT_NAMES);
    let functions_rva = field(28)?;
    let names_rva = field(32)?;
    let ordinals_rva = field(36)?;

    let table = |rva: u32, len: usize| reader.read_span(module_base + u64::from(rva), len);
    let functions = table(functions_rva, function_count as usize * 4)?;
    let names = table(names_rva, name_count as usize * 4)?;
    let ordinals = table(ordinals_rva, name_count as usize * 2)?;

    let mut exports = Vec::with_capacity(name_count as usize);
    for i in 0..name_count as usize {
        let (Some(name_rva), Some(ordinal)) = (le_u32(&names, i * 4), le_u16(&ordinals, i * 2)) else {
            break;
        };
        if u32::from(ordinal) >= function_count {
            continue;
        }
        let Some(function_rva) = le_u32(&functions, ordinal as usize * 4) else {
            continue;
        };
        if function_rva >= dir_rva && function_rva < dir_end {
            continue;
        }

        let name = match name_rva.checked_sub(dir_rva) {
            Some(offset) if (offset as usize) < dir_span.len() => {
                let end = (offset as usize + MAX_EXPORT_NAME_LEN).min(dir_span.len());
                cstring_from_bytes(&dir_span[offset as usize..end])
            }
            _ => match reader.read_cstring(module_base + u64::from(name_rva), MAX_EXPORT_NAME_LEN) {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping export name at rva {:#x}: {}", name_rva, e);
                    continue;
                }
            },
        };
        if name.is_empty() {
            continue;
        }

        exports.push(Export {
            name,
            address: module_base + u64::from(function_rva),
        });
    }

    Ok(exports)
}

fn le_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(slice.try_into().ok()?))
}

fn le_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(slice.try_into().ok()?))
}
