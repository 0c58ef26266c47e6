//! Pointer classification and annotation.

mod rtti;

use std::fmt;

use serde::Serialize;

use crate::memory::{ExportMap, ModuleCatalogue, PointerWidth, QueryMemory, ReadMemory, cstring_from_bytes};

pub use rtti::{MAX_BASE_CLASSES, resolve_rtti};

/// Bytes read for a string preview
pub const PREVIEW_LEN: usize = 64;

/// Section name used when an address is inside a module but no section
pub const UNKNOWN_SECTION: &str = "unknown";

/// Where an integer value points, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerInfo {
    None,
    Heap,
    Module { name: String, section: String },
}

impl PointerInfo {
    pub fn is_pointer(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Classify `value` against the module catalogue, falling back to a region
/// query for heap memory.
pub fn classify<Q: QueryMemory + ?Sized>(
    memory: &Q,
    catalogue: &ModuleCatalogue,
    value: u64,
) -> PointerInfo {
    if value == 0 {
        return PointerInfo::None;
    }

    if let Some(module) = catalogue.containing(value) {
        let section = module
            .section_for(value)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| UNKNOWN_SECTION.to_string());
        return PointerInfo::Module {
            name: module.name.clone(),
            section,
        };
    }

    match memory.query_region(value) {
        Ok(region) if region.is_heap() => PointerInfo::Heap,
        _ => PointerInfo::None,
    }
}

/// Printable text at `address`, if its first four bytes are printable ASCII.
pub fn string_preview<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Option<String> {
    let bytes = reader
        .read_bytes(address, PREVIEW_LEN)
        .or_else(|_| reader.read_bytes(address, 4))
        .ok()?;
    if bytes.len() < 4 || !bytes[..4].iter().all(|b| (0x20..=0x7E).contains(b)) {
        return None;
    }
    Some(cstring_from_bytes(&bytes))
}

/// Everything known about a pointer-sized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointerDescription {
    pub value: u64,
    pub info: PointerInfo,
    pub symbol: Option<String>,
    pub rtti: Option<String>,
    pub preview: Option<String>,
}

impl PointerDescription {
    pub fn is_pointer(&self) -> bool {
        self.info.is_pointer()
    }
}

impl fmt::Display for PointerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.info, &self.symbol) {
            (PointerInfo::None, _) => write!(f, "{:#x}", self.value)?,
            (PointerInfo::Heap, _) => write!(f, "[heap] {:#x}", self.value)?,
            (PointerInfo::Module { .. }, Some(symbol)) => {
                write!(f, "[EXPORT] {} {:#x}", symbol, self.value)?
            }
            (PointerInfo::Module { name, section }, None) => {
                write!(f, "[{}] {} {:#x}", section, name, self.value)?
            }
        }
        if let Some(rtti) = &self.rtti {
            write!(f, " {rtti}")?;
        }
        if let Some(preview) = &self.preview {
            write!(f, " '{preview}'")?;
        }
        Ok(())
    }
}

/// Classify `value` and gather its export symbol, RTTI and string preview.
pub fn describe_pointer<M: ReadMemory + QueryMemory + ?Sized>(
    memory: &M,
    catalogue: &ModuleCatalogue,
    exports: &ExportMap,
    width: PointerWidth,
    value: u64,
) -> PointerDescription {
    let info = classify(memory, catalogue, value);
    if !info.is_pointer() {
        return PointerDescription {
            value,
            info,
            symbol: None,
            rtti: None,
            preview: None,
        };
    }

    PointerDescription {
        value,
        symbol: exports.symbol_at(value).map(str::to_string),
        rtti: resolve_rtti(memory, value, width),
        preview: string_preview(memory, value),
        info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockMemory;
    use crate::memory::{Module, Section};

    const MODULE_BASE: u64 = rtti::tests::IMAGE_BASE;

    fn catalogue() -> ModuleCatalogue {
        let mut module = Module::new("game.exe", MODULE_BASE, 0x1000);
        module.sections.push(Section {
            name: ".rdata".to_string(),
            base: MODULE_BASE + 0x200,
            size: 0x400,
        });
        let mut catalogue = ModuleCatalogue::new();
        catalogue.replace(vec![module]);
        catalogue
    }

    fn memory() -> MockMemory {
        let mut heap = vec![0u8; 0x100];
        heap[..6].copy_from_slice(b"hello\0");
        MockMemory::new()
            .with_segment(MODULE_BASE, rtti::tests::x64_image(".?AVPlayer@@"))
            .with_heap(0x5000, heap)
    }

    #[test]
    fn test_classify_module_and_section() {
        let memory = memory();
        let catalogue = catalogue();

        assert_eq!(
            classify(&memory, &catalogue, MODULE_BASE + 0x210),
            PointerInfo::Module {
                name: "game.exe".into(),
                section: ".rdata".into()
            }
        );
        assert_eq!(
            classify(&memory, &catalogue, MODULE_BASE + 0x10),
            PointerInfo::Module {
                name: "game.exe".into(),
                section: UNKNOWN_SECTION.into()
            }
        );
        // module end is inclusive, section end is not
        assert_eq!(
            classify(&memory, &catalogue, MODULE_BASE + 0x1000),
            PointerInfo::Module {
                name: "game.exe".into(),
                section: UNKNOWN_SECTION.into()
            }
        );
    }

    #[test]
    fn test_classify_heap_and_none() {
        let memory = memory();
        let catalogue = catalogue();
        assert_eq!(classify(&memory, &catalogue, 0x5010), PointerInfo::Heap);
        assert_eq!(classify(&memory, &catalogue, 0x9000), PointerInfo::None);
        assert_eq!(classify(&memory, &catalogue, 0), PointerInfo::None);
    }

    #[test]
    fn test_string_preview() {
        let memory = memory();
        assert_eq!(string_preview(&memory, 0x5000), Some("hello".into()));
        assert_eq!(string_preview(&memory, 0x5003), None);
        assert_eq!(string_preview(&memory, 0x9000), None);
    }

    #[test]
    fn test_describe_pointer() {
        let memory = memory();
        let catalogue = catalogue();
        let mut exports = ExportMap::new();
        exports.insert(rtti::tests::X64_VTABLE, "game.exe", "PlayerVtbl");

        let description = describe_pointer(
            &memory,
            &catalogue,
            &exports,
            PointerWidth::X64,
            rtti::tests::X64_VTABLE,
        );
        assert!(description.is_pointer());
        assert_eq!(description.symbol.as_deref(), Some("game.exe!PlayerVtbl"));
        assert_eq!(description.rtti.as_deref(), Some("Player : Entity"));
        assert_eq!(
            description.to_string(),
            format!(
                "[EXPORT] game.exe!PlayerVtbl {:#x} Player : Entity",
                rtti::tests::X64_VTABLE
            )
        );

        let heap = describe_pointer(&memory, &catalogue, &exports, PointerWidth::X64, 0x5000);
        assert_eq!(heap.to_string(), "[heap] 0x5000 'hello'");

        let plain = describe_pointer(&memory, &catalogue, &exports, PointerWidth::X64, 42);
        assert!(!plain.is_pointer());
        assert_eq!(plain.to_string(), "0x2a");
    }
}
