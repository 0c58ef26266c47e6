//! MSVC run-time type information walk.
//!
//! An object's vtable is preceded by a pointer to its complete object
//! locator. From there the class hierarchy descriptor lists every base class
//! with a type descriptor holding the decorated name (`.?AVName@@`).

use crate::memory::{PointerWidth, ReadMemory, cstring_from_bytes};

/// Upper bound on base classes walked for one object
pub const MAX_BASE_CLASSES: u32 = 64;

/// Decorated name bytes read from a type descriptor
const TYPE_NAME_LEN: usize = 60;

/// Complete object locator, with descriptor references already absolute.
#[derive(Debug, Clone, Copy)]
struct ObjectLocator {
    hierarchy: u64,
    image_base: u64,
}

fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

fn read_locator<R: ReadMemory + ?Sized>(
    reader: &R,
    address: u64,
    width: PointerWidth,
) -> Option<ObjectLocator> {
    match width {
        // signature, offset, cdOffset, typeDescriptor, hierarchy, selfOffset
        PointerWidth::X64 => {
            let bytes = reader.read_bytes(address, 24).ok()?;
            let hierarchy = u32_at(&bytes, 16)? as u64;
            let self_offset = u32_at(&bytes, 20)? as u64;
            let image_base = address.checked_sub(self_offset)?;
            Some(ObjectLocator {
                hierarchy: image_base.checked_add(hierarchy)?,
                image_base,
            })
        }
        // signature, offset, cdOffset, pTypeDescriptor, pHierarchy
        PointerWidth::X32 => {
            let bytes = reader.read_bytes(address, 20).ok()?;
            Some(ObjectLocator {
                hierarchy: u32_at(&bytes, 16)? as u64,
                image_base: 0,
            })
        }
    }
}

/// Strip `.?AV` and the trailing `@@` from a decorated type name.
fn undecorate(name: &str) -> Option<&str> {
    let stripped = name.strip_suffix("@@")?;
    stripped.get(4..)
}

/// Resolve the class hierarchy of the object whose vtable pointer is `value`.
///
/// Returns the class names joined with `" : "`, most derived first, or
/// `None` if any step of the walk does not look like valid RTTI.
pub fn resolve_rtti<R: ReadMemory + ?Sized>(
    reader: &R,
    value: u64,
    width: PointerWidth,
) -> Option<String> {
    let ptr_size = width.size() as u64;
    let locator_address = reader.read_pointer(value.checked_sub(ptr_size)?, width).ok()?;
    if locator_address == 0 {
        return None;
    }

    let locator = read_locator(reader, locator_address, width)?;
    let base = locator.image_base;

    // signature, attributes, numBaseClasses, baseClassArray
    let hierarchy = reader.read_bytes(locator.hierarchy, 16).ok()?;
    let count = u32_at(&hierarchy, 8)?;
    if count > MAX_BASE_CLASSES {
        return None;
    }
    let array = base.checked_add(u32_at(&hierarchy, 12)? as u64)?;

    let mut names = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let class_descriptor = base.checked_add(reader.read_u32(array.checked_add(i * 4)?).ok()? as u64)?;
        let type_descriptor = base.checked_add(reader.read_u32(class_descriptor).ok()? as u64)?;
        let raw = reader
            .read_bytes(type_descriptor.checked_add(2 * ptr_size)?, TYPE_NAME_LEN)
            .ok()?;
        let decorated = cstring_from_bytes(&raw);
        names.push(undecorate(&decorated)?.to_string());
    }

    if names.is_empty() {
        None
    } else {
        Some(names.join(" : "))
    }
}
