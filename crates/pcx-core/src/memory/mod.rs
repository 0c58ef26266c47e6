mod catalogue;
#[cfg(test)]
pub mod mock;
pub mod pe;
mod read_cache;
mod reader;
mod remote;

pub use catalogue::{ExportMap, Module, ModuleCatalogue, Section, parse_hex, parse_module_list};
pub use pe::{Export, read_exports, read_sections};
pub use read_cache::ReadCache;
pub use reader::{
    MemoryState, MemoryType, PointerWidth, QueryMemory, ReadMemory, RegionInfo, cstring_from_bytes,
};
pub use remote::{ProcessInfo, RemoteMemory};
