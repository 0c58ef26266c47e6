use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::warn;

/// A named section of a loaded module image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl Section {
    pub fn contains(&self, address: u64) -> bool {
        self.base <= address && address < self.base + self.size
    }
}

/// A module loaded in the target process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub sections: Vec<Section>,
}

impl Module {
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            base,
            size,
            sections: Vec::new(),
        }
    }

    /// Inclusive of the end address, matching how pointers one past the
    /// image are still attributed to it.
    pub fn contains(&self, address: u64) -> bool {
        self.base <= address && address <= self.base + self.size
    }

    pub fn section_for(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }
}

/// Parse the agent's module list: `name,base,size` records separated by
/// `|`, with base and size in hex.
pub fn parse_module_list(list: &str) -> Vec<Module> {
    list.split('|')
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let module = parse_module_record(record);
            if module.is_none() {
                warn!("Skipping malformed module record '{}'", record);
            }
            module
        })
        .collect()
}

fn parse_module_record(record: &str) -> Option<Module> {
    // Names may contain commas, base and size never do
    let mut parts = record.rsplitn(3, ',');
    let size = parse_hex(parts.next()?)?;
    let base = parse_hex(parts.next()?)?;
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(Module::new(name, base, size))
}

/// Parse a hex number with optional `0x` prefix.
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Modules of the attached process, refreshed on demand.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalogue {
    modules: Vec<Module>,
    refreshed_at: Option<DateTime<Local>>,
}

impl ModuleCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole catalogue in one step.
    pub fn replace(&mut self, modules: Vec<Module>) {
        self.modules = modules;
        self.refreshed_at = Some(Local::now());
    }

    pub fn clear(&mut self) {
        self.modules.clear();
        self.refreshed_at = None;
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Local>> {
        self.refreshed_at
    }

    /// Case-insensitive lookup by module name.
    pub fn find(&self, name: &str) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn containing(&self, address: u64) -> Option<&Module> {
        self.modules.iter().find(|m| m.contains(address))
    }

    /// Render an address as `module+0xRVA`.
    pub fn format_rva(&self, address: u64) -> Option<String> {
        self.containing(address)
            .map(|m| format!("{}+0x{:X}", m.name, address - m.base))
    }
}

/// Exported symbols of every module, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct ExportMap {
    by_address: HashMap<u64, String>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u64, module: &str, symbol: &str) {
        self.by_address
            .insert(address, format!("{}!{}", module, symbol));
    }

    pub fn clear(&mut self) {
        self.by_address.clear();
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Exports sorted by address.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        let mut entries: Vec<(u64, &str)> = self
            .by_address
            .iter()
            .map(|(address, name)| (*address, name.as_str()))
            .collect();
        entries.sort_unstable_by_key(|(address, _)| *address);
        entries.into_iter()
    }

    /// `module!symbol` for an exported address
    pub fn symbol_at(&self, address: u64) -> Option<&str> {
        self.by_address.get(&address).map(String::as_str)
    }

    /// Address of `module!symbol`; the module name matches case-insensitively.
    pub fn resolve(&self, module: &str, symbol: &str) -> Option<u64> {
        self.by_address.iter().find_map(|(address, full)| {
            let (m, s) = full.split_once('!')?;
            (m.eq_ignore_ascii_case(module) && s == symbol).then_some(*address)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_list() {
        let modules = parse_module_list("game.exe,140000000,2A000|kernel32.dll,7FFA10000000,C1000");
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0], Module::new("game.exe", 0x140000000, 0x2A000));
        assert_eq!(modules[1].name, "kernel32.dll");
        assert_eq!(modules[1].base, 0x7FFA10000000);
        assert_eq!(modules[1].size, 0xC1000);
    }

    #[test]
    fn test_parse_module_list_skips_malformed() {
        let modules = parse_module_list("good.dll,1000,200|broken|bad.dll,zz,10||other.dll,0x2000,0x100|");
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["good.dll", "other.dll"]);
        assert_eq!(modules[1].base, 0x2000);
    }

    #[test]
    fn test_parse_module_name_with_comma() {
        let modules = parse_module_list("odd,name.dll,1000,10");
        assert_eq!(modules[0].name, "odd,name.dll");
    }

    #[test]
    fn test_module_and_section_bounds() {
        let mut module = Module::new("game.exe", 0x1000, 0x100);
        module.sections.push(Section {
            name: ".text".to_string(),
            base: 0x1000,
            size: 0x80,
        });

        assert!(module.contains(0x1000));
        assert!(module.contains(0x1100));
        assert!(!module.contains(0x1101));
        assert!(!module.contains(0xFFF));

        assert_eq!(module.section_for(0x107F).unwrap().name, ".text");
        assert!(module.section_for(0x1080).is_none());
    }

    #[test]
    fn test_catalogue_lookup_and_rva() {
        let mut catalogue = ModuleCatalogue::new();
        assert!(catalogue.refreshed_at().is_none());
        catalogue.replace(vec![Module::new("Game.exe", 0x140000000, 0x1000)]);

        assert!(catalogue.refreshed_at().is_some());
        assert!(catalogue.find("game.EXE").is_some());
        assert_eq!(
            catalogue.format_rva(0x140000123).as_deref(),
            Some("Game.exe+0x123")
        );
        assert_eq!(catalogue.format_rva(0x50), None);
    }

    #[test]
    fn test_export_map() {
        let mut exports = ExportMap::new();
        exports.insert(0x7FF0_0000_1000, "kernel32.dll", "Sleep");

        assert_eq!(
            exports.symbol_at(0x7FF0_0000_1000),
            Some("kernel32.dll!Sleep")
        );
        assert_eq!(
            exports.resolve("KERNEL32.DLL", "Sleep"),
            Some(0x7FF0_0000_1000)
        );
        assert_eq!(exports.resolve("kernel32.dll", "sleep"), None);

        exports.insert(0x7FF0_0000_0800, "kernel32.dll", "Beep");
        let names: Vec<_> = exports.iter().map(|(_, name)| name).collect();
        assert_eq!(names, vec!["kernel32.dll!Beep", "kernel32.dll!Sleep"]);
    }
}
