//! Explicit owner of everything tied to one attached process.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::address::parse_address;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout::Region;
use crate::memory::{
    ExportMap, Module, ModuleCatalogue, PointerWidth, ProcessInfo, RemoteMemory, read_exports,
    read_sections,
};
use crate::pattern::{self, PatternInfo};
use crate::pointer::{self, PointerDescription};
use crate::sync::{SnapshotCache, SyncLoop, SyncTargets};

/// Module catalogue, export map, regions and snapshot state for one target.
///
/// Attaching initializes it; detaching clears it.
pub struct Session {
    memory: Arc<RemoteMemory>,
    config: Config,
    catalogue: ModuleCatalogue,
    exports: ExportMap,
    regions: Vec<Region>,
    selected: usize,
    preview: Region,
    width: PointerWidth,
    region_counter: u32,
    snapshots: Arc<SnapshotCache>,
    targets: Arc<SyncTargets>,
}

impl Session {
    pub fn new(memory: Arc<RemoteMemory>, config: Config) -> Self {
        let width = PointerWidth::default();
        let preview = Region::new("Preview", config.layout.preview_fields, width);
        Self {
            memory,
            config,
            catalogue: ModuleCatalogue::new(),
            exports: ExportMap::new(),
            regions: Vec::new(),
            selected: 0,
            preview,
            width,
            region_counter: 0,
            snapshots: Arc::new(SnapshotCache::new()),
            targets: Arc::new(SyncTargets::new()),
        }
    }

    pub fn memory(&self) -> &Arc<RemoteMemory> {
        &self.memory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn width(&self) -> PointerWidth {
        self.width
    }

    pub fn catalogue(&self) -> &ModuleCatalogue {
        &self.catalogue
    }

    pub fn exports(&self) -> &ExportMap {
        &self.exports
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCache> {
        &self.snapshots
    }

    pub fn attach_by_pid(&mut self, pid: u32) -> Result<ProcessInfo> {
        let process = self.memory.attach_by_pid(pid)?;
        self.on_attached(process);
        Ok(process)
    }

    pub fn attach_by_name(&mut self, name: &str) -> Result<ProcessInfo> {
        let process = self.memory.attach_by_name(name)?;
        self.on_attached(process);
        Ok(process)
    }

    fn on_attached(&mut self, process: ProcessInfo) {
        let width = process.pointer_width();
        if width != self.width || self.regions.is_empty() {
            self.width = width;
            self.reset_regions();
        }
        if let Err(e) = self.refresh_modules() {
            warn!("Module refresh after attach failed: {}", e);
        }
    }

    fn reset_regions(&mut self) {
        self.regions.clear();
        self.region_counter = 0;
        self.selected = 0;
        self.add_region();
        self.preview = Region::new("Preview", self.config.layout.preview_fields, self.width);
    }

    /// Drop the process and everything derived from it.
    pub fn detach(&mut self) {
        self.memory.detach();
        self.catalogue.clear();
        self.exports.clear();
        self.regions.clear();
        self.region_counter = 0;
        self.selected = 0;
        self.preview.set_address(0);
        self.targets.publish(Vec::new());
        self.snapshots.clear();
    }

    /// Reload modules with their section tables and export symbols.
    pub fn refresh_modules(&mut self) -> Result<usize> {
        let mut modules = self.memory.get_modules()?;
        self.exports.clear();

        for module in &mut modules {
            match read_sections(self.memory.as_ref(), module.base) {
                Ok(sections) => module.sections = sections,
                Err(e) => debug!("No section table for {}: {}", module.name, e),
            }
            match read_exports(self.memory.as_ref(), module.base) {
                Ok(exports) => {
                    for export in exports {
                        self.exports.insert(export.address, &module.name, &export.name);
                    }
                }
                Err(e) => debug!("No exports for {}: {}", module.name, e),
            }
        }

        info!(
            "Catalogue: {} modules, {} exports",
            modules.len(),
            self.exports.len()
        );
        let count = modules.len();
        self.catalogue.replace(modules);
        Ok(count)
    }

    /// Add a default region named `Class_<n>` and return its index.
    pub fn add_region(&mut self) -> usize {
        let name = format!("Class_{}", self.region_counter);
        self.region_counter += 1;
        self.regions
            .push(Region::new(name, self.config.layout.default_fields, self.width));
        self.regions.len() - 1
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn region_mut(&mut self, index: usize) -> Option<&mut Region> {
        self.regions.get_mut(index)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_region(&self) -> Option<&Region> {
        self.regions.get(self.selected)
    }

    pub fn selected_region_mut(&mut self) -> Option<&mut Region> {
        self.regions.get_mut(self.selected)
    }

    pub fn select_region(&mut self, index: usize) -> bool {
        if index < self.regions.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Index of a region already showing `address`.
    pub fn region_at(&self, address: u64) -> Option<usize> {
        self.regions.iter().position(|r| r.address() == address)
    }

    pub fn remove_region(&mut self, index: usize) -> Option<Region> {
        if index >= self.regions.len() {
            return None;
        }
        let removed = self.regions.remove(index);
        if self.selected >= self.regions.len() {
            self.selected = self.regions.len().saturating_sub(1);
        }
        Some(removed)
    }

    pub fn preview(&self) -> &Region {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut Region {
        &mut self.preview
    }

    /// Point the preview region at a hovered pointer.
    pub fn set_preview_target(&mut self, address: u64) {
        self.preview.set_address(address);
    }

    pub fn resolve_address(&self, expression: &str) -> Result<u64> {
        parse_address(expression, &self.catalogue, &self.exports)
    }

    /// Hand the current region addresses and sizes to the sync loop.
    pub fn publish_sync_targets(&self) {
        let targets = self
            .regions
            .iter()
            .chain(std::iter::once(&self.preview))
            .map(|region| (region.address(), region.size()))
            .collect();
        self.targets.publish(targets);
    }

    /// Copy matching snapshots into every region. Returns how many updated.
    pub fn apply_snapshots(&mut self) -> usize {
        let mut applied = 0;
        for region in self.regions.iter_mut().chain(std::iter::once(&mut self.preview)) {
            if region.address() == 0 {
                continue;
            }
            if let Some(bytes) = self.snapshots.bytes_of_size(region.address(), region.size())
                && region.apply_snapshot(&bytes)
            {
                applied += 1;
            }
        }
        applied
    }

    /// Sync loop wired to this session's targets and snapshot cache.
    pub fn sync_loop(&self) -> SyncLoop {
        SyncLoop::new(
            self.memory.clone(),
            Arc::clone(&self.targets),
            Arc::clone(&self.snapshots),
        )
    }

    pub fn describe_pointer(&self, value: u64) -> PointerDescription {
        pointer::describe_pointer(
            self.memory.as_ref(),
            &self.catalogue,
            &self.exports,
            self.width,
            value,
        )
    }

    pub fn find_module(&self, name: &str) -> Result<&Module> {
        self.catalogue
            .find(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    fn pattern_info(input: &str) -> Result<PatternInfo> {
        pattern::detect(input)
            .ok_or_else(|| Error::InvalidPattern(format!("Unrecognized pattern '{}'", input.trim())))
    }

    /// Local scan of `module` for every match of `input`.
    pub fn scan(&self, module: &str, input: &str) -> Result<Vec<u64>> {
        let info = Self::pattern_info(input)?;
        pattern::scan(self.memory.as_ref(), self.find_module(module)?, &info)
    }

    /// Agent-side scan of `module`; first match only.
    pub fn scan_remote(&self, module: &str, input: &str) -> Result<Option<u64>> {
        let info = Self::pattern_info(input)?;
        pattern::scan_remote(&self.memory, self.find_module(module)?, &info)
    }

    pub fn export_region(&mut self, index: usize) -> Option<String> {
        self.regions.get_mut(index).map(Region::export_definition)
    }

    pub fn format_rva(&self, address: u64) -> Option<String> {
        self.catalogue.format_rva(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::pe::tests::build_image;
    use crate::rpc::mock::ScriptedAgent;
    use serde_json::json;

    const IMAGE_BASE: u64 = 0x1_4000_0000;
    const HEAP_BASE: u64 = 0x5000;

    /// Agent serving a PE image at `IMAGE_BASE` and a small heap block.
    fn agent(is_x32: bool) -> Arc<ScriptedAgent> {
        let image = build_image();
        let mut heap = vec![0u8; 0x100];
        heap[..8].copy_from_slice(b"heapdata");
        ScriptedAgent::new(move |request| {
            let field = |name: &str| request[name].as_str().unwrap_or_default().to_string();
            let mut reply = match request["type"].as_str()? {
                "ref_process" => json!({
                    "success": true,
                    "base_address": "140000000",
                    "peb": "0",
                    "pid": "99",
                    "is_x32": if is_x32 { "true" } else { "false" },
                }),
                "get_modules" => json!({
                    "success": true,
                    "modules": "game.exe,140000000,3000|",
                    "count": "1",
                }),
                "rvm" => {
                    let address: u64 = field("address").parse().ok()?;
                    let size: usize = field("size").parse().ok()?;
                    let slice = if address >= IMAGE_BASE {
                        let start = (address - IMAGE_BASE) as usize;
                        image.get(start..start + size)
                    } else if address >= HEAP_BASE {
                        let start = (address - HEAP_BASE) as usize;
                        heap.get(start..start + size)
                    } else {
                        None
                    };
                    match slice {
                        Some(bytes) => json!({ "success": true, "data": hex::encode_upper(bytes) }),
                        None => json!({ "success": false, "error": "unmapped" }),
                    }
                }
                "find_pattern" => json!({ "success": true, "address": "0x140001010" }),
                "query_memory" => {
                    let address: u64 = field("address").parse().ok()?;
                    if (HEAP_BASE..HEAP_BASE + 0x100).contains(&address) {
                        json!({ "success": true, "state": "commit", "type": "private", "protect": "4" })
                    } else {
                        json!({ "success": true, "state": "free", "type": "private", "protect": "1" })
                    }
                }
                _ => return None,
            };
            reply["request_id"] = request["request_id"].clone();
            Some(reply)
        })
    }

    fn session(agent: &Arc<ScriptedAgent>) -> Session {
        let memory = Arc::new(RemoteMemory::new(agent.client(), &Config::default()));
        Session::new(memory, Config::default())
    }

    #[test]
    fn test_attach_initializes_state() {
        let agent = agent(false);
        let mut session = session(&agent);
        assert!(session.regions().is_empty());

        session.attach_by_pid(99).unwrap();
        assert_eq!(session.regions().len(), 1);
        assert_eq!(session.regions()[0].name, "Class_0");
        assert_eq!(session.regions()[0].size(), 50 * 8);
        assert_eq!(session.preview().size(), 15 * 8);

        let module = session.find_module("GAME.EXE").unwrap();
        let names: Vec<&str> = module.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![".text", ".data"]);
        assert_eq!(session.exports().symbol_at(IMAGE_BASE + 0x1010), Some("game.exe!Alpha"));
        assert!(session.catalogue().refreshed_at().is_some());
    }

    #[test]
    fn test_x32_target_uses_narrow_fields() {
        let agent = agent(true);
        let mut session = session(&agent);
        session.attach_by_name("game.exe").unwrap();
        assert_eq!(session.width(), PointerWidth::X32);
        assert_eq!(session.regions()[0].size(), 50 * 4);
        assert_eq!(session.preview().size(), 15 * 4);
    }

    #[test]
    fn test_reattach_same_width_keeps_regions() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();
        session.add_region();
        session.attach_by_pid(99).unwrap();
        assert_eq!(session.regions().len(), 2);
        assert_eq!(session.regions()[1].name, "Class_1");
    }

    #[test]
    fn test_detach_clears_everything() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();
        session.snapshots().insert(0x10, vec![1]);

        session.detach();
        assert!(session.regions().is_empty());
        assert!(session.catalogue().is_empty());
        assert!(session.exports().is_empty());
        assert!(session.snapshots().is_empty());
        assert!(!session.memory().is_attached());
    }

    #[test]
    fn test_resolve_address() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();
        assert_eq!(session.resolve_address("game.exe+0x20").unwrap(), IMAGE_BASE + 0x20);
        assert_eq!(
            session.resolve_address("game.exe!Beta").unwrap(),
            IMAGE_BASE + 0x1020
        );
        assert_eq!(session.format_rva(IMAGE_BASE + 0x1020).as_deref(), Some("game.exe+0x1020"));
    }

    #[test]
    fn test_sync_round_trip_into_regions() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();

        let region = session.selected_region_mut().unwrap();
        region.set_address(HEAP_BASE);
        region.resize(-8);
        while region.size() > 16 {
            region.resize(-8);
        }
        session.set_preview_target(0);

        session.publish_sync_targets();
        let report = session.sync_loop().tick();
        assert_eq!(report.targets, 1);
        assert_eq!(report.updated, 1);

        assert_eq!(session.apply_snapshots(), 1);
        assert_eq!(&session.regions()[0].bytes()[..8], b"heapdata");
    }

    #[test]
    fn test_snapshot_with_stale_size_is_ignored() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();
        session.selected_region_mut().unwrap().set_address(HEAP_BASE);
        session.snapshots().insert(HEAP_BASE, vec![0xFF; 8]);
        assert_eq!(session.apply_snapshots(), 0);
    }

    #[test]
    fn test_describe_pointer() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();

        let export = session.describe_pointer(IMAGE_BASE + 0x1010);
        assert_eq!(export.symbol.as_deref(), Some("game.exe!Alpha"));

        let heap = session.describe_pointer(HEAP_BASE);
        assert_eq!(heap.info, pointer::PointerInfo::Heap);
        assert_eq!(heap.preview.as_deref(), Some("heapdata"));

        assert!(!session.describe_pointer(0x10).is_pointer());
    }

    #[test]
    fn test_scan_by_module_name() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();

        let hits = session.scan("game.exe", "4D 5A").unwrap();
        assert_eq!(hits.first(), Some(&IMAGE_BASE));

        assert_eq!(
            session.scan_remote("game.exe", "4D 5A ??").unwrap(),
            Some(IMAGE_BASE + 0x1010)
        );
        assert!(matches!(
            session.scan("missing.dll", "90"),
            Err(Error::ModuleNotFound(_))
        ));
        assert!(matches!(
            session.scan("game.exe", "not a pattern"),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_region_management() {
        let agent = agent(false);
        let mut session = session(&agent);
        session.attach_by_pid(99).unwrap();

        let index = session.add_region();
        assert_eq!(index, 1);
        assert!(session.select_region(1));
        assert!(!session.select_region(5));
        session.region_mut(1).unwrap().set_address(0x1234);
        assert_eq!(session.region_at(0x1234), Some(1));

        assert!(session.remove_region(1).is_some());
        assert_eq!(session.selected_index(), 0);
        assert!(session.remove_region(3).is_none());

        let text = session.export_region(0).unwrap();
        assert!(text.starts_with("class Class_0 {\npublic:"));
    }
}
