// Debug target
//
// A target owns its loaded modules, source map, settings and breakpoints.
// Every operation runs with exclusive access; shared users go through
// `SharedTarget`, so resolution, deduction and module events never overlap.

use crate::breakpoint::BreakpointSpec;
use crate::error::{BkptResult, BreakpointError};
use crate::module::Module;
use crate::registry::{BreakpointRegistry, CreateOptions, LocationHit};
use crate::resolver::BreakpointResolver;
use crate::settings::TargetSettings;
use crate::source_map::SourceMap;
use crate::types::{Address, BreakpointId, BreakpointRef, TargetId};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type SharedTarget = Arc<Mutex<Target>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    NotLaunched,
    Running { run: u32 },
    Exited { status: i32 },
}

#[derive(Debug)]
pub struct Target {
    id: TargetId,
    name: String,
    settings: TargetSettings,
    modules: Vec<Arc<Module>>,
    source_map: SourceMap,
    registry: BreakpointRegistry,
    process: ProcessState,
    runs: u32,
    resolver_fallbacks: u32,
}

impl Target {
    pub fn new(id: TargetId, name: impl Into<String>, settings: TargetSettings) -> Self {
        let source_map = SourceMap::from_pairs(settings.source_map.iter().cloned());
        Self {
            id,
            name: name.into(),
            settings,
            modules: Vec::new(),
            source_map,
            registry: BreakpointRegistry::new(),
            process: ProcessState::NotLaunched,
            runs: 0,
            resolver_fallbacks: 0,
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &TargetSettings {
        &self.settings
    }

    pub fn process_state(&self) -> ProcessState {
        self.process
    }

    fn is_running(&self) -> bool {
        matches!(self.process, ProcessState::Running { .. })
    }

    pub fn loaded_modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn find_modules(&self, path: &str) -> Vec<Arc<Module>> {
        self.modules
            .iter()
            .filter(|m| m.is_named(path))
            .cloned()
            .collect()
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BreakpointRegistry {
        &mut self.registry
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn source_map_mut(&mut self) -> &mut SourceMap {
        &mut self.source_map
    }

    /// Replace the source map from a JSON array of `[original, replacement]` pairs
    pub fn set_source_map_json(&mut self, value: &Value) -> BkptResult<()> {
        let entries = SourceMap::entries_from_json(value)?;
        self.source_map.replace_all(entries);
        Ok(())
    }

    pub fn clear_source_map(&mut self) {
        self.source_map.clear();
    }

    /// Load a module and resolve every breakpoint against it.
    ///
    /// Returns the number of locations added.
    pub fn add_module(&mut self, module: Module) -> BkptResult<usize> {
        let module = Arc::new(module);
        info!("Target {}: loaded module {}", self.id, module.name);
        self.modules.push(module.clone());

        let installed = self.is_running();
        let scope = [module];
        let mut added = 0;

        for bp in self.registry.iter_mut() {
            let mut resolver = BreakpointResolver::new(&mut self.source_map, &self.settings);
            let outcome = match resolver.resolve(&bp.spec, &scope) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Breakpoint {} failed to resolve: {}", bp.id, e);
                    continue;
                }
            };
            self.resolver_fallbacks += outcome.fallbacks;

            let enabled = bp.enabled;
            for location in outcome.locations {
                if bp.add_location(location).is_some() {
                    added += 1;
                }
            }
            if installed && enabled {
                bp.locations_mut().for_each(|l| l.resolved = true);
            }
        }

        debug!("Module load added {} breakpoint locations", added);
        Ok(added)
    }

    /// Unload a module, dropping the breakpoint locations inside it
    pub fn remove_module(&mut self, name: &str) -> BkptResult<usize> {
        let before = self.modules.len();
        self.modules.retain(|m| m.name != name);
        if self.modules.len() == before {
            return Err(BreakpointError::UnknownModule(name.to_string()));
        }

        let removed = self.registry.remove_module(name);
        info!(
            "Target {}: unloaded module {} ({} breakpoint locations removed)",
            self.id, name, removed
        );
        Ok(removed)
    }

    pub fn create_breakpoint(
        &mut self,
        spec: BreakpointSpec,
        options: CreateOptions,
    ) -> BkptResult<BreakpointId> {
        // Pin the default file so later module loads resolve the same request
        let spec = match spec {
            BreakpointSpec::FileLine {
                file: None,
                line,
                column,
                exact_match,
            } => BreakpointSpec::FileLine {
                file: BreakpointResolver::default_file(&self.modules),
                line,
                column,
                exact_match,
            },
            other => other,
        };

        let start = Instant::now();
        let outcome =
            BreakpointResolver::new(&mut self.source_map, &self.settings).resolve(&spec, &self.modules)?;
        let elapsed = start.elapsed();
        self.resolver_fallbacks += outcome.fallbacks;

        let installed = self.is_running();
        self.registry
            .create(spec, outcome.locations, elapsed, options, installed)
    }

    pub fn set_enabled(&mut self, refs: &[BreakpointRef], enabled: bool) -> BkptResult<Vec<BreakpointId>> {
        let installed = self.is_running();
        self.registry.set_enabled(refs, enabled, installed)
    }

    /// Start a fresh run
    pub fn launch(&mut self) -> u32 {
        self.runs += 1;
        self.process = ProcessState::Running { run: self.runs };
        self.registry.on_process_launch();
        info!("Target {}: run {} started", self.id, self.runs);
        self.runs
    }

    pub fn hit(&mut self, address: Address) -> Vec<LocationHit> {
        self.hit_in(address, None)
    }

    /// Stop at `address` inside `module`, when the process layer knows it
    pub fn hit_in(&mut self, address: Address, module: Option<&str>) -> Vec<LocationHit> {
        if !self.is_running() {
            warn!("Target {}: stop at {:#x} with no running process", self.id, address);
            return Vec::new();
        }
        let hits = self.registry.on_hit(address, module);
        debug!("Target {}: stop at {:#x}, {} location(s) hit", self.id, address, hits.len());
        hits
    }

    pub fn exit(&mut self, status: i32) {
        self.process = ProcessState::Exited { status };
        self.registry.on_process_exit();
        info!("Target {}: process exited with status = {}", self.id, status);
    }

    /// Per-target statistics: deduction count and per-breakpoint hit counts
    pub fn statistics(&self) -> Value {
        let breakpoints: Vec<Value> = self
            .registry
            .iter()
            .map(|bp| {
                json!({
                    "id": bp.id.0,
                    "hitCount": bp.hit_count(),
                    "numLocations": bp.locations().len(),
                    "numResolvedLocations": bp.num_resolved(),
                    "resolveTime": bp.resolve_time.as_secs_f64(),
                    "names": bp.names.iter().collect::<Vec<_>>(),
                    "details": bp.spec,
                })
            })
            .collect();

        json!({
            "targetName": self.name,
            "sourceMapDeduceCount": self.source_map.deduce_count(),
            "lineTableFallbackCount": self.resolver_fallbacks,
            "moduleCount": self.modules.len(),
            "process": self.process,
            "breakpoints": breakpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELATIVE: &str = r#"{
        "name": "a.out",
        "sections": [{"name": "__text", "address": "0x100003f94", "size": "0x2c"}],
        "symbols": [{"name": "main", "address": "0x100003f94", "size": "0x2c"}],
        "compile_units": [{
            "name": "./a/b/c/main.cpp",
            "line_table": [
                {"file": "./a/b/c/main.cpp", "line": 1, "address": "0x100003f94"},
                {"file": "./a/b/c/main.cpp", "line": 2, "column": 3, "address": "0x100003fb0"},
                {"file": "./a/b/c/main.cpp", "line": 2, "column": 3, "address": "0x100003fb8"},
                {"file": "./a/b/c/main.cpp", "line": 2, "address": "0x100003fc0", "end_sequence": true}
            ]
        }]
    }"#;

    fn target() -> Target {
        let mut target = Target::new(1, "a.out", TargetSettings::default());
        target.add_module(Module::from_json_str(RELATIVE).unwrap()).unwrap();
        target
    }

    fn num_locations(target: &Target, id: BreakpointId) -> usize {
        target.registry().get(id).unwrap().locations().len()
    }

    #[test]
    fn test_deduces_source_map_once() {
        let mut target = target();
        assert!(target.source_map().is_empty());

        for _ in 0..3 {
            let id = target
                .create_breakpoint(BreakpointSpec::file_line("/x/y/a/b/c/main.cpp", 2), CreateOptions::default())
                .unwrap();
            assert_eq!(num_locations(&target, id), 1);
        }

        assert_eq!(target.source_map().to_json(), json!([[".", "/x/y"]]));
        assert_eq!(target.statistics()["sourceMapDeduceCount"], 1);
    }

    #[test]
    fn test_identical_relative_path_does_not_deduce() {
        let mut target = target();
        let id = target
            .create_breakpoint(BreakpointSpec::file_line("a/b/c/main.cpp", 2), CreateOptions::default())
            .unwrap();
        assert_eq!(num_locations(&target, id), 1);
        assert!(target.source_map().is_empty());
    }

    #[test]
    fn test_auto_deduction_can_be_disabled() {
        let settings = TargetSettings {
            auto_source_map_relative: false,
            ..TargetSettings::default()
        };
        let mut target = Target::new(1, "a.out", settings);
        target.add_module(Module::from_json_str(RELATIVE).unwrap()).unwrap();

        let id = target
            .create_breakpoint(BreakpointSpec::file_line("/x/y/a/b/c/main.cpp", 2), CreateOptions::default())
            .unwrap();
        assert_eq!(num_locations(&target, id), 1);
        assert!(target.source_map().is_empty());
    }

    #[test]
    fn test_pending_breakpoint_resolves_on_module_load() {
        let mut target = Target::new(1, "a.out", TargetSettings::default());
        let id = target
            .create_breakpoint(BreakpointSpec::file_line("main.cpp", 2), CreateOptions::default())
            .unwrap();
        assert_eq!(num_locations(&target, id), 0);

        let added = target.add_module(Module::from_json_str(RELATIVE).unwrap()).unwrap();
        assert_eq!(added, 1);
        assert_eq!(num_locations(&target, id), 1);

        assert_eq!(target.remove_module("a.out").unwrap(), 1);
        assert_eq!(num_locations(&target, id), 0);
        assert!(target.remove_module("a.out").is_err());
    }

    #[test]
    fn test_module_loaded_during_run_installs_locations() {
        let mut target = Target::new(1, "a.out", TargetSettings::default());
        let id = target
            .create_breakpoint(BreakpointSpec::name("main"), CreateOptions::default())
            .unwrap();
        target.launch();
        target.add_module(Module::from_json_str(RELATIVE).unwrap()).unwrap();

        assert_eq!(target.registry().get(id).unwrap().num_resolved(), 1);
        let hits = target.hit(0x100003fb0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_hit_without_process_is_ignored() {
        let mut target = target();
        target
            .create_breakpoint(BreakpointSpec::file_line("main.cpp", 2), CreateOptions::default())
            .unwrap();
        assert!(target.hit(0x100003fb0).is_empty());
    }

    #[test]
    fn test_find_modules() {
        let target = target();
        assert_eq!(target.find_modules("a.out").len(), 1);
        assert!(target.find_modules("libfoo.so").is_empty());
    }

    fn library(name: &str) -> Module {
        let json = format!(
            r#"{{
                "name": "{}",
                "symbols": [{{"name": "init", "address": "0x1000", "size": "0x20"}}],
                "compile_units": [{{
                    "name": "/src/init.c",
                    "line_table": [
                        {{"file": "/src/init.c", "line": 4, "address": "0x1000"}},
                        {{"file": "/src/init.c", "line": 5, "address": "0x1008"}},
                        {{"file": "/src/init.c", "line": 5, "address": "0x1020", "end_sequence": true}}
                    ]
                }}]
            }}"#,
            name
        );
        Module::from_json_str(&json).unwrap()
    }

    #[test]
    fn test_same_address_in_two_modules_gets_two_locations() {
        let mut target = Target::new(1, "a.out", TargetSettings::default());
        target.add_module(library("liba.so")).unwrap();
        target.add_module(library("libb.so")).unwrap();

        let by_name = target
            .create_breakpoint(BreakpointSpec::name("init"), CreateOptions::default())
            .unwrap();
        let by_line = target
            .create_breakpoint(BreakpointSpec::file_line("init.c", 5), CreateOptions::default())
            .unwrap();
        for id in [by_name, by_line] {
            let bp = target.registry().get(id).unwrap();
            let modules: Vec<&str> = bp.locations().iter().map(|l| l.module.as_str()).collect();
            assert_eq!(modules, vec!["liba.so", "libb.so"]);
        }

        // A breakpoint created before the second load picks it up too
        let mut target = Target::new(2, "a.out", TargetSettings::default());
        target.add_module(library("liba.so")).unwrap();
        let pending = target
            .create_breakpoint(BreakpointSpec::name("init"), CreateOptions::default())
            .unwrap();
        assert_eq!(target.add_module(library("libb.so")).unwrap(), 1);
        assert_eq!(num_locations(&target, pending), 2);

        // A stop that names its module only counts there
        target.launch();
        assert_eq!(target.hit_in(0x1008, Some("liba.so")).len(), 1);
        assert_eq!(target.hit(0x1008).len(), 2);
        let counts: Vec<u32> = target
            .registry()
            .get(pending)
            .unwrap()
            .locations()
            .iter()
            .map(|l| l.hit_count)
            .collect();
        assert_eq!(counts, vec![2, 1]);

        assert_eq!(target.remove_module("liba.so").unwrap(), 1);
        assert_eq!(num_locations(&target, pending), 1);
    }

    #[test]
    fn test_symbol_at_top_of_address_space() {
        let module = Module::from_json_str(
            r#"{
                "name": "a.out",
                "symbols": [{"name": "hi", "address": "0xfffffffffffffff0", "size": "0x20"}],
                "compile_units": [{
                    "name": "/src/hi.c",
                    "line_table": [
                        {"file": "/src/hi.c", "line": 1, "address": "0xfffffffffffffff0"},
                        {"file": "/src/hi.c", "line": 2, "address": "0xfffffffffffffff8"},
                        {"file": "/src/hi.c", "line": 3, "address": "0xffffffffffffffff"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let mut target = Target::new(1, "a.out", TargetSettings::default());
        target.add_module(module).unwrap();

        let id = target
            .create_breakpoint(BreakpointSpec::name("hi"), CreateOptions::default())
            .unwrap();
        let bp = target.registry().get(id).unwrap();
        assert_eq!(bp.locations().len(), 1);
        assert_eq!(bp.locations()[0].address, 0xffff_ffff_ffff_fff8);

        let id = target
            .create_breakpoint(BreakpointSpec::file_line("hi.c", 3), CreateOptions::default())
            .unwrap();
        assert_eq!(num_locations(&target, id), 1);
    }

    #[test]
    fn test_statistics_shape() {
        let mut target = target();
        target
            .create_breakpoint(BreakpointSpec::file_line("main.cpp", 2), CreateOptions::default())
            .unwrap();
        target.launch();
        target.hit(0x100003fb0);

        let stats = target.statistics();
        assert_eq!(stats["breakpoints"][0]["hitCount"], 1);
        assert_eq!(stats["breakpoints"][0]["details"]["type"], "file_line");
        assert_eq!(stats["process"]["state"], "running");
    }
}
