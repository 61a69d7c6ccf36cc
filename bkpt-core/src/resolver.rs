// Breakpoint resolution
//
// Turns a breakpoint spec into concrete addresses across a set of modules.
// File+line requests go through path matching, which may teach the source
// map a new entry; symbol and source regex requests honour `-f` file
// filters as a union.

use crate::breakpoint::{BreakpointSpec, SymbolPattern};
use crate::error::BkptResult;
use crate::module::{CompileUnit, Module};
use crate::path::{self, SourcePath};
use crate::settings::TargetSettings;
use crate::source_map::SourceMap;
use crate::types::Address;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// An address a breakpoint resolved to, with its source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub address: Address,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub column: u16,
    pub function: Option<String>,
    pub offset: u64,
    /// The requested line had no code; a later line was used
    pub moved: bool,
}

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub locations: Vec<ResolvedLocation>,
    /// Addresses placed by the line table because the aranges failed
    pub fallbacks: u32,
}

impl ResolveOutcome {
    fn push(&mut self, location: ResolvedLocation) {
        if !self
            .locations
            .iter()
            .any(|l| l.address == location.address && l.module == location.module)
        {
            self.locations.push(location);
        }
    }
}

pub struct BreakpointResolver<'a> {
    source_map: &'a mut SourceMap,
    settings: &'a TargetSettings,
}

impl<'a> BreakpointResolver<'a> {
    pub fn new(source_map: &'a mut SourceMap, settings: &'a TargetSettings) -> Self {
        Self {
            source_map,
            settings,
        }
    }

    /// The primary file of the compile unit defining `main`
    pub fn default_file(modules: &[Arc<Module>]) -> Option<String> {
        modules.iter().find_map(|module| {
            let main = module.symbols.iter().find(|s| s.name == "main")?;
            let context = module.index().resolve_address(module, main.address, None)?;
            module
                .compile_units
                .get(context.unit?)
                .map(|cu| cu.name.clone())
        })
    }

    pub fn resolve(
        &mut self,
        spec: &BreakpointSpec,
        modules: &[Arc<Module>],
    ) -> BkptResult<ResolveOutcome> {
        let mut outcome = ResolveOutcome::default();

        match spec {
            BreakpointSpec::FileLine {
                file,
                line,
                column,
                exact_match,
            } => {
                let file = match file {
                    Some(file) => file.clone(),
                    None => match Self::default_file(modules) {
                        Some(file) => file,
                        None => {
                            debug!("No default file for line {}", line);
                            return Ok(outcome);
                        }
                    },
                };
                let exact = *exact_match || !self.settings.move_to_nearest_code;
                self.resolve_file_line(&file, *line, *column, exact, modules, &mut outcome);
            }
            BreakpointSpec::Symbol { pattern, files } => {
                self.resolve_symbol(pattern, files, modules, &mut outcome)?;
            }
            BreakpointSpec::SourceRegex { pattern, files } => {
                self.resolve_source_regex(pattern, files, modules, &mut outcome)?;
            }
        }

        debug!(
            "Resolved {} to {} location(s)",
            spec.describe(),
            outcome.locations.len()
        );
        Ok(outcome)
    }

    fn resolve_file_line(
        &mut self,
        file: &str,
        line: u32,
        column: Option<u16>,
        exact: bool,
        modules: &[Arc<Module>],
        outcome: &mut ResolveOutcome,
    ) {
        let requested = SourcePath::parse(file);

        for module in modules {
            let index = module.index();

            for recorded in index.files() {
                let result = path::matches(
                    &requested,
                    &SourcePath::parse(recorded),
                    self.source_map,
                    self.settings.auto_source_map_relative,
                );
                if !result.matched {
                    continue;
                }

                let found = index.lookup(module, recorded, line, column, exact);
                if found.is_empty() {
                    continue;
                }

                if let Some(entry) = result.deduced {
                    self.source_map.deduce_from_match(entry);
                }

                for row in found {
                    let location = locate(
                        module,
                        row.address,
                        Some(row.unit),
                        &row.file,
                        row.line,
                        row.column,
                        row.moved,
                        outcome,
                    );
                    outcome.push(location);
                }
            }
        }
    }

    fn resolve_symbol(
        &self,
        pattern: &SymbolPattern,
        files: &[String],
        modules: &[Arc<Module>],
        outcome: &mut ResolveOutcome,
    ) -> BkptResult<()> {
        let regex = match pattern {
            SymbolPattern::Regex(text) => Some(Regex::new(text)?),
            SymbolPattern::Name(_) => None,
        };

        for module in modules {
            let index = module.index();

            for symbol in &module.symbols {
                let hit = match (pattern, &regex) {
                    (SymbolPattern::Name(name), _) => symbol.name == *name,
                    (SymbolPattern::Regex(_), Some(regex)) => regex.is_match(&symbol.name),
                    (SymbolPattern::Regex(_), None) => false,
                };
                if !hit {
                    continue;
                }

                let unit = index
                    .resolve_address(module, symbol.address, None)
                    .and_then(|context| context.unit);

                if !files.is_empty() {
                    let in_filter = unit
                        .and_then(|u| module.compile_units.get(u))
                        .is_some_and(|cu| unit_matches_filters(cu, files));
                    if !in_filter {
                        debug!("{} filtered out by file filters {:?}", symbol.name, files);
                        continue;
                    }
                }

                let mut address = symbol.address;
                if self.settings.skip_prologue {
                    if let Some(u) = unit {
                        let end = symbol.address.saturating_add(symbol.size.max(1));
                        if let Some(after) = index.first_row_after(u, symbol.address, end) {
                            address = after;
                        }
                    }
                }

                let (file, line, column) = index
                    .row_for_address(address)
                    .unwrap_or_else(|| (String::new(), 0, 0));
                let location = locate(module, address, unit, &file, line, column, false, outcome);
                outcome.push(location);
            }
        }

        Ok(())
    }

    fn resolve_source_regex(
        &self,
        pattern: &str,
        files: &[String],
        modules: &[Arc<Module>],
        outcome: &mut ResolveOutcome,
    ) -> BkptResult<()> {
        let regex = Regex::new(pattern)?;

        for module in modules {
            let index = module.index();

            for (unit, cu) in module.compile_units.iter().enumerate() {
                if !files.is_empty() && !unit_matches_filters(cu, files) {
                    continue;
                }
                let Some(text) = self.source_text(cu) else {
                    continue;
                };

                for (number, text_line) in text.lines().enumerate() {
                    if !regex.is_match(text_line) {
                        continue;
                    }
                    let line = number as u32 + 1;
                    for row in index.lookup(module, &cu.name, line, None, true) {
                        if row.unit != unit {
                            continue;
                        }
                        let location = locate(
                            module,
                            row.address,
                            Some(unit),
                            &row.file,
                            row.line,
                            row.column,
                            false,
                            outcome,
                        );
                        outcome.push(location);
                    }
                }
            }
        }

        Ok(())
    }

    // Embedded source text, else the file on disk at its source-mapped path
    fn source_text(&self, cu: &CompileUnit) -> Option<String> {
        if let Some(text) = &cu.source {
            return Some(text.clone());
        }

        let mut recorded = SourcePath::parse(&cu.name);
        if !recorded.is_absolute() {
            if let Some(dir) = &cu.comp_dir {
                recorded = SourcePath::parse(dir).join(recorded.components());
            }
        }
        let local = self.source_map.remap(&recorded).unwrap_or(recorded);

        match std::fs::read_to_string(local.to_string()) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("No source text for {}: {}", local, e);
                None
            }
        }
    }
}

fn unit_matches_filters(cu: &CompileUnit, files: &[String]) -> bool {
    files.iter().any(|filter| path::filter_matches(filter, &cu.name))
}

#[allow(clippy::too_many_arguments)]
fn locate(
    module: &Module,
    address: Address,
    unit: Option<usize>,
    file: &str,
    line: u32,
    column: u16,
    moved: bool,
    outcome: &mut ResolveOutcome,
) -> ResolvedLocation {
    let context = module.index().resolve_address(module, address, unit);
    if context.as_ref().is_some_and(|c| c.fallback) {
        warn!(
            "Address {:#x} in {} placed from the line table; aranges are inconsistent",
            address, module.name
        );
        outcome.fallbacks += 1;
    }

    ResolvedLocation {
        address,
        module: module.name.clone(),
        file: file.to_string(),
        line,
        column,
        function: context.as_ref().and_then(|c| c.function.clone()),
        offset: context.map_or(0, |c| c.offset),
        moved,
    }
}
