// Breakpoint model
//
// Logical breakpoints, their resolution spec, attached action and the
// concrete locations they resolved to

use crate::error::{BkptResult, BreakpointError};
use crate::resolver::ResolvedLocation;
use crate::types::{Address, BreakpointId, LocationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;

/// What a breakpoint asks to be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakpointSpec {
    FileLine {
        /// Requested path; `None` means the file defining `main`
        file: Option<String>,
        line: u32,
        #[serde(default)]
        column: Option<u16>,
        #[serde(default)]
        exact_match: bool,
    },
    Symbol {
        pattern: SymbolPattern,
        /// Compile unit filters, unioned
        #[serde(default)]
        files: Vec<String>,
    },
    SourceRegex {
        pattern: String,
        #[serde(default)]
        files: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SymbolPattern {
    Name(String),
    Regex(String),
}

impl BreakpointSpec {
    pub fn file_line(file: impl Into<String>, line: u32) -> Self {
        BreakpointSpec::FileLine {
            file: Some(file.into()),
            line,
            column: None,
            exact_match: false,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        BreakpointSpec::Symbol {
            pattern: SymbolPattern::Name(name.into()),
            files: Vec::new(),
        }
    }

    pub fn regex(pattern: impl Into<String>, files: &[&str]) -> Self {
        BreakpointSpec::Symbol {
            pattern: SymbolPattern::Regex(pattern.into()),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn source_regex(pattern: impl Into<String>, files: &[&str]) -> Self {
        BreakpointSpec::SourceRegex {
            pattern: pattern.into(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// One-line description as shown by `list`
    pub fn describe(&self) -> String {
        match self {
            BreakpointSpec::FileLine {
                file,
                line,
                column,
                exact_match,
            } => {
                let mut out = format!("file = '{}', line = {}", file.as_deref().unwrap_or("<default>"), line);
                if let Some(col) = column {
                    let _ = write!(out, ", column = {}", col);
                }
                let _ = write!(out, ", exact_match = {}", u8::from(*exact_match));
                out
            }
            BreakpointSpec::Symbol {
                pattern: SymbolPattern::Name(name),
                ..
            } => format!("name = '{}'", name),
            BreakpointSpec::Symbol {
                pattern: SymbolPattern::Regex(regex),
                ..
            } => format!("regex = '{}'", regex),
            BreakpointSpec::SourceRegex { pattern, .. } => format!("source regex = '{}'", pattern),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScriptCallback {
    /// Inline script body
    OneLiner(String),
    /// Name of a script function taking (frame, bp_loc, internal_dict)
    Function(String),
}

/// What runs when a breakpoint stops the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BreakpointAction {
    Commands(Vec<String>),
    Script(ScriptCallback),
}

/// A request to attach an action; exactly one source must be given
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandSource {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub script: Option<ScriptCallback>,
}

impl CommandSource {
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            script: None,
        }
    }

    pub fn script(callback: ScriptCallback) -> Self {
        Self {
            commands: Vec::new(),
            script: Some(callback),
        }
    }

    pub fn into_action(self) -> BkptResult<BreakpointAction> {
        match (self.commands.is_empty(), self.script) {
            (false, Some(_)) => Err(BreakpointError::AmbiguousCommandSource),
            (true, None) => Err(BreakpointError::EmptyCommandSource),
            (false, None) => Ok(BreakpointAction::Commands(self.commands)),
            (true, Some(script)) => Ok(BreakpointAction::Script(script)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakpointLocation {
    pub id: LocationId,
    pub address: Address,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub column: u16,
    pub function: Option<String>,
    pub offset: u64,
    pub hit_count: u32,
    /// Site installed in a live process
    pub resolved: bool,
    pub hardware: bool,
}

impl BreakpointLocation {
    pub fn describe(&self) -> String {
        let base = self.file.rsplit('/').next().unwrap_or(&self.file);
        let mut out = format!("{}: where = {}", self.id, self.module);
        if let Some(function) = &self.function {
            let _ = write!(out, "`{}", function);
            if self.offset > 0 {
                let _ = write!(out, " + {}", self.offset);
            }
        }
        let _ = write!(out, " at {}:{}", base, self.line);
        if self.column > 0 {
            let _ = write!(out, ":{}", self.column);
        }
        let _ = write!(
            out,
            ", address = {:#018x}, {}",
            self.address,
            if self.resolved { "resolved" } else { "unresolved" }
        );
        if self.hardware {
            out.push_str(", hardware");
        }
        let _ = write!(out, ", hit count = {}", self.hit_count);
        out
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub spec: BreakpointSpec,
    pub enabled: bool,
    pub names: BTreeSet<String>,
    pub action: Option<BreakpointAction>,
    pub resolve_time: Duration,
    locations: Vec<BreakpointLocation>,
    next_location: u32,
}

impl Breakpoint {
    pub fn new(id: BreakpointId, spec: BreakpointSpec) -> Self {
        Self {
            id,
            spec,
            enabled: true,
            names: BTreeSet::new(),
            action: None,
            resolve_time: Duration::ZERO,
            locations: Vec::new(),
            next_location: 1,
        }
    }

    pub fn locations(&self) -> &[BreakpointLocation] {
        &self.locations
    }

    pub fn locations_mut(&mut self) -> impl Iterator<Item = &mut BreakpointLocation> {
        self.locations.iter_mut()
    }

    pub fn num_resolved(&self) -> usize {
        self.locations.iter().filter(|l| l.resolved).count()
    }

    /// Sum of every location's hit count
    pub fn hit_count(&self) -> u32 {
        self.locations.iter().map(|l| l.hit_count).sum()
    }

    /// Modules load at their link addresses, so an address alone can be shared
    pub fn has_location_at(&self, address: Address, module: &str) -> bool {
        self.locations
            .iter()
            .any(|l| l.address == address && l.module == module)
    }

    /// Add a location unless one already exists at the same address in the same module
    pub fn add_location(&mut self, resolved: ResolvedLocation) -> Option<LocationId> {
        if self.has_location_at(resolved.address, &resolved.module) {
            return None;
        }

        let id = LocationId {
            breakpoint: self.id,
            index: self.next_location,
        };
        self.next_location += 1;

        self.locations.push(BreakpointLocation {
            id,
            address: resolved.address,
            module: resolved.module,
            file: resolved.file,
            line: resolved.line,
            column: resolved.column,
            function: resolved.function,
            offset: resolved.offset,
            hit_count: 0,
            resolved: false,
            hardware: false,
        });
        Some(id)
    }

    /// Drop the locations that live in `module`, returning how many went
    pub fn remove_module_locations(&mut self, module: &str) -> usize {
        let before = self.locations.len();
        self.locations.retain(|l| l.module != module);
        before - self.locations.len()
    }

    pub fn describe(&self, include_locations: bool) -> String {
        let mut out = format!("{}: {}, locations = {}", self.id, self.spec.describe(), self.locations.len());
        if self.locations.is_empty() {
            out.push_str(" (pending)");
        }
        let resolved = self.num_resolved();
        if resolved > 0 {
            let _ = write!(out, ", resolved = {}", resolved);
        }
        let _ = writeln!(out, ", hit count = {}", self.hit_count());

        if !self.enabled {
            out.push_str("    Options: disabled\n");
        }
        if !self.names.is_empty() {
            out.push_str("    Names:\n");
            for name in &self.names {
                let _ = writeln!(out, "      {}", name);
            }
        }
        if let Some(action) = &self.action {
            out.push_str(&describe_action(action, "    "));
        }

        if include_locations {
            for location in &self.locations {
                let _ = writeln!(out, "  {}", location.describe());
            }
        }
        out
    }

    /// Output of `breakpoint command list`
    pub fn command_description(&self) -> String {
        match &self.action {
            None => format!("Breakpoint {} does not have an associated command.\n", self.id),
            Some(action) => format!("Breakpoint {}:\n{}", self.id, describe_action(action, "    ")),
        }
    }
}

fn describe_action(action: &BreakpointAction, indent: &str) -> String {
    let mut out = String::new();
    match action {
        BreakpointAction::Commands(commands) => {
            let _ = writeln!(out, "{}Breakpoint commands:", indent);
            for command in commands {
                let _ = writeln!(out, "{}  {}", indent, command);
            }
        }
        BreakpointAction::Script(callback) => {
            let _ = writeln!(out, "{}Breakpoint commands (Python):", indent);
            match callback {
                ScriptCallback::OneLiner(body) => {
                    let _ = writeln!(out, "{}  {}", indent, body);
                }
                ScriptCallback::Function(name) => {
                    let _ = writeln!(out, "{}  {}(frame, bp_loc, internal_dict)", indent, name);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(address: Address) -> ResolvedLocation {
        ResolvedLocation {
            address,
            module: "a.out".to_string(),
            file: "/src/main.c".to_string(),
            line: 12,
            column: 3,
            function: Some("main".to_string()),
            offset: 20,
            moved: false,
        }
    }

    #[test]
    fn test_command_source_rejects_both() {
        let source = CommandSource {
            commands: vec!["bt".to_string()],
            script: Some(ScriptCallback::Function("bktptcmd.function".to_string())),
        };
        assert!(matches!(
            source.into_action(),
            Err(BreakpointError::AmbiguousCommandSource)
        ));
        assert!(matches!(
            CommandSource::default().into_action(),
            Err(BreakpointError::EmptyCommandSource)
        ));
    }

    #[test]
    fn test_spec_describe() {
        assert_eq!(
            BreakpointSpec::file_line("main.c", 12).describe(),
            "file = 'main.c', line = 12, exact_match = 0"
        );
        assert_eq!(BreakpointSpec::name("main").describe(), "name = 'main'");
        assert_eq!(
            BreakpointSpec::regex("._MyFunction", &[]).describe(),
            "regex = '._MyFunction'"
        );
    }

    #[test]
    fn test_location_ids_are_not_reused() {
        let mut bp = Breakpoint::new(BreakpointId(1), BreakpointSpec::file_line("main.c", 12));
        assert_eq!(bp.add_location(resolved(0x1000)).map(|l| l.index), Some(1));
        assert!(bp.add_location(resolved(0x1000)).is_none());

        assert_eq!(bp.remove_module_locations("a.out"), 1);
        assert_eq!(bp.add_location(resolved(0x1000)).map(|l| l.index), Some(2));
    }

    #[test]
    fn test_describe_pending_and_located() {
        let mut bp = Breakpoint::new(BreakpointId(2), BreakpointSpec::file_line("main.c", 12));
        assert!(bp.describe(false).starts_with("2: file = 'main.c', line = 12, exact_match = 0, locations = 0 (pending)"));

        bp.add_location(resolved(0x100003f94));
        let text = bp.describe(true);
        assert!(text.starts_with("2: file = 'main.c', line = 12, exact_match = 0, locations = 1, hit count = 0"));
        assert!(text.contains(
            "2.1: where = a.out`main + 20 at main.c:12:3, address = 0x0000000100003f94, unresolved, hit count = 0"
        ));
    }

    #[test]
    fn test_command_description() {
        let mut bp = Breakpoint::new(BreakpointId(1), BreakpointSpec::name("main"));
        assert_eq!(
            bp.command_description(),
            "Breakpoint 1 does not have an associated command.\n"
        );

        bp.action = Some(BreakpointAction::Script(ScriptCallback::Function(
            "bktptcmd.function".to_string(),
        )));
        let text = bp.command_description();
        assert!(text.contains("Breakpoint commands (Python):"));
        assert!(text.contains("bktptcmd.function(frame, bp_loc, internal_dict)"));
    }
}
