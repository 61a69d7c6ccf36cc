// Line table index
//
// Per-module projection of every compile unit's line table, keyed by the
// file path recorded in debug info. Also answers address to symbol context
// queries, preferring the aranges when they agree with the line table.

use crate::module::Module;
use crate::types::Address;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct IndexedRow {
    line: u32,
    column: u16,
    address: Address,
    unit: usize,
}

// A contiguous run of rows closed by an end-of-sequence row
#[derive(Debug, Clone)]
struct Sequence {
    start: Address,
    end: Address,
    unit: usize,
}

// Rows of one line collapse to a single location per function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKey {
    Function(Address),
    Sequence(Option<usize>),
}

impl Sequence {
    fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end
    }
}

/// A line-table row selected for a breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub address: Address,
    pub file: String,
    pub line: u32,
    pub column: u16,
    pub unit: usize,
    /// True when the requested line had no code and a later line was used
    pub moved: bool,
}

/// Compile unit and function owning an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolContext {
    pub unit: Option<usize>,
    pub function: Option<String>,
    pub offset: u64,
    /// True when the aranges could not place the address
    pub fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LineTableIndex {
    files: BTreeMap<String, Vec<IndexedRow>>,
    sequences: Vec<Sequence>,
}

impl LineTableIndex {
    pub fn build(module: &Module) -> Self {
        let mut files: BTreeMap<String, Vec<IndexedRow>> = BTreeMap::new();
        let mut sequences = Vec::new();

        for (unit, cu) in module.compile_units.iter().enumerate() {
            let mut start: Option<Address> = None;
            let mut last: Option<Address> = None;

            for row in &cu.line_table {
                if row.end_sequence {
                    if let Some(s) = start.take() {
                        sequences.push(Sequence {
                            start: s,
                            end: row.address,
                            unit,
                        });
                    }
                    last = None;
                    continue;
                }

                start.get_or_insert(row.address);
                last = Some(row.address);

                files.entry(row.file.clone()).or_default().push(IndexedRow {
                    line: row.line,
                    column: row.column,
                    address: row.address,
                    unit,
                });
            }

            // Unterminated sequence: cover through the last row
            if let (Some(s), Some(l)) = (start, last) {
                sequences.push(Sequence {
                    start: s,
                    end: l.saturating_add(1),
                    unit,
                });
            }
        }

        for rows in files.values_mut() {
            rows.sort_by_key(|r| (r.line, r.address));
        }
        sequences.sort_by_key(|s| s.start);

        debug!(
            "Indexed module {}: {} files, {} sequences",
            module.name,
            files.len(),
            sequences.len()
        );

        Self { files, sequences }
    }

    /// Distinct file paths as recorded in the line tables
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Rows for `line` in the recorded `file`, one per containing function.
    ///
    /// With `exact` unset, a line without code moves to the next line that has
    /// code in the same file.
    pub fn lookup(
        &self,
        module: &Module,
        file: &str,
        line: u32,
        column: Option<u16>,
        exact: bool,
    ) -> Vec<LineMatch> {
        let Some(rows) = self.files.get(file) else {
            return Vec::new();
        };

        let mut target_line = line;
        let mut moved = false;
        if !rows.iter().any(|r| r.line == line) {
            if exact {
                return Vec::new();
            }
            match rows.iter().map(|r| r.line).filter(|&l| l > line).min() {
                Some(next) => {
                    debug!("{}:{} has no code, moving to line {}", file, line, next);
                    target_line = next;
                    moved = true;
                }
                None => return Vec::new(),
            }
        }

        let on_line: Vec<&IndexedRow> = rows.iter().filter(|r| r.line == target_line).collect();
        let candidates: Vec<&IndexedRow> = match column {
            Some(col) if on_line.iter().any(|r| r.column == col) => {
                on_line.into_iter().filter(|r| r.column == col).collect()
            }
            _ => on_line,
        };

        // Rows are address-ordered within a line, so the first row seen for a
        // function is its lowest address.
        let mut seen: Vec<GroupKey> = Vec::new();
        let mut matches = Vec::new();
        for row in candidates {
            let key = match module.symbol_containing(row.address) {
                Some(function) => GroupKey::Function(function.address),
                None => GroupKey::Sequence(self.sequence_index(row.address)),
            };
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            matches.push(LineMatch {
                address: row.address,
                file: file.to_string(),
                line: row.line,
                column: row.column,
                unit: row.unit,
                moved,
            });
        }

        matches
    }

    /// First row after `start` inside `[start, end)`, used to step over a prologue
    pub fn first_row_after(&self, unit: usize, start: Address, end: Address) -> Option<Address> {
        self.files
            .values()
            .flatten()
            .filter(|r| r.unit == unit && r.address > start && r.address < end)
            .map(|r| r.address)
            .min()
    }

    /// The row describing `address`: the last row at or below it in its sequence
    pub fn row_for_address(&self, address: Address) -> Option<(String, u32, u16)> {
        let unit = self.sequences.get(self.sequence_index(address)?)?.unit;
        self.files
            .iter()
            .flat_map(|(file, rows)| rows.iter().map(move |r| (file, r)))
            .filter(|(_, r)| r.unit == unit && r.address <= address)
            .max_by_key(|(_, r)| r.address)
            .map(|(file, r)| (file.clone(), r.line, r.column))
    }

    fn sequence_index(&self, address: Address) -> Option<usize> {
        self.sequences.iter().position(|s| s.contains(address))
    }

    fn unit_covers(&self, unit: usize, address: Address) -> bool {
        self.sequences
            .iter()
            .any(|s| s.unit == unit && s.contains(address))
    }

    /// Resolve an address to its compile unit and function.
    ///
    /// The aranges are consulted first but only trusted when the unit they
    /// name has line-table rows covering the address. Otherwise the line
    /// table sequences, then the section map with `origin_unit`, decide.
    pub fn resolve_address(
        &self,
        module: &Module,
        address: Address,
        origin_unit: Option<usize>,
    ) -> Option<SymbolContext> {
        let function = module.symbol_containing(address);
        let context = |unit: Option<usize>, fallback: bool| SymbolContext {
            unit,
            function: function.map(|f| f.name.clone()),
            offset: function.map_or(0, |f| address - f.address),
            fallback,
        };

        let mut fallback = false;
        if let Some(aranges) = &module.aranges {
            match aranges.iter().find(|a| a.contains(address)) {
                Some(arange) if self.unit_covers(arange.unit, address) => {
                    return Some(context(Some(arange.unit), false));
                }
                Some(arange) => {
                    debug!(
                        "aranges in {} place {:#x} in unit {} which has no rows there",
                        module.name, address, arange.unit
                    );
                    fallback = true;
                }
                None => {
                    debug!(
                        "aranges in {} do not cover {:#x}, using line table",
                        module.name, address
                    );
                    fallback = true;
                }
            }
        }

        if let Some(index) = self.sequence_index(address) {
            return Some(context(Some(self.sequences[index].unit), fallback));
        }

        if module.section_containing(address).is_some() || function.is_some() {
            return Some(context(origin_unit, fallback));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(aranges: Option<&str>) -> Module {
        let aranges = aranges.map_or(String::new(), |a| format!(r#", "aranges": {}"#, a));
        Module::from_json_str(&format!(
            r#"{{
                "name": "a.out",
                "sections": [{{"name": "__text", "address": "0x100003f94", "size": "0x100"}}],
                "symbols": [{{"name": "main", "address": "0x100003f94", "size": "0x2c"}}],
                "compile_units": [{{
                    "name": "/tmp/ab/main.cpp",
                    "line_table": [
                        {{"file": "/tmp/ab/main.cpp", "line": 1, "address": "0x100003f94"}},
                        {{"file": "/tmp/ab/main.cpp", "line": 2, "column": 3, "address": "0x100003fb0"}},
                        {{"file": "/tmp/ab/main.cpp", "line": 2, "column": 3, "address": "0x100003fb8"}},
                        {{"file": "/tmp/ab/main.cpp", "line": 4, "address": "0x100003fbc"}},
                        {{"file": "/tmp/ab/main.cpp", "line": 4, "address": "0x100003fc0", "end_sequence": true}}
                    ]
                }}]{}
            }}"#,
            aranges
        ))
        .unwrap()
    }

    #[test]
    fn test_lookup_collapses_rows_per_function() {
        let m = module(None);
        let found = m.index().lookup(&m, "/tmp/ab/main.cpp", 2, None, true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 0x100003fb0);
        assert!(!found[0].moved);
    }

    #[test]
    fn test_lookup_moves_forward_unless_exact() {
        let m = module(None);
        assert!(m.index().lookup(&m, "/tmp/ab/main.cpp", 3, None, true).is_empty());

        let found = m.index().lookup(&m, "/tmp/ab/main.cpp", 3, None, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 4);
        assert!(found[0].moved);

        assert!(m.index().lookup(&m, "/tmp/ab/main.cpp", 9, None, false).is_empty());
    }

    #[test]
    fn test_lookup_narrows_by_column() {
        let m = Module::from_json_str(
            r#"{
                "name": "a.out",
                "symbols": [{"name": "add", "address": "0x2000", "size": "0x20"}],
                "compile_units": [{
                    "name": "/src/add.c",
                    "line_table": [
                        {"file": "/src/add.c", "line": 7, "column": 5, "address": "0x2000"},
                        {"file": "/src/add.c", "line": 7, "column": 12, "address": "0x2008"},
                        {"file": "/src/add.c", "line": 8, "column": 1, "address": "0x2010"},
                        {"file": "/src/add.c", "line": 8, "address": "0x2020", "end_sequence": true}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let index = m.index();

        let found = index.lookup(&m, "/src/add.c", 7, Some(12), true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 0x2008);
        assert_eq!(found[0].column, 12);

        let found = index.lookup(&m, "/src/add.c", 7, Some(5), true);
        assert_eq!(found[0].address, 0x2000);

        // No row at that column: every row on the line stays a candidate
        let found = index.lookup(&m, "/src/add.c", 7, Some(9), true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 0x2000);
    }

    #[test]
    fn test_end_sequence_rows_are_not_breakable() {
        let m = module(None);
        let found = m.index().lookup(&m, "/tmp/ab/main.cpp", 4, None, true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 0x100003fbc);
    }

    #[test]
    fn test_resolve_address_with_good_aranges() {
        let m = module(Some(r#"[{"start": "0x100003f94", "end": "0x100003fc0", "unit": 0}]"#));
        let ctx = m.index().resolve_address(&m, 0x100003fb0, None).unwrap();
        assert_eq!(ctx.unit, Some(0));
        assert_eq!(ctx.function.as_deref(), Some("main"));
        assert_eq!(ctx.offset, 0x1c);
        assert!(!ctx.fallback);
    }

    #[test]
    fn test_resolve_address_survives_bad_aranges() {
        let m = module(Some(r#"[{"start": "0x200003f94", "end": "0x200003fb8", "unit": 0}]"#));
        let ctx = m.index().resolve_address(&m, 0x100003fb0, None).unwrap();
        assert_eq!(ctx.unit, Some(0));
        assert!(ctx.fallback);
    }

    #[test]
    fn test_resolve_address_survives_wrong_unit_in_aranges() {
        let m = module(Some(r#"[{"start": "0x100003f94", "end": "0x100003fc0", "unit": 7}]"#));
        let ctx = m.index().resolve_address(&m, 0x100003fb0, None).unwrap();
        assert_eq!(ctx.unit, Some(0));
        assert!(ctx.fallback);
    }

    #[test]
    fn test_resolve_address_outside_module() {
        let m = module(None);
        assert!(m.index().resolve_address(&m, 0x5000, None).is_none());
    }

    #[test]
    fn test_row_for_address() {
        let m = module(None);
        let (file, line, column) = m.index().row_for_address(0x100003fb4).unwrap();
        assert_eq!(file, "/tmp/ab/main.cpp");
        assert_eq!(line, 2);
        assert_eq!(column, 3);
    }
}
