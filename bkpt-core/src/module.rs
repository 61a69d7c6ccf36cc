// Loaded module descriptions
//
// A module is the debug-info view of one executable or shared library:
// sections, compile units with line tables, a symbol table and an optional
// address-range index. Descriptions are read from JSON; addresses may be
// written as numbers or as "0x" hex strings.

use crate::error::BkptResult;
use crate::line_table::LineTableIndex;
use crate::types::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(deserialize_with = "de_address")]
    pub address: Address,
    #[serde(deserialize_with = "de_address")]
    pub size: u64,
}

impl Section {
    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address - self.address < self.size
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(deserialize_with = "de_address")]
    pub address: Address,
    #[serde(default, deserialize_with = "de_address")]
    pub size: u64,
}

impl Symbol {
    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address - self.address < self.size.max(1)
    }
}

/// One row of a line table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTableEntry {
    /// File path exactly as recorded in debug info
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub column: u16,
    #[serde(deserialize_with = "de_address")]
    pub address: Address,
    #[serde(default)]
    pub end_sequence: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileUnit {
    /// Primary source file as recorded in debug info
    pub name: String,
    #[serde(default)]
    pub comp_dir: Option<String>,
    #[serde(default)]
    pub line_table: Vec<LineTableEntry>,
    /// Source text embedded in the description, used for source regex breakpoints
    #[serde(default)]
    pub source: Option<String>,
}

/// An address range claimed by a compile unit (`.debug_aranges`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArangeEntry {
    #[serde(deserialize_with = "de_address")]
    pub start: Address,
    #[serde(deserialize_with = "de_address")]
    pub end: Address,
    pub unit: usize,
}

impl ArangeEntry {
    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub compile_units: Vec<CompileUnit>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub aranges: Option<Vec<ArangeEntry>>,
    #[serde(skip)]
    index: OnceLock<LineTableIndex>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            sections: Vec::new(),
            compile_units: Vec::new(),
            symbols: Vec::new(),
            aranges: None,
            index: OnceLock::new(),
        }
    }

    pub fn from_json_str(json: &str) -> BkptResult<Self> {
        let module: Module = serde_json::from_str(json)?;
        debug!(
            "Parsed module {}: {} compile units, {} symbols",
            module.name,
            module.compile_units.len(),
            module.symbols.len()
        );
        Ok(module)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> BkptResult<Self> {
        let path = path.as_ref();
        info!("Reading module description {}", path.display());

        let json = std::fs::read_to_string(path)?;
        let mut module = Self::from_json_str(&json)?;
        if module.path.is_none() {
            module.path = Some(path.display().to_string());
        }
        Ok(module)
    }

    /// Line table index, built on first use and kept for the module's lifetime
    pub fn index(&self) -> &LineTableIndex {
        self.index.get_or_init(|| LineTableIndex::build(self))
    }

    pub fn symbol_containing(&self, address: Address) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.contains(address))
    }

    pub fn section_containing(&self, address: Address) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }

    /// True if this module was loaded from, or is named by, `path`
    pub fn is_named(&self, path: &str) -> bool {
        self.name == path
            || self.path.as_deref() == Some(path)
            || self
                .path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .is_some_and(|base| base == path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddress {
    Number(u64),
    Text(String),
}

/// Parse "0x"-prefixed hex or decimal address text
pub fn parse_address(text: &str) -> Result<Address, std::num::ParseIntError> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn de_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    match RawAddress::deserialize(deserializer)? {
        RawAddress::Number(n) => Ok(n),
        RawAddress::Text(s) => parse_address(&s).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal_addresses() {
        let module = Module::from_json_str(
            r#"{
                "name": "a.out",
                "sections": [{"name": "__text", "address": "0x1000", "size": 256}],
                "symbols": [{"name": "main", "address": 4096, "size": "0x20"}]
            }"#,
        )
        .unwrap();

        assert_eq!(module.sections[0].address, 0x1000);
        assert_eq!(module.symbols[0].size, 0x20);
        assert!(module.aranges.is_none());
        assert!(module.section_containing(0x10ff).is_some());
        assert!(module.section_containing(0x1100).is_none());
        assert_eq!(module.symbol_containing(0x101f).map(|s| s.name.as_str()), Some("main"));
    }

    #[test]
    fn test_bad_address_text_is_rejected() {
        let err = Module::from_json_str(
            r#"{"name": "a.out", "symbols": [{"name": "main", "address": "0xzz"}]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_is_named_by_path_or_basename() {
        let mut module = Module::new("a.out");
        module.path = Some("/build/bin/a.out".to_string());
        assert!(module.is_named("a.out"));
        assert!(module.is_named("/build/bin/a.out"));
        assert!(!module.is_named("b.out"));
    }
}
