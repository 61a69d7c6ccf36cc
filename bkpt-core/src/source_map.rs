// Source map: ordered path prefix rewrites
//
// Translates a source path prefix recorded in debug info into a prefix valid
// on this machine. Entries are tried in order and the first match wins.
// Entries are added by the user or deduced from breakpoint resolution.

use crate::error::{BkptResult, BreakpointError};
use crate::path::SourcePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub original: String,
    pub replacement: String,
}

impl SourceMapEntry {
    pub fn new(original: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
    deduce_count: u32,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, O, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (O, R)>,
        O: Into<String>,
        R: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(o, r)| SourceMapEntry::new(o, r))
                .collect(),
            deduce_count: 0,
        }
    }

    pub fn entries(&self) -> &[SourceMapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries ever added by deduction, across clears
    pub fn deduce_count(&self) -> u32 {
        self.deduce_count
    }

    /// Add a user entry ahead of every existing one
    pub fn insert(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        self.entries.insert(0, SourceMapEntry::new(original, replacement));
    }

    /// Add a user entry after every existing one
    pub fn append(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        self.entries.push(SourceMapEntry::new(original, replacement));
    }

    /// Replace all entries, keeping the deduction counter
    pub fn replace_all(&mut self, entries: Vec<SourceMapEntry>) {
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record a mapping learned from a successful suffix match.
    ///
    /// Returns false when an entry for the same original prefix exists.
    pub fn deduce_from_match(&mut self, entry: SourceMapEntry) -> bool {
        if self.entries.iter().any(|e| e.original == entry.original) {
            debug!(
                "Source map already maps '{}', not deducing '{}'",
                entry.original, entry.replacement
            );
            return false;
        }

        info!(
            "Deduced source map entry '{}' -> '{}'",
            entry.original, entry.replacement
        );
        self.entries.push(entry);
        self.deduce_count += 1;
        true
    }

    /// Rewrite a recorded path with the first entry whose original prefix covers it
    pub fn remap(&self, recorded: &SourcePath) -> Option<SourcePath> {
        self.entries.iter().find_map(|entry| {
            let original = SourcePath::parse(&entry.original);
            recorded
                .strip_prefix(&original)
                .map(|rest| SourcePath::parse(&entry.replacement).join(rest))
        })
    }

    /// Ordered array of `[original, replacement]` pairs
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| Value::Array(vec![
                    Value::String(e.original.clone()),
                    Value::String(e.replacement.clone()),
                ]))
                .collect(),
        )
    }

    /// Parse an array of `[original, replacement]` pairs
    pub fn entries_from_json(value: &Value) -> BkptResult<Vec<SourceMapEntry>> {
        let pairs = value
            .as_array()
            .ok_or_else(|| BreakpointError::InvalidSourceMap("expected an array".to_string()))?;

        pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(original), Value::String(replacement)]) => {
                    Ok(SourceMapEntry::new(original.clone(), replacement.clone()))
                }
                _ => Err(BreakpointError::InvalidSourceMap(format!(
                    "expected [original, replacement], got {}",
                    pair
                ))),
            })
            .collect()
    }
}
