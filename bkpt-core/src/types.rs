// Core type definitions
//
// Identifiers shared across the resolver, registry and target

use serde::{Deserialize, Serialize};
use std::fmt;

// Load addresses; modules are assumed to be loaded at their link addresses
pub type Address = u64;

pub type TargetId = u32;

/// Breakpoint identity, allocated monotonically and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location identity: `breakpoint.sub_index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId {
    pub breakpoint: BreakpointId,
    pub index: u32,
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.breakpoint, self.index)
    }
}

/// A user reference to breakpoints: a numeric ID or a breakpoint name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointRef {
    Id(BreakpointId),
    Name(String),
}

impl BreakpointRef {
    /// Parse a user token. Digits are IDs, anything else is a name.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.parse::<u32>() {
            Ok(id) => BreakpointRef::Id(BreakpointId(id)),
            Err(_) => BreakpointRef::Name(token.to_string()),
        }
    }
}

impl fmt::Display for BreakpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointRef::Id(id) => write!(f, "{}", id),
            BreakpointRef::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<BreakpointId> for BreakpointRef {
    fn from(id: BreakpointId) -> Self {
        BreakpointRef::Id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_ref_parse() {
        assert_eq!(BreakpointRef::parse("3"), BreakpointRef::Id(BreakpointId(3)));
        assert_eq!(
            BreakpointRef::parse("MyBKPTS"),
            BreakpointRef::Name("MyBKPTS".to_string())
        );
    }

    #[test]
    fn test_location_id_display() {
        let loc = LocationId {
            breakpoint: BreakpointId(2),
            index: 1,
        };
        assert_eq!(loc.to_string(), "2.1");
    }
}
