// Per-target settings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// Learn source map entries when a full request path matches a relative
    /// path recorded in debug info
    pub auto_source_map_relative: bool,
    /// Move a file+line breakpoint to the next line with code when the
    /// requested line has none
    pub move_to_nearest_code: bool,
    /// Place symbol breakpoints after the function prologue
    pub skip_prologue: bool,
    /// Initial source map as `[original, replacement]` pairs
    pub source_map: Vec<(String, String)>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            auto_source_map_relative: true,
            move_to_nearest_code: true,
            skip_prologue: true,
            source_map: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings: TargetSettings =
            serde_json::from_str(r#"{"skip_prologue": false, "source_map": [["/build", "/src"]]}"#)
                .unwrap();
        assert!(settings.auto_source_map_relative);
        assert!(!settings.skip_prologue);
        assert_eq!(settings.source_map, vec![("/build".to_string(), "/src".to_string())]);
    }
}
