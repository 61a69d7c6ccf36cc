// Source path matching
//
// Decides whether a path typed by the user names a file recorded in debug
// info. Paths compare component-wise from the file name backwards; `.` and
// empty components carry no information and are dropped on parse.

use crate::source_map::{SourceMap, SourceMapEntry};
use std::fmt;

/// A normalized source path: absolute flag plus its meaningful components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePath {
    absolute: bool,
    components: Vec<String>,
}

impl SourcePath {
    pub fn parse(path: &str) -> Self {
        let absolute = path.starts_with('/');
        let components = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_string)
            .collect();

        Self {
            absolute,
            components,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// True if `suffix` is a trailing run of this path's components
    pub fn ends_with(&self, suffix: &SourcePath) -> bool {
        suffix.components.len() <= self.components.len()
            && self.components.ends_with(&suffix.components)
    }

    /// Components left after removing `prefix`, if it is a component-wise prefix
    pub fn strip_prefix(&self, prefix: &SourcePath) -> Option<&[String]> {
        if self.absolute != prefix.absolute || !self.components.starts_with(&prefix.components) {
            return None;
        }
        Some(&self.components[prefix.components.len()..])
    }

    /// Append components to this path
    pub fn join(&self, rest: &[String]) -> SourcePath {
        let mut components = self.components.clone();
        components.extend(rest.iter().cloned());
        SourcePath {
            absolute: self.absolute,
            components,
        }
    }

    fn leading(&self, count: usize) -> SourcePath {
        SourcePath {
            absolute: self.absolute,
            components: self.components[..count].to_vec(),
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/{}", self.components.join("/"))
        } else if self.components.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.components.join("/"))
        }
    }
}

/// Outcome of matching a requested path against a recorded one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub deduced: Option<SourceMapEntry>,
}

impl MatchResult {
    fn no_match() -> Self {
        Self::default()
    }

    fn matched(deduced: Option<SourceMapEntry>) -> Self {
        Self {
            matched: true,
            deduced,
        }
    }
}

// Extra leading components of the request when it is longer than a relative
// recorded path, e.g. `/x/y` for `/x/y/a/b/c/main.cpp` against `a/b/c/main.cpp`
struct RawMatch {
    extra: Option<SourcePath>,
}

fn raw_match(requested: &SourcePath, recorded: &SourcePath) -> Option<RawMatch> {
    if requested.is_empty() || recorded.is_empty() {
        return None;
    }

    let extra_of = |longer: &SourcePath, shorter: &SourcePath| {
        let count = longer.components.len() - shorter.components.len();
        (count > 0).then(|| longer.leading(count))
    };

    match (requested.absolute, recorded.absolute) {
        // Two full paths must agree exactly
        (true, true) => (requested == recorded).then_some(RawMatch { extra: None }),
        // A full request must contain the whole relative recorded path
        (true, false) => requested.ends_with(recorded).then(|| RawMatch {
            extra: extra_of(requested, recorded),
        }),
        (false, recorded_absolute) => {
            if recorded.ends_with(requested) {
                Some(RawMatch { extra: None })
            } else if !recorded_absolute && requested.ends_with(recorded) {
                Some(RawMatch {
                    extra: extra_of(requested, recorded),
                })
            } else {
                None
            }
        }
    }
}

/// Match a requested path against a recorded debug-info path.
///
/// The source map is tried first; when the rewritten path does not match, the
/// recorded path is compared raw. A raw match of a full request against a
/// shorter relative recorded path yields a deduced `(".", prefix)` mapping
/// when `auto_deduce` is set.
pub fn matches(
    requested: &SourcePath,
    recorded: &SourcePath,
    source_map: &SourceMap,
    auto_deduce: bool,
) -> MatchResult {
    if let Some(remapped) = source_map.remap(recorded) {
        if raw_match(requested, &remapped).is_some() {
            return MatchResult::matched(None);
        }
    }

    let Some(raw) = raw_match(requested, recorded) else {
        return MatchResult::no_match();
    };

    let deduced = if auto_deduce && requested.is_absolute() && !recorded.is_absolute() {
        raw.extra
            .map(|prefix| SourceMapEntry::new(".", prefix.to_string()))
    } else {
        None
    };

    MatchResult::matched(deduced)
}

/// Match a `-f` style file filter against a recorded path, without remapping
pub fn filter_matches(filter: &str, recorded: &str) -> bool {
    raw_match(&SourcePath::parse(filter), &SourcePath::parse(recorded)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(requested: &str, recorded: &str) -> MatchResult {
        matches(
            &SourcePath::parse(requested),
            &SourcePath::parse(recorded),
            &SourceMap::new(),
            true,
        )
    }

    #[test]
    fn test_parse_strips_dot_components() {
        let path = SourcePath::parse("./a//b/./c/main.cpp");
        assert!(!path.is_absolute());
        assert_eq!(path.components(), &["a", "b", "c", "main.cpp"]);
        assert_eq!(path.to_string(), "a/b/c/main.cpp");
        assert_eq!(SourcePath::parse("/x/y").to_string(), "/x/y");
        assert_eq!(SourcePath::parse(".").to_string(), ".");
    }

    #[test]
    fn test_shorter_relative_request_matches() {
        for path in ["main.cpp", "c/main.cpp", "./b/c/main.cpp", "a/b/c/main.cpp"] {
            let result = check(path, "./a/b/c/main.cpp");
            assert!(result.matched, "{} should match", path);
            assert!(result.deduced.is_none());
        }
    }

    #[test]
    fn test_longer_relative_request_matches_without_deduction() {
        let result = check("x/y/a/b/c/main.cpp", "./a/b/c/main.cpp");
        assert!(result.matched);
        assert!(result.deduced.is_none());
    }

    #[test]
    fn test_full_request_deduces_prefix() {
        let result = check("/x/y/a/b/c/main.cpp", "./a/b/c/main.cpp");
        assert!(result.matched);
        assert_eq!(result.deduced, Some(SourceMapEntry::new(".", "/x/y")));
    }

    #[test]
    fn test_full_request_must_contain_recorded_path() {
        assert!(!check("/x/b/c/main.cpp", "./a/b/c/main.cpp").matched);
        assert!(!check("/x/c/main.cpp", "./a/b/c/main.cpp").matched);
        assert!(!check("/x/main.cpp", "./a/b/c/main.cpp").matched);
    }

    #[test]
    fn test_mismatched_interior_component() {
        assert!(!check("./x/y/a/d/c/main.cpp", "./a/b/c/main.cpp").matched);
        assert!(!check("d/c/main.cpp", "./a/b/c/main.cpp").matched);
    }

    #[test]
    fn test_absolute_paths_compare_exactly() {
        assert!(check("/tmp/ab/main.cpp", "/tmp/ab/main.cpp").matched);
        assert!(!check("/tmp/xy/main.cpp", "/tmp/ab/main.cpp").matched);
        assert!(check("ab/main.cpp", "/tmp/ab/main.cpp").matched);
        // a relative request longer than an absolute recorded path cannot match
        assert!(!check("tmp/ab/main.cpp/extra", "/tmp/ab/main.cpp").matched);
    }

    #[test]
    fn test_source_map_match_skips_deduction() {
        let mut map = SourceMap::new();
        map.insert(".", "/x/y");
        let result = matches(
            &SourcePath::parse("/x/y/a/b/c/main.cpp"),
            &SourcePath::parse("./a/b/c/main.cpp"),
            &map,
            true,
        );
        assert!(result.matched);
        assert!(result.deduced.is_none());
    }

    #[test]
    fn test_filter_matches_basename() {
        assert!(filter_matches("a.c", "/build/src/a.c"));
        assert!(!filter_matches("b.c", "/build/src/a.c"));
    }
}
