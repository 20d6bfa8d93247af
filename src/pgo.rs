//! Profile-guided-optimization profile loading (§4.Q, §6).
//!
//! The profile only ever raises inlining thresholds for hot functions and
//! skips cold ones (§4.L); its absence is always harmless. The file format
//! is a simple line-oriented one: `name,hot` or `name,cold` per line, `#`
//! comments and blank lines ignored.

use crate::error::ProfileError;
use crate::fx::FxHashSet;
use std::path::Path;

/// A loaded PGO profile: the set of function names marked hot, and the set
/// marked cold. A name absent from both answers `false` to both queries.
#[derive(Debug, Clone, Default)]
pub struct PgoProfile {
    hot: FxHashSet<String>,
    cold: FxHashSet<String>,
}

impl PgoProfile {
    /// True if `name` was marked hot.
    pub fn is_hot(&self, name: &str) -> bool {
        self.hot.contains(name)
    }

    /// True if `name` was marked cold.
    pub fn is_cold(&self, name: &str) -> bool {
        self.cold.contains(name)
    }

    fn parse(text: &str) -> Result<Self, ProfileError> {
        let mut profile = PgoProfile::default();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, tag) = line.split_once(',').ok_or_else(|| ProfileError::MalformedLine {
                line_no,
                text: raw_line.to_string(),
            })?;
            let name = name.trim();
            match tag.trim() {
                "hot" => {
                    profile.hot.insert(name.to_string());
                }
                "cold" => {
                    profile.cold.insert(name.to_string());
                }
                other => {
                    return Err(ProfileError::UnknownTag {
                        line_no,
                        tag: other.to_string(),
                    });
                }
            }
        }
        Ok(profile)
    }
}

/// Load a PGO profile from `path`. Called at most once per compilation
/// session (§6); a missing file or parse error is reported to the caller
/// rather than panicking, since this is the crate's one real I/O boundary.
pub fn pgo_load_profile(path: impl AsRef<Path>) -> Result<PgoProfile, ProfileError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    PgoProfile::parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hot_and_cold() {
        let profile = PgoProfile::parse("helper,hot\n# comment\n\nleaf,cold\n").unwrap();
        assert!(profile.is_hot("helper"));
        assert!(!profile.is_cold("helper"));
        assert!(profile.is_cold("leaf"));
        assert!(!profile.is_hot("unknown"));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = PgoProfile::parse("helper hot\n").unwrap_err();
        assert!(matches!(err, ProfileError::MalformedLine { line_no: 1, .. }));
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = PgoProfile::parse("helper,lukewarm\n").unwrap_err();
        assert!(matches!(err, ProfileError::UnknownTag { line_no: 1, .. }));
    }
}
