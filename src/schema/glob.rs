//! Field-name glob patterns for dynamic templates
//!
//! - `*` matches any sequence of characters (including empty)
//! - `?` matches exactly one character
//!
//! Matching is case-sensitive and anchored to the full field name.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MapstoreError, Result};

/// A compiled glob pattern
#[derive(Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob pattern
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(MapstoreError::InvalidMapping(
                "dynamic template pattern must not be empty".to_string(),
            ));
        }

        // `.` must also match line breaks
        let mut regex_pattern = String::with_capacity(pattern.len() + 12);
        regex_pattern.push_str("(?s)^");
        for ch in pattern.chars() {
            match ch {
                '*' => regex_pattern.push_str(".*"),
                '?' => regex_pattern.push('.'),
                other => regex_pattern.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        regex_pattern.push('$');

        let regex = Regex::new(&regex_pattern).map_err(|e| {
            MapstoreError::InvalidMapping(format!("invalid pattern [{}]: {}", pattern, e))
        })?;
        Ok(Self { pattern, regex })
    }

    /// Check whether a field name matches this pattern
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The source pattern
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobPattern({:?})", self.pattern)
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Serialize for GlobPattern {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for GlobPattern {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        GlobPattern::new(pattern).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern() {
        let glob = GlobPattern::new("dv_*").unwrap();
        assert!(glob.matches("dv_field"));
        assert!(glob.matches("dv_"));
        assert!(!glob.matches("xdv_field"));
        assert!(!glob.matches("DV_field"));
        assert!(!glob.matches("name"));
    }

    #[test]
    fn test_anchored_and_single_char() {
        let glob = GlobPattern::new("f?_count").unwrap();
        assert!(glob.matches("f1_count"));
        assert!(!glob.matches("f12_count"));
        assert!(!glob.matches("f1_count_total"));
    }

    #[test]
    fn test_regex_characters_are_literal() {
        let glob = GlobPattern::new("a.b+*").unwrap();
        assert!(glob.matches("a.b+c"));
        assert!(!glob.matches("axb+c"));
    }

    #[test]
    fn test_wildcards_match_line_breaks() {
        assert!(GlobPattern::new("dv_*").unwrap().matches("dv_a\nb"));
        assert!(GlobPattern::new("a?b").unwrap().matches("a\nb"));
        assert!(GlobPattern::new("*").unwrap().matches("\r\n"));
        assert!(!GlobPattern::new("dv_?").unwrap().matches("dv_\n\n"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(GlobPattern::new("").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let glob = GlobPattern::new("*_id").unwrap();
        let json = serde_json::to_string(&glob).unwrap();
        assert_eq!(json, "\"*_id\"");
        let restored: GlobPattern = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, glob);
        assert!(restored.matches("user_id"));
    }
}
