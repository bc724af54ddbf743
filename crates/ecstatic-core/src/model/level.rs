//! Option levels and relation kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel node standing in for "any numeric level".
pub const NUMERIC_SENTINEL: &str = "i";

/// Sentinel node for the smaller of two numeric levels that both resolve to `i`.
pub const NUMERIC_SENTINEL_BELOW: &str = "i-1";

/// A named setting of one configuration option.
///
/// Two levels are equal iff both the option name and the level name match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Level {
    pub option: String,
    pub name: String,
}

impl Level {
    pub fn new(option: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            name: name.into(),
        }
    }

    /// Whether this level is one of the numeric sentinels `i` / `i-1`.
    pub fn is_sentinel(&self) -> bool {
        self.name == NUMERIC_SENTINEL || self.name == NUMERIC_SENTINEL_BELOW
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.option, self.name)
    }
}

/// The two partial orders declared over an option's levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Soundness,
    Precision,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Soundness => "soundness",
            Relation::Precision => "precision",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_equal_only_when_option_and_name_match() {
        assert_eq!(Level::new("k", "1"), Level::new("k", "1"));
        assert_ne!(Level::new("k", "1"), Level::new("j", "1"));
        assert_ne!(Level::new("k", "1"), Level::new("k", "2"));
    }

    #[test]
    fn test_sentinels_are_recognised() {
        assert!(Level::new("k", "i").is_sentinel());
        assert!(Level::new("k", "i-1").is_sentinel());
        assert!(!Level::new("k", "0").is_sentinel());
    }

    #[test]
    fn test_relation_serializes_snake_case() {
        let json = serde_json::to_string(&Relation::Precision).unwrap();
        assert_eq!(json, "\"precision\"");
        assert_eq!(Relation::Soundness.to_string(), "soundness");
    }
}
