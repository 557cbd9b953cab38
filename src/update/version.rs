//! Release version parsing and ordering.
//!
//! A version is a dotted numeric part (1 to 4 components) followed by an
//! optional free-form suffix, e.g. `1.1.12` or `v1.1.3b`. Numeric parts are
//! compared first with missing components treated as zero. On a tie an
//! unsuffixed version sorts before a suffixed one, and two suffixes compare
//! case-insensitively.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_COMPONENTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("version {0:?} has no leading numeric part")]
    MissingNumber(String),
    #[error("version {0:?} has an empty numeric component")]
    EmptyComponent(String),
    #[error("version {0:?} has more than 4 numeric components")]
    TooManyComponents(String),
    #[error("version {0:?} has a numeric component out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    suffix: String,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let unprefixed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let numeric_len = unprefixed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unprefixed.len());
        let (numeric, suffix) = unprefixed.split_at(numeric_len);

        if !numeric.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(VersionParseError::MissingNumber(input.to_string()));
        }

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() > MAX_COMPONENTS {
            return Err(VersionParseError::TooManyComponents(input.to_string()));
        }

        let mut components = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() {
                return Err(VersionParseError::EmptyComponent(input.to_string()));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| VersionParseError::OutOfRange(input.to_string()))?;
            components.push(value);
        }

        Ok(Self {
            components,
            suffix: suffix.to_string(),
        })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    fn padded(&self) -> [u64; MAX_COMPONENTS] {
        let mut padded = [0; MAX_COMPONENTS];
        for (slot, value) in padded.iter_mut().zip(&self.components) {
            *slot = *value;
        }
        padded
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.padded()
            .cmp(&other.padded())
            .then_with(|| match (self.suffix.is_empty(), other.suffix.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => self
                    .suffix
                    .to_lowercase()
                    .cmp(&other.suffix.to_lowercase()),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numeric: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}{}", numeric.join("."), self.suffix)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Orders two version strings. Callers should skip, not abort, on `Err`.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionParseError> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_orderings() {
        assert_eq!(compare("1.1.3", "1.1.3b").unwrap(), Ordering::Less);
        assert_eq!(compare("1.1.12", "1.1.2").unwrap(), Ordering::Greater);
        assert_eq!(compare("1.0.0", "1.0.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_prefix_and_padding() {
        assert_eq!(compare("v1.2", "1.2.0.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("V2", "1.99.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_suffixes_compare_case_insensitively() {
        assert_eq!(compare("1.0a", "1.0B").unwrap(), Ordering::Less);
        assert_eq!(compare("1.0RC", "1.0rc").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.0.1", "1.0zzz").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_unparseable_versions_rejected() {
        assert!(matches!(
            Version::parse("latest"),
            Err(VersionParseError::MissingNumber(_))
        ));
        assert!(matches!(
            Version::parse("v.1"),
            Err(VersionParseError::MissingNumber(_))
        ));
        assert!(matches!(
            Version::parse("1..2"),
            Err(VersionParseError::EmptyComponent(_))
        ));
        assert!(matches!(
            Version::parse("1.2.3.4.5"),
            Err(VersionParseError::TooManyComponents(_))
        ));
        assert!(compare("", "1.0").is_err());
    }

    #[test]
    fn test_display_keeps_suffix() {
        assert_eq!(Version::parse("v1.1.3b").unwrap().to_string(), "1.1.3b");
    }

    #[test]
    fn test_antisymmetry_and_transitivity() {
        let samples = [
            "0.9", "1.0", "1.0.0a", "1.0.0B", "1.0.1", "1.1.2", "1.1.3", "1.1.3b", "1.1.12",
            "v2.0", "2.0rc", "10.0.0.1",
        ];

        for a in samples {
            for b in samples {
                assert_eq!(
                    compare(a, b).unwrap(),
                    compare(b, a).unwrap().reverse(),
                    "antisymmetry failed for {a} / {b}"
                );
            }
        }

        let mut sorted: Vec<Version> = samples.iter().map(|s| s.parse().unwrap()).collect();
        sorted.sort();
        for a in 0..sorted.len() {
            for b in a..sorted.len() {
                for c in b..sorted.len() {
                    assert!(sorted[a] <= sorted[b] && sorted[b] <= sorted[c]);
                    assert!(sorted[a] <= sorted[c]);
                }
            }
        }
    }
}
