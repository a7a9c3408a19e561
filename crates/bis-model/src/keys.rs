//! Composite keys used across the engine.
//!
//! Steps and viewer snapshots are addressed by small value types. The
//! string form `model;line;step[_suffix]` exists only at the serialization
//! boundary (`Display` / `FromStr`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A step boundary: the model (by load-order index) and the first line of the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepPos {
    pub model_index: usize,
    pub line_number: usize,
}

impl StepPos {
    pub fn new(model_index: usize, line_number: usize) -> Self {
        Self {
            model_index,
            line_number,
        }
    }
}

impl fmt::Display for StepPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.model_index, self.line_number)
    }
}

/// Optional suffix distinguishing variants of the same step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySuffix {
    /// The final model view (`_fm`).
    FinalModel,
    /// A single-part view (`_part_<escaped name>`).
    Part(String),
}

/// Key of a cached viewer step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerStepKey {
    pub model_index: usize,
    pub line_number: usize,
    pub step_number: usize,
    pub suffix: Option<KeySuffix>,
}

impl ViewerStepKey {
    pub fn new(model_index: usize, line_number: usize, step_number: usize) -> Self {
        Self {
            model_index,
            line_number,
            step_number,
            suffix: None,
        }
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: KeySuffix) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn position(&self) -> StepPos {
        StepPos::new(self.model_index, self.line_number)
    }
}

impl fmt::Display for ViewerStepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{}",
            self.model_index, self.line_number, self.step_number
        )?;
        match &self.suffix {
            None => Ok(()),
            Some(KeySuffix::FinalModel) => f.write_str("_fm"),
            Some(KeySuffix::Part(name)) => write!(f, "_part_{}", escape_part_name(name)),
        }
    }
}

impl FromStr for ViewerStepKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ModelError::MalformedKey { key: s.to_string() };

        let (numbers, suffix) = match s.find('_') {
            Some(at) => (&s[..at], Some(&s[at + 1..])),
            None => (s, None),
        };

        let mut parts = numbers.split(';');
        let mut next_number = || -> Result<usize> {
            parts
                .next()
                .and_then(|value| value.trim().parse().ok())
                .ok_or_else(malformed)
        };
        let model_index = next_number()?;
        let line_number = next_number()?;
        let step_number = next_number()?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        let suffix = match suffix {
            None => None,
            Some("fm") => Some(KeySuffix::FinalModel),
            Some(rest) => {
                let escaped = rest.strip_prefix("part_").ok_or_else(malformed)?;
                Some(KeySuffix::Part(unescape_part_name(escaped).ok_or_else(malformed)?))
            }
        };

        Ok(Self {
            model_index,
            line_number,
            step_number,
            suffix,
        })
    }
}

/// Escape `%` and `_` so a part name never contains the suffix delimiter.
pub fn escape_part_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape_part_name`]. Returns `None` on an unknown escape.
pub fn unescape_part_name(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let code = rest.get(at + 1..at + 3)?;
        match code.to_ascii_uppercase().as_str() {
            "25" => out.push('%'),
            "5F" => out.push('_'),
            _ => return None,
        }
        rest = &rest[at + 3..];
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key() {
        let key = ViewerStepKey::new(2, 14, 3);
        assert_eq!(key.to_string(), "2;14;3");
        assert_eq!("2;14;3".parse::<ViewerStepKey>().unwrap(), key);
    }

    #[test]
    fn test_final_model_key() {
        let key = ViewerStepKey::new(0, 0, 9).with_suffix(KeySuffix::FinalModel);
        assert_eq!(key.to_string(), "0;0;9_fm");
        assert_eq!("0;0;9_fm".parse::<ViewerStepKey>().unwrap(), key);
    }

    #[test]
    fn test_part_names_with_underscores_do_not_collide() {
        let key = ViewerStepKey::new(1, 5, 2).with_suffix(KeySuffix::Part("3626bp_01.dat".into()));
        let text = key.to_string();
        assert_eq!(text, "1;5;2_part_3626bp%5F01.dat");
        assert_eq!(text.parse::<ViewerStepKey>().unwrap(), key);

        let fm_part = ViewerStepKey::new(1, 5, 2).with_suffix(KeySuffix::Part("fm".into()));
        assert_ne!(fm_part.to_string(), "1;5;2_fm");
    }

    #[test]
    fn test_escape_round_trip_with_percent() {
        for name in ["%_", "%5F", "a%25_b", "plain.dat"] {
            assert_eq!(unescape_part_name(&escape_part_name(name)).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_malformed_keys() {
        assert!("1;2".parse::<ViewerStepKey>().is_err());
        assert!("1;2;x".parse::<ViewerStepKey>().is_err());
        assert!("1;2;3;4".parse::<ViewerStepKey>().is_err());
        assert!("1;2;3_bogus".parse::<ViewerStepKey>().is_err());
        assert!("1;2;3_part_%zz".parse::<ViewerStepKey>().is_err());
    }
}
