//! LDraw line tokenizer and grammar.
//!
//! LDraw files are line oriented. The first whitespace-separated token names
//! the line type:
//!
//! | Type | Meaning          | Fields |
//! |------|------------------|--------|
//! | 0    | comment / meta   | any    |
//! | 1    | sub-file ref     | 15     |
//! | 2    | line             | 8      |
//! | 3    | triangle         | 11     |
//! | 4    | quadrilateral    | 14     |
//! | 5    | optional line    | 14     |
//!
//! A type 1 line references another file by name in its last field. Names may
//! contain spaces, so everything after the 14th token is the file name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// LDraw line type, taken from the first token of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    /// Empty or whitespace-only line.
    Blank,
    /// Type 0: comment or meta-command.
    Meta,
    /// Type 1: sub-file reference (part or submodel).
    Part,
    /// Type 2: line.
    Line,
    /// Type 3: triangle.
    Triangle,
    /// Type 4: quadrilateral.
    Quad,
    /// Type 5: optional line.
    OptionalLine,
}

impl LineType {
    /// Classify a line by its first token without validating the rest.
    pub fn of(line: &str) -> Result<Self> {
        match line.split_whitespace().next() {
            None => Ok(Self::Blank),
            Some("0") => Ok(Self::Meta),
            Some("1") => Ok(Self::Part),
            Some("2") => Ok(Self::Line),
            Some("3") => Ok(Self::Triangle),
            Some("4") => Ok(Self::Quad),
            Some("5") => Ok(Self::OptionalLine),
            Some(token) => Err(ModelError::UnknownLineType {
                token: token.to_string(),
            }),
        }
    }

    /// Numeric LDraw code of this type (blank lines report 0).
    pub fn code(self) -> u8 {
        match self {
            Self::Blank | Self::Meta => 0,
            Self::Part => 1,
            Self::Line => 2,
            Self::Triangle => 3,
            Self::Quad => 4,
            Self::OptionalLine => 5,
        }
    }

    /// Minimum number of whitespace tokens a well-formed line carries.
    pub fn field_count(self) -> usize {
        match self {
            Self::Blank => 0,
            Self::Meta => 1,
            Self::Part => 15,
            Self::Line => 8,
            Self::Triangle => 11,
            Self::Quad | Self::OptionalLine => 14,
        }
    }

    /// Types 1-5 add geometry to a step.
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            Self::Part | Self::Line | Self::Triangle | Self::Quad | Self::OptionalLine
        )
    }
}

/// Validate a line against the LDraw grammar and return its type.
///
/// Type 0 and blank lines are always accepted. Geometry lines must carry the
/// required number of fields, every coordinate must be numeric and the colour
/// must be a decimal code or a `0x` direct colour.
pub fn validate_line(line: &str) -> Result<LineType> {
    let line_type = LineType::of(line)?;
    if !line_type.is_geometry() {
        return Ok(line_type);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let expected = line_type.field_count();
    if tokens.len() < expected {
        return Err(ModelError::MissingFields {
            line_type: line_type.code(),
            expected,
            found: tokens.len(),
        });
    }

    parse_colour(tokens[1])?;

    // Type 1 ends in a file name; every other type is numbers all the way.
    let numeric_end = if line_type == LineType::Part {
        14
    } else {
        expected
    };
    for (field, value) in tokens.iter().enumerate().take(numeric_end).skip(2) {
        parse_number(field, value)?;
    }

    Ok(line_type)
}

/// Split a type 1 line into its 14 leading tokens and the referenced file name.
///
/// Returns `None` when the line is not a type 1 line or is too short.
pub fn split_part_line(line: &str) -> Option<(Vec<&str>, &str)> {
    let trimmed = line.trim();
    let mut tokens = Vec::with_capacity(14);
    let mut rest = trimmed;

    while tokens.len() < 14 {
        let start = rest.find(|c: char| !c.is_whitespace())?;
        rest = &rest[start..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        tokens.push(&rest[..end]);
        rest = &rest[end..];
    }

    if tokens.first() != Some(&"1") {
        return None;
    }

    let file = rest.trim();
    if file.is_empty() {
        return None;
    }
    Some((tokens, file))
}

/// The file name referenced by a type 1 line, if the line is one.
pub fn referenced_file(line: &str) -> Option<&str> {
    split_part_line(line).map(|(_, file)| file)
}

/// Normalize a referenced file name for case-insensitive lookup.
///
/// LDraw paths may use either separator; lookups use lowercase names with
/// forward slashes.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('\\', "/").to_lowercase()
}

fn parse_number(field: usize, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| ModelError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_colour(value: &str) -> Result<()> {
    let valid = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => !hex.is_empty() && u32::from_str_radix(hex, 16).is_ok(),
        None => value.parse::<u32>().is_ok(),
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidColour {
            value: value.to_string(),
        })
    }
}

/// A parsed type 1 line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartLine {
    /// Colour code as written (decimal or `0x` direct colour).
    pub colour: String,
    /// Translation `x y z`.
    pub position: [f64; 3],
    /// Row-major 3x3 rotation/scale matrix `a b c / d e f / g h i`.
    pub matrix: [[f64; 3]; 3],
    /// Referenced file name, spaces preserved.
    pub file: String,
}

impl PartLine {
    /// Parse a type 1 line.
    pub fn parse(line: &str) -> Result<Self> {
        let line_type = validate_line(line)?;
        if line_type != LineType::Part {
            return Err(ModelError::UnknownLineType {
                token: line_type.code().to_string(),
            });
        }
        let (tokens, file) = split_part_line(line).ok_or(ModelError::MissingFields {
            line_type: 1,
            expected: 15,
            found: line.split_whitespace().count(),
        })?;

        let mut numbers = [0.0f64; 12];
        for (slot, field) in numbers.iter_mut().zip(2..14) {
            *slot = parse_number(field, tokens[field])?;
        }

        Ok(Self {
            colour: tokens[1].to_string(),
            position: [numbers[0], numbers[1], numbers[2]],
            matrix: [
                [numbers[3], numbers[4], numbers[5]],
                [numbers[6], numbers[7], numbers[8]],
                [numbers[9], numbers[10], numbers[11]],
            ],
            file: file.to_string(),
        })
    }

    /// Determinant of the 3x3 transform submatrix.
    pub fn determinant(&self) -> f64 {
        determinant(&self.matrix)
    }

    /// A placement is mirrored when its transform reflects space.
    pub fn is_mirrored(&self) -> bool {
        self.determinant() < 0.0
    }
}

impl FromStr for PartLine {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1 {}", self.colour)?;
        for value in self.position {
            write!(f, " {}", format_number(value))?;
        }
        for row in self.matrix {
            for value in row {
                write!(f, " {}", format_number(value))?;
            }
        }
        write!(f, " {}", self.file)
    }
}

/// Determinant of a row-major 3x3 matrix.
pub fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";

    #[test]
    fn test_line_types() {
        assert_eq!(LineType::of("").unwrap(), LineType::Blank);
        assert_eq!(LineType::of("   ").unwrap(), LineType::Blank);
        assert_eq!(LineType::of("0 STEP").unwrap(), LineType::Meta);
        assert_eq!(LineType::of(IDENTITY).unwrap(), LineType::Part);
        assert_eq!(
            LineType::of("2 24 0 0 0 1 1 1").unwrap(),
            LineType::Line
        );
        assert!(matches!(
            LineType::of("7 foo"),
            Err(ModelError::UnknownLineType { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_short_part_line() {
        let result = validate_line("1 4 0 0 0 1 0 0 3001.dat");
        assert!(matches!(
            result,
            Err(ModelError::MissingFields {
                line_type: 1,
                expected: 15,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_number() {
        let result = validate_line("2 24 0 0 x 1 1 1");
        assert!(matches!(
            result,
            Err(ModelError::InvalidNumber { field: 4, .. })
        ));
    }

    #[test]
    fn test_validate_accepts_direct_colour() {
        let line = "1 0x2FF0000 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat";
        assert_eq!(validate_line(line).unwrap(), LineType::Part);
    }

    #[test]
    fn test_file_name_with_spaces() {
        let line = "1 16 0 0 0 1 0 0 0 1 0 0 0 1 My Sub Model.ldr";
        assert_eq!(referenced_file(line), Some("My Sub Model.ldr"));
        let part = PartLine::parse(line).unwrap();
        assert_eq!(part.file, "My Sub Model.ldr");
    }

    #[test]
    fn test_referenced_file_ignores_other_types() {
        assert_eq!(referenced_file("0 FILE a.ldr"), None);
        assert_eq!(referenced_file("1 4 0 0 0"), None);
    }

    #[test]
    fn test_identity_is_not_mirrored() {
        let part = PartLine::parse(IDENTITY).unwrap();
        assert_eq!(part.determinant(), 1.0);
        assert!(!part.is_mirrored());
    }

    #[test]
    fn test_single_axis_flip_is_mirrored() {
        let part = PartLine::parse("1 4 0 0 0 -1 0 0 0 1 0 0 0 1 3001.dat").unwrap();
        assert!(part.is_mirrored());
    }

    #[test]
    fn test_two_axis_flip_is_not_mirrored() {
        let part = PartLine::parse("1 4 0 0 0 -1 0 0 0 -1 0 0 0 1 3001.dat").unwrap();
        assert!(!part.is_mirrored());
    }

    #[test]
    fn test_display_round_trip() {
        let part = PartLine::parse("1 4 10 -8 0.5 1 0 0 0 1 0 0 0 1 3001.dat").unwrap();
        assert_eq!(part.to_string(), "1 4 10 -8 0.5 1 0 0 0 1 0 0 0 1 3001.dat");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(" Parts\\S\\3001S01.DAT "), "parts/s/3001s01.dat");
    }
}
