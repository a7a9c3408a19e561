//! Type 0 meta-command recognition.
//!
//! Official LDraw meta-commands (`FILE`, `NOFILE`, `!DATA`, `STEP`, `ROTSTEP`,
//! `Name:`, `Author:`, `!CATEGORY`, `!LDRAW_ORG`, `!COLOUR`) and the
//! instruction-authoring extensions under `!LPUB` are recognized here. The
//! `!LPUB` prefix is also accepted without the bang, as older files write it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::submodel::UnofficialType;

macro_rules! meta_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("Invalid meta-command regex"));
    };
}

meta_regex!(FILE_RX, r"(?i)^\s*0\s+FILE\s+(.+?)\s*$");
meta_regex!(NOFILE_RX, r"(?i)^\s*0\s+NOFILE\s*$");
meta_regex!(DATA_RX, r"(?i)^\s*0\s+!DATA\s+(.+?)\s*$");
meta_regex!(DATA_LINE_RX, r"^\s*0\s+!:\s?(.*?)\s*$");
meta_regex!(NAME_RX, r"(?i)^\s*0\s+Name:\s*(.*?)\s*$");
meta_regex!(AUTHOR_RX, r"(?i)^\s*0\s+Author:\s*(.*?)\s*$");
meta_regex!(CATEGORY_RX, r"(?i)^\s*0\s+!CATEGORY\s*(.*?)\s*$");
meta_regex!(LDRAW_ORG_RX, r"(?i)^\s*0\s+!LDRAW_ORG\s+(\S+)");
meta_regex!(STEP_RX, r"(?i)^\s*0\s+STEP\s*$");
meta_regex!(ROTSTEP_RX, r"(?i)^\s*0\s+ROTSTEP(?:\s+.*)?$");
meta_regex!(
    BUILD_MOD_RX,
    r"(?i)^\s*0\s+!?LPUB\s+BUILD_MOD\s+(BEGIN|APPLY|ADD|REMOVE|END_MOD|END)(?:\s+(.+?))?\s*$"
);
meta_regex!(CALLOUT_RX, r"(?i)^\s*0\s+!?LPUB\s+CALLOUT\s+(BEGIN|END)\b");
meta_regex!(MULTI_STEP_RX, r"(?i)^\s*0\s+!?LPUB\s+MULTI_STEP\s+(BEGIN|END)\b");
meta_regex!(INCLUDE_RX, r#"(?i)^\s*0\s+!?LPUB\s+INCLUDE\s+"?([^"]+?)"?\s*$"#);
meta_regex!(
    SUBSTITUTE_RX,
    r"(?i)^\s*0\s+!?LPUB\s+(?:PLI|BOM)\s+BEGIN\s+SUB\b(?:\s+(\S+))?"
);
meta_regex!(
    DISPLAY_MODEL_RX,
    r"(?i)^\s*0\s+!?LPUB\s+INSERT\s+DISPLAY_MODEL\b"
);
meta_regex!(
    COLOUR_RX,
    r"(?i)^\s*0\s+!COLOUR\s+(\S+)\s+CODE\s+(\d+)\s+VALUE\s+(#[0-9A-F]{6})"
);

/// A `0 !COLOUR` definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColourDefinition {
    /// Colour name, e.g. `Custom_Teal`.
    pub name: String,
    /// LDraw colour code.
    pub code: u32,
    /// `#RRGGBB` value.
    pub value: String,
}

/// Build-modification meta-command keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildModCommand {
    /// `BEGIN <key>`: opens a patch region.
    Begin,
    /// `APPLY <key>` (or `ADD <key>`): the patch is in force from this step.
    Apply,
    /// `REMOVE <key>`: the patch is withdrawn from this step.
    Remove,
    /// `END_MOD`: closes the patch body; original content follows.
    EndMod,
    /// `END`: closes the region.
    End,
}

/// A recognized type 0 line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCommand {
    File(String),
    NoFile,
    Data(String),
    DataLine(String),
    Name(String),
    Author(String),
    Category(String),
    LDrawOrg(UnofficialType),
    Step,
    RotStep,
    BuildMod {
        command: BuildModCommand,
        key: Option<String>,
    },
    CalloutBegin,
    CalloutEnd,
    MultiStepBegin,
    MultiStepEnd,
    Include(String),
    Substitute(Option<String>),
    DisplayModel,
    Colour(ColourDefinition),
    /// `0 <text>` that is not a keyword: a description or free comment.
    Comment(String),
    /// `0 // ...` or any other keyword-led meta line.
    Other,
}

impl MetaCommand {
    /// Classify a line. Returns `None` for lines that are not type 0.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("0") {
            return None;
        }
        let Some(keyword) = tokens.next() else {
            return Some(Self::Comment(String::new()));
        };
        let upper = keyword.to_ascii_uppercase();

        let command = match upper.as_str() {
            "FILE" => capture(&FILE_RX, line).map(Self::File),
            "NOFILE" => NOFILE_RX.is_match(line).then_some(Self::NoFile),
            "!DATA" => capture(&DATA_RX, line).map(Self::Data),
            "!:" => capture(&DATA_LINE_RX, line).map(Self::DataLine),
            "NAME:" => capture(&NAME_RX, line).map(Self::Name),
            "AUTHOR:" => capture(&AUTHOR_RX, line).map(Self::Author),
            "!CATEGORY" => capture(&CATEGORY_RX, line).map(Self::Category),
            "!LDRAW_ORG" => {
                capture(&LDRAW_ORG_RX, line).map(|tag| Self::LDrawOrg(UnofficialType::from_tag(&tag)))
            }
            "STEP" => STEP_RX.is_match(line).then_some(Self::Step),
            "ROTSTEP" => ROTSTEP_RX.is_match(line).then_some(Self::RotStep),
            "!COLOUR" => parse_colour(line).map(Self::Colour),
            "!LPUB" | "LPUB" => parse_lpub(line),
            _ => None,
        };

        Some(command.unwrap_or_else(|| {
            if keyword.starts_with('!') || keyword.starts_with("//") || is_keyword(&upper) {
                Self::Other
            } else {
                Self::Comment(comment_text(line))
            }
        }))
    }

    /// STEP or ROTSTEP.
    pub fn is_step_boundary(&self) -> bool {
        matches!(self, Self::Step | Self::RotStep)
    }

    /// Lines that belong in the header block of a model.
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            Self::Name(_)
                | Self::Author(_)
                | Self::Category(_)
                | Self::LDrawOrg(_)
                | Self::Comment(_)
                | Self::Other
        )
    }
}

fn capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn comment_text(line: &str) -> String {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix('0')
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn is_keyword(upper: &str) -> bool {
    matches!(
        upper,
        "BFC" | "CLEAR" | "PAUSE" | "PRINT" | "WRITE" | "SAVE" | "GHOST" | "MLCAD" | "LEOCAD"
    )
}

fn parse_colour(line: &str) -> Option<ColourDefinition> {
    let caps = COLOUR_RX.captures(line)?;
    Some(ColourDefinition {
        name: caps.get(1)?.as_str().to_string(),
        code: caps.get(2)?.as_str().parse().ok()?,
        value: caps.get(3)?.as_str().to_ascii_uppercase(),
    })
}

fn parse_lpub(line: &str) -> Option<MetaCommand> {
    if let Some(caps) = BUILD_MOD_RX.captures(line) {
        let command = match caps.get(1)?.as_str().to_ascii_uppercase().as_str() {
            "BEGIN" => BuildModCommand::Begin,
            "APPLY" | "ADD" => BuildModCommand::Apply,
            "REMOVE" => BuildModCommand::Remove,
            "END_MOD" => BuildModCommand::EndMod,
            _ => BuildModCommand::End,
        };
        let key = caps
            .get(2)
            .map(|m| m.as_str().trim_matches('"').to_string())
            .filter(|key| !key.is_empty());
        return Some(MetaCommand::BuildMod { command, key });
    }
    if let Some(caps) = CALLOUT_RX.captures(line) {
        return Some(if caps[1].eq_ignore_ascii_case("BEGIN") {
            MetaCommand::CalloutBegin
        } else {
            MetaCommand::CalloutEnd
        });
    }
    if let Some(caps) = MULTI_STEP_RX.captures(line) {
        return Some(if caps[1].eq_ignore_ascii_case("BEGIN") {
            MetaCommand::MultiStepBegin
        } else {
            MetaCommand::MultiStepEnd
        });
    }
    if let Some(file) = capture(&INCLUDE_RX, line) {
        return Some(MetaCommand::Include(file));
    }
    if let Some(caps) = SUBSTITUTE_RX.captures(line) {
        return Some(MetaCommand::Substitute(
            caps.get(1).map(|m| m.as_str().to_string()),
        ));
    }
    if DISPLAY_MODEL_RX.is_match(line) {
        return Some(MetaCommand::DisplayModel);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_markers() {
        assert_eq!(
            MetaCommand::parse("0 FILE main model.ldr"),
            Some(MetaCommand::File("main model.ldr".to_string()))
        );
        assert_eq!(MetaCommand::parse("0 NOFILE"), Some(MetaCommand::NoFile));
        assert_eq!(
            MetaCommand::parse("0 !DATA logo.png"),
            Some(MetaCommand::Data("logo.png".to_string()))
        );
        assert_eq!(
            MetaCommand::parse("0 !: iVBORw0KGgo="),
            Some(MetaCommand::DataLine("iVBORw0KGgo=".to_string()))
        );
    }

    #[test]
    fn test_not_meta() {
        assert_eq!(MetaCommand::parse("1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"), None);
        assert_eq!(MetaCommand::parse(""), None);
    }

    #[test]
    fn test_headers() {
        assert_eq!(
            MetaCommand::parse("0 Name: car.ldr"),
            Some(MetaCommand::Name("car.ldr".to_string()))
        );
        assert_eq!(
            MetaCommand::parse("0 Author: Jane Doe"),
            Some(MetaCommand::Author("Jane Doe".to_string()))
        );
        assert_eq!(
            MetaCommand::parse("0 !LDRAW_ORG Unofficial_Part"),
            Some(MetaCommand::LDrawOrg(UnofficialType::Part))
        );
        assert_eq!(
            MetaCommand::parse("0 Red sports car"),
            Some(MetaCommand::Comment("Red sports car".to_string()))
        );
        assert_eq!(MetaCommand::parse("0 // note"), Some(MetaCommand::Other));
        assert_eq!(MetaCommand::parse("0 BFC CERTIFY CCW"), Some(MetaCommand::Other));
    }

    #[test]
    fn test_steps() {
        assert_eq!(MetaCommand::parse("0 STEP"), Some(MetaCommand::Step));
        assert_eq!(MetaCommand::parse("0 step  "), Some(MetaCommand::Step));
        assert_eq!(
            MetaCommand::parse("0 ROTSTEP 0 90 0 ABS"),
            Some(MetaCommand::RotStep)
        );
        assert!(MetaCommand::parse("0 ROTSTEP END").unwrap().is_step_boundary());
    }

    #[test]
    fn test_build_mod_commands() {
        assert_eq!(
            MetaCommand::parse("0 !LPUB BUILD_MOD BEGIN Mod_01"),
            Some(MetaCommand::BuildMod {
                command: BuildModCommand::Begin,
                key: Some("Mod_01".to_string()),
            })
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB BUILD_MOD END_MOD"),
            Some(MetaCommand::BuildMod {
                command: BuildModCommand::EndMod,
                key: None,
            })
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB BUILD_MOD END"),
            Some(MetaCommand::BuildMod {
                command: BuildModCommand::End,
                key: None,
            })
        );
        assert_eq!(
            MetaCommand::parse("0 LPUB BUILD_MOD ADD \"Mod 2\""),
            Some(MetaCommand::BuildMod {
                command: BuildModCommand::Apply,
                key: Some("Mod 2".to_string()),
            })
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB BUILD_MOD REMOVE Mod_01"),
            Some(MetaCommand::BuildMod {
                command: BuildModCommand::Remove,
                key: Some("Mod_01".to_string()),
            })
        );
    }

    #[test]
    fn test_build_mod_enabled_is_not_a_region_command() {
        assert_eq!(
            MetaCommand::parse("0 !LPUB BUILD_MOD_ENABLED TRUE"),
            Some(MetaCommand::Other)
        );
    }

    #[test]
    fn test_lpub_regions() {
        assert_eq!(
            MetaCommand::parse("0 !LPUB CALLOUT BEGIN"),
            Some(MetaCommand::CalloutBegin)
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB MULTI_STEP END"),
            Some(MetaCommand::MultiStepEnd)
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB INCLUDE \"settings.ldr\""),
            Some(MetaCommand::Include("settings.ldr".to_string()))
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB PLI BEGIN SUB 3001.dat 4"),
            Some(MetaCommand::Substitute(Some("3001.dat".to_string())))
        );
        assert_eq!(
            MetaCommand::parse("0 !LPUB INSERT DISPLAY_MODEL"),
            Some(MetaCommand::DisplayModel)
        );
    }

    #[test]
    fn test_colour_definition() {
        let parsed =
            MetaCommand::parse("0 !COLOUR Custom_Teal CODE 10001 VALUE #00a0a0 EDGE #333333");
        assert_eq!(
            parsed,
            Some(MetaCommand::Colour(ColourDefinition {
                name: "Custom_Teal".to_string(),
                code: 10001,
                value: "#00A0A0".to_string(),
            }))
        );
    }
}
