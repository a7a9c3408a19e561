//! Value types describing a submodel.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `!LDRAW_ORG` type of a submodel.
///
/// Plain submodels carry no tag. Custom parts shipped inside a document carry
/// `Unofficial_Part`, `Unofficial_Subpart` and so on; the official prefix form
/// maps to the same variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnofficialType {
    #[default]
    None,
    Model,
    Part,
    Subpart,
    Primitive,
    Shortcut,
}

impl UnofficialType {
    /// Parse the first token after `!LDRAW_ORG`.
    pub fn from_tag(tag: &str) -> Self {
        let lower = tag.to_ascii_lowercase();
        let bare = lower.strip_prefix("unofficial_").unwrap_or(&lower);
        if bare.contains("subpart") {
            Self::Subpart
        } else if bare.contains("primitive") {
            Self::Primitive
        } else if bare.contains("shortcut") {
            Self::Shortcut
        } else if bare.contains("part") {
            Self::Part
        } else if bare.contains("model") {
            Self::Model
        } else {
            Self::None
        }
    }

    /// Part-like submodels are leaves for counting purposes.
    pub fn is_part(self) -> bool {
        matches!(
            self,
            Self::Part | Self::Subpart | Self::Primitive | Self::Shortcut
        )
    }
}

/// Boolean state carried by every submodel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubModelFlags {
    /// Created by the application rather than loaded.
    pub generated: bool,
    /// Loaded from an `!LPUB INCLUDE` directive.
    pub include_file: bool,
    /// A `!DATA` block (embedded image).
    pub data_file: bool,
    /// Contains `!LPUB INSERT DISPLAY_MODEL`.
    pub display_model: bool,
    /// Edited since it was loaded or last saved.
    pub modified: bool,
    /// Edited since the last save.
    pub changed_since_write: bool,
}

/// Header block values of a submodel.
///
/// `None` means the header is absent. `Some("")` means the header was found
/// after the body started and is treated as present but empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubModelMeta {
    pub description: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
}

/// Where the lines of a submodel live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubModelSource {
    /// Part of the document that was opened.
    #[default]
    Main,
    /// A separate LDR/MPD file found in the project or search directories.
    External(PathBuf),
    /// An `!LPUB INCLUDE` file.
    Include(PathBuf),
    /// Created in memory; written into the main document on save.
    Generated,
}
