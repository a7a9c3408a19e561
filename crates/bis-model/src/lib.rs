//! LDraw value types for Brick Instruction Studio.
//!
//! This crate holds the leaf pieces of the document engine: the LDraw line
//! grammar and the small value types shared by every other crate.
//!
//! # Module Organization
//!
//! - [`line`]: line tokenizer, geometry validation, type 1 transforms and mirroring
//! - [`meta`]: type 0 meta-command recognition (`FILE`, `STEP`, `!LPUB BUILD_MOD`, ...)
//! - [`keys`]: step positions and viewer step keys
//! - [`buildmod`]: build-modification actions, policies and attribute vectors
//! - [`submodel`]: submodel flags, header metadata and source
//! - [`ledger`]: recoverable load anomalies

pub mod buildmod;
pub mod keys;
pub mod ledger;
pub mod line;
pub mod meta;
pub mod submodel;

mod error;

// === Error Types ===
pub use error::{ModelError, Result};

// === Line Grammar ===
pub use line::{
    LineType, PartLine, determinant, normalize_name, referenced_file, split_part_line,
    validate_line,
};
pub use meta::{BuildModCommand, ColourDefinition, MetaCommand};

// === Keys ===
pub use keys::{KeySuffix, StepPos, ViewerStepKey};

// === Build Modifications ===
pub use buildmod::{ActionPolicy, BuildModAction, BuildModAttribute, BuildModAttributes};

// === Submodels ===
pub use submodel::{SubModelFlags, SubModelMeta, SubModelSource, UnofficialType};

// === Ledger ===
pub use ledger::{Ledger, LedgerCategory, LedgerEntry, Severity};
