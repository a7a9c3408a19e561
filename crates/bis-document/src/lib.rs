//! Document engine for Brick Instruction Studio.
//!
//! This crate loads LDraw/MPD documents into a registry of named submodels
//! and keeps the derived indexes current while the document is edited:
//!
//! - **Step index**: every counted step of the whole nested tree, in
//!   depth-first build order
//! - **Build modifications**: named reversible patches and the action each
//!   step carries for them
//! - **Instance counts**: placements, mirrored placements and steps per submodel
//! - **Viewer cache**: render-ready content per step
//!
//! # Example
//!
//! ```ignore
//! use bis_document::{Document, DocumentConfig, Services};
//!
//! let mut document = Document::new(DocumentConfig::default(), Services::default());
//! let summary = document.load_file(Path::new("castle.mpd"))?;
//! println!("{} submodels, {} steps", summary.submodels, summary.steps);
//!
//! document.insert_line("castle.mpd", 12, "0 STEP")?;
//! if document.needs_recount() {
//!     document.count_instances();
//! }
//! document.save_file(Path::new("castle.mpd"))?;
//! ```
//!
//! # Architecture
//!
//! - `loader/` - decoding, submodel splitting, header repair, includes and
//!   reference resolution
//! - `registry.rs` - name-keyed submodel store with stable load-order indexes
//! - `step_index.rs` - the global step sequence
//! - `build_mod.rs` - build-mod store, per-step rows and nesting levels
//! - `counter.rs` - the counting pass
//! - `viewer.rs` - viewer step cache and content composition
//! - `writer.rs` - rendering and atomic save
//! - `document.rs` - the [`Document`] facade
//! - `services.rs` - collaborator traits and their default implementations

pub mod build_mod;
pub mod counter;
pub mod loader;
pub mod registry;
pub mod services;
pub mod step_index;
pub mod viewer;
pub mod writer;

mod config;
mod document;
mod error;

// === Facade ===
pub use document::{CancelToken, Document, LoadSummary, StepLine};

// === Configuration and Errors ===
pub use config::DocumentConfig;
pub use error::{DocumentError, Result};

// === Components ===
pub use build_mod::{BuildMod, BuildModStep, BuildModStore};
pub use counter::{CountReport, InstanceCounter, count_instances};
pub use loader::{
    FileLayout, LineEnding, ParsedDocument, Resolution, Substitution, TextEncoding, TextFormat,
    parse_document,
};
pub use registry::{Framing, SubModel, SubModelRegistry};
pub use step_index::StepIndex;
pub use viewer::{ViewType, ViewerStep, ViewerStepCache};

// === Collaborators ===
pub use services::{
    DirectorySearchPaths, DirectoryTextureWriter, MemoryTextureWriter, NoPieceLibrary,
    PieceLibrary, SearchPathProvider, Services, StaticPieceLibrary, StatusSink, TextureWriter,
    TracingStatusSink,
};
