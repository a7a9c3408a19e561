//! LDraw/MPD document loader.
//!
//! Loading is a pure function of the input bytes, the configuration and the
//! collaborators: [`parse_document`] returns a [`ParsedDocument`] holding
//! the filled registry and the load ledger. Nothing here touches an open
//! [`Document`](crate::Document); the caller swaps the result in.
//!
//! # Stages
//!
//! 1. Decode (UTF-8 or Windows-1252) and check the first line.
//! 2. Split into submodels (`0 FILE` / `0 NOFILE`, `0 !DATA`, inline `Name:`).
//! 3. Repair headers, validate lines, decode data blocks and register.
//! 4. Load `!LPUB INCLUDE` files through their restricted grammar.
//! 5. Resolve every referenced file: piece library, registry, project and
//!    search directories, official catalogue. Anything left is missing.
//! 6. Collect `!COLOUR` definitions and `PLI BEGIN SUB` substitutions.

mod encoding;
mod header;
mod resolve;
mod split;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};

use bis_model::{
    ColourDefinition, Ledger, LedgerCategory, LedgerEntry, LineType, MetaCommand, Severity,
    SubModelSource, referenced_file, validate_line,
};

use crate::config::DocumentConfig;
use crate::error::{DocumentError, Result};
use crate::registry::{SubModel, SubModelRegistry};
use crate::services::{Services, report_entries};

pub use encoding::{LineEnding, TextEncoding, TextFormat, decode, encode};

/// Extensions accepted for a top-level document.
pub const MODEL_EXTENSIONS: &[&str] = &["ldr", "mpd", "dat"];

/// Layout of one file on disk, kept for writing it back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileLayout {
    pub format: TextFormat,
    pub mpd: bool,
    /// Lines before the first submodel.
    pub preamble: Vec<String>,
}

/// Where a referenced file was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// A piece in the piece library.
    Library,
    /// A submodel of the document.
    SubModel,
    /// An external file, loaded as submodels.
    External(PathBuf),
    /// Known to the official catalogue only.
    Official,
    Missing,
}

/// A `PLI BEGIN SUB` / `BOM BEGIN SUB` substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub model: String,
    pub line: usize,
    /// Substitute part, when the command names one.
    pub part: Option<String>,
}

/// Everything a load produced.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub registry: SubModelRegistry,
    pub ledger: Ledger,
    pub layout: FileLayout,
    /// Layouts of external files, by path.
    pub external: BTreeMap<PathBuf, FileLayout>,
    /// Normalized name of every referenced file and where it resolved.
    pub resolutions: BTreeMap<String, Resolution>,
    pub colours: Vec<ColourDefinition>,
    pub substitutions: Vec<Substitution>,
}

impl ParsedDocument {
    /// Normalized names of unresolved references.
    pub fn missing(&self) -> BTreeSet<String> {
        self.resolutions
            .iter()
            .filter(|(_, resolution)| **resolution == Resolution::Missing)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Reject files that are not LDraw text before any parsing happens.
pub fn check_signature(path: &Path, lines: &[String]) -> Result<()> {
    let format_error = |reason: &str| DocumentError::Format {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let first = lines
        .iter()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| format_error("the file has no content"))?;
    LineType::of(first).map_err(|_| format_error("the first line is not an LDraw line"))?;
    Ok(())
}

/// Check the extension of a top-level document path.
pub fn check_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if MODEL_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(DocumentError::Format {
            path: path.to_path_buf(),
            reason: format!("unsupported file extension '.{extension}'"),
        })
    }
}

/// Parse a whole document.
///
/// `path` names the top-level file; its parent is the project directory
/// searched for external and include files. Only an unrecognized top-level
/// file is an error.
pub fn parse_document(
    bytes: &[u8],
    path: &Path,
    config: &DocumentConfig,
    services: &Services,
) -> Result<ParsedDocument> {
    let (lines, format) = decode(bytes);
    check_signature(path, &lines)?;

    let mut loader = Loader::new(path, config, services);
    if format.encoding == TextEncoding::Windows1252 {
        loader.push(LedgerEntry::new(
            Severity::Info,
            LedgerCategory::Encoding,
            format!("{} is not UTF-8; read as Windows-1252", path.display()),
        ));
    }

    let top_name = file_name(path);
    let total = lines.len();
    let (mpd, preamble) = loader.load_lines(lines, &top_name, &SubModelSource::Main, total);
    loader.parsed.layout = FileLayout {
        format,
        mpd,
        preamble,
    };

    loader.load_includes();
    loader.resolve_references();
    loader.scan_colours_and_substitutions();
    services.status.progress(total, total);

    let parsed = loader.finish();
    tracing::info!(
        path = %path.display(),
        submodels = parsed.registry.len(),
        ledger = parsed.ledger.len(),
        "document parsed"
    );
    Ok(parsed)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A reference waiting to be resolved.
#[derive(Debug, Clone)]
struct StagedReference {
    name: String,
    model: String,
    line: usize,
}

/// Mutable state of one load.
struct Loader<'a> {
    config: &'a DocumentConfig,
    services: &'a Services,
    project_dir: Option<PathBuf>,
    parsed: ParsedDocument,
    staged: VecDeque<StagedReference>,
    includes: Vec<(String, String)>,
}

impl<'a> Loader<'a> {
    fn new(path: &Path, config: &'a DocumentConfig, services: &'a Services) -> Self {
        let project_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Self {
            config,
            services,
            project_dir,
            parsed: ParsedDocument::default(),
            staged: VecDeque::new(),
            includes: Vec::new(),
        }
    }

    fn push(&mut self, entry: LedgerEntry) {
        self.parsed.ledger.push(entry);
    }

    fn finish(self) -> ParsedDocument {
        report_entries(self.services.status.as_ref(), self.parsed.ledger.iter());
        self.parsed
    }

    /// Split one file and register its submodels. Returns the MPD flag and preamble.
    fn load_lines(
        &mut self,
        lines: Vec<String>,
        top_name: &str,
        source: &SubModelSource,
        total: usize,
    ) -> (bool, Vec<String>) {
        let split = split::split_models(lines, top_name);
        for entry in split.ledger {
            self.push(entry);
        }
        for raw in split.models {
            let done = raw.first_line + raw.lines.len();
            if raw.data {
                self.register_data(raw, source);
            } else {
                self.register_model(raw, source);
            }
            if matches!(source, SubModelSource::Main) {
                self.services.status.progress(done.min(total), total);
            }
        }
        (split.mpd, split.preamble)
    }

    fn register_model(&mut self, raw: split::RawModel, source: &SubModelSource) {
        let (name, mut lines, framing) = raw.into_parts();

        if self.parsed.registry.contains(&name) {
            // Only the opened document may redefine a submodel.
            let kept = matches!(source, SubModelSource::Main);
            let outcome = if kept { "the last one is kept" } else { "the new one is ignored" };
            self.push(
                LedgerEntry::new(
                    Severity::Warning,
                    LedgerCategory::DuplicateSubModel,
                    format!("submodel '{name}' is defined more than once; {outcome}"),
                )
                .in_model(&name),
            );
            if !kept {
                return;
            }
        }

        let empty = lines.iter().all(|line| line.trim().is_empty());
        let mut model_ledger = Vec::new();
        let scan = if empty {
            self.push(
                LedgerEntry::new(
                    Severity::Warning,
                    LedgerCategory::EmptySubModel,
                    format!("submodel '{name}' has no content"),
                )
                .in_model(&name),
            );
            header::HeaderScan::default()
        } else {
            header::scan_header(&name, &mut lines, self.config, &mut model_ledger)
        };
        for entry in model_ledger {
            self.push(entry);
        }

        for (number, line) in lines.iter().enumerate() {
            if let Err(err) = validate_line(line) {
                self.push(
                    LedgerEntry::new(Severity::Warning, LedgerCategory::MalformedLine, err.to_string())
                        .in_model(&name)
                        .at_line(number),
                );
                continue;
            }
            if let Some(file) = referenced_file(line) {
                self.staged.push_back(StagedReference {
                    name: file.to_string(),
                    model: name.clone(),
                    line: number,
                });
            }
            if let Some(MetaCommand::Include(file)) = MetaCommand::parse(line) {
                self.includes.push((file, name.clone()));
            }
        }

        let mut model = SubModel::new(&name, lines)
            .with_meta(scan.meta)
            .with_source(source.clone());
        model.unofficial = scan.unofficial;
        model.flags.display_model = scan.display_model;
        model.framing = framing;
        self.parsed.registry.insert_model(model);
        tracing::debug!(name = %name, "submodel registered");
    }

    fn register_data(&mut self, raw: split::RawModel, source: &SubModelSource) {
        let (name, lines, framing) = raw.into_parts();
        let payload: String = lines
            .iter()
            .filter_map(|line| match MetaCommand::parse(line) {
                Some(MetaCommand::DataLine(data)) => Some(data),
                _ => None,
            })
            .collect();

        match base64::engine::general_purpose::STANDARD.decode(payload.trim()) {
            Ok(bytes) => {
                if let Err(err) = self.services.textures.write(&name, &bytes) {
                    self.push(
                        LedgerEntry::new(
                            Severity::Warning,
                            LedgerCategory::DataFile,
                            format!("could not write image '{name}': {err}"),
                        )
                        .in_model(&name),
                    );
                }
            }
            Err(err) => {
                self.push(
                    LedgerEntry::new(
                        Severity::Warning,
                        LedgerCategory::DataFile,
                        format!("invalid base64 in '{name}': {err}"),
                    )
                    .in_model(&name),
                );
            }
        }

        let mut model = SubModel::new(&name, lines).with_source(source.clone());
        model.flags.data_file = true;
        model.framing = framing;
        self.parsed.registry.insert_model(model);
    }

    fn scan_colours_and_substitutions(&mut self) {
        let mut codes = BTreeSet::new();
        for model in self.parsed.registry.iter() {
            for (number, line) in model.contents.iter().enumerate() {
                match MetaCommand::parse(line) {
                    Some(MetaCommand::Colour(colour)) => {
                        if codes.insert(colour.code) {
                            self.parsed.colours.push(colour);
                        }
                    }
                    Some(MetaCommand::Substitute(part)) => {
                        self.parsed.substitutions.push(Substitution {
                            model: model.name.clone(),
                            line: number,
                            part,
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    /// Candidate paths for a referenced file: the project directory, then
    /// every search directory.
    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let relative = name.trim().replace('\\', "/");
        let as_path = Path::new(&relative);
        if as_path.is_absolute() {
            return vec![as_path.to_path_buf()];
        }
        self.project_dir
            .iter()
            .cloned()
            .chain(self.services.search_paths.search_dirs())
            .map(|dir| dir.join(as_path))
            .collect()
    }
}
