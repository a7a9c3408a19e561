//! External collaborators consumed by the document engine.
//!
//! The engine never talks to the piece library, the file system search
//! policy, the UI or the texture store directly. Each is a trait object
//! bundled in [`Services`] and handed to the loader.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bis_model::{LedgerCategory, LedgerEntry, Severity, normalize_name};

/// Lookup of parts outside the document.
pub trait PieceLibrary: Send + Sync {
    /// Whether the library holds a piece of that name.
    fn find_piece(&self, name: &str) -> bool;

    /// Whether the name is a primitive (`p/` or `48/` in the official tree).
    fn is_primitive(&self, name: &str) -> bool;

    /// Whether the name is in the official catalogue even if the piece files
    /// are not installed.
    fn is_official(&self, _name: &str) -> bool {
        false
    }
}

/// Ordered directories searched for referenced files.
pub trait SearchPathProvider: Send + Sync {
    fn search_dirs(&self) -> Vec<PathBuf>;
}

/// Receiver of load anomalies and progress.
pub trait StatusSink: Send + Sync {
    fn report(&self, severity: Severity, category: LedgerCategory, text: &str);

    fn progress(&self, _done: usize, _total: usize) {}
}

/// Persists decoded `!DATA` images.
pub trait TextureWriter: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
}

// === Piece libraries ===

/// Library that knows no pieces; every reference must resolve elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPieceLibrary;

impl PieceLibrary for NoPieceLibrary {
    fn find_piece(&self, _name: &str) -> bool {
        false
    }

    fn is_primitive(&self, _name: &str) -> bool {
        false
    }
}

/// In-memory piece library built from name lists.
#[derive(Debug, Default, Clone)]
pub struct StaticPieceLibrary {
    pieces: BTreeSet<String>,
    primitives: BTreeSet<String>,
    official: BTreeSet<String>,
}

impl StaticPieceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from piece names; names under `p/` or `48/` also count as primitives.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut library = Self::new();
        for name in names {
            library.add_piece(name.as_ref());
        }
        library
    }

    /// Read a piece list: one name per line, `#` starts a comment.
    pub fn from_list_file(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_names(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or_default().trim())
                .filter(|line| !line.is_empty()),
        ))
    }

    pub fn add_piece(&mut self, name: &str) {
        let key = normalize_name(name);
        if key.starts_with("p/") || key.starts_with("48/") {
            self.primitives.insert(key.clone());
        }
        self.pieces.insert(key);
    }

    /// Record a catalogue name without an installed piece file.
    #[must_use]
    pub fn with_official(mut self, name: &str) -> Self {
        self.official.insert(normalize_name(name));
        self
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl PieceLibrary for StaticPieceLibrary {
    fn find_piece(&self, name: &str) -> bool {
        self.pieces.contains(&normalize_name(name))
    }

    fn is_primitive(&self, name: &str) -> bool {
        self.primitives.contains(&normalize_name(name))
    }

    fn is_official(&self, name: &str) -> bool {
        self.official.contains(&normalize_name(name))
    }
}

// === Search paths ===

/// Fixed list of search directories.
#[derive(Debug, Default, Clone)]
pub struct DirectorySearchPaths {
    dirs: Vec<PathBuf>,
}

impl DirectorySearchPaths {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl SearchPathProvider for DirectorySearchPaths {
    fn search_dirs(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }
}

// === Status sinks ===

/// Forward ledger entries to a status sink, one report each.
pub(crate) fn report_entries<'a>(
    status: &dyn StatusSink,
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) {
    for entry in entries {
        let mut text = entry.message.clone();
        if let Some(model) = &entry.model {
            text.push_str(&format!(" in {model}"));
        }
        if let Some(line) = entry.line {
            text.push_str(&format!(" at line {}", line + 1));
        }
        status.report(entry.severity, entry.category, &text);
    }
}

/// Forwards every report to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, severity: Severity, category: LedgerCategory, text: &str) {
        let category = category.label();
        match severity {
            Severity::Info => tracing::info!(category, "{text}"),
            Severity::Warning => tracing::warn!(category, "{text}"),
            Severity::Error => tracing::error!(category, "{text}"),
        }
    }

    fn progress(&self, done: usize, total: usize) {
        tracing::trace!(done, total, "load progress");
    }
}

// === Texture writers ===

/// Keeps decoded images in memory, keyed by lowercase name.
#[derive(Debug, Default)]
pub struct MemoryTextureWriter {
    images: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryTextureWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.images
            .lock()
            .ok()
            .and_then(|images| images.get(&normalize_name(name)).cloned())
    }

    pub fn names(&self) -> Vec<String> {
        self.images
            .lock()
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl TextureWriter for MemoryTextureWriter {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut images = self
            .images
            .lock()
            .map_err(|_| io::Error::other("texture store poisoned"))?;
        images.insert(normalize_name(name), bytes.to_vec());
        Ok(())
    }
}

/// Writes decoded images into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryTextureWriter {
    dir: PathBuf,
}

impl DirectoryTextureWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TextureWriter for DirectoryTextureWriter {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        // Data block names may carry a relative path; keep only the file name.
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty texture name"))?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(file_name), bytes)
    }
}

/// The collaborators a document is loaded with.
#[derive(Clone)]
pub struct Services {
    pub library: Arc<dyn PieceLibrary>,
    pub search_paths: Arc<dyn SearchPathProvider>,
    pub status: Arc<dyn StatusSink>,
    pub textures: Arc<dyn TextureWriter>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            library: Arc::new(NoPieceLibrary),
            search_paths: Arc::new(DirectorySearchPaths::default()),
            status: Arc::new(TracingStatusSink),
            textures: Arc::new(MemoryTextureWriter::new()),
        }
    }
}

impl Services {
    #[must_use]
    pub fn with_library(mut self, library: Arc<dyn PieceLibrary>) -> Self {
        self.library = library;
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, search_paths: Arc<dyn SearchPathProvider>) -> Self {
        self.search_paths = search_paths;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_textures(mut self, textures: Arc<dyn TextureWriter>) -> Self {
        self.textures = textures;
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("search_dirs", &self.search_paths.search_dirs())
            .finish_non_exhaustive()
    }
}
