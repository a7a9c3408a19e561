//! Load-status ledger.
//!
//! Recoverable anomalies found while loading or indexing a document are
//! recorded here instead of being returned as errors. Each entry carries a
//! severity, a category and, when known, the submodel and line it concerns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a ledger entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerCategory {
    /// Description, `Name:` or `Author:` header was absent.
    MissingHeader,
    /// `!CATEGORY` header was absent.
    MissingCategory,
    /// A submodel with no content lines.
    EmptySubModel,
    /// A second submodel with a name already in use.
    DuplicateSubModel,
    /// A type 1 reference that resolved to nothing.
    MissingReference,
    /// A line that does not follow the LDraw grammar.
    MalformedLine,
    /// Problems with an `!LPUB INCLUDE` file.
    IncludeFile,
    /// Problems with a `!DATA` block.
    DataFile,
    /// A nested file that could not be read.
    NestedFile,
    /// Text outside any `0 FILE` block of an MPD document.
    StrayContent,
    /// Build-modification bookkeeping.
    BuildMod,
    /// A submodel that references itself through its children.
    RecursiveReference,
    /// Decoding fell back from UTF-8.
    Encoding,
}

impl LedgerCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing header",
            Self::MissingCategory => "missing category",
            Self::EmptySubModel => "empty submodel",
            Self::DuplicateSubModel => "duplicate submodel",
            Self::MissingReference => "missing reference",
            Self::MalformedLine => "malformed line",
            Self::IncludeFile => "include file",
            Self::DataFile => "data file",
            Self::NestedFile => "nested file",
            Self::StrayContent => "stray content",
            Self::BuildMod => "build modification",
            Self::RecursiveReference => "recursive reference",
            Self::Encoding => "encoding",
        }
    }
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One recorded anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub severity: Severity,
    pub category: LedgerCategory,
    pub message: String,
    pub model: Option<String>,
    pub line: Option<usize>,
}

impl LedgerEntry {
    pub fn new(severity: Severity, category: LedgerCategory, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            model: None,
            line: None,
        }
    }

    #[must_use]
    pub fn in_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;
        match (&self.model, self.line) {
            (Some(model), Some(line)) => write!(f, " ({model}:{})", line + 1),
            (Some(model), None) => write!(f, " ({model})"),
            _ => Ok(()),
        }
    }
}

/// Ordered collection of ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, other: Ledger) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn retain(&mut self, keep: impl FnMut(&LedgerEntry) -> bool) {
        self.entries.retain(keep);
    }

    /// Entries of one category.
    pub fn by_category(&self, category: LedgerCategory) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Whether any entry of the category exists.
    pub fn has(&self, category: LedgerCategory) -> bool {
        self.by_category(category).next().is_some()
    }

    /// Number of entries at the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|e| e.severity == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display() {
        let entry = LedgerEntry::new(
            Severity::Warning,
            LedgerCategory::MissingReference,
            "3001x.dat not found",
        )
        .in_model("main.ldr")
        .at_line(4);
        assert_eq!(
            entry.to_string(),
            "[Warning] missing reference: 3001x.dat not found (main.ldr:5)"
        );
    }

    #[test]
    fn test_ledger_queries() {
        let mut ledger = Ledger::new();
        ledger.push(LedgerEntry::new(
            Severity::Info,
            LedgerCategory::MissingCategory,
            "no category",
        ));
        ledger.push(LedgerEntry::new(
            Severity::Warning,
            LedgerCategory::EmptySubModel,
            "empty",
        ));

        assert_eq!(ledger.len(), 2);
        assert!(ledger.has(LedgerCategory::EmptySubModel));
        assert!(!ledger.has(LedgerCategory::MalformedLine));
        assert_eq!(ledger.count(Severity::Warning), 1);
    }
}
