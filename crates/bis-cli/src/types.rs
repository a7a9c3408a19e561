use std::path::PathBuf;

use bis_document::{Document, LoadSummary};

/// A loaded document together with what the load reported.
#[derive(Debug)]
pub struct LoadedDocument {
    pub document: Document,
    pub summary: LoadSummary,
}

impl LoadedDocument {
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }
}

#[derive(Debug)]
pub struct ResaveResult {
    pub loaded: LoadedDocument,
    pub output: PathBuf,
}
