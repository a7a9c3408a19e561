//! Include files, external files and reference resolution.

use std::fs;
use std::path::PathBuf;

use bis_model::{
    LedgerCategory, LedgerEntry, LineType, MetaCommand, Severity, SubModelSource, normalize_name,
};

use super::{FileLayout, Loader, Resolution, check_signature, decode};
use crate::registry::SubModel;

impl Loader<'_> {
    /// Read the first candidate path that exists.
    fn read_first(&mut self, name: &str) -> Option<(PathBuf, Vec<u8>)> {
        for path in self.candidates(name) {
            if !path.is_file() {
                continue;
            }
            match fs::read(&path) {
                Ok(bytes) => return Some((path, bytes)),
                Err(err) => self.push(LedgerEntry::new(
                    Severity::Warning,
                    LedgerCategory::NestedFile,
                    format!("could not read {}: {err}", path.display()),
                )),
            }
        }
        None
    }

    /// Load every `!LPUB INCLUDE` staged so far.
    pub(super) fn load_includes(&mut self) {
        let pending = std::mem::take(&mut self.includes);
        for (file, host) in pending {
            let mut chain = Vec::new();
            self.load_include(&file, &host, &mut chain);
        }
    }

    fn include_warning(&mut self, host: &str, message: String) {
        self.push(
            LedgerEntry::new(Severity::Warning, LedgerCategory::IncludeFile, message).in_model(host),
        );
    }

    fn load_include(&mut self, file: &str, host: &str, chain: &mut Vec<String>) {
        let key = normalize_name(file);
        if chain.contains(&key) {
            self.include_warning(host, format!("include file '{file}' includes itself"));
            return;
        }
        if chain.len() >= self.config.max_include_depth {
            self.include_warning(
                host,
                format!(
                    "include file '{file}' exceeds the nesting limit of {}",
                    self.config.max_include_depth
                ),
            );
            return;
        }
        if self.parsed.registry.contains(file) {
            return;
        }
        let Some((path, bytes)) = self.read_first(file) else {
            self.include_warning(host, format!("include file '{file}' not found"));
            return;
        };

        let (lines, _) = decode(&bytes);
        let mut kept = Vec::with_capacity(lines.len());
        let mut nested = Vec::new();
        for (number, line) in lines.into_iter().enumerate() {
            let rejected = match LineType::of(&line) {
                Ok(line_type) if line_type.is_geometry() => Some("geometry"),
                Err(_) => Some("an unknown line type"),
                Ok(_) => match MetaCommand::parse(&line) {
                    Some(MetaCommand::Substitute(_)) => Some("a substitution"),
                    Some(MetaCommand::Include(inner)) => {
                        nested.push(inner);
                        None
                    }
                    _ => None,
                },
            };
            match rejected {
                Some(what) => self.push(
                    LedgerEntry::new(
                        Severity::Warning,
                        LedgerCategory::IncludeFile,
                        format!("include files may not contain {what}; line skipped"),
                    )
                    .in_model(file)
                    .at_line(number),
                ),
                None => kept.push(line),
            }
        }

        let mut model = SubModel::new(file, kept).with_source(SubModelSource::Include(path));
        model.flags.include_file = true;
        self.parsed.registry.insert_model(model);
        tracing::debug!(file, host, "include file loaded");

        chain.push(key);
        for inner in nested {
            self.load_include(&inner, file, chain);
        }
        chain.pop();
    }

    /// Resolve staged references until none are left.
    pub(super) fn resolve_references(&mut self) {
        while let Some(staged) = self.staged.pop_front() {
            let key = normalize_name(&staged.name);
            if self.parsed.resolutions.contains_key(&key) {
                continue;
            }

            let resolution = if self.services.library.find_piece(&staged.name) {
                Resolution::Library
            } else if self.parsed.registry.contains(&staged.name) {
                Resolution::SubModel
            } else if let Some(path) = self
                .config
                .resolve_external_files
                .then(|| self.load_external(&staged.name))
                .flatten()
            {
                Resolution::External(path)
            } else if self.services.library.is_official(&staged.name) {
                Resolution::Official
            } else {
                self.push(
                    LedgerEntry::new(
                        Severity::Warning,
                        LedgerCategory::MissingReference,
                        format!("'{}' could not be found", staged.name),
                    )
                    .in_model(&staged.model)
                    .at_line(staged.line),
                );
                Resolution::Missing
            };
            tracing::trace!(name = %staged.name, ?resolution, "reference resolved");
            self.parsed.resolutions.insert(key, resolution);
        }
    }

    /// Load a referenced file from the project or search directories.
    fn load_external(&mut self, name: &str) -> Option<PathBuf> {
        let (path, bytes) = self.read_first(name)?;
        let (lines, format) = decode(&bytes);
        if let Err(err) = check_signature(&path, &lines) {
            self.push(LedgerEntry::new(
                Severity::Warning,
                LedgerCategory::NestedFile,
                err.to_string(),
            ));
            return None;
        }

        let source = SubModelSource::External(path.clone());
        let (mpd, preamble) = self.load_lines(lines, name, &source, 0);
        self.parsed.external.insert(
            path.clone(),
            FileLayout {
                format,
                mpd,
                preamble,
            },
        );
        self.load_includes();
        tracing::debug!(name, path = %path.display(), "external file loaded");
        Some(path)
    }
}
