//! Splitting a file's lines into submodels.
//!
//! `0 FILE` and `0 !DATA` open a submodel, `0 NOFILE` closes one. LDR files
//! without markers form a single model named after the file, except that a
//! `0 Name:` header after geometry starts a new inline submodel. Lines outside
//! any submodel are kept with the previous one so nothing is lost on save.

use bis_model::{LedgerCategory, LedgerEntry, LineType, MetaCommand, Severity};

use crate::registry::Framing;

/// A submodel as cut from the file, before header repair and registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawModel {
    pub name: String,
    pub lines: Vec<String>,
    pub framing: Option<Framing>,
    pub data: bool,
    /// Lines after the submodel that belong to no submodel.
    pub trailer: Vec<String>,
    /// File line of the first content line.
    pub first_line: usize,
    has_geometry: bool,
}

impl RawModel {
    fn new(name: impl Into<String>, first_line: usize) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
            framing: None,
            data: false,
            trailer: Vec::new(),
            first_line,
            has_geometry: false,
        }
    }

    fn framed(name: String, marker: String, number: usize, data: bool) -> Self {
        let mut model = Self::new(name, number + 1);
        model.framing = Some(Framing::new(marker));
        model.data = data;
        model
    }

    fn push(&mut self, line: String) {
        if LineType::of(&line).is_ok_and(LineType::is_geometry) {
            self.has_geometry = true;
        }
        self.lines.push(line);
    }

    /// Move trailing stray lines into the framing, or the body when unframed.
    pub fn into_parts(mut self) -> (String, Vec<String>, Option<Framing>) {
        match self.framing.as_mut() {
            Some(framing) => framing.trailer = self.trailer,
            None => self.lines.extend(self.trailer),
        }
        (self.name, self.lines, self.framing)
    }
}

/// Result of splitting one file.
#[derive(Debug, Default)]
pub(crate) struct FileSplit {
    pub mpd: bool,
    /// Lines before the first submodel.
    pub preamble: Vec<String>,
    pub models: Vec<RawModel>,
    pub ledger: Vec<LedgerEntry>,
}

impl FileSplit {
    fn close(&mut self, model: Option<RawModel>) {
        if let Some(model) = model {
            self.models.push(model);
        }
    }

    fn outside(&mut self, line: String, number: usize) {
        if !line.trim().is_empty() {
            let mut entry = LedgerEntry::new(
                Severity::Warning,
                LedgerCategory::StrayContent,
                format!("line outside any submodel: {}", line.trim()),
            )
            .at_line(number);
            if let Some(previous) = self.models.last() {
                entry = entry.in_model(&previous.name);
            }
            self.ledger.push(entry);
        }
        match self.models.last_mut() {
            Some(previous) => previous.trailer.push(line),
            None => self.preamble.push(line),
        }
    }
}

/// A document is MPD when its first non-blank line is a `0 FILE` marker.
pub(crate) fn is_mpd(lines: &[String]) -> bool {
    lines
        .iter()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| matches!(MetaCommand::parse(line), Some(MetaCommand::File(_))))
}

/// Split decoded lines into submodels. `top_name` names an unframed first model.
pub(crate) fn split_models(lines: Vec<String>, top_name: &str) -> FileSplit {
    let mut split = FileSplit {
        mpd: is_mpd(&lines),
        ..FileSplit::default()
    };
    let mut current: Option<RawModel> = None;

    for (number, line) in lines.into_iter().enumerate() {
        let meta = MetaCommand::parse(&line);
        match meta {
            Some(MetaCommand::File(name)) => {
                split.close(current.take());
                current = Some(RawModel::framed(name, line, number, false));
                continue;
            }
            Some(MetaCommand::Data(name)) => {
                split.close(current.take());
                current = Some(RawModel::framed(name, line, number, true));
                continue;
            }
            Some(MetaCommand::NoFile) => {
                match current.take() {
                    Some(mut model) => {
                        match model.framing.as_mut() {
                            Some(framing) => framing.nofile = Some(line),
                            None => model.push(line),
                        }
                        split.close(Some(model));
                    }
                    None => split.outside(line, number),
                }
                continue;
            }
            _ => {}
        }

        let Some(model) = current.as_mut() else {
            if split.mpd || !split.models.is_empty() {
                split.outside(line, number);
            } else {
                let mut top = RawModel::new(top_name, number);
                top.push(line);
                current = Some(top);
            }
            continue;
        };

        if model.data {
            if matches!(meta, Some(MetaCommand::DataLine(_))) {
                model.push(line);
            } else {
                split.close(current.take());
                split.outside(line, number);
            }
            continue;
        }

        // Inline submodel boundary: only in LDR files, never inside a FILE block.
        if !split.mpd
            && model.framing.is_none()
            && model.has_geometry
            && let Some(MetaCommand::Name(name)) = &meta
            && !name.is_empty()
        {
            let mut next = RawModel::new(name.clone(), number);
            if model
                .lines
                .last()
                .is_some_and(|last| matches!(MetaCommand::parse(last), Some(MetaCommand::Comment(text)) if !text.is_empty()))
                && let Some(description) = model.lines.pop()
            {
                next.first_line = number - 1;
                next.push(description);
            }
            next.push(line);
            split.close(current.replace(next));
            continue;
        }

        model.push(line);
    }

    split.close(current);
    split
}
