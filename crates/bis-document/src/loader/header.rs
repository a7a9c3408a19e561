//! Header scan and repair.
//!
//! An LDraw model starts with a header block: a description comment, then
//! `0 Name:`, `0 Author:` and optional `!CATEGORY` / `!LDRAW_ORG` lines. The
//! block ends at the first line that is neither a header nor a comment.

use std::path::Path;

use bis_model::{
    LedgerCategory, LedgerEntry, MetaCommand, Severity, SubModelMeta, UnofficialType,
};

use crate::config::DocumentConfig;

/// What the header scan found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct HeaderScan {
    pub meta: SubModelMeta,
    pub unofficial: UnofficialType,
    pub display_model: bool,
    /// Placeholder lines inserted at the top.
    pub inserted: usize,
}

/// Scan the header of `lines`, inserting placeholders for missing entries
/// when the configuration asks for it.
pub(crate) fn scan_header(
    name: &str,
    lines: &mut Vec<String>,
    config: &DocumentConfig,
    ledger: &mut Vec<LedgerEntry>,
) -> HeaderScan {
    let mut scan = HeaderScan::default();
    let mut in_header = true;
    let mut description_at = None;
    let mut name_at = None;

    for (number, line) in lines.iter().enumerate() {
        let command = MetaCommand::parse(line);
        let is_blank = line.trim().is_empty();
        if in_header && !is_blank && !command.as_ref().is_some_and(MetaCommand::is_header) {
            in_header = false;
        }

        // Headers past the header block count as present but empty.
        let value = |text: &String| if in_header { text.clone() } else { String::new() };
        match &command {
            Some(MetaCommand::Comment(text))
                if in_header && scan.meta.description.is_none() && !text.is_empty() =>
            {
                scan.meta.description = Some(text.clone());
                description_at = Some(number);
            }
            Some(MetaCommand::Name(text)) if scan.meta.name.is_none() => {
                scan.meta.name = Some(value(text));
                name_at = Some(number);
            }
            Some(MetaCommand::Author(text)) if scan.meta.author.is_none() => {
                scan.meta.author = Some(value(text));
            }
            Some(MetaCommand::Category(text)) if scan.meta.category.is_none() => {
                scan.meta.category = Some(value(text));
            }
            Some(MetaCommand::LDrawOrg(kind)) => scan.unofficial = *kind,
            Some(MetaCommand::DisplayModel) => scan.display_model = true,
            _ => {}
        }
    }

    let missing = |what: &str| {
        LedgerEntry::new(
            Severity::Warning,
            LedgerCategory::MissingHeader,
            format!("missing {what} header"),
        )
        .in_model(name)
    };

    let repair = config.insert_missing_headers;
    let mut insert_at = 0;

    if scan.meta.description.is_none() {
        ledger.push(missing("description"));
        if repair {
            let stem = Path::new(name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            lines.insert(0, format!("0 {stem}"));
            scan.meta.description = Some(stem);
            scan.inserted += 1;
            name_at = name_at.map(|at| at + 1);
            insert_at = 1;
        }
    } else if let Some(at) = description_at {
        insert_at = at + 1;
    }

    if scan.meta.name.is_none() {
        ledger.push(missing("Name:"));
        if repair {
            lines.insert(insert_at, format!("0 Name: {name}"));
            scan.meta.name = Some(name.to_string());
            scan.inserted += 1;
            name_at = Some(insert_at);
        }
    }

    if scan.meta.author.is_none() {
        ledger.push(missing("Author:"));
        if repair {
            let at = name_at.map_or(insert_at, |at| at + 1);
            lines.insert(at, format!("0 Author: {}", config.default_author));
            scan.meta.author = Some(config.default_author.clone());
            scan.inserted += 1;
        }
    }

    if scan.meta.category.is_none() {
        ledger.push(
            LedgerEntry::new(
                Severity::Info,
                LedgerCategory::MissingCategory,
                "no !CATEGORY header",
            )
            .in_model(name),
        );
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_complete_header() {
        let mut body = lines(
            "0 Red car\n0 Name: car.ldr\n0 Author: Jane\n0 !CATEGORY Vehicle\n0 !LDRAW_ORG Unofficial_Model\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat",
        );
        let mut ledger = Vec::new();
        let scan = scan_header("car.ldr", &mut body, &DocumentConfig::default(), &mut ledger);

        assert_eq!(scan.meta.description.as_deref(), Some("Red car"));
        assert_eq!(scan.meta.name.as_deref(), Some("car.ldr"));
        assert_eq!(scan.meta.author.as_deref(), Some("Jane"));
        assert_eq!(scan.meta.category.as_deref(), Some("Vehicle"));
        assert_eq!(scan.unofficial, UnofficialType::Model);
        assert_eq!(scan.inserted, 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_missing_headers_are_inserted() {
        let mut body = lines("1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat");
        let mut ledger = Vec::new();
        let config = DocumentConfig::default().with_default_author("Builder");
        let scan = scan_header("wheel.ldr", &mut body, &config, &mut ledger);

        assert_eq!(
            body,
            [
                "0 wheel",
                "0 Name: wheel.ldr",
                "0 Author: Builder",
                "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"
            ]
        );
        assert_eq!(scan.inserted, 3);
        let headers = ledger
            .iter()
            .filter(|e| e.category == LedgerCategory::MissingHeader)
            .count();
        assert_eq!(headers, 3);
        assert!(ledger.iter().any(|e| e.category == LedgerCategory::MissingCategory
            && e.severity == Severity::Info));
    }

    #[test]
    fn test_author_goes_after_existing_name() {
        let mut body = lines("0 Wheel\n0 Name: wheel.ldr\n0 !CATEGORY Wheel\n0 STEP");
        let mut ledger = Vec::new();
        scan_header("wheel.ldr", &mut body, &DocumentConfig::default(), &mut ledger);
        assert_eq!(body[2], "0 Author: Unknown");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_late_header_is_present_but_empty() {
        let mut body = lines("0 Wheel\n0 Name: wheel.ldr\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 Author: Late");
        let mut ledger = Vec::new();
        let scan = scan_header("wheel.ldr", &mut body, &DocumentConfig::default(), &mut ledger);
        assert_eq!(scan.meta.author.as_deref(), Some(""));
        assert_eq!(body.len(), 4);
        assert!(!ledger.iter().any(|e| e.category == LedgerCategory::MissingHeader));
    }

    #[test]
    fn test_no_repair_leaves_lines_alone() {
        let mut body = lines("0 STEP");
        let mut ledger = Vec::new();
        let config = DocumentConfig::default().without_header_repair();
        let scan = scan_header("x.ldr", &mut body, &config, &mut ledger);
        assert_eq!(body, ["0 STEP"]);
        assert!(scan.meta.name.is_none());
        assert_eq!(ledger.len(), 4);
    }
}
