//! Document writer.
//!
//! Rendering is the inverse of splitting: every submodel is written with the
//! framing it was read with, so an unmodified document comes back byte for
//! byte once [`encode`] applies the original text layout. Generated
//! submodels, and unframed ones inside an MPD file, get a synthesized
//! `0 FILE` / `0 NOFILE` block followed by one blank line.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bis_model::SubModelSource;

use crate::error::{DocumentError, Result};
use crate::loader::{FileLayout, encode};
use crate::registry::{SubModel, SubModelRegistry};

/// Render `models` in order as the lines of one file.
pub fn render_models<'a, I>(models: I, layout: &FileLayout) -> Vec<String>
where
    I: IntoIterator<Item = &'a SubModel>,
{
    let mut lines = layout.preamble.clone();
    for model in models {
        match &model.framing {
            Some(framing) => {
                lines.push(framing.marker.clone());
                lines.extend(model.contents.iter().cloned());
                lines.extend(framing.nofile.iter().cloned());
                lines.extend(framing.trailer.iter().cloned());
            }
            None if layout.mpd || model.flags.generated => {
                lines.push(format!("0 FILE {}", model.name));
                lines.extend(model.contents.iter().cloned());
                lines.push("0 NOFILE".to_string());
                lines.push(String::new());
            }
            None => lines.extend(model.contents.iter().cloned()),
        }
    }
    lines
}

/// Lines of the main document: every model loaded from it or generated.
pub fn render_main(registry: &SubModelRegistry, layout: &FileLayout) -> Vec<String> {
    render_models(registry.iter().filter(|model| model.is_main()), layout)
}

/// Lines of one external file.
pub fn render_external(registry: &SubModelRegistry, path: &Path, layout: &FileLayout) -> Vec<String> {
    render_models(
        registry
            .iter()
            .filter(|model| matches!(&model.source, SubModelSource::External(p) if p == path)),
        layout,
    )
}

/// External files with at least one submodel changed since the last save.
pub fn changed_external_files(registry: &SubModelRegistry) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = registry
        .iter()
        .filter(|model| model.flags.changed_since_write)
        .filter_map(|model| match &model.source {
            SubModelSource::External(path) => Some(path.clone()),
            _ => None,
        })
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Render and write a file in its original text layout.
pub fn write_lines(path: &Path, lines: &[String], layout: &FileLayout) -> Result<()> {
    write_atomic(path, &encode(lines, layout.format))
}

/// Write bytes to `path` through a temp file and a rename, so a crash
/// never leaves a half-written document behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let extension = path
        .extension()
        .map(|ext| format!("{}.tmp", ext.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let temp_path = path.with_extension(extension);

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DocumentError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut file = File::create(&temp_path).map_err(|e| DocumentError::Io {
        operation: "create",
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(bytes).map_err(|e| DocumentError::Io {
        operation: "write",
        path: temp_path.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| DocumentError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source: e,
    })?;

    fs::rename(&temp_path, path).map_err(|e| DocumentError::AtomicWriteFailed {
        temp_path: temp_path.clone(),
        target_path: path.to_path_buf(),
        source: e,
    })?;

    tracing::info!("Saved document to {}", path.display());
    Ok(())
}
