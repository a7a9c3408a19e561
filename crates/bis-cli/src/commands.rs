use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, info_span};

use bis_document::{
    DirectorySearchPaths, DirectoryTextureWriter, Document, DocumentConfig, Services,
    StaticPieceLibrary,
};

use crate::cli::{DocumentArgs, InspectArgs, ResaveArgs, StepsArgs};
use crate::types::{LoadedDocument, ResaveResult};

/// Read document options from a TOML file; absent keys keep their defaults.
pub fn load_config(path: Option<&Path>) -> Result<DocumentConfig> {
    let Some(path) = path else {
        return Ok(DocumentConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
}

pub fn build_services(args: &DocumentArgs) -> Result<Services> {
    let mut services = Services::default()
        .with_search_paths(Arc::new(DirectorySearchPaths::new(args.search_dirs.clone())));
    if let Some(path) = &args.library {
        let library = StaticPieceLibrary::from_list_file(path)
            .with_context(|| format!("read piece list {}", path.display()))?;
        debug!(pieces = library.len(), "piece list loaded");
        services = services.with_library(Arc::new(library));
    }
    if let Some(dir) = &args.texture_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("create texture directory {}", dir.display()))?;
        services = services.with_textures(Arc::new(DirectoryTextureWriter::new(dir.clone())));
    }
    Ok(services)
}

pub fn open_document(args: &DocumentArgs, config: DocumentConfig) -> Result<LoadedDocument> {
    let services = build_services(args)?;
    let mut document = Document::new(config, services);
    let summary = document
        .load_file(&args.file)
        .map_err(|error| anyhow!(error.user_message()))?;
    Ok(LoadedDocument { document, summary })
}

pub fn run_inspect(args: &InspectArgs) -> Result<LoadedDocument> {
    let span = info_span!("inspect", file = %args.document.file.display());
    let _guard = span.enter();
    let config = load_config(args.document.config.as_deref())?;
    open_document(&args.document, config)
}

pub fn run_steps(args: &StepsArgs) -> Result<LoadedDocument> {
    let span = info_span!("steps", file = %args.document.file.display());
    let _guard = span.enter();
    let config = load_config(args.document.config.as_deref())?;
    let loaded = open_document(&args.document, config)?;
    if let Some(model) = &args.model
        && loaded.document.submodel(model).is_none()
    {
        return Err(anyhow!("no submodel named {model} in {}", args.document.file.display()));
    }
    Ok(loaded)
}

pub fn run_resave(args: &ResaveArgs) -> Result<ResaveResult> {
    let span = info_span!("resave", file = %args.document.file.display());
    let _guard = span.enter();
    let config = load_config(args.document.config.as_deref())?;
    let mut loaded = open_document(&args.document, config)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.document.file.clone());
    loaded
        .document
        .save_file(&output)
        .map_err(|error| anyhow!(error.user_message()))?;
    info!(output = %output.display(), "document resaved");
    Ok(ResaveResult { loaded, output })
}
