//! CLI argument definitions for the `bis` tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "bis",
    version,
    about = "Brick Instruction Studio - inspect and resave LDraw/MPD documents",
    long_about = "Load an LDraw/MPD document, index its submodels, steps and build \
                  modifications, and report what was found.\n\n\
                  Unresolved references are looked up in the document's directory \
                  and any --search-dir given."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a document and summarize its submodels and load problems.
    Inspect(InspectArgs),

    /// List the counted steps of a document in build order.
    Steps(StepsArgs),

    /// Load a document and write it back out.
    Resave(ResaveArgs),
}

/// Options shared by every command that opens a document.
#[derive(Args, Clone, Default)]
pub struct DocumentArgs {
    /// The `.ldr`, `.mpd` or `.dat` file to open.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// TOML file with document options (author, header repair, includes).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Extra directory searched for unresolved submodel files (repeatable).
    #[arg(long = "search-dir", value_name = "DIR")]
    pub search_dirs: Vec<PathBuf>,

    /// Piece list file: one known part name per line, `#` starts a comment.
    #[arg(long = "library", value_name = "PATH")]
    pub library: Option<PathBuf>,

    /// Directory that receives images decoded from `!DATA` blocks.
    #[arg(long = "texture-dir", value_name = "DIR")]
    pub texture_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Also list every build modification.
    #[arg(long = "build-mods")]
    pub build_mods: bool,
}

#[derive(Args)]
pub struct StepsArgs {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Only list the steps of this submodel.
    #[arg(long = "model", value_name = "NAME")]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct ResaveArgs {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Where to write the document (default: overwrite FILE).
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
