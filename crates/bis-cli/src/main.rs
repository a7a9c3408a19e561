//! Brick Instruction Studio CLI.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;

use bis_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use bis_cli::commands::{run_inspect, run_resave, run_steps};
use bis_cli::logging::{LogConfig, LogFormat, init_logging};
use bis_cli::summary::{print_inspect, print_resave, print_steps};

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        return ExitCode::FAILURE;
    }
    let outcome = match &cli.command {
        Command::Inspect(args) => run_inspect(args).map(|loaded| {
            print_inspect(&loaded, args.build_mods);
            loaded.has_errors()
        }),
        Command::Steps(args) => run_steps(args).map(|loaded| {
            print_steps(&loaded, args.model.as_deref());
            false
        }),
        Command::Resave(args) => run_resave(args).map(|result| {
            print_resave(&result);
            false
        }),
    };
    match outcome {
        Ok(false) => ExitCode::SUCCESS,
        // Loaded, but the ledger holds errors.
        Ok(true) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
