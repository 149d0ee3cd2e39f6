//! Command-line interface for the bab asset builder.
//!
//! Provides the `bab` binary with subcommands:
//! - `bab build`: compile an asset declaration tree into a stream
//! - `bab hash`: print the hash the builder assigns to a string

#![warn(missing_docs)]

mod build;
mod hash;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Incremental asset builder: XML asset declarations to binary streams.
#[derive(Parser, Debug)]
#[command(name = "bab", version, about = "Incremental XML asset builder")]
pub struct Cli {
    /// Suppress everything except warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Color output control.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a `bab.toml` settings file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the stream generated by an input document.
    Build(BuildArgs),
    /// Print the hash of a string.
    Hash(HashArgs),
}

/// Arguments for the `bab build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// The root asset declaration document.
    pub input: PathBuf,

    /// Output directory, overriding the settings file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Asset schema, overriding `paths.schema_path`.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Named build configuration to apply.
    #[arg(long)]
    pub configuration: Option<String>,

    /// Target platform (`all`, `win32`, `xenon`, `ps3`).
    #[arg(long)]
    pub platform: Option<String>,

    /// `0` reports missing references as warnings; higher makes them fatal.
    #[arg(long)]
    pub error_level: Option<u32>,

    /// Produce linked stream files.
    #[arg(long)]
    pub linked: bool,

    /// Use the stable, patch-friendly output order.
    #[arg(long)]
    pub stable_sort: bool,

    /// Print the build summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `bab hash` subcommand.
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// The text to hash.
    pub text: String,

    /// Hash the text as given instead of its lowercase form.
    #[arg(long)]
    pub case_sensitive: bool,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a settings file.
    pub config: Option<PathBuf>,
}

/// The default log filter for the given verbosity flags.
fn default_filter(quiet: bool, verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

fn init_tracing(global: &GlobalArgs) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(global.quiet, global.verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Hash(ref args) => hash::run(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
