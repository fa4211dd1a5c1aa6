use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, Level};

use evoscript::dsl::registry::Registry;
use evoscript::error::{AppError, AppResult};
use evoscript::model::CompileOutput;
use evoscript::settings::{self, CompilerSettings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "evoscript-cli", about = "Compile automation scripts to runtime config", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (JSON)
    #[arg(long, global = true, default_value = "evoscript.json")]
    config: PathBuf,

    /// More logging; repeat for trace output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and print `{document, errors}` as JSON
    Compile {
        /// Script file, or `-` for stdin
        file: PathBuf,
        /// Write the output here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
        /// Registry extension merged over the built-in tables
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Report diagnostics only
    Check {
        file: PathBuf,
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Print the effective registry as JSON
    Registry {
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Print the JSON Schema of the compiler output
    Schema,
}

// ── Entry point ──────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    let config = settings::load_settings(&cli.config).unwrap_or_default();
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        process::exit(2);
    }
    init_tracing(cli.verbose, config.log_level.as_deref());
    debug!(config = %cli.config.display(), "settings loaded");

    match run(cli.command, &cli.config, &config) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn init_tracing(verbose: u8, configured: Option<&str>) {
    let level = match verbose {
        0 => configured
            .and_then(|l| l.parse::<Level>().ok())
            .unwrap_or(Level::WARN),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Runs one subcommand; returns the process exit code.
fn run(command: Commands, config_path: &Path, config: &CompilerSettings) -> AppResult<i32> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    match command {
        Commands::Compile {
            file,
            out,
            pretty,
            registry,
        } => {
            let registry = load_registry(config, base_dir, registry.as_deref())?;
            let source = read_source(&file)?;
            let output = compile(&file, &source, &registry);
            let json = to_json(&output, pretty || config.pretty)?;
            match out {
                Some(path) => std::fs::write(&path, json).map_err(|e| AppError::io(path, e))?,
                None => println!("{json}"),
            }
            Ok(i32::from(!output.is_ok()))
        }
        Commands::Check { file, registry } => {
            let registry = load_registry(config, base_dir, registry.as_deref())?;
            let source = read_source(&file)?;
            let output = compile(&file, &source, &registry);
            if output.is_ok() {
                eprintln!("{}: ok", file.display());
            }
            Ok(i32::from(!output.is_ok()))
        }
        Commands::Registry { registry } => {
            let registry = load_registry(config, base_dir, registry.as_deref())?;
            println!("{}", to_json(&registry, true)?);
            Ok(0)
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(CompileOutput);
            println!("{}", to_json(&schema, true)?);
            Ok(0)
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn load_registry(
    config: &CompilerSettings,
    base_dir: &Path,
    extra: Option<&Path>,
) -> AppResult<Registry> {
    let mut registry = config.load_registry(base_dir)?;
    if let Some(path) = extra {
        registry.extend(settings::read_registry(path)?);
    }
    Ok(registry)
}

fn read_source(file: &Path) -> AppResult<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| AppError::io(file, e))?;
        return Ok(source);
    }
    std::fs::read_to_string(file).map_err(|e| AppError::io(file, e))
}

/// Compile, echoing any errors with their positions to stderr.
fn compile(file: &Path, source: &str, registry: &Registry) -> CompileOutput {
    let result = evoscript::compile_source(source, registry);
    if let Err(errors) = &result {
        for error in errors {
            eprintln!("{}: {}", file.display(), error.format_with_position());
        }
    }
    CompileOutput::from(result)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> AppResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
