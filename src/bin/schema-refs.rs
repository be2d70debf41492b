//! Schema Refs CLI
//!
//! Command-line interface for dereferencing and bundling `$ref`s.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use schema_refs::{bundle, dereference, Circular, Options, Settings};
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "schema-refs")]
#[command(about = "Dereference and bundle JSON Schema / OpenAPI $refs")]
#[command(version)]
struct Cli {
    /// Log progress to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every $ref with the value it points to
    Dereference {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Inline external $refs so the document is self-contained
    Bundle {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Schema source: file path or URL (http:// or https://)
    source: String,

    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Options file (YAML or JSON); flags given on the command line win
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to do with circular $refs [default: allow]
    #[arg(long, value_enum)]
    circular: Option<CircularArg>,

    /// Leave $refs to other files untouched
    #[arg(long)]
    no_external: bool,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Extra HTTP header as NAME:VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CircularArg {
    Allow,
    Forbid,
    Ignore,
}

impl From<CircularArg> for Circular {
    fn from(arg: CircularArg) -> Self {
        match arg {
            CircularArg::Allow => Circular::Allow,
            CircularArg::Forbid => Circular::Forbid,
            CircularArg::Ignore => Circular::Ignore,
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{s}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Dereference { common } => run_dereference(&common),
        Commands::Bundle { common } => run_bundle(&common),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn load_settings(path: &Path) -> Result<Settings, u8> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error reading config {}: {}", path.display(), e);
        3u8
    })?;
    // YAML is a superset of JSON
    serde_yaml::from_str(&content).map_err(|e| {
        eprintln!("Error parsing config {}: {}", path.display(), e);
        2u8
    })
}

fn build_options(args: &CommonArgs) -> Result<Options, u8> {
    let mut options = Options::new();
    if let Some(path) = &args.config {
        options = options.settings(&load_settings(path)?);
    }
    if let Some(circular) = args.circular {
        options = options.circular(circular.into());
    }
    if args.no_external {
        options = options.external(false);
    }
    if let Some(secs) = args.timeout {
        options = options.timeout(Duration::from_secs(secs));
    }
    for (name, value) in &args.headers {
        options = options.header(name.clone(), value.clone());
    }
    tracing::debug!(?options, "options");
    Ok(options)
}

fn run_dereference(args: &CommonArgs) -> Result<(), u8> {
    let options = build_options(args)?;
    let result = dereference(&args.source, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    write_output(&result.to_value(), args)
}

fn run_bundle(args: &CommonArgs) -> Result<(), u8> {
    let options = build_options(args)?;
    let bundled = bundle(&args.source, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    write_output(&bundled, args)
}

fn write_output(value: &Value, args: &CommonArgs) -> Result<(), u8> {
    let json_output = if args.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
