//! Binary entry point for the symbol map maintenance CLI.
#![forbid(unsafe_code)]

#[path = "symmap/config.rs"]
mod config;

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use symmap::primitives::io::StdFileIo;
use symmap::symbols::SymbolMapHeader;
use symmap::{
    SymbolColumnDescriptor, SymbolKey, SymbolMapConfig, SymbolMapReader, SymbolMapWriter,
    Synchronous,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "symmap",
    version,
    about = "Create, inspect and maintain persistent symbol maps",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SYMMAP_ROOT",
        help = "Directory holding the symbol map files"
    )]
    root: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SYMMAP_CONFIG",
        help = "Path to a TOML config file"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Flush policy override")]
    synchronous: Option<SynchronousArg>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty symbol column
    Create {
        name: String,
        #[arg(long, default_value_t = 1024, help = "Expected number of distinct symbols")]
        capacity: u32,
        #[arg(long, help = "Record that writers should not keep a dedup cache")]
        no_cache: bool,
    },
    /// Append values (from arguments, or stdin lines when none are given)
    Append {
        name: String,
        values: Vec<String>,
        #[arg(
            long,
            conflicts_with = "no_cache",
            help = "Deduplicate even if the column was created without a cache"
        )]
        cache: bool,
        #[arg(long, help = "Append without deduplicating")]
        no_cache: bool,
    },
    /// Print the values stored under keys
    Get {
        name: String,
        #[arg(required = true, allow_negative_numbers = true)]
        keys: Vec<i32>,
    },
    /// Print the keys of values
    Lookup {
        name: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Discard every symbol with key >= COUNT
    Rollback { name: String, count: usize },
    /// Show header fields and sizes
    Info { name: String },
    /// Print every key and value
    Dump { name: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum SynchronousArg {
    Full,
    Normal,
    Off,
}

impl From<SynchronousArg> for Synchronous {
    fn from(value: SynchronousArg) -> Self {
        match value {
            SynchronousArg::Full => Synchronous::Full,
            SynchronousArg::Normal => Synchronous::Normal,
            SynchronousArg::Off => Synchronous::Off,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Entry<'a> {
    key: i32,
    value: Option<&'a str>,
}

#[derive(Serialize)]
struct InfoReport<'a> {
    name: &'a str,
    root: PathBuf,
    format_version: u16,
    capacity: u64,
    cached: bool,
    count: usize,
    offsets_bytes: u64,
    values_bytes: u64,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let file_config = CliConfig::load(cli.config.clone())?;
    if let Some(path) = &file_config.path {
        debug!(path = %path.display(), "cli.config");
    }
    let root = cli
        .root
        .clone()
        .or(file_config.root)
        .ok_or("no root directory; pass --root, set SYMMAP_ROOT or add `root` to the config file")?;
    let synchronous = cli
        .synchronous
        .or(file_config.synchronous)
        .map(Synchronous::from)
        .unwrap_or_default();
    let config = SymbolMapConfig::new(root).synchronous(synchronous);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Create {
            name,
            capacity,
            no_cache,
        } => {
            let descriptor = SymbolColumnDescriptor::new(name, capacity).cached(!no_cache);
            SymbolMapWriter::create(&config, &descriptor)?;
            if cli.format == OutputFormat::Text {
                writeln!(out, "created {} (capacity {capacity})", descriptor.name)?;
            } else {
                writeln!(
                    out,
                    "{}",
                    serde_json::json!({ "created": descriptor.name, "capacity": capacity })
                )?;
            }
        }
        Command::Append {
            name,
            values,
            cache,
            no_cache,
        } => {
            let use_cache = if cache || no_cache {
                cache
            } else {
                stored_cache_flag(&config, &name)?
            };
            let mut writer = SymbolMapWriter::resume(&config, &name, use_cache)?;
            let values = if values.is_empty() {
                io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?
            } else {
                values
            };
            let mut entries = Vec::with_capacity(values.len());
            for value in &values {
                let key = writer.append(value.as_str())?;
                entries.push(Entry {
                    key: key.0,
                    value: Some(value),
                });
            }
            writer.commit()?;
            writer.close()?;
            print_entries(&mut out, cli.format, &entries)?;
        }
        Command::Get { name, keys } => {
            let reader = SymbolMapReader::open(&config, &name, usize::MAX)?;
            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                entries.push(Entry {
                    key,
                    value: reader.value_of(key)?,
                });
            }
            print_entries(&mut out, cli.format, &entries)?;
        }
        Command::Lookup { name, values } => {
            let reader = SymbolMapReader::open(&config, &name, usize::MAX)?;
            let entries: Vec<_> = values
                .iter()
                .map(|value| Entry {
                    key: reader.key_of(value.as_str()).0,
                    value: Some(value),
                })
                .collect();
            print_entries(&mut out, cli.format, &entries)?;
        }
        Command::Rollback { name, count } => {
            let mut writer = SymbolMapWriter::resume(&config, &name, false)?;
            let before = writer.count();
            writer.rollback(count)?;
            writer.close()?;
            if cli.format == OutputFormat::Text {
                writeln!(out, "rolled back {name} from {before} to {count} symbols")?;
            } else {
                writeln!(
                    out,
                    "{}",
                    serde_json::json!({ "name": name, "from": before, "to": count })
                )?;
            }
        }
        Command::Info { name } => {
            let reader = SymbolMapReader::open(&config, &name, usize::MAX)?;
            let header = reader.header();
            let report = InfoReport {
                name: &name,
                root: config.root.clone(),
                format_version: header.format_version,
                capacity: header.capacity,
                cached: header.cached,
                count: reader.count(),
                offsets_bytes: std::fs::metadata(config.offsets_path(&name)?)?.len(),
                values_bytes: std::fs::metadata(config.values_path(&name)?)?.len(),
            };
            match cli.format {
                OutputFormat::Text => {
                    writeln!(out, "name            {}", report.name)?;
                    writeln!(out, "root            {}", report.root.display())?;
                    writeln!(out, "format version  {}", report.format_version)?;
                    writeln!(out, "capacity        {}", report.capacity)?;
                    writeln!(out, "cached          {}", report.cached)?;
                    writeln!(out, "symbols         {}", report.count)?;
                    writeln!(out, "offset bytes    {}", report.offsets_bytes)?;
                    writeln!(out, "value bytes     {}", report.values_bytes)?;
                }
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&report)?)?,
            }
        }
        Command::Dump { name } => {
            let reader = SymbolMapReader::open(&config, &name, usize::MAX)?;
            let mut entries = Vec::with_capacity(reader.count());
            for item in reader.iter() {
                let (key, value): (SymbolKey, &str) = item?;
                entries.push(Entry {
                    key: key.0,
                    value: Some(value),
                });
            }
            print_entries(&mut out, cli.format, &entries)?;
        }
    }
    Ok(())
}

/// Cache flag recorded in the column header at creation.
fn stored_cache_flag(config: &SymbolMapConfig, name: &str) -> symmap::Result<bool> {
    let path = config.offsets_path(name)?;
    let io = StdFileIo::open_read_only(&path)?;
    Ok(SymbolMapHeader::load(&io, &path)?.cached)
}

fn print_entries(
    out: &mut impl Write,
    format: OutputFormat,
    entries: &[Entry<'_>],
) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Text => {
            for entry in entries {
                writeln!(out, "{}\t{}", entry.key, entry.value.unwrap_or("<null>"))?;
            }
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(entries)?)?,
    }
    Ok(())
}
