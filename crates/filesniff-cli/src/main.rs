use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use filesniff_core::{
    Backend, DetectorMode, ExitCode, Magic, SniffConfig, SniffError, format_version,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "filesniff",
    about = "Identify file and stream contents with libmagic",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    /// Also enabled by setting FILESNIFF_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Magic database to load instead of the configured or built-in one.
    #[arg(long, short = 'm', global = true, value_name = "PATH")]
    magic_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe contents in human readable form ("ASCII text").
    Describe {
        /// Files to inspect; `-` reads standard input.
        #[arg(required = true)]
        paths: Vec<String>,
        /// Do not prefix results with the file name.
        #[arg(long, short)]
        brief: bool,
    },

    /// Print the MIME type and charset ("text/plain; charset=us-ascii").
    Mime {
        /// Files to inspect; `-` reads standard input.
        #[arg(required = true)]
        paths: Vec<String>,
        /// Do not prefix results with the file name.
        #[arg(long, short)]
        brief: bool,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check that libmagic and its database can be used.
    Doctor,

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Print the config file location.
    Path,
    /// Set one value in the config file; an empty value clears a path.
    Set {
        /// Key as shown by `config list`, e.g. `detection.decompress`.
        key: String,
        value: String,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    init_tracing();

    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("filesniff: {e:#}");
            e.downcast_ref::<SniffError>()
                .map(ExitCode::from)
                .unwrap_or(ExitCode::GeneralError)
        }
    };
    std::process::exit(code as i32);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FILESNIFF_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let start = Instant::now();
    let json_output = cli.json || std::env::var("FILESNIFF_JSON").as_deref() == Ok("1");

    let mut config = SniffConfig::load()?;
    apply_overrides(&mut config, cli.magic_file.as_deref());
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Describe { paths, brief } => {
            query_all(&config, DetectorMode::Description, &paths, brief, json_output, start)
        }

        Commands::Mime { paths, brief } => {
            query_all(&config, DetectorMode::Mime, &paths, brief, json_output, start)
        }

        Commands::Config { action } => {
            match action {
                ConfigAction::List => {
                    let kv = config.key_values();
                    if json_output {
                        let data: serde_json::Map<String, serde_json::Value> = kv
                            .into_iter()
                            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                            .collect();
                        print_json(&envelope(serde_json::Value::Object(data), start))?;
                    } else {
                        for (k, v) in kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Path => {
                    let path = SniffConfig::config_path();
                    if json_output {
                        print_json(&envelope(serde_json::json!({ "path": path }), start))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
                ConfigAction::Set { key, value } => {
                    // write back what is on disk, not the command-line overrides
                    let path = SniffConfig::config_path();
                    let mut stored = SniffConfig::load_from(&path)?;
                    stored.set(&key, &value)?;
                    stored.save_to(&path)?;
                    if json_output {
                        print_json(&envelope(
                            serde_json::json!({ "key": key, "value": value, "path": path }),
                            start,
                        ))?;
                    } else {
                        println!("{key} = {value}");
                    }
                }
            }
            Ok(ExitCode::Success)
        }

        Commands::Doctor => doctor(&config),

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            let native = Magic::from_config(&config)
                .ok()
                .and_then(|m| m.native_version())
                .map(format_version);
            if json_output {
                print_json(&envelope(
                    serde_json::json!({ "version": version, "libmagic": native }),
                    start,
                ))?;
            } else {
                match native {
                    Some(v) => println!("filesniff v{version} (libmagic {v})"),
                    None => println!("filesniff v{version}"),
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

fn apply_overrides(config: &mut SniffConfig, magic_file: Option<&Path>) {
    if let Some(db) = magic_file {
        config.magic.database_path = Some(db.to_path_buf());
    }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

fn query_all(
    config: &SniffConfig,
    mode: DetectorMode,
    paths: &[String],
    brief: bool,
    json_output: bool,
    start: Instant,
) -> Result<ExitCode> {
    let magic = Magic::from_config(config)?;
    let stdin = StdinCache::new(std::io::stdin().lock());
    let code = query_with(&magic, mode, paths, brief, json_output, start, stdin)?;
    magic.close();
    Ok(code)
}

fn query_with<B: Backend, R: Read>(
    magic: &Magic<B>,
    mode: DetectorMode,
    paths: &[String],
    brief: bool,
    json_output: bool,
    start: Instant,
    mut stdin: StdinCache<R>,
) -> Result<ExitCode> {
    let mut items = Vec::with_capacity(paths.len());
    let mut failed = 0usize;

    for input in paths {
        match classify(magic, mode, input, &mut stdin) {
            Ok(result) => {
                if json_output {
                    items.push(serde_json::json!({ "path": input, "result": result }));
                } else {
                    println!("{}", render_line(input, &result, brief));
                }
            }
            // the detector itself is unusable; every other input would fail the same way
            Err(e @ (SniffError::Initialization(_) | SniffError::LibraryNotFound(_))) => {
                return Err(e.into());
            }
            Err(e) => {
                failed += 1;
                if json_output {
                    items.push(serde_json::json!({ "path": input, "error": e.to_string() }));
                } else {
                    eprintln!("{input}: {e}");
                }
            }
        }
    }

    if json_output {
        let status = if failed == 0 { "ok" } else { "partial" };
        let mut out = envelope(
            serde_json::json!({ "mode": mode.to_string(), "items": items, "failed": failed }),
            start,
        );
        out["status"] = serde_json::Value::from(status);
        print_json(&out)?;
    }

    Ok(if failed == 0 {
        ExitCode::Success
    } else {
        ExitCode::DetectionFailed
    })
}

/// Standard input, read on the first `-` and replayed for every later one.
struct StdinCache<R> {
    reader: R,
    bytes: Option<Vec<u8>>,
}

impl<R: Read> StdinCache<R> {
    fn new(reader: R) -> Self {
        Self { reader, bytes: None }
    }

    fn bytes(&mut self) -> std::io::Result<&[u8]> {
        if self.bytes.is_none() {
            let mut buf = Vec::new();
            self.reader.read_to_end(&mut buf)?;
            self.bytes = Some(buf);
        }
        Ok(self.bytes.as_deref().unwrap_or_default())
    }
}

fn classify<B: Backend, R: Read>(
    magic: &Magic<B>,
    mode: DetectorMode,
    input: &str,
    stdin: &mut StdinCache<R>,
) -> filesniff_core::Result<String> {
    if input == "-" {
        let buf = stdin.bytes()?;
        return match mode {
            DetectorMode::Description => magic.describe_contents(buf),
            DetectorMode::Mime => magic.checktype_contents(buf),
        };
    }

    let path = Path::new(input);
    match mode {
        DetectorMode::Description => magic.describe_filename(path),
        DetectorMode::Mime => magic.checktype_filename(path),
    }
}

fn render_line(input: &str, result: &str, brief: bool) -> String {
    if brief {
        result.to_string()
    } else if input == "-" {
        format!("/dev/stdin: {result}")
    } else {
        format!("{input}: {result}")
    }
}

// ─── Doctor ──────────────────────────────────────────────────────────────────

fn doctor(config: &SniffConfig) -> Result<ExitCode> {
    let config_path = SniffConfig::config_path();
    if config_path.exists() {
        println!("✓ Config: {}", config_path.display());
    } else {
        println!("○ Config: not found (using defaults)");
    }

    let magic = match Magic::from_config(config) {
        Ok(m) => m,
        Err(e) => {
            println!("✗ Setup: {e}");
            return Ok(ExitCode::from(&e));
        }
    };

    let location = magic.library_location().unwrap_or("unknown");
    match magic.native_version() {
        Some(v) => println!("✓ libmagic: {location} (version {})", format_version(v)),
        None => println!("✓ libmagic: {location} (version unknown)"),
    }

    match magic.database_path() {
        Some(db) => println!("✓ Database: {}", db.display()),
        None => println!("○ Database: libmagic default"),
    }

    let mut issues = 0;
    for (mode, outcome) in [
        (DetectorMode::Description, magic.describe_contents(b"hello world\n")),
        (DetectorMode::Mime, magic.checktype_contents(b"hello world\n")),
    ] {
        match outcome {
            Ok(answer) => println!("✓ Sample query ({mode}): {answer}"),
            Err(e) => {
                issues += 1;
                println!("✗ Sample query ({mode}): {e}");
            }
        }
    }

    if issues == 0 {
        println!("\nAll checks passed.");
        Ok(ExitCode::Success)
    } else {
        println!("\n{issues} issue(s) found.");
        Ok(ExitCode::InitializationFailed)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn envelope(data: serde_json::Value, start: Instant) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "data": data,
        "meta": { "duration_ms": start.elapsed().as_millis() as u64 }
    })
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(val).context("failed to encode JSON output")?
    );
    Ok(())
}
