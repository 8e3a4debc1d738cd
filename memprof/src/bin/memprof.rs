//! Convert a device heap snapshot to a developer-tool document.
//!
//! The source map argument is either the device's own Source Map v3 or an
//! application bundle manifest carrying `sourceMaps.device.<device_type>`.
//!
//! # Usage
//!
//! ```bash
//! memprof device.heap app.json device.heapsnapshot atlas
//! memprof device.heap app.json device.gexf atlas --format gexf
//! RUST_LOG=memprof=debug memprof device.heap app.map out.heapsnapshot atlas
//! ```

use clap::Parser;
use memprof::convert::{OutputFormat, SnapshotConverter};
use memprof::sourcemap::SourceMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "memprof")]
#[command(about = "Convert device heap snapshots to V8 heap snapshots or GEXF graphs")]
#[command(version)]
struct Args {
    /// Heap snapshot dumped by the device
    snapshot: PathBuf,

    /// Source map JSON, or a bundle manifest with per-device source maps
    sourcemap: PathBuf,

    /// Output file
    output: PathBuf,

    /// Device type whose source map should be used
    device_type: String,

    /// Output format: v8 (alias heapsnapshot) or gexf
    #[arg(short, long, default_value = "v8")]
    format: String,

    /// Encoding of the input snapshot
    #[arg(long, default_value = "jerryscript-1")]
    snapshot_format: String,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let format: OutputFormat = args.format.parse()?;

    let map_data = fs::read(&args.sourcemap).map_err(|e| {
        format!(
            "Failed to read source map '{}': {}",
            args.sourcemap.display(),
            e
        )
    })?;
    let source_map = SourceMap::for_device(&map_data, &args.device_type)?;

    let input_file = File::open(&args.snapshot).map_err(|e| {
        format!(
            "Failed to open input file '{}': {}",
            args.snapshot.display(),
            e
        )
    })?;

    let mut converter = SnapshotConverter::new(&source_map);
    converter.parse(BufReader::new(input_file), &args.snapshot_format)?;

    let output_file = File::create(&args.output).map_err(|e| {
        format!(
            "Failed to create output file '{}': {}",
            args.output.display(),
            e
        )
    })?;
    let mut writer = BufWriter::new(output_file);
    converter.write(format, &mut writer)?;
    writer.flush()?;

    eprintln!(
        "Converted '{}' -> '{}'",
        args.snapshot.display(),
        args.output.display()
    );

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
