//! Check a V8 heap snapshot document for internal consistency.
//!
//! Reads a `.heapsnapshot` (as written by `memprof` or Chrome DevTools),
//! verifies that node, edge and string references line up, and prints a
//! short summary. Exits 2 on a usage error and 1 on an invalid document.
//!
//! # Usage
//!
//! ```bash
//! heapsnapshot_validate device.heapsnapshot
//! ```

use memprof::heapcheck::ParsedSnapshot;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <file.heapsnapshot>", args[0]);
        return ExitCode::from(2);
    }

    let path = &args[1];

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let snapshot = match ParsedSnapshot::parse(BufReader::new(file)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Invalid heap snapshot '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    match snapshot.validate() {
        Ok(()) => {
            println!("Valid heap snapshot: {}", path);
            println!("  Nodes: {}", snapshot.nodes.len());
            println!("  Edges: {}", snapshot.edges.len());
            println!("  Strings: {}", snapshot.string_count());
            if snapshot.location_count() > 0 {
                println!("  Locations: {}", snapshot.location_count());
            }
            let total: u64 = snapshot.nodes.iter().map(|n| n.self_size).sum();
            println!("  Total self size: {}", total);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Invalid heap snapshot '{}': {}", path, e);
            ExitCode::FAILURE
        }
    }
}
