//! ROM to assembly listing CLI.
//!
//! # Usage
//! ```text
//! disassembler <input.rom> [OPTIONS]
//! ```
//!
//! Without `-o` the addressed listing (`AA: text`) is printed to stdout. With
//! `-o` plain source is written instead, which assembles back to the same ROM.
//!
//! # Options
//! - `-o, --output <file>`: Write re-assemblable source to `file`
//! - `-q, --quiet`: Only log errors

use robovm::utils::log::{self, Level};
use robovm::virtual_machine::decompiler::{decompile, to_source};
use robovm::virtual_machine::rom::Rom;
use robovm::{error, info};
use std::env;
use std::fs;
use std::process;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--quiet" | "-q" => {
                log::set_min_level(Some(Level::Error));
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let bytes = fs::read(input_path).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", input_path, e);
        process::exit(1);
    });
    let rom = Rom::from_bytes(&bytes).unwrap_or_else(|e| {
        error!("{}: {}", input_path, e);
        process::exit(1);
    });

    let lines = decompile(rom.bytes());

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, to_source(&lines)) {
                error!("Failed to write output file: {}", e);
                process::exit(1);
            }
            info!("Disassembled {} -> {} ({} lines)", input_path, path, lines.len());
        }
        None => {
            for line in &lines {
                println!("{line}");
            }
        }
    }
}

const USAGE: &str = "\
Robot VM Disassembler

USAGE:
    {program} <input.rom> [OPTIONS]

ARGS:
    <input.rom>    256-byte ROM image

OPTIONS:
    -o, --output <file>     Write re-assemblable source instead of a listing
    -q, --quiet             Only log errors
    -h, --help              Print this help message

ENVIRONMENT:
    ROBOVM_LOG              Minimum log level: info, warn, error or off
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
