//! Assembly to ROM compiler CLI.
//!
//! Reads an assembly source file and writes the 256-byte ROM image.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.rom`)
//! - `-r, --run <ticks>`: Run the ROM for up to `ticks` instructions afterwards
//! - `-q, --quiet`: Only log errors
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm -o robot.rom
//! assembler program.asm -r 1000
//! ```

use robovm::utils::log::{self, Level};
use robovm::virtual_machine::assembler::assemble_file;
use robovm::virtual_machine::errors::VMError;
use robovm::virtual_machine::host::{Host, IoSelector};
use robovm::virtual_machine::vm::Vm;
use robovm::{error, info, warn};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

/// Logs every I/O request and answers reads with zeros.
struct LoggingHost;

impl Host for LoggingHost {
    fn io(&mut self, selector: u8, vm: &mut Vm) {
        match IoSelector::try_from(selector) {
            Ok(selector @ (IoSelector::Motor | IoSelector::Steer)) => {
                let value = vm.pop_float();
                info!("io {}: {}", selector.name(), value);
            }
            Ok(selector @ (IoSelector::Battery | IoSelector::Sensor)) => {
                info!("io {}: reading 0", selector.name());
                vm.push_float(0.0);
            }
            Ok(IoSelector::Accel) => {
                info!("io accel: reading 0, 0");
                vm.push_float(0.0);
                vm.push_float(0.0);
            }
            Ok(IoSelector::MarkRead) => {
                info!("io mark_read: reading 0");
                vm.push8(0);
            }
            Ok(IoSelector::MarkWrite) => {
                let mark = vm.pop8();
                info!("io mark_write: {}", mark);
            }
            Err(other) => warn!("io: unknown selector {other}"),
        }
    }
}

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut run_ticks: Option<usize> = None;

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
            k @ ("--run" | "-r") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                let ticks = args[i].parse::<usize>().unwrap_or_else(|_| {
                    error!("Invalid tick count: '{}' is not a valid number", args[i]);
                    process::exit(1);
                });
                run_ticks = Some(ticks);
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

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        Path::new(input_path)
            .with_extension("rom")
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    // Source errors were already logged as a diagnostic.
    let rom = match assemble_file(input_path) {
        Ok(rom) => rom,
        Err(VMError::AssemblyError { .. }) => process::exit(1),
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(&output_path, rom.bytes()) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    let used = rom.bytes().iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    info!(
        "Compiled {} -> {} ({} of {} bytes used)",
        input_path,
        output_path,
        used,
        rom.bytes().len()
    );

    if let Some(ticks) = run_ticks {
        let mut vm = Vm::from_rom(&rom);
        let served = vm.run(&mut LoggingHost, ticks);
        println!(
            "pc: ${:02X}  sp: ${:02X}  io events: {}",
            vm.pc(),
            vm.stack_pointer(),
            served
        );
    }
}

const USAGE: &str = "\
Robot VM Assembler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.rom)
    -r, --run <ticks>       Run the ROM for up to <ticks> instructions
    -q, --quiet             Only log errors
    -h, --help              Print this help message

ENVIRONMENT:
    ROBOVM_LOG              Minimum log level: info, warn, error or off

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output
    {program} program.asm -o robot.rom

    # Compile and run for 1000 ticks
    {program} program.asm -r 1000
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
