//! Toolchain for a 256-byte robot virtual machine.
//!
//! Provides the instruction set, the interpreter, a two-pass assembler and a
//! disassembler that round-trips byte-exactly through the assembler.

pub mod types;
pub mod utils;
pub mod virtual_machine;
