//! Stack-based 256-byte virtual machine driving a simulated robot.
//!
//! A program is a flat 256-byte image. Code, data and the stack share that one
//! memory, and every address, the program counter and the stack pointer wrap
//! modulo 256.
//!
//! # Architecture
//!
//! - **Instruction format**: one opcode byte (6-bit data, 2-bit family),
//!   followed by 0, 1 or 4 operand bytes
//! - **Families**: FUNC (64-slot built-in table), PUSH, POP and BRANCH
//! - **Values**: bytes, and 32-bit floats stored as 4 bytes on the stack
//! - **Execution model**: one instruction per [`vm::Vm::tick`]; decoding is
//!   total, so execution never fails
//! - **I/O**: the `io` function raises a flag that a [`host::Host`] serves
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, and ROM generation
//! - [`decompiler`]: ROM to assembly listing, byte-exact through the assembler
//! - [`errors`]: Assembly, image and save-state error types
//! - [`host`]: I/O host trait and selector names
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`operand`]: Operand and literal syntax
//! - [`rom`]: Immutable program images
//! - [`vm`]: Interpreter and save states

pub mod assembler;
pub mod decompiler;
pub mod errors;
pub mod host;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod rom;
pub mod vm;
