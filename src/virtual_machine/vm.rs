//! Core virtual machine implementation.
//!
//! The VM executes directly out of its own 256-byte memory, which also holds
//! the stack. There is no bounds checking anywhere: the program counter, the
//! stack pointer and every computed address wrap modulo 256, so a runaway
//! stack silently overwrites code. All byte arithmetic wraps.

use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::Host;
use crate::virtual_machine::isa::{
    BranchMode, Function, MEMORY_SIZE, Opcode, PopMode, PushMode, byte_constant, float_constant,
};
use crate::virtual_machine::rom::Rom;
use robovm_derive::BinaryCodec;

/// Highest address; the stack grows down from here.
const STACK_TOP: u8 = u8::MAX;

/// Interpreter state.
///
/// The derived codec is the save-state format: memory, pc, sp and the I/O
/// flag back to back (259 bytes).
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Vm {
    /// Code, data and stack.
    memory: [u8; MEMORY_SIZE],
    /// Address of the next byte to fetch.
    pc: u8,
    /// Stack depth; the visible stack pointer is `255 - sp`.
    sp: u8,
    /// Raised by the `io` function, cleared by [`Vm::check_io`].
    io: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with zeroed memory.
    pub fn new() -> Self {
        Self {
            memory: [0; MEMORY_SIZE],
            pc: 0,
            sp: 0,
            io: false,
        }
    }

    /// Creates a VM from a raw memory image, which must be exactly 256 bytes.
    pub fn from_image(image: &[u8]) -> Result<Self, VMError> {
        let memory = image.try_into().map_err(|_| VMError::InvalidImageSize {
            expected: MEMORY_SIZE,
            actual: image.len(),
        })?;
        Ok(Self {
            memory,
            ..Self::new()
        })
    }

    /// Creates a VM running a copy of `rom`.
    pub fn from_rom(rom: &Rom) -> Self {
        Self {
            memory: *rom.bytes(),
            ..Self::new()
        }
    }

    /// Serializes memory, pc, sp and the I/O flag.
    pub fn save_state(&self) -> Vec<u8> {
        self.to_bytes()
    }

    /// Restores a VM written by [`Vm::save_state`].
    pub fn restore_state(bytes: &[u8]) -> Result<Self, VMError> {
        Ok(Self::from_bytes(bytes)?)
    }

    /// Returns the program counter.
    pub fn pc(&self) -> u8 {
        self.pc
    }

    /// Moves the program counter.
    pub fn set_pc(&mut self, pc: u8) {
        self.pc = pc;
    }

    /// Returns the visible stack pointer: the address of the next free slot.
    pub fn stack_pointer(&self) -> u8 {
        STACK_TOP - self.sp
    }

    /// Returns the whole memory image.
    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    /// Returns whether the I/O flag was raised, and clears it.
    pub fn check_io(&mut self) -> bool {
        std::mem::take(&mut self.io)
    }

    // =========================
    // Memory
    // =========================

    pub fn read8(&self, address: u8) -> u8 {
        self.memory[address as usize]
    }

    pub fn write8(&mut self, address: u8, value: u8) {
        self.memory[address as usize] = value;
    }

    /// Reads the little-endian float starting at `address` (wrapping).
    pub fn read_float(&self, address: u8) -> f32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read8(address.wrapping_add(i as u8));
        }
        f32::from_le_bytes(bytes)
    }

    /// Writes `value` little-endian starting at `address` (wrapping).
    pub fn write_float(&mut self, address: u8, value: f32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(address.wrapping_add(i as u8), byte);
        }
    }

    /// Reads the byte at the address stored at `pointer`.
    pub fn read8_indirect(&self, pointer: u8) -> u8 {
        self.read8(self.read8(pointer))
    }

    /// Writes to the address stored at `pointer`.
    pub fn write8_indirect(&mut self, pointer: u8, value: u8) {
        self.write8(self.read8(pointer), value);
    }

    pub fn read_float_indirect(&self, pointer: u8) -> f32 {
        self.read_float(self.read8(pointer))
    }

    pub fn write_float_indirect(&mut self, pointer: u8, value: f32) {
        self.write_float(self.read8(pointer), value);
    }

    // =========================
    // Stack
    // =========================

    pub fn push8(&mut self, value: u8) {
        self.write8(self.stack_pointer(), value);
        self.sp = self.sp.wrapping_add(1);
    }

    pub fn pop8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_sub(1);
        self.read8(self.stack_pointer())
    }

    /// Returns the top byte without popping it.
    pub fn peek8(&self) -> u8 {
        self.read8(self.stack_pointer().wrapping_add(1))
    }

    /// Pushes the four bytes of `value`, most significant first, leaving it
    /// little-endian in memory at the new top of stack.
    pub fn push_float(&mut self, value: f32) {
        for byte in value.to_le_bytes().into_iter().rev() {
            self.push8(byte);
        }
    }

    pub fn pop_float(&mut self) -> f32 {
        let mut bytes = [0u8; 4];
        for byte in bytes.iter_mut() {
            *byte = self.pop8();
        }
        f32::from_le_bytes(bytes)
    }

    /// Returns the top float without popping it.
    pub fn peek_float(&self) -> f32 {
        self.read_float(self.stack_pointer().wrapping_add(1))
    }

    // =========================
    // Execution
    // =========================

    /// Fetches the byte at pc and advances it.
    fn fetch(&mut self) -> u8 {
        let byte = self.read8(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_float(&mut self) -> f32 {
        let mut bytes = [0u8; 4];
        for byte in bytes.iter_mut() {
            *byte = self.fetch();
        }
        f32::from_le_bytes(bytes)
    }

    /// Address `offset` bytes from the current pc.
    fn relative(&self, offset: i8) -> u8 {
        self.pc.wrapping_add_signed(offset)
    }

    /// Executes exactly one instruction.
    pub fn tick(&mut self) {
        match Opcode::decode(self.fetch()) {
            Opcode::Function(function) => self.exec_function(function),
            Opcode::Unused(_) => {}
            Opcode::Push(mode) => self.exec_push(mode),
            Opcode::Pop(mode) => self.exec_pop(mode),
            Opcode::Branch(mode) => self.exec_branch(mode),
        }
    }

    fn exec_push(&mut self, mode: PushMode) {
        match mode {
            PushMode::Address => {
                let address = self.fetch();
                self.push8(self.read8(address));
            }
            PushMode::FloatAddress => {
                let address = self.fetch();
                self.push_float(self.read_float(address));
            }
            PushMode::Literal => {
                let value = self.fetch();
                self.push8(value);
            }
            PushMode::FloatLiteral => {
                let value = self.fetch_float();
                self.push_float(value);
            }
            PushMode::Relative(offset) => self.push8(self.read8(self.relative(offset))),
        }
    }

    fn exec_pop(&mut self, mode: PopMode) {
        match mode {
            PopMode::Address => {
                let address = self.fetch();
                let value = self.pop8();
                self.write8(address, value);
            }
            PopMode::FloatAddress => {
                let address = self.fetch();
                let value = self.pop_float();
                self.write_float(address, value);
            }
            PopMode::Indirect => {
                let pointer = self.fetch();
                let value = self.pop8();
                self.write8_indirect(pointer, value);
            }
            PopMode::FloatIndirect => {
                let pointer = self.fetch();
                let value = self.pop_float();
                self.write_float_indirect(pointer, value);
            }
            PopMode::Relative(offset) => {
                let address = self.relative(offset);
                let value = self.pop8();
                self.write8(address, value);
            }
        }
    }

    fn exec_branch(&mut self, mode: BranchMode) {
        match mode {
            BranchMode::Jump => self.pc = self.fetch(),
            BranchMode::JumpIfNonZero => {
                let target = self.fetch();
                if self.pop8() != 0 {
                    self.pc = target;
                }
            }
            BranchMode::JumpIndirect => {
                let pointer = self.fetch();
                self.pc = self.read8(pointer);
            }
            BranchMode::RelativeIfNonZero(offset) => {
                let target = self.relative(offset);
                if self.pop8() != 0 {
                    self.pc = target;
                }
            }
        }
    }

    fn unary8(&mut self, op: impl FnOnce(u8) -> u8) {
        let a = self.pop8();
        self.push8(op(a));
    }

    fn binary8(&mut self, op: impl FnOnce(u8, u8) -> u8) {
        let b = self.pop8();
        let a = self.pop8();
        self.push8(op(a, b));
    }

    fn unary_float(&mut self, op: impl FnOnce(f32) -> f32) {
        let a = self.pop_float();
        self.push_float(op(a));
    }

    fn binary_float(&mut self, op: impl FnOnce(f32, f32) -> f32) {
        let b = self.pop_float();
        let a = self.pop_float();
        self.push_float(op(a, b));
    }

    fn compare8(&mut self, op: impl FnOnce(u8, u8) -> bool) {
        self.binary8(|a, b| op(a, b) as u8);
    }

    fn compare_float(&mut self, op: impl FnOnce(f32, f32) -> bool) {
        let b = self.pop_float();
        let a = self.pop_float();
        self.push8(op(a, b) as u8);
    }

    fn exec_function(&mut self, function: Function) {
        use Function::*;
        match function {
            Nop => {}
            // Casts
            ToFloat => {
                let a = self.pop8();
                self.push_float(a as f32);
            }
            ToByte => {
                let a = self.pop_float();
                self.push8(a as u8);
            }
            // Bitwise
            Not => self.unary8(|a| !a),
            Or => self.binary8(|a, b| a | b),
            And => self.binary8(|a, b| a & b),
            Xor => self.binary8(|a, b| a ^ b),
            Shl => self.binary8(|a, b| a.checked_shl(b as u32).unwrap_or(0)),
            Shr => self.binary8(|a, b| a.checked_shr(b as u32).unwrap_or(0)),
            // Byte arithmetic
            Add8 => self.binary8(u8::wrapping_add),
            Sub8 => self.binary8(u8::wrapping_sub),
            Mul8 => self.binary8(u8::wrapping_mul),
            Div8 => self.binary8(|a, b| a.checked_div(b).unwrap_or(0)),
            Madd8 => {
                let c = self.pop8();
                let b = self.pop8();
                let a = self.pop8();
                self.push8(a.wrapping_mul(b).wrapping_add(c));
            }
            // Float arithmetic
            AddF => self.binary_float(|a, b| a + b),
            SubF => self.binary_float(|a, b| a - b),
            MulF => self.binary_float(|a, b| a * b),
            DivF => self.binary_float(|a, b| a / b),
            MaddF => {
                let c = self.pop_float();
                let b = self.pop_float();
                let a = self.pop_float();
                self.push_float(a * b + c);
            }
            NegF => self.unary_float(|a| -a),
            // Float math
            Cos => self.unary_float(f32::cos),
            Sin => self.unary_float(f32::sin),
            Tan => self.unary_float(f32::tan),
            Acos => self.unary_float(f32::acos),
            Asin => self.unary_float(f32::asin),
            Atan => self.unary_float(f32::atan),
            Abs => self.unary_float(f32::abs),
            Min => self.binary_float(f32::min),
            Max => self.binary_float(f32::max),
            Pow => self.binary_float(f32::powf),
            Log => self.unary_float(f32::ln),
            Log10 => self.unary_float(f32::log10),
            // Byte comparison
            Eq8 => self.compare8(|a, b| a == b),
            Ne8 => self.compare8(|a, b| a != b),
            Lt8 => self.compare8(|a, b| a < b),
            Lte8 => self.compare8(|a, b| a <= b),
            Gt8 => self.compare8(|a, b| a > b),
            Gte8 => self.compare8(|a, b| a >= b),
            // Float comparison
            EqF => self.compare_float(|a, b| a == b),
            NeF => self.compare_float(|a, b| a != b),
            LtF => self.compare_float(|a, b| a < b),
            LteF => self.compare_float(|a, b| a <= b),
            GtF => self.compare_float(|a, b| a > b),
            GteF => self.compare_float(|a, b| a >= b),
            // Constants
            Const8Zero | Const8One | Const8Two | Const8Three | Const8Four | Const8Max => {
                self.push8(byte_constant(function).unwrap_or_default());
            }
            ConstFMinusOne | ConstFZero | ConstFOne | ConstFTwo | ConstFThree | ConstFInf => {
                self.push_float(float_constant(function).unwrap_or_default());
            }
            // Stack and control
            IsNan => {
                let a = self.pop_float();
                self.push8(a.is_nan() as u8);
            }
            Dup8 => self.push8(self.peek8()),
            DupF => self.push_float(self.peek_float()),
            Jsr => {
                let target = self.pop8();
                self.push8(self.pc);
                self.pc = target;
            }
            Ret => self.pc = self.pop8(),
            Io => self.io = true,
        }
    }

    /// Runs up to `max_ticks` instructions, handing each I/O request to `host`.
    ///
    /// After every tick that raised the I/O flag the VM pops a selector byte
    /// and calls [`Host::io`]; the host performs whatever further pops and
    /// pushes that selector needs. Returns the number of I/O requests served.
    pub fn run<H: Host>(&mut self, host: &mut H, max_ticks: usize) -> usize {
        let mut served = 0;
        for _ in 0..max_ticks {
            self.tick();
            if self.check_io() {
                let selector = self.pop8();
                host.io(selector, self);
                served += 1;
            }
        }
        served
    }
}

#[cfg(test)]
mod tests;
