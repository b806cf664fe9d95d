//! ROM disassembler.
//!
//! Turns a 256-byte image back into assembly that the assembler turns into the
//! same 256 bytes. Labels are not reconstructed; every target prints as `$XX`.
//!
//! Most instructions print as their natural mnemonic. The exceptions are
//! emitted as `db` lines, one per original byte:
//! - generic literal pushes whose value the assembler would fold into a
//!   one-byte constant function (annotated `; verbose push8 #n`)
//! - unused function slots
//! - an instruction whose operands would run past address 255

use crate::virtual_machine::isa::{
    BranchMode, MEMORY_SIZE, Opcode, PopMode, PushMode, fold_byte, fold_float,
};
use std::fmt;

/// One listing line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedLine {
    /// Address of the first byte this line covers.
    pub address: u8,
    /// Assembly text, re-assemblable as-is.
    pub text: String,
}

impl fmt::Display for DecodedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}: {}", self.address, self.text)
    }
}

/// Length of the image once trailing zero bytes are dropped.
///
/// Never less than 1, so an all-zero image still lists its first `nop`.
pub fn active_length(image: &[u8; MEMORY_SIZE]) -> usize {
    image.iter().rposition(|byte| *byte != 0).map_or(1, |i| i + 1)
}

/// Float literal text that parses back to the same bits.
fn float_literal(value: f32) -> String {
    if value.is_nan() {
        format!("${:08X}", value.to_bits())
    } else {
        format!("{value}")
    }
}

fn read_float(image: &[u8; MEMORY_SIZE], at: usize) -> f32 {
    f32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
}

/// One `db` line per byte in `range`, the first optionally annotated.
fn raw_lines(
    image: &[u8; MEMORY_SIZE],
    range: std::ops::Range<usize>,
    note: Option<String>,
    out: &mut Vec<DecodedLine>,
) {
    for (i, address) in range.enumerate() {
        let mut text = format!("db ${:02X}", image[address]);
        if i == 0
            && let Some(note) = &note
        {
            text.push_str(" ; verbose ");
            text.push_str(note);
        }
        out.push(DecodedLine {
            address: address as u8,
            text,
        });
    }
}

/// Disassembles an image. Total over every possible input.
pub fn decompile(image: &[u8; MEMORY_SIZE]) -> Vec<DecodedLine> {
    let end = active_length(image);
    let mut lines = Vec::new();
    let mut address = 0usize;

    while address < end {
        let opcode = Opcode::decode(image[address]);
        let size = opcode.size();

        if address + size > MEMORY_SIZE {
            raw_lines(image, address..MEMORY_SIZE, None, &mut lines);
            break;
        }

        let operand = image.get(address + 1).copied().unwrap_or_default();
        // Relative targets are taken from the address after the opcode byte.
        let relative = move |offset: i8| (address as u8).wrapping_add(1).wrapping_add(offset as u8);

        let text = match opcode {
            Opcode::Function(function) => function.mnemonic().to_string(),
            Opcode::Unused(_) => format!("db ${:02X}", image[address]),
            Opcode::Push(PushMode::Literal) => {
                if fold_byte(operand).is_some() {
                    let note = format!("push8 #{operand}");
                    raw_lines(image, address..address + size, Some(note), &mut lines);
                    address += size;
                    continue;
                }
                format!("push8 #{operand}")
            }
            Opcode::Push(PushMode::FloatLiteral) => {
                let value = read_float(image, address + 1);
                let text = format!("pushf #{}", float_literal(value));
                if fold_float(value).is_some() {
                    raw_lines(image, address..address + size, Some(text), &mut lines);
                    address += size;
                    continue;
                }
                text
            }
            Opcode::Push(PushMode::Address) => format!("push8 ${operand:02X}"),
            Opcode::Push(PushMode::FloatAddress) => format!("pushf ${operand:02X}"),
            Opcode::Push(PushMode::Relative(offset)) => {
                format!("push8r ${:02X}", relative(offset))
            }
            Opcode::Pop(PopMode::Address) => format!("pop8 ${operand:02X}"),
            Opcode::Pop(PopMode::FloatAddress) => format!("popf ${operand:02X}"),
            Opcode::Pop(PopMode::Indirect) => format!("pop8 (${operand:02X})"),
            Opcode::Pop(PopMode::FloatIndirect) => format!("popf (${operand:02X})"),
            Opcode::Pop(PopMode::Relative(offset)) => format!("pop8r ${:02X}", relative(offset)),
            Opcode::Branch(BranchMode::Jump) => format!("jmp ${operand:02X}"),
            Opcode::Branch(BranchMode::JumpIfNonZero) => format!("jnz ${operand:02X}"),
            Opcode::Branch(BranchMode::JumpIndirect) => format!("jmp (${operand:02X})"),
            Opcode::Branch(BranchMode::RelativeIfNonZero(offset)) => {
                format!("jnzr ${:02X}", relative(offset))
            }
        };

        lines.push(DecodedLine {
            address: address as u8,
            text,
        });
        address += size;
    }

    lines
}

/// Joins the listing into assembly source, one instruction per line.
pub fn to_source(lines: &[DecodedLine]) -> String {
    let mut source = String::new();
    for line in lines {
        source.push_str(&line.text);
        source.push('\n');
    }
    source
}
