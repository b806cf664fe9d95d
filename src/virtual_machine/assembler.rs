//! Assembly language parser and ROM compiler.
//!
//! Converts line-oriented assembly source into a 256-byte [`Rom`].
//!
//! # Syntax
//!
//! ```text
//! label: other_label: MNEMONIC operand, operand  ; comment
//! ```
//!
//! - Mnemonics and function names are case-insensitive; labels are not
//! - `;` starts a comment
//! - A line may declare any number of leading `name:` labels
//! - Operands are separated by commas and/or whitespace
//! - `#value` is an immediate, `addr` a direct address, `(addr)`/`[addr]` indirect
//!
//! | mnemonic | operands |
//! |---|---|
//! | `push8` | `#byte` or address |
//! | `pushf` | `#float` or address |
//! | `pop8`, `popf` | address or `(address)` |
//! | `jmp` | address or `(address)` |
//! | `jnz` | address |
//! | `push8r`, `pop8r`, `jnzr` | address, encoded relative to the next instruction |
//! | `db` | one or more raw bytes |
//! | any built-in function | none |
//!
//! Byte and float immediates that have a one-byte constant function are folded
//! into it (`push8 #0` is `const8_0`), which saves 1 or 4 bytes each.

use crate::error;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    BranchMode, Family, Function, MEMORY_SIZE, Opcode, PopMode, PushMode, fold_byte, fold_float,
};
use crate::virtual_machine::operand::{
    Operand, Target, is_identifier, parse_byte_literal, parse_float_literal, parse_operand,
};
use crate::virtual_machine::rom::Rom;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';

const PUSH8: &str = "push8";
const PUSHF: &str = "pushf";
const POP8: &str = "pop8";
const POPF: &str = "popf";
const JMP: &str = "jmp";
const JNZ: &str = "jnz";
const PUSH8R: &str = "push8r";
const POP8R: &str = "pop8r";
const JNZR: &str = "jnzr";
const DB: &str = "db";

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Logs a diagnostic for an assembly error.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    match assembly_error_location(err) {
        Some((line, offset, message)) => {
            error!(
                "{}",
                render_assembly_diagnostic(file, source, line, offset, &message)
            );
        }
        None => error!("{err}"),
    }
}

/// Attaches a source location to an error.
fn at(line: usize, offset: usize, err: VMError) -> VMError {
    VMError::AssemblyError {
        line,
        offset,
        source: err.to_string(),
    }
}

/// Label bindings collected by the measure pass.
#[derive(Debug, Default)]
struct AsmContext {
    labels: HashMap<String, u8>,
}

impl AsmContext {
    fn define_label(&mut self, name: &str, address: u8) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel {
                label: name.to_string(),
            });
        }
        self.labels.insert(name.to_string(), address);
        Ok(())
    }

    fn resolve(&self, target: &Target) -> Result<u8, VMError> {
        match target {
            Target::Address(address) => Ok(*address),
            Target::Label(name) => {
                self.labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| VMError::UndefinedLabel {
                        label: name.clone(),
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Immediate {
    Byte(u8),
    Float(f32),
}

/// One unit of output. Each statement knows its size before labels are bound.
#[derive(Debug, Clone)]
enum Statement {
    /// Binds a name to the current address; emits nothing.
    Label(String),
    /// Bytes emitted as-is (functions, `db`).
    Bytes(Vec<u8>),
    /// Opcode followed by one address byte.
    Reference {
        opcode: Opcode,
        target: Target,
        /// Column of the operand.
        column: usize,
    },
    /// Literal push, folded to a constant function when possible.
    Immediate(Immediate),
    /// Single-byte relative form.
    Relative {
        instruction: &'static str,
        family: Family,
        target: Target,
        column: usize,
    },
}

impl Statement {
    /// Column of the operand that label resolution errors point at.
    fn operand_column(&self) -> Option<usize> {
        match self {
            Statement::Reference { column, .. } | Statement::Relative { column, .. } => {
                Some(*column)
            }
            _ => None,
        }
    }

    fn size(&self) -> usize {
        match self {
            Statement::Label(_) => 0,
            Statement::Bytes(bytes) => bytes.len(),
            Statement::Reference { opcode, .. } => opcode.size(),
            Statement::Immediate(Immediate::Byte(value)) => match fold_byte(*value) {
                Some(_) => 1,
                None => Opcode::Push(PushMode::Literal).size(),
            },
            Statement::Immediate(Immediate::Float(value)) => match fold_float(*value) {
                Some(_) => 1,
                None => Opcode::Push(PushMode::FloatLiteral).size(),
            },
            Statement::Relative { .. } => 1,
        }
    }

    fn emit(&self, ctx: &AsmContext, out: &mut Vec<u8>) -> Result<(), VMError> {
        match self {
            Statement::Label(_) => {}
            Statement::Bytes(bytes) => out.extend_from_slice(bytes),
            Statement::Reference { opcode, target, .. } => {
                out.push(opcode.encode());
                out.push(ctx.resolve(target)?);
            }
            Statement::Immediate(Immediate::Byte(value)) => match fold_byte(*value) {
                Some(function) => out.push(function.opcode()),
                None => {
                    out.push(Opcode::Push(PushMode::Literal).encode());
                    out.push(*value);
                }
            },
            Statement::Immediate(Immediate::Float(value)) => match fold_float(*value) {
                Some(function) => out.push(function.opcode()),
                None => {
                    out.push(Opcode::Push(PushMode::FloatLiteral).encode());
                    out.extend_from_slice(&value.to_le_bytes());
                }
            },
            Statement::Relative {
                instruction,
                family,
                target,
                ..
            } => {
                let target = ctx.resolve(target)?;
                let next = (out.len() as u8).wrapping_add(1);
                let offset = target.wrapping_sub(next) as i8 as i16;
                let opcode =
                    Opcode::relative(*family, offset).ok_or(VMError::RelativeOutOfRange {
                        instruction: *instruction,
                        target,
                        offset,
                    })?;
                out.push(opcode.encode());
            }
        }
        Ok(())
    }
}

/// A statement with the location it came from.
#[derive(Debug)]
struct Located {
    line: usize,
    offset: usize,
    statement: Statement,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Splits off leading `name:` declarations.
///
/// Returns the labels and the byte position where the instruction starts.
fn split_labels(line: &str) -> (Vec<Token<'_>>, usize) {
    let mut labels = Vec::new();
    let mut pos = 0;
    loop {
        let rest = &line[pos..];
        let start = pos + (rest.len() - rest.trim_start().len());
        let Some(colon) = line[start..].find(LABEL_SUFFIX) else {
            break;
        };
        let name = &line[start..start + colon];
        if !is_identifier(name) {
            break;
        }
        labels.push(Token {
            text: name,
            offset: start + 1,
        });
        pos = start + colon + 1;
    }
    (labels, pos)
}

/// Tokenize the instruction part of a line.
///
/// Rules:
/// - commas and whitespace separate tokens
/// - `( ... )` and `[ ... ]` groups are kept whole, inner spaces included
///
/// `base` is the byte position of `text` within its line.
fn tokenize(text: &str, base: usize) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;
    let mut depth = 0usize;

    for (i, b) in text.bytes().enumerate() {
        match b {
            b',' | b' ' | b'\t' if depth == 0 => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &text[s..i],
                        offset: base + s + 1,
                    });
                }
            }
            b'(' | b'[' => {
                start.get_or_insert(i);
                depth += 1;
            }
            b')' | b']' => {
                start.get_or_insert(i);
                depth = depth.saturating_sub(1);
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if let Some(s) = start {
        if depth != 0 {
            return Err(at(
                0,
                base + s + 1,
                VMError::InvalidOperand {
                    token: text[s..].trim_end().to_string(),
                },
            ));
        }
        out.push(Token {
            text: &text[s..],
            offset: base + s + 1,
        });
    }
    Ok(out)
}

/// Checks the operand count.
fn expect_args(
    instruction: &str,
    args: &[Token],
    expected: usize,
    expected_text: &'static str,
) -> Result<(), VMError> {
    if args.len() != expected {
        return Err(VMError::ArityMismatch {
            instruction: instruction.to_string(),
            expected: expected_text,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Parses the only operand of `name`.
fn single_operand<'t>(
    line: usize,
    name: &'static str,
    head: &Token,
    args: &[Token<'t>],
) -> Result<Operand<'t>, VMError> {
    expect_args(name, args, 1, "1").map_err(|e| at(line, head.offset, e))?;
    parse_operand(args[0].text).map_err(|e| at(line, args[0].offset, e))
}

/// Parses one instruction from tokens into a [`Statement`].
///
/// Errors come back already located; operand errors point at the operand.
fn parse_statement(line: usize, tokens: &[Token]) -> Result<Statement, VMError> {
    let head = &tokens[0];
    let args = &tokens[1..];
    let mnemonic = head.text.to_ascii_lowercase();
    let fail_head = |err: VMError| at(line, head.offset, err);

    let single = |name: &'static str| single_operand(line, name, head, args);
    let fail_arg = |err: VMError| at(line, args[0].offset, err);

    let statement = match mnemonic.as_str() {
        PUSH8 => match single(PUSH8)? {
            Operand::Literal(text) => Statement::Immediate(Immediate::Byte(
                parse_byte_literal(text).map_err(fail_arg)?,
            )),
            Operand::Direct(target) => Statement::Reference {
                opcode: Opcode::Push(PushMode::Address),
                target,
                column: args[0].offset,
            },
            Operand::Indirect(_) => {
                return Err(fail_arg(VMError::IndirectNotAllowed { instruction: PUSH8 }));
            }
        },
        PUSHF => match single(PUSHF)? {
            Operand::Literal(text) => Statement::Immediate(Immediate::Float(
                parse_float_literal(text).map_err(fail_arg)?,
            )),
            Operand::Direct(target) => Statement::Reference {
                opcode: Opcode::Push(PushMode::FloatAddress),
                target,
                column: args[0].offset,
            },
            Operand::Indirect(_) => {
                return Err(fail_arg(VMError::IndirectNotAllowed { instruction: PUSHF }));
            }
        },
        POP8 | POPF | JMP | JNZ => {
            let name = match mnemonic.as_str() {
                POP8 => POP8,
                POPF => POPF,
                JMP => JMP,
                _ => JNZ,
            };
            let operand = single(name)?;
            let (target, indirect) = match operand {
                Operand::Literal(_) => {
                    return Err(fail_arg(VMError::LiteralNotAllowed { instruction: name }));
                }
                Operand::Direct(target) => (target, false),
                Operand::Indirect(target) => (target, true),
            };
            let opcode = match (name, indirect) {
                (POP8, false) => Opcode::Pop(PopMode::Address),
                (POP8, true) => Opcode::Pop(PopMode::Indirect),
                (POPF, false) => Opcode::Pop(PopMode::FloatAddress),
                (POPF, true) => Opcode::Pop(PopMode::FloatIndirect),
                (JMP, false) => Opcode::Branch(BranchMode::Jump),
                (JMP, true) => Opcode::Branch(BranchMode::JumpIndirect),
                (_, false) => Opcode::Branch(BranchMode::JumpIfNonZero),
                (_, true) => {
                    return Err(fail_arg(VMError::IndirectNotAllowed { instruction: name }));
                }
            };
            Statement::Reference {
                opcode,
                target,
                column: args[0].offset,
            }
        }
        PUSH8R | POP8R | JNZR => {
            let (instruction, family) = match mnemonic.as_str() {
                PUSH8R => (PUSH8R, Family::Push),
                POP8R => (POP8R, Family::Pop),
                _ => (JNZR, Family::Branch),
            };
            let target = match single(instruction)? {
                Operand::Direct(target) => target,
                Operand::Literal(_) => {
                    return Err(fail_arg(VMError::LiteralNotAllowed { instruction }));
                }
                Operand::Indirect(_) => {
                    return Err(fail_arg(VMError::IndirectNotAllowed { instruction }));
                }
            };
            Statement::Relative {
                instruction,
                family,
                target,
                column: args[0].offset,
            }
        }
        DB => {
            if args.is_empty() {
                return Err(fail_head(VMError::ArityMismatch {
                    instruction: DB.to_string(),
                    expected: "at least 1",
                    actual: 0,
                }));
            }
            let bytes = args
                .iter()
                .map(|arg| parse_byte_literal(arg.text).map_err(|e| at(line, arg.offset, e)))
                .collect::<Result<Vec<u8>, VMError>>()?;
            Statement::Bytes(bytes)
        }
        name => {
            let function = Function::from_mnemonic(name).ok_or_else(|| {
                fail_head(VMError::UnknownMnemonic {
                    name: head.text.to_string(),
                })
            })?;
            expect_args(function.mnemonic(), args, 0, "0").map_err(fail_head)?;
            Statement::Bytes(vec![function.opcode()])
        }
    };
    Ok(statement)
}

/// Parses every line into located statements.
fn parse_lines<I, S>(lines: I) -> Result<Vec<Located>, VMError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut statements = Vec::new();
    for (index, raw) in lines.into_iter().enumerate() {
        let line = index + 1;
        let raw = raw.as_ref();
        let code = raw.split(COMMENT_CHAR).next().unwrap_or_default();

        let (labels, pos) = split_labels(code);
        for label in labels {
            statements.push(Located {
                line,
                offset: label.offset,
                statement: Statement::Label(label.text.to_string()),
            });
        }

        let tokens = tokenize(&code[pos..], pos).map_err(|err| match err {
            VMError::AssemblyError { offset, source, .. } => VMError::AssemblyError {
                line,
                offset,
                source,
            },
            other => other,
        })?;
        if tokens.is_empty() {
            continue;
        }
        statements.push(Located {
            line,
            offset: tokens[0].offset,
            statement: parse_statement(line, &tokens)?,
        });
    }
    Ok(statements)
}

/// Measure pass: binds labels and checks that the program fits.
fn measure(statements: &[Located]) -> Result<AsmContext, VMError> {
    let mut ctx = AsmContext::default();
    let mut pc = 0usize;
    let mut overflow_at = None;

    for located in statements {
        if let Statement::Label(name) = &located.statement {
            ctx.define_label(name, (pc % MEMORY_SIZE) as u8)
                .map_err(|e| at(located.line, located.offset, e))?;
            continue;
        }
        pc += located.statement.size();
        if pc > MEMORY_SIZE && overflow_at.is_none() {
            overflow_at = Some((located.line, located.offset));
        }
    }

    if let Some((line, offset)) = overflow_at {
        return Err(at(
            line,
            offset,
            VMError::ProgramTooLarge {
                size: pc,
                limit: MEMORY_SIZE,
            },
        ));
    }
    Ok(ctx)
}

/// Emit pass: writes every statement, resolving labels bound by [`measure`].
fn emit(statements: &[Located], ctx: &AsmContext) -> Result<Rom, VMError> {
    let mut out = Vec::with_capacity(MEMORY_SIZE);
    for located in statements {
        located
            .statement
            .emit(ctx, &mut out)
            .map_err(|e| {
                let column = located.statement.operand_column().unwrap_or(located.offset);
                at(located.line, column, e)
            })?;
    }

    let mut image = [0u8; MEMORY_SIZE];
    image[..out.len()].copy_from_slice(&out);
    Ok(Rom::new(image))
}

/// Assembles source lines into a zero-filled 256-byte ROM.
///
/// Uses two passes over one statement list:
/// 1. Measure: every statement reports its size, labels bind to the running
///    address (modulo 256)
/// 2. Emit: statements write their bytes with labels resolved
///
/// Stops at the first error, which carries the 1-based line and column.
pub fn assemble_lines<I, S>(lines: I) -> Result<Rom, VMError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let statements = parse_lines(lines)?;
    let ctx = measure(&statements)?;
    emit(&statements, &ctx)
}

/// Assemble a full source string into a ROM.
///
/// On failure a compiler-style diagnostic is also logged.
pub fn assemble_source(source: &str) -> Result<Rom, VMError> {
    assemble_source_with_name(source, "<source>")
}

fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Rom, VMError> {
    let result = assemble_lines(source.lines());
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Rom, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}
