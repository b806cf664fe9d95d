//! Operand syntax of the assembly language.
//!
//! - `#value`: immediate literal, interpreted as a byte or float by the mnemonic
//! - `name`, `42`, `$2A`: direct address (label, decimal or hex)
//! - `(target)` or `[target]`: one level of indirection

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::IoSelector;

const LITERAL_MARKER: char = '#';
const HEX_PREFIX: char = '$';

/// An address operand, before label resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Address(u8),
    Label(String),
}

/// A parsed instruction argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand<'a> {
    /// Text after `#`; its type depends on the instruction.
    Literal(&'a str),
    Direct(Target),
    Indirect(Target),
}

/// Returns whether `text` is a label name: `[A-Za-z_.][A-Za-z0-9_.]*`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parses hex digits after a `$`, rejecting signs and empty input.
fn parse_hex(digits: &str, max_digits: usize) -> Option<u32> {
    if digits.is_empty()
        || digits.len() > max_digits
        || !digits.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parses one argument token.
pub fn parse_operand(text: &str) -> Result<Operand<'_>, VMError> {
    let invalid = || VMError::InvalidOperand {
        token: text.to_string(),
    };

    if let Some(literal) = text.strip_prefix(LITERAL_MARKER) {
        let literal = literal.trim();
        if literal.is_empty() {
            return Err(invalid());
        }
        return Ok(Operand::Literal(literal));
    }

    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .or_else(|| text.strip_prefix('[').and_then(|t| t.strip_suffix(']')));
    if let Some(inner) = inner {
        let inner = inner.trim();
        if inner.is_empty() {
            return Err(invalid());
        }
        return Ok(Operand::Indirect(parse_target(inner)?));
    }

    Ok(Operand::Direct(parse_target(text)?))
}

/// Parses a label, decimal address or `$hex` address.
///
/// A number that is not a valid address but is a valid float (`300`, `1.5`,
/// `-2`) almost always means a forgotten `#`, and gets its own error.
pub fn parse_target(text: &str) -> Result<Target, VMError> {
    if is_identifier(text) {
        return Ok(Target::Label(text.to_string()));
    }

    let address = match text.strip_prefix(HEX_PREFIX) {
        Some(digits) => parse_hex(digits, 2).map(|v| v as u8),
        None => text.parse::<u8>().ok(),
    };
    if let Some(address) = address {
        return Ok(Target::Address(address));
    }

    if text.parse::<f32>().is_ok() {
        return Err(VMError::MissingLiteralMarker {
            token: text.to_string(),
        });
    }
    Err(VMError::InvalidOperand {
        token: text.to_string(),
    })
}

/// Parses a byte immediate: `$hex`, `0..=255`, `-128..=-1` or an I/O selector name.
pub fn parse_byte_literal(text: &str) -> Result<u8, VMError> {
    let value = if let Some(digits) = text.strip_prefix(HEX_PREFIX) {
        parse_hex(digits, 2).map(|v| v as u8)
    } else if let Ok(v) = text.parse::<u8>() {
        Some(v)
    } else if let Ok(v) = text.parse::<i8>() {
        Some(v as u8)
    } else {
        IoSelector::from_name(text).map(|selector| selector as u8)
    };

    value.ok_or_else(|| VMError::InvalidByteLiteral {
        token: text.to_string(),
    })
}

/// Parses a float immediate: anything `f32` accepts, or `$XXXXXXXX` raw bits.
pub fn parse_float_literal(text: &str) -> Result<f32, VMError> {
    let value = match text.strip_prefix(HEX_PREFIX) {
        Some(digits) => parse_hex(digits, 8).map(f32::from_bits),
        None => text.parse::<f32>().ok(),
    };

    value.ok_or_else(|| VMError::InvalidFloatLiteral {
        token: text.to_string(),
    })
}
