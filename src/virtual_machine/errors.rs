use crate::types::encoding::DecodeError;
use robovm_derive::Error;

/// Errors produced by the assembler, ROM loading and save-state restore.
///
/// Execution itself never fails: every byte pattern is a defined instruction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VMError {
    /// A memory image or ROM was not exactly 256 bytes.
    #[error("memory image must be exactly {expected} bytes, got {actual}")]
    InvalidImageSize { expected: usize, actual: usize },
    /// Neither a mnemonic nor a built-in function name.
    #[error("unknown instruction or function: {name}")]
    UnknownMnemonic { name: String },
    /// Wrong number of operands for an instruction.
    #[error("operand count mismatch for {instruction}: expected {expected}, got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: &'static str,
        actual: usize,
    },
    /// Immediate that is not a valid byte value or I/O selector name.
    #[error("invalid byte literal '{token}'")]
    InvalidByteLiteral { token: String },
    /// Immediate that is not a valid float or `$XXXXXXXX` bit pattern.
    #[error("invalid float literal '{token}'")]
    InvalidFloatLiteral { token: String },
    /// A bare number that only makes sense as a literal.
    #[error("'{token}' is not an address (0..=255); write #{token} for a literal value")]
    MissingLiteralMarker { token: String },
    /// Operand that is neither an address, a label nor a literal.
    #[error("invalid operand '{token}'")]
    InvalidOperand { token: String },
    /// Reference to a label that is never declared.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Label declared more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Relative target that cannot be encoded in the 6-bit offset field.
    #[error("relative target {target:#04x} is out of range for {instruction} (offset {offset:+})")]
    RelativeOutOfRange {
        instruction: &'static str,
        target: u8,
        offset: i16,
    },
    /// `#literal` where an address is required.
    #[error("{instruction} takes an address, not a literal")]
    LiteralNotAllowed { instruction: &'static str },
    /// `(addr)` on an instruction without an indirect form.
    #[error("{instruction} has no indirect form")]
    IndirectNotAllowed { instruction: &'static str },
    /// Program does not fit in memory.
    #[error("program is {size} bytes, limit is {limit}")]
    ProgramTooLarge { size: usize, limit: usize },
    /// Assembly error with line and column context.
    #[error("line {line}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// File I/O error.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
    /// Malformed save state.
    #[error("decoding error: {0}")]
    DecodeError(DecodeError),
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        VMError::DecodeError(err)
    }
}
