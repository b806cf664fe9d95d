//! Instruction Set Architecture (ISA) definitions.
//!
//! Every instruction starts with a single opcode byte:
//!
//! ```text
//!   7            2 1      0
//!  +--------------+--------+
//!  |   data (6)   | family |
//!  +--------------+--------+
//! ```
//!
//! The family selects FUNC, PUSH, POP or BRANCH. For FUNC, `data` indexes the
//! built-in table declared by [`for_each_function!`](crate::for_each_function).
//! For the other families a few `data` values are reserved addressing modes and
//! every other value is a signed relative offset `data - 32` from the address
//! following the opcode byte.
//!
//! Decoding is total: [`Opcode::decode`] maps each of the 256 byte values to
//! exactly one instruction, so neither the VM nor the decompiler can fail.

/// Size of the address space, the ROM and the VM memory.
pub const MEMORY_SIZE: usize = 256;

/// Number of slots in the built-in function table.
pub const FUNCTION_SLOTS: usize = 64;

/// Bias added to a relative offset to form the 6-bit `data` field.
const RELATIVE_BIAS: i16 = 32;

/// `data` value of the address mode (PUSH/POP).
const DATA_ADDRESS: u8 = 0;
/// `data` value of the float address mode (PUSH/POP) and of the direct jump.
const DATA_FLOAT_ADDRESS: u8 = 31;
/// `data` value of the literal byte push, the indirect pop and the conditional jump.
const DATA_LITERAL: u8 = 32;
/// `data` value of the literal float push, the indirect float pop and the indirect jump.
const DATA_FLOAT_LITERAL: u8 = 33;

/// Invokes a callback macro with the built-in function table.
///
/// Each entry is `Name = slot, "mnemonic"`. Slots not listed are no-ops.
#[macro_export]
macro_rules! for_each_function {
    ($callback:ident) => {
        $callback! {
            /// nop ; does nothing
            Nop = 0, "nop",
            // =========================
            // Casts
            // =========================
            /// tofloat ; byte -> float
            ToFloat = 1, "tofloat",
            /// tobyte ; float -> byte, saturating, NaN -> 0
            ToByte = 2, "tobyte",
            // =========================
            // Bitwise
            // =========================
            /// not ; a -> !a
            Not = 3, "not",
            /// or ; a, b -> a | b
            Or = 4, "or",
            /// and ; a, b -> a & b
            And = 5, "and",
            /// xor ; a, b -> a ^ b
            Xor = 6, "xor",
            /// shl ; a, b -> a << b (0 when b >= 8)
            Shl = 7, "shl",
            /// shr ; a, b -> a >> b (0 when b >= 8)
            Shr = 8, "shr",
            // =========================
            // Byte arithmetic
            // =========================
            /// add8 ; a, b -> a + b
            Add8 = 9, "add8",
            /// sub8 ; a, b -> a - b
            Sub8 = 10, "sub8",
            /// mul8 ; a, b -> a * b
            Mul8 = 11, "mul8",
            /// div8 ; a, b -> a / b (0 when b == 0)
            Div8 = 12, "div8",
            /// madd8 ; a, b, c -> a * b + c
            Madd8 = 13, "madd8",
            // =========================
            // Float arithmetic
            // =========================
            /// addf ; a, b -> a + b
            AddF = 14, "addf",
            /// subf ; a, b -> a - b
            SubF = 15, "subf",
            /// mulf ; a, b -> a * b
            MulF = 16, "mulf",
            /// divf ; a, b -> a / b
            DivF = 17, "divf",
            /// maddf ; a, b, c -> a * b + c
            MaddF = 18, "maddf",
            /// negf ; a -> -a
            NegF = 19, "negf",
            // =========================
            // Float math
            // =========================
            /// cos ; a -> cos(a)
            Cos = 20, "cos",
            /// sin ; a -> sin(a)
            Sin = 21, "sin",
            /// tan ; a -> tan(a)
            Tan = 22, "tan",
            /// acos ; a -> acos(a)
            Acos = 23, "acos",
            /// asin ; a -> asin(a)
            Asin = 24, "asin",
            /// atan ; a -> atan(a)
            Atan = 25, "atan",
            /// abs ; a -> |a|
            Abs = 26, "abs",
            /// min ; a, b -> min(a, b)
            Min = 27, "min",
            /// max ; a, b -> max(a, b)
            Max = 28, "max",
            /// pow ; a, b -> a ^ b
            Pow = 29, "pow",
            /// log ; a -> ln(a)
            Log = 30, "log",
            /// log10 ; a -> log10(a)
            Log10 = 31, "log10",
            // =========================
            // Byte comparison
            // =========================
            /// eq8 ; a, b -> a == b
            Eq8 = 32, "eq8",
            /// ne8 ; a, b -> a != b
            Ne8 = 33, "ne8",
            /// lt8 ; a, b -> a < b
            Lt8 = 34, "lt8",
            /// lte8 ; a, b -> a <= b
            Lte8 = 35, "lte8",
            /// gt8 ; a, b -> a > b
            Gt8 = 36, "gt8",
            /// gte8 ; a, b -> a >= b
            Gte8 = 37, "gte8",
            // =========================
            // Float comparison
            // =========================
            /// eqf ; a, b -> a == b
            EqF = 38, "eqf",
            /// nef ; a, b -> a != b
            NeF = 39, "nef",
            /// ltf ; a, b -> a < b
            LtF = 40, "ltf",
            /// ltef ; a, b -> a <= b
            LteF = 41, "ltef",
            /// gtf ; a, b -> a > b
            GtF = 42, "gtf",
            /// gtef ; a, b -> a >= b
            GteF = 43, "gtef",
            // =========================
            // Constants
            // =========================
            /// const8_0 ; -> 0
            Const8Zero = 44, "const8_0",
            /// const8_1 ; -> 1
            Const8One = 45, "const8_1",
            /// const8_2 ; -> 2
            Const8Two = 46, "const8_2",
            /// const8_3 ; -> 3
            Const8Three = 47, "const8_3",
            /// const8_4 ; -> 4
            Const8Four = 48, "const8_4",
            /// const8_255 ; -> 255
            Const8Max = 49, "const8_255",
            /// constf_m1 ; -> -1.0
            ConstFMinusOne = 50, "constf_m1",
            /// constf_0 ; -> 0.0
            ConstFZero = 51, "constf_0",
            /// constf_1 ; -> 1.0
            ConstFOne = 52, "constf_1",
            /// constf_2 ; -> 2.0
            ConstFTwo = 53, "constf_2",
            /// constf_3 ; -> 3.0
            ConstFThree = 54, "constf_3",
            /// constf_inf ; -> +inf
            ConstFInf = 55, "constf_inf",
            // =========================
            // Stack and control
            // =========================
            /// isnan ; a -> a is NaN
            IsNan = 56, "isnan",
            /// dup8 ; a -> a, a
            Dup8 = 57, "dup8",
            /// dupf ; a -> a, a
            DupF = 58, "dupf",
            /// jsr ; target -> return ; pc = target
            Jsr = 59, "jsr",
            /// ret ; address -> ; pc = address
            Ret = 60, "ret",
            /// io ; raises the I/O flag
            Io = 61, "io",
        }
    };
}

macro_rules! define_functions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $slot:expr, $mnemonic:literal
        ),* $(,)?
    ) => {
        /// Built-in operations of the FUNC family, by table slot.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Function {
            $(
                $(#[$doc])*
                $name = $slot,
            )*
        }

        /// Slot-indexed function table; `None` marks an unused (no-op) slot.
        pub const FUNCTION_TABLE: [Option<Function>; FUNCTION_SLOTS] = {
            let mut table = [None; FUNCTION_SLOTS];
            $( table[$slot] = Some(Function::$name); )*
            table
        };

        impl Function {
            /// Returns the assembly mnemonic for this function.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Function::$name => $mnemonic, )*
                }
            }

            /// Looks a function up by its lowercase mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Function> {
                match name {
                    $( $mnemonic => Some(Function::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_function!(define_functions);

impl Function {
    /// Returns the function in `slot` (taken modulo 64), if the slot is used.
    pub const fn from_index(slot: u8) -> Option<Function> {
        FUNCTION_TABLE[(slot as usize) % FUNCTION_SLOTS]
    }

    /// Returns the table slot of this function.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Returns the one-byte FUNC opcode invoking this function.
    pub const fn opcode(self) -> u8 {
        encode(Family::Func, self as u8)
    }
}

/// Instruction family, stored in the two low bits of every opcode byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Family {
    Func = 0,
    Push = 1,
    Pop = 2,
    Branch = 3,
}

impl Family {
    /// Returns the family encoded in `byte`.
    pub const fn of(byte: u8) -> Family {
        match byte & 0b11 {
            0 => Family::Func,
            1 => Family::Push,
            2 => Family::Pop,
            _ => Family::Branch,
        }
    }

    /// Returns whether `data` is a magic addressing mode for this family
    /// rather than a relative offset.
    pub const fn is_reserved(self, data: u8) -> bool {
        match self {
            Family::Func => true,
            Family::Push | Family::Pop => matches!(
                data,
                DATA_ADDRESS | DATA_FLOAT_ADDRESS | DATA_LITERAL | DATA_FLOAT_LITERAL
            ),
            Family::Branch => matches!(data, DATA_FLOAT_ADDRESS | DATA_LITERAL | DATA_FLOAT_LITERAL),
        }
    }
}

/// Packs a family and a 6-bit data field into an opcode byte.
pub const fn encode(family: Family, data: u8) -> u8 {
    (data << 2) | family as u8
}

/// Returns the 6-bit data field of an opcode byte.
pub const fn data_of(byte: u8) -> u8 {
    byte >> 2
}

/// Data field of a relative offset.
const fn relative_data(offset: i8) -> u8 {
    (offset as i16 + RELATIVE_BIAS) as u8 & 0x3F
}

/// PUSH addressing modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PushMode {
    /// Push the byte at the operand address.
    Address,
    /// Push the float at the operand address.
    FloatAddress,
    /// Push the operand byte.
    Literal,
    /// Push the 4-byte little-endian float operand.
    FloatLiteral,
    /// Push the byte at `pc + offset`.
    Relative(i8),
}

/// POP addressing modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PopMode {
    /// Pop a byte into the operand address.
    Address,
    /// Pop a float into the operand address.
    FloatAddress,
    /// Pop a byte into the address stored at the operand address.
    Indirect,
    /// Pop a float into the address stored at the operand address.
    FloatIndirect,
    /// Pop a byte into `pc + offset`.
    Relative(i8),
}

/// BRANCH addressing modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BranchMode {
    /// Jump to the operand address.
    Jump,
    /// Pop a byte; jump to the operand address if it is non-zero.
    JumpIfNonZero,
    /// Jump to the address stored at the operand address.
    JumpIndirect,
    /// Pop a byte; if it is non-zero, `pc += offset`.
    RelativeIfNonZero(i8),
}

/// A decoded opcode byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    Function(Function),
    /// FUNC slot with no function; executes as a no-op.
    Unused(u8),
    Push(PushMode),
    Pop(PopMode),
    Branch(BranchMode),
}

impl Opcode {
    /// Decodes an opcode byte. Every byte value decodes.
    pub const fn decode(byte: u8) -> Opcode {
        let data = data_of(byte);
        let offset = (data as i16 - RELATIVE_BIAS) as i8;
        match Family::of(byte) {
            Family::Func => match Function::from_index(data) {
                Some(function) => Opcode::Function(function),
                None => Opcode::Unused(data),
            },
            Family::Push => Opcode::Push(match data {
                DATA_ADDRESS => PushMode::Address,
                DATA_FLOAT_ADDRESS => PushMode::FloatAddress,
                DATA_LITERAL => PushMode::Literal,
                DATA_FLOAT_LITERAL => PushMode::FloatLiteral,
                _ => PushMode::Relative(offset),
            }),
            Family::Pop => Opcode::Pop(match data {
                DATA_ADDRESS => PopMode::Address,
                DATA_FLOAT_ADDRESS => PopMode::FloatAddress,
                DATA_LITERAL => PopMode::Indirect,
                DATA_FLOAT_LITERAL => PopMode::FloatIndirect,
                _ => PopMode::Relative(offset),
            }),
            Family::Branch => Opcode::Branch(match data {
                DATA_FLOAT_ADDRESS => BranchMode::Jump,
                DATA_LITERAL => BranchMode::JumpIfNonZero,
                DATA_FLOAT_LITERAL => BranchMode::JumpIndirect,
                _ => BranchMode::RelativeIfNonZero(offset),
            }),
        }
    }

    /// Encodes this opcode back into its byte.
    ///
    /// Relative offsets are assumed valid; build them with [`Opcode::relative`].
    pub const fn encode(self) -> u8 {
        match self {
            Opcode::Function(function) => function.opcode(),
            Opcode::Unused(slot) => encode(Family::Func, slot & 0x3F),
            Opcode::Push(mode) => encode(
                Family::Push,
                match mode {
                    PushMode::Address => DATA_ADDRESS,
                    PushMode::FloatAddress => DATA_FLOAT_ADDRESS,
                    PushMode::Literal => DATA_LITERAL,
                    PushMode::FloatLiteral => DATA_FLOAT_LITERAL,
                    PushMode::Relative(offset) => relative_data(offset),
                },
            ),
            Opcode::Pop(mode) => encode(
                Family::Pop,
                match mode {
                    PopMode::Address => DATA_ADDRESS,
                    PopMode::FloatAddress => DATA_FLOAT_ADDRESS,
                    PopMode::Indirect => DATA_LITERAL,
                    PopMode::FloatIndirect => DATA_FLOAT_LITERAL,
                    PopMode::Relative(offset) => relative_data(offset),
                },
            ),
            Opcode::Branch(mode) => encode(
                Family::Branch,
                match mode {
                    BranchMode::Jump => DATA_FLOAT_ADDRESS,
                    BranchMode::JumpIfNonZero => DATA_LITERAL,
                    BranchMode::JumpIndirect => DATA_FLOAT_LITERAL,
                    BranchMode::RelativeIfNonZero(offset) => relative_data(offset),
                },
            ),
        }
    }

    /// Builds the relative form of `family` for `offset`.
    ///
    /// Returns `None` for offsets outside -32..=31, for offsets that collide
    /// with a magic mode of that family, and for the FUNC family.
    pub const fn relative(family: Family, offset: i16) -> Option<Opcode> {
        let data = offset + RELATIVE_BIAS;
        if data < 0 || data >= FUNCTION_SLOTS as i16 || family.is_reserved(data as u8) {
            return None;
        }
        let offset = offset as i8;
        match family {
            Family::Func => None,
            Family::Push => Some(Opcode::Push(PushMode::Relative(offset))),
            Family::Pop => Some(Opcode::Pop(PopMode::Relative(offset))),
            Family::Branch => Some(Opcode::Branch(BranchMode::RelativeIfNonZero(offset))),
        }
    }

    /// Number of operand bytes following the opcode byte.
    pub const fn operand_len(self) -> usize {
        match self {
            Opcode::Function(_)
            | Opcode::Unused(_)
            | Opcode::Push(PushMode::Relative(_))
            | Opcode::Pop(PopMode::Relative(_))
            | Opcode::Branch(BranchMode::RelativeIfNonZero(_)) => 0,
            Opcode::Push(PushMode::FloatLiteral) => 4,
            Opcode::Push(_) | Opcode::Pop(_) | Opcode::Branch(_) => 1,
        }
    }

    /// Total instruction size in bytes, opcode included.
    pub const fn size(self) -> usize {
        1 + self.operand_len()
    }
}

/// Byte literals that have a one-byte constant function.
const BYTE_FOLDS: [(u8, Function); 6] = [
    (0, Function::Const8Zero),
    (1, Function::Const8One),
    (2, Function::Const8Two),
    (3, Function::Const8Three),
    (4, Function::Const8Four),
    (255, Function::Const8Max),
];

/// Float literals (as bit patterns) that have a one-byte constant function.
const FLOAT_FOLDS: [(u32, Function); 6] = [
    (0xBF80_0000, Function::ConstFMinusOne),
    (0x0000_0000, Function::ConstFZero),
    (0x3F80_0000, Function::ConstFOne),
    (0x4000_0000, Function::ConstFTwo),
    (0x4040_0000, Function::ConstFThree),
    (0x7F80_0000, Function::ConstFInf),
];

/// Returns the constant function that pushes `value`, if there is one.
pub fn fold_byte(value: u8) -> Option<Function> {
    BYTE_FOLDS
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, function)| *function)
}

/// Returns the constant function that pushes exactly these float bits.
///
/// Matching is bitwise, so `-0.0` and NaN never fold.
pub fn fold_float(value: f32) -> Option<Function> {
    let bits = value.to_bits();
    FLOAT_FOLDS
        .iter()
        .find(|(b, _)| *b == bits)
        .map(|(_, function)| *function)
}

/// Value pushed by a byte constant function.
pub fn byte_constant(function: Function) -> Option<u8> {
    BYTE_FOLDS
        .iter()
        .find(|(_, f)| *f == function)
        .map(|(v, _)| *v)
}

/// Value pushed by a float constant function.
pub fn float_constant(function: Function) -> Option<f32> {
    FLOAT_FOLDS
        .iter()
        .find(|(_, f)| *f == function)
        .map(|(bits, _)| f32::from_bits(*bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_encode_is_identity_for_every_byte() {
        for byte in 0..=255u8 {
            assert_eq!(Opcode::decode(byte).encode(), byte, "byte {byte:#04x}");
        }
    }

    #[test]
    fn family_is_low_two_bits() {
        assert_eq!(Family::of(0b1111_1100), Family::Func);
        assert_eq!(Family::of(0b0000_0001), Family::Push);
        assert_eq!(Family::of(0b0000_0010), Family::Pop);
        assert_eq!(Family::of(0b0000_0011), Family::Branch);
    }

    #[test]
    fn magic_modes_decode() {
        assert_eq!(Opcode::decode(encode(Family::Push, 0)), Opcode::Push(PushMode::Address));
        assert_eq!(Opcode::decode(encode(Family::Push, 32)), Opcode::Push(PushMode::Literal));
        assert_eq!(Opcode::decode(encode(Family::Pop, 33)), Opcode::Pop(PopMode::FloatIndirect));
        assert_eq!(Opcode::decode(encode(Family::Branch, 31)), Opcode::Branch(BranchMode::Jump));
        assert_eq!(
            Opcode::decode(encode(Family::Branch, 0)),
            Opcode::Branch(BranchMode::RelativeIfNonZero(-32))
        );
        assert_eq!(Opcode::decode(encode(Family::Push, 63)), Opcode::Push(PushMode::Relative(31)));
    }

    #[test]
    fn relative_rejects_reserved_offsets() {
        for offset in [-32, -1, 0, 1] {
            assert_eq!(Opcode::relative(Family::Push, offset), None);
            assert_eq!(Opcode::relative(Family::Pop, offset), None);
        }
        for offset in [-1, 0, 1] {
            assert_eq!(Opcode::relative(Family::Branch, offset), None);
        }
        assert_eq!(
            Opcode::relative(Family::Branch, -32),
            Some(Opcode::Branch(BranchMode::RelativeIfNonZero(-32)))
        );
        assert_eq!(Opcode::relative(Family::Push, 32), None);
        assert_eq!(Opcode::relative(Family::Push, -33), None);
        assert_eq!(Opcode::relative(Family::Func, 5), None);
    }

    #[test]
    fn relative_round_trips_through_encode() {
        let op = Opcode::relative(Family::Pop, -5).unwrap();
        assert_eq!(Opcode::decode(op.encode()), op);
    }

    #[test]
    fn instruction_lengths() {
        assert_eq!(Function::Nop.opcode(), 0x00);
        assert_eq!(Opcode::decode(Function::Add8.opcode()).size(), 1);
        assert_eq!(Opcode::Push(PushMode::Literal).size(), 2);
        assert_eq!(Opcode::Push(PushMode::FloatLiteral).size(), 5);
        assert_eq!(Opcode::Pop(PopMode::FloatIndirect).size(), 2);
        assert_eq!(Opcode::Branch(BranchMode::RelativeIfNonZero(4)).size(), 1);
    }

    #[test]
    fn unused_slots() {
        assert_eq!(Function::from_index(62), None);
        assert_eq!(Function::from_index(63), None);
        assert_eq!(Opcode::decode(encode(Family::Func, 62)), Opcode::Unused(62));
        assert_eq!(FUNCTION_TABLE.iter().filter(|f| f.is_some()).count(), 62);
    }

    #[test]
    fn mnemonic_lookup_round_trips() {
        for function in FUNCTION_TABLE.iter().flatten() {
            assert_eq!(Function::from_mnemonic(function.mnemonic()), Some(*function));
            assert_eq!(Function::from_index(function.index()), Some(*function));
        }
        assert_eq!(Function::from_mnemonic("frobnicate"), None);
    }

    #[test]
    fn folding_tables() {
        for v in [0u8, 1, 2, 3, 4, 255] {
            let f = fold_byte(v).unwrap();
            assert_eq!(byte_constant(f), Some(v));
        }
        assert_eq!(fold_byte(5), None);

        for v in [-1.0f32, 0.0, 1.0, 2.0, 3.0, f32::INFINITY] {
            let f = fold_float(v).unwrap();
            assert_eq!(float_constant(f).map(f32::to_bits), Some(v.to_bits()));
        }
        assert_eq!(fold_float(-0.0), None);
        assert_eq!(fold_float(f32::NAN), None);
        assert_eq!(fold_float(f32::NEG_INFINITY), None);
        assert_eq!(fold_float(0.5), None);
    }
}
