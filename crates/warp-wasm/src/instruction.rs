//! The closed instruction set.
//!
//! Numeric instructions are grouped by shape ([`TestOp`], [`CompareOp`],
//! [`UnaryOp`], [`BinaryOp`], [`ConvertOp`]) so that arity and typing rules
//! can be stated once per group. Consumers match exhaustively; adding an
//! opcode is a compile error everywhere it is not yet handled.

use serde::Serialize;

use crate::types::{BlockType, ValueType};

/// The immediate of a load or store. Only memory 0 exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    pub fn offset(offset: u32) -> Self {
        Self { align: 0, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instruction {
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call(u32),
    /// Call through table 0 with the given type index.
    CallIndirect(u32),

    Drop,
    Select,

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,

    I32Const(i32),
    I64Const(i64),
    /// Raw IEEE-754 bits.
    F32Const(u32),
    /// Raw IEEE-754 bits.
    F64Const(u64),

    Test(TestOp),
    Compare(CompareOp),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Convert(ConvertOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoadOp {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

impl LoadOp {
    pub fn result_type(self) -> ValueType {
        match self {
            LoadOp::I32Load
            | LoadOp::I32Load8S
            | LoadOp::I32Load8U
            | LoadOp::I32Load16S
            | LoadOp::I32Load16U => ValueType::I32,
            LoadOp::I64Load
            | LoadOp::I64Load8S
            | LoadOp::I64Load8U
            | LoadOp::I64Load16S
            | LoadOp::I64Load16U
            | LoadOp::I64Load32S
            | LoadOp::I64Load32U => ValueType::I64,
            LoadOp::F32Load => ValueType::F32,
            LoadOp::F64Load => ValueType::F64,
        }
    }

    /// Access width in bytes.
    pub fn width(self) -> u32 {
        match self {
            LoadOp::I32Load8S | LoadOp::I32Load8U | LoadOp::I64Load8S | LoadOp::I64Load8U => 1,
            LoadOp::I32Load16S | LoadOp::I32Load16U | LoadOp::I64Load16S | LoadOp::I64Load16U => 2,
            LoadOp::I32Load | LoadOp::F32Load | LoadOp::I64Load32S | LoadOp::I64Load32U => 4,
            LoadOp::I64Load | LoadOp::F64Load => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StoreOp {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

impl StoreOp {
    pub fn value_type(self) -> ValueType {
        match self {
            StoreOp::I32Store | StoreOp::I32Store8 | StoreOp::I32Store16 => ValueType::I32,
            StoreOp::I64Store | StoreOp::I64Store8 | StoreOp::I64Store16 | StoreOp::I64Store32 => {
                ValueType::I64
            }
            StoreOp::F32Store => ValueType::F32,
            StoreOp::F64Store => ValueType::F64,
        }
    }

    /// Access width in bytes.
    pub fn width(self) -> u32 {
        match self {
            StoreOp::I32Store8 | StoreOp::I64Store8 => 1,
            StoreOp::I32Store16 | StoreOp::I64Store16 => 2,
            StoreOp::I32Store | StoreOp::F32Store | StoreOp::I64Store32 => 4,
            StoreOp::I64Store | StoreOp::F64Store => 8,
        }
    }
}

/// `eqz`: one integer operand, boolean result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TestOp {
    I32Eqz,
    I64Eqz,
}

impl TestOp {
    pub fn operand_type(self) -> ValueType {
        match self {
            TestOp::I32Eqz => ValueType::I32,
            TestOp::I64Eqz => ValueType::I64,
        }
    }
}

/// Two operands of the same type, boolean result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
}

impl CompareOp {
    pub fn operand_type(self) -> ValueType {
        use CompareOp::*;
        match self {
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU => ValueType::I32,
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS
            | I64GeU => ValueType::I64,
            F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => ValueType::F32,
            F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => ValueType::F64,
        }
    }
}

/// One operand, result of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Extend8S,
    I32Extend16S,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
}

impl UnaryOp {
    pub fn value_type(self) -> ValueType {
        use UnaryOp::*;
        match self {
            I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S => ValueType::I32,
            I64Clz | I64Ctz | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S => {
                ValueType::I64
            }
            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => {
                ValueType::F32
            }
            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => {
                ValueType::F64
            }
        }
    }
}

/// Two operands and a result, all of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,
}

impl BinaryOp {
    pub fn value_type(self) -> ValueType {
        use BinaryOp::*;
        match self {
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => ValueType::I32,
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => ValueType::I64,
            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => ValueType::F32,
            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => ValueType::F64,
        }
    }

    /// Integer division and remainder trap on a zero divisor.
    pub fn may_trap(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            I32DivS | I32DivU | I32RemS | I32RemU | I64DivS | I64DivU | I64RemS | I64RemU
        )
    }
}

/// One operand, result of a different type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConvertOp {
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}

impl ConvertOp {
    pub fn operand_type(self) -> ValueType {
        use ConvertOp::*;
        match self {
            I64ExtendI32S | I64ExtendI32U | F32ConvertI32S | F32ConvertI32U | F64ConvertI32S
            | F64ConvertI32U | F32ReinterpretI32 => ValueType::I32,
            I32WrapI64 | F32ConvertI64S | F32ConvertI64U | F64ConvertI64S | F64ConvertI64U
            | F64ReinterpretI64 => ValueType::I64,
            I32TruncF32S | I32TruncF32U | I64TruncF32S | I64TruncF32U | F64PromoteF32
            | I32ReinterpretF32 | I32TruncSatF32S | I32TruncSatF32U | I64TruncSatF32S
            | I64TruncSatF32U => ValueType::F32,
            I32TruncF64S | I32TruncF64U | I64TruncF64S | I64TruncF64U | F32DemoteF64
            | I64ReinterpretF64 | I32TruncSatF64S | I32TruncSatF64U | I64TruncSatF64S
            | I64TruncSatF64U => ValueType::F64,
        }
    }

    pub fn result_type(self) -> ValueType {
        use ConvertOp::*;
        match self {
            I32WrapI64 | I32TruncF32S | I32TruncF32U | I32TruncF64S | I32TruncF64U
            | I32ReinterpretF32 | I32TruncSatF32S | I32TruncSatF32U | I32TruncSatF64S
            | I32TruncSatF64U => ValueType::I32,
            I64ExtendI32S | I64ExtendI32U | I64TruncF32S | I64TruncF32U | I64TruncF64S
            | I64TruncF64U | I64ReinterpretF64 | I64TruncSatF32S | I64TruncSatF32U
            | I64TruncSatF64S | I64TruncSatF64U => ValueType::I64,
            F32ConvertI32S | F32ConvertI32U | F32ConvertI64S | F32ConvertI64U | F32DemoteF64
            | F32ReinterpretI32 => ValueType::F32,
            F64ConvertI32S | F64ConvertI32U | F64ConvertI64S | F64ConvertI64U | F64PromoteF32
            | F64ReinterpretI64 => ValueType::F64,
        }
    }

    /// Non-saturating float-to-integer truncations trap.
    pub fn may_trap(self) -> bool {
        use ConvertOp::*;
        matches!(
            self,
            I32TruncF32S
                | I32TruncF32U
                | I32TruncF64S
                | I32TruncF64U
                | I64TruncF32S
                | I64TruncF32U
                | I64TruncF64S
                | I64TruncF64U
        )
    }
}
