//! The value graph and statement tree shared by the builder and the emitter.
//!
//! Every stack value of the source function is a [`Node`] in an arena,
//! addressed by [`NodeId`]. A node is either still pending (its expression
//! will be inlined into its single consumer) or materialized as a temporary
//! `tN`. Statements are collected into a [`Stmt`] tree that mirrors the
//! structured control flow of the source.

use std::ops::BitOr;

use warp_wasm::{BinaryOp, CompareOp, ConvertOp, LoadOp, TestOp, UnaryOp, ValueType};

// ══════════════════════════════════════════════════════════════════════════════
// Types and Literals
// ══════════════════════════════════════════════════════════════════════════════

/// A value type, plus the `bool` pseudo-type produced by comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Type {
    I32,
    I64,
    F32,
    F64,
    Bool,
}

impl From<ValueType> for Type {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Type::I32,
            ValueType::I64 => Type::I64,
            ValueType::F32 => Type::F32,
            ValueType::F64 => Type::F64,
        }
    }
}

impl Type {
    pub fn rust(self) -> &'static str {
        match self {
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Bool => "bool",
        }
    }

    /// The initializer of a fresh local or temporary.
    pub fn zero(self) -> &'static str {
        match self {
            Type::I32 | Type::I64 => "0",
            Type::F32 | Type::F64 => "0.0",
            Type::Bool => "false",
        }
    }
}

/// A constant. Floats are kept as raw bits so NaN payloads survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Literal {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    Bool(bool),
}

impl Literal {
    pub fn ty(self) -> Type {
        match self {
            Literal::I32(_) => Type::I32,
            Literal::I64(_) => Type::I64,
            Literal::F32(_) => Type::F32,
            Literal::F64(_) => Type::F64,
            Literal::Bool(_) => Type::Bool,
        }
    }

    pub fn f32(v: f32) -> Self {
        Literal::F32(v.to_bits())
    }

    pub fn f64(v: f64) -> Self {
        Literal::F64(v.to_bits())
    }

    pub fn as_i32(self) -> Option<i32> {
        match self {
            Literal::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Literal::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(self) -> Option<f32> {
        match self {
            Literal::F32(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Literal::F64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Literal::Bool(v) => Some(v),
            _ => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Effects
// ══════════════════════════════════════════════════════════════════════════════

/// What evaluating an instruction may observe or change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Effects(u8);

impl Effects {
    pub const NONE: Effects = Effects(0);
    pub const LOAD_LOCAL: Effects = Effects(1 << 0);
    pub const LOAD_GLOBAL: Effects = Effects(1 << 1);
    pub const LOAD_MEM: Effects = Effects(1 << 2);
    pub const STORE_LOCAL: Effects = Effects(1 << 3);
    pub const STORE_GLOBAL: Effects = Effects(1 << 4);
    pub const STORE_MEM: Effects = Effects(1 << 5);
    pub const MAY_TRAP: Effects = Effects(1 << 6);
    pub const CONTROL: Effects = Effects(1 << 7);

    /// A call may do anything except touch the caller's locals.
    pub const CALL: Effects = Effects(
        Self::LOAD_GLOBAL.0
            | Self::LOAD_MEM.0
            | Self::STORE_GLOBAL.0
            | Self::STORE_MEM.0
            | Self::MAY_TRAP.0
            | Self::CONTROL.0,
    );

    pub fn intersects(self, other: Effects) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Effects {
    type Output = Effects;

    fn bitor(self, rhs: Effects) -> Effects {
        Effects(self.0 | rhs.0)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) type NodeId = usize;

/// The expression a node stands for. Operands are other nodes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Const(Literal),
    Temp(u32),
    Local(u32),
    Global(u32),
    Load {
        op: LoadOp,
        addr: NodeId,
        offset: u32,
    },
    MemorySize,
    Test(TestOp, NodeId),
    /// `eqz` of a boolean.
    Not(NodeId),
    Compare(CompareOp, NodeId, NodeId),
    Unary(UnaryOp, NodeId),
    Binary(BinaryOp, NodeId, NodeId),
    Convert(ConvertOp, NodeId),
    Select {
        then: NodeId,
        otherwise: NodeId,
        cond: NodeId,
    },
    /// A boolean consumed as an `i32`.
    BoolToInt(NodeId),
    /// An `i32` consumed as a condition.
    IntToBool(NodeId),
}

impl Expr {
    /// Operands in evaluation order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Expr::Const(_) | Expr::Temp(_) | Expr::Local(_) | Expr::Global(_) | Expr::MemorySize => {
                Vec::new()
            }
            Expr::Load { addr, .. } => vec![*addr],
            Expr::Test(_, x)
            | Expr::Not(x)
            | Expr::Unary(_, x)
            | Expr::Convert(_, x)
            | Expr::BoolToInt(x)
            | Expr::IntToBool(x) => vec![*x],
            Expr::Compare(_, a, b) | Expr::Binary(_, a, b) => vec![*a, *b],
            Expr::Select {
                then,
                otherwise,
                cond,
            } => vec![*then, *otherwise, *cond],
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub expr: Expr,
    pub ty: Type,
    /// Effects of the node and all of its operands.
    pub effects: Effects,
    /// Locals read anywhere in the expression, sorted and deduplicated.
    pub reads: Vec<u32>,
    /// Set by the literal classifier; see `classify`.
    pub untyped: bool,
}

impl Node {
    /// Temporaries and constants can be read any number of times, at any
    /// point, with the same result.
    pub fn is_value(&self) -> bool {
        matches!(self.expr, Expr::Const(_) | Expr::Temp(_))
    }

    /// Whether this pending node may still be evaluated after a statement
    /// with `effects` that writes the locals in `writes`.
    pub fn can_move_after(&self, effects: Effects, writes: &[u32]) -> bool {
        if self.effects.intersects(Effects::LOAD_GLOBAL) && effects.intersects(Effects::STORE_GLOBAL)
        {
            return false;
        }
        if self.effects.intersects(Effects::LOAD_MEM) && effects.intersects(Effects::STORE_MEM) {
            return false;
        }
        if self.reads.iter().any(|r| writes.binary_search(r).is_ok()) {
            return false;
        }
        let ordered = Effects::STORE_LOCAL
            | Effects::STORE_GLOBAL
            | Effects::STORE_MEM
            | Effects::MAY_TRAP
            | Effects::CONTROL;
        !(self.effects.intersects(Effects::MAY_TRAP) && effects.intersects(ordered))
    }
}

/// How compiled code reaches a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlobalSlot {
    /// A local, unexported global: a plain `Cell`.
    Private,
    /// A local global visible to other modules: a shared `Global`.
    Exported,
    /// An imported global, resolved at instantiation.
    Imported,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// One statement of a generated function body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    /// A complete statement, including its trailing `;`.
    Line(String),
    /// `'lN: { ... }`
    Block { label: u32, body: Vec<Stmt> },
    /// `'lN: loop { ... }`
    Loop { label: u32, body: Vec<Stmt> },
    /// `if cond { ... } else { ... }`, inside `'lN: { }` when labeled.
    If {
        label: Option<u32>,
        cond: String,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `match scrutinee { pattern => { ... } ... }`
    Match {
        scrutinee: String,
        arms: Vec<(String, Vec<Stmt>)>,
    },
}
