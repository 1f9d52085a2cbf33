//! Rendering nodes as Rust expressions.
//!
//! Each rendering carries a precedence level. A consumer states the minimum
//! level it accepts through a [`Position`]; anything below is wrapped in
//! parentheses. Casts are always printed parenthesized, so they behave as
//! atoms everywhere.

use warp_wasm::{BinaryOp, CompareOp, ConvertOp, LoadOp, StoreOp, UnaryOp, ValueType};

use crate::ir::{Expr, GlobalSlot, Literal, Node, NodeId, Type};

// ══════════════════════════════════════════════════════════════════════════════
// Precedence
// ══════════════════════════════════════════════════════════════════════════════

const SELECT: u8 = 0;
const COMPARE: u8 = 1;
const BIT_OR: u8 = 2;
const BIT_XOR: u8 = 3;
const BIT_AND: u8 = 4;
const SHIFT: u8 = 5;
const ADD: u8 = 6;
const MUL: u8 = 7;
const UNARY: u8 = 8;
const ATOM: u8 = 9;

/// Where a rendered expression is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    /// Lowest precedence accepted without parentheses.
    min: u8,
    /// Literals must carry their width suffix.
    suffix: bool,
}

impl Position {
    /// Function arguments, assignment right-hand sides, return values.
    pub const ARG: Position = Position {
        min: SELECT,
        suffix: false,
    };
    /// Like `ARG`, but the context does not fix the type.
    pub const TYPED: Position = Position {
        min: SELECT,
        suffix: true,
    };
    /// `if` conditions and `match` scrutinees cannot start with `if`.
    pub const COND: Position = Position {
        min: COMPARE,
        suffix: false,
    };
    const RECEIVER: Position = Position {
        min: ATOM,
        suffix: true,
    };
    /// Operand of an `as` cast.
    pub const CAST: Position = Position {
        min: UNARY,
        suffix: true,
    };

    fn operand(level: u8, suffix: bool) -> Position {
        Position {
            min: level + 1,
            suffix,
        }
    }
}

fn wrap(text: String, level: u8, pos: Position) -> String {
    if level < pos.min {
        format!("({text})")
    } else {
        text
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

/// Renders a literal, returning its precedence level.
pub(crate) fn literal(lit: Literal, suffix: bool) -> (String, u8) {
    let sfx = |s: &str| if suffix { s.to_string() } else { String::new() };
    match lit {
        Literal::I32(v) => (format!("{v}{}", sfx("i32")), signed_level(v < 0)),
        Literal::I64(v) => (format!("{v}{}", sfx("i64")), signed_level(v < 0)),
        Literal::F32(bits) => {
            let v = f32::from_bits(bits);
            if plain_float(v.is_finite(), v.is_subnormal(), bits >> 31 == 1, v == 0.0) {
                (format!("{v:?}{}", sfx("f32")), signed_level(v < 0.0))
            } else {
                (format!("f32::from_bits({bits:#x})"), ATOM)
            }
        }
        Literal::F64(bits) => {
            let v = f64::from_bits(bits);
            if plain_float(v.is_finite(), v.is_subnormal(), bits >> 63 == 1, v == 0.0) {
                (format!("{v:?}{}", sfx("f64")), signed_level(v < 0.0))
            } else {
                (format!("f64::from_bits({bits:#x})"), ATOM)
            }
        }
        Literal::Bool(b) => (b.to_string(), ATOM),
    }
}

fn signed_level(negative: bool) -> u8 {
    if negative {
        UNARY
    } else {
        ATOM
    }
}

/// NaNs, infinities, subnormals and negative zero go through `from_bits`.
fn plain_float(finite: bool, subnormal: bool, sign: bool, zero: bool) -> bool {
    finite && !subnormal && !(sign && zero)
}

/// A constant initializer rendered for its declared type.
pub(crate) fn typed_literal(lit: Literal) -> String {
    let (text, level) = literal(lit, true);
    wrap(text, level, Position::CAST)
}

// ══════════════════════════════════════════════════════════════════════════════
// Accessors
// ══════════════════════════════════════════════════════════════════════════════

/// Memory accessor and widening cast for a load.
fn load_access(op: LoadOp) -> (&'static str, Option<&'static str>) {
    match op {
        LoadOp::I32Load => ("i32", None),
        LoadOp::I64Load => ("i64", None),
        LoadOp::F32Load => ("f32", None),
        LoadOp::F64Load => ("f64", None),
        LoadOp::I32Load8S => ("i8", Some("i32")),
        LoadOp::I32Load8U => ("u8", Some("i32")),
        LoadOp::I32Load16S => ("i16", Some("i32")),
        LoadOp::I32Load16U => ("u16", Some("i32")),
        LoadOp::I64Load8S => ("i8", Some("i64")),
        LoadOp::I64Load8U => ("u8", Some("i64")),
        LoadOp::I64Load16S => ("i16", Some("i64")),
        LoadOp::I64Load16U => ("u16", Some("i64")),
        LoadOp::I64Load32S => ("i32", Some("i64")),
        LoadOp::I64Load32U => ("u32", Some("i64")),
    }
}

/// Memory accessor and narrowing cast for a store.
fn store_access(op: StoreOp) -> (&'static str, Option<&'static str>) {
    match op {
        StoreOp::I32Store => ("i32", None),
        StoreOp::I64Store => ("i64", None),
        StoreOp::F32Store => ("f32", None),
        StoreOp::F64Store => ("f64", None),
        StoreOp::I32Store8 | StoreOp::I64Store8 => ("u8", Some("u8")),
        StoreOp::I32Store16 | StoreOp::I64Store16 => ("u16", Some("u16")),
        StoreOp::I64Store32 => ("u32", Some("u32")),
    }
}

/// Bit width mask for shift and rotate counts.
fn mask(ty: Type) -> i64 {
    match ty {
        Type::I64 => 63,
        Type::I32 | Type::F32 | Type::F64 | Type::Bool => 31,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Emitter
// ══════════════════════════════════════════════════════════════════════════════

/// Renders nodes of one function.
pub(crate) struct Emitter<'a> {
    nodes: &'a [Node],
    globals: &'a [(GlobalSlot, ValueType)],
}

impl<'a> Emitter<'a> {
    pub fn new(nodes: &'a [Node], globals: &'a [(GlobalSlot, ValueType)]) -> Self {
        Self { nodes, globals }
    }

    pub fn expr(&self, id: NodeId, pos: Position) -> String {
        let Some(node) = self.nodes.get(id) else {
            return String::from("()");
        };
        if let Expr::Const(lit) = node.expr {
            let (text, level) = literal(lit, pos.suffix || !node.untyped);
            return wrap(text, level, pos);
        }
        let (text, level) = self.render(node);
        wrap(text, level, pos)
    }

    fn is_const(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id).map(|n| &n.expr), Some(Expr::Const(_)))
    }

    fn const_of(&self, id: NodeId) -> Option<Literal> {
        match self.nodes.get(id).map(|n| &n.expr) {
            Some(Expr::Const(lit)) => Some(*lit),
            _ => None,
        }
    }

    fn ty(&self, id: NodeId) -> Type {
        self.nodes.get(id).map_or(Type::I32, |n| n.ty)
    }

    /// An infix operation. A literal operand keeps its suffix unless the
    /// other side fixes the type.
    fn infix(&self, a: NodeId, op: &str, b: NodeId, level: u8) -> (String, u8) {
        let left = self.expr(a, Position::operand(level, self.is_const(b)));
        let right = self.expr(b, Position::operand(level, self.is_const(a)));
        (format!("{left} {op} {right}"), level)
    }

    fn method(&self, recv: NodeId, name: &str, arg: Option<NodeId>) -> (String, u8) {
        let recv = self.expr(recv, Position::RECEIVER);
        match arg {
            Some(arg) => (
                format!("{recv}.{name}({})", self.expr(arg, Position::ARG)),
                ATOM,
            ),
            None => (format!("{recv}.{name}()"), ATOM),
        }
    }

    fn call(&self, path: &str, args: &[NodeId], fallible: bool) -> (String, u8) {
        let args: Vec<String> = args.iter().map(|a| self.expr(*a, Position::ARG)).collect();
        let q = if fallible { "?" } else { "" };
        (format!("{path}({}){q}", args.join(", ")), ATOM)
    }

    fn cast(&self, x: NodeId, chain: &str) -> (String, u8) {
        (format!("({} as {chain})", self.expr(x, Position::CAST)), ATOM)
    }

    /// `x as u32` or `x as u64`, for unsigned views of an integer.
    fn unsigned(&self, x: NodeId) -> String {
        let target = if self.ty(x) == Type::I64 { "u64" } else { "u32" };
        format!("({} as {target})", self.expr(x, Position::CAST))
    }

    /// A shift or rotate count, masked to the operand width.
    fn count(&self, b: NodeId, ty: Type) -> String {
        match self.const_of(b) {
            Some(Literal::I32(v)) => (i64::from(v) & mask(ty)).to_string(),
            Some(Literal::I64(v)) => (v & mask(ty)).to_string(),
            _ => format!("({} & {})", self.expr(b, Position::operand(BIT_AND, false)), mask(ty)),
        }
    }

    fn shift(&self, a: NodeId, op: &str, b: NodeId) -> (String, u8) {
        let left = self.expr(a, Position::operand(SHIFT, true));
        (format!("{left} {op} {}", self.count(b, self.ty(a))), SHIFT)
    }

    fn rotate(&self, a: NodeId, name: &str, b: NodeId) -> (String, u8) {
        let recv = self.expr(a, Position::RECEIVER);
        let count = match self.const_of(b) {
            Some(_) => self.count(b, self.ty(a)),
            None => format!("({} as u32)", self.count(b, self.ty(a))),
        };
        (format!("{recv}.{name}({count})"), ATOM)
    }

    fn unsigned_compare(&self, a: NodeId, op: &str, b: NodeId) -> (String, u8) {
        (
            format!("{} {op} {}", self.unsigned(a), self.unsigned(b)),
            COMPARE,
        )
    }

    // ── Memory ──

    /// `acc_at(addr)` or `acc(base, offset)`. Constant addresses are
    /// pre-added when the sum stays below 2^32.
    fn address(&self, acc: &str, addr: NodeId, offset: u32) -> String {
        if let Some(Literal::I32(base)) = self.const_of(addr) {
            let effective = u64::from(base as u32) + u64::from(offset);
            if let Ok(effective) = u32::try_from(effective) {
                return format!("{acc}_at({}", effective as i32);
            }
            return format!("{acc}({base}, {offset}");
        }
        let base = self.expr(addr, Position::ARG);
        if offset == 0 {
            format!("{acc}_at({base}")
        } else {
            format!("{acc}({base}, {offset}")
        }
    }

    fn load(&self, op: LoadOp, addr: NodeId, offset: u32) -> (String, u8) {
        let (acc, widen) = load_access(op);
        let access = format!("m.mem0()?.{})?", self.address(acc, addr, offset));
        match widen {
            Some(target) => (format!("({access} as {target})"), ATOM),
            None => (access, ATOM),
        }
    }

    /// A complete store statement.
    pub fn store(&self, op: StoreOp, addr: NodeId, offset: u32, value: NodeId) -> String {
        let (acc, narrow) = store_access(op);
        let value = match narrow {
            Some(target) => format!("({} as {target})", self.expr(value, Position::CAST)),
            None => self.expr(value, Position::ARG),
        };
        let address = self.address(&format!("put_{acc}"), addr, offset);
        format!("m.mem0()?.{address}, {value})?;")
    }

    // ── Globals ──

    fn global_get(&self, index: u32) -> String {
        let Some((slot, ty)) = self.globals.get(index as usize) else {
            return format!("m.g{index}.get()");
        };
        let sfx = Type::from(*ty).rust();
        match slot {
            GlobalSlot::Private => format!("m.g{index}.get()"),
            GlobalSlot::Exported => format!("m.g{index}.get_{sfx}()"),
            GlobalSlot::Imported => format!("m.g{index}()?.get_{sfx}()"),
        }
    }

    /// A complete global assignment statement.
    pub fn global_set(&self, index: u32, value: NodeId) -> String {
        let value = self.expr(value, Position::ARG);
        let Some((slot, ty)) = self.globals.get(index as usize) else {
            return format!("m.g{index}.set({value});");
        };
        let sfx = Type::from(*ty).rust();
        match slot {
            GlobalSlot::Private => format!("m.g{index}.set({value});"),
            GlobalSlot::Exported => format!("m.g{index}.set_{sfx}({value});"),
            GlobalSlot::Imported => format!("m.g{index}()?.set_{sfx}({value});"),
        }
    }

    // ── Expressions ──

    fn render(&self, node: &Node) -> (String, u8) {
        match &node.expr {
            Expr::Const(lit) => literal(*lit, true),
            Expr::Temp(k) => (format!("t{k}"), ATOM),
            Expr::Local(i) => (format!("v{i}"), ATOM),
            Expr::Global(i) => (self.global_get(*i), ATOM),
            Expr::Load { op, addr, offset } => self.load(*op, *addr, *offset),
            Expr::MemorySize => ("(m.mem0()?.size() as i32)".to_string(), ATOM),
            Expr::Test(_, x) => (
                format!("{} == 0", self.expr(*x, Position::operand(COMPARE, false))),
                COMPARE,
            ),
            Expr::Not(x) => (format!("!{}", self.expr(*x, Position::RECEIVER)), UNARY),
            Expr::Compare(op, a, b) => self.compare(*op, *a, *b),
            Expr::Unary(op, x) => self.unary(*op, *x),
            Expr::Binary(op, a, b) => self.binary(*op, *a, *b),
            Expr::Convert(op, x) => self.convert(*op, *x),
            Expr::Select {
                then,
                otherwise,
                cond,
            } => (
                format!(
                    "if {} {{ {} }} else {{ {} }}",
                    self.expr(*cond, Position::COND),
                    self.expr(*then, Position::TYPED),
                    self.expr(*otherwise, Position::TYPED)
                ),
                SELECT,
            ),
            Expr::BoolToInt(x) => self.cast(*x, "i32"),
            Expr::IntToBool(x) => (
                format!("{} != 0", self.expr(*x, Position::operand(COMPARE, false))),
                COMPARE,
            ),
        }
    }

    fn compare(&self, op: CompareOp, a: NodeId, b: NodeId) -> (String, u8) {
        use CompareOp::*;
        match op {
            I32Eq | I64Eq | F32Eq | F64Eq => self.infix(a, "==", b, COMPARE),
            I32Ne | I64Ne | F32Ne | F64Ne => self.infix(a, "!=", b, COMPARE),
            I32LtS | I64LtS | F32Lt | F64Lt => self.infix(a, "<", b, COMPARE),
            I32GtS | I64GtS | F32Gt | F64Gt => self.infix(a, ">", b, COMPARE),
            I32LeS | I64LeS | F32Le | F64Le => self.infix(a, "<=", b, COMPARE),
            I32GeS | I64GeS | F32Ge | F64Ge => self.infix(a, ">=", b, COMPARE),
            I32LtU | I64LtU => self.unsigned_compare(a, "<", b),
            I32GtU | I64GtU => self.unsigned_compare(a, ">", b),
            I32LeU | I64LeU => self.unsigned_compare(a, "<=", b),
            I32GeU | I64GeU => self.unsigned_compare(a, ">=", b),
        }
    }

    fn unary(&self, op: UnaryOp, x: NodeId) -> (String, u8) {
        use UnaryOp::*;
        let counted = |name: &str, ty: &str| {
            let (text, _) = self.method(x, name, None);
            (format!("({text} as {ty})"), ATOM)
        };
        match op {
            I32Clz => counted("leading_zeros", "i32"),
            I32Ctz => counted("trailing_zeros", "i32"),
            I32Popcnt => counted("count_ones", "i32"),
            I64Clz => counted("leading_zeros", "i64"),
            I64Ctz => counted("trailing_zeros", "i64"),
            I64Popcnt => counted("count_ones", "i64"),
            I32Extend8S => self.cast(x, "i8 as i32"),
            I32Extend16S => self.cast(x, "i16 as i32"),
            I64Extend8S => self.cast(x, "i8 as i64"),
            I64Extend16S => self.cast(x, "i16 as i64"),
            I64Extend32S => self.cast(x, "i32 as i64"),
            F32Neg | F64Neg => (format!("-{}", self.expr(x, Position::RECEIVER)), UNARY),
            F32Abs | F64Abs => self.method(x, "abs", None),
            F32Ceil | F64Ceil => self.method(x, "ceil", None),
            F32Floor | F64Floor => self.method(x, "floor", None),
            F32Trunc | F64Trunc => self.method(x, "trunc", None),
            F32Nearest | F64Nearest => self.method(x, "round_ties_even", None),
            F32Sqrt | F64Sqrt => self.method(x, "sqrt", None),
        }
    }

    fn binary(&self, op: BinaryOp, a: NodeId, b: NodeId) -> (String, u8) {
        use BinaryOp::*;
        match op {
            I32Add | I64Add => self.method(a, "wrapping_add", Some(b)),
            I32Sub | I64Sub => self.method(a, "wrapping_sub", Some(b)),
            I32Mul | I64Mul => self.method(a, "wrapping_mul", Some(b)),
            I32DivS => self.call("numerics::i32_div_s", &[a, b], true),
            I32DivU => self.call("numerics::i32_div_u", &[a, b], true),
            I32RemS => self.call("numerics::i32_rem_s", &[a, b], true),
            I32RemU => self.call("numerics::i32_rem_u", &[a, b], true),
            I64DivS => self.call("numerics::i64_div_s", &[a, b], true),
            I64DivU => self.call("numerics::i64_div_u", &[a, b], true),
            I64RemS => self.call("numerics::i64_rem_s", &[a, b], true),
            I64RemU => self.call("numerics::i64_rem_u", &[a, b], true),
            I32And | I64And => self.infix(a, "&", b, BIT_AND),
            I32Or | I64Or => self.infix(a, "|", b, BIT_OR),
            I32Xor | I64Xor => self.infix(a, "^", b, BIT_XOR),
            I32Shl | I64Shl => self.shift(a, "<<", b),
            I32ShrS | I64ShrS => self.shift(a, ">>", b),
            I32ShrU | I64ShrU => {
                let signed = if op == I64ShrU { "i64" } else { "i32" };
                (
                    format!(
                        "(({} >> {}) as {signed})",
                        self.unsigned(a),
                        self.count(b, self.ty(a))
                    ),
                    ATOM,
                )
            }
            I32Rotl | I64Rotl => self.rotate(a, "rotate_left", b),
            I32Rotr | I64Rotr => self.rotate(a, "rotate_right", b),
            F32Add | F64Add => self.infix(a, "+", b, ADD),
            F32Sub | F64Sub => self.infix(a, "-", b, ADD),
            F32Mul | F64Mul => self.infix(a, "*", b, MUL),
            F32Div | F64Div => self.infix(a, "/", b, MUL),
            F32Min => self.call("numerics::f32_min", &[a, b], false),
            F32Max => self.call("numerics::f32_max", &[a, b], false),
            F64Min => self.call("numerics::f64_min", &[a, b], false),
            F64Max => self.call("numerics::f64_max", &[a, b], false),
            F32Copysign | F64Copysign => self.method(a, "copysign", Some(b)),
        }
    }

    fn convert(&self, op: ConvertOp, x: NodeId) -> (String, u8) {
        use ConvertOp::*;
        let widened = |path: &str| {
            let arg = format!("({} as f64)", self.expr(x, Position::CAST));
            (format!("{path}({arg})?"), ATOM)
        };
        match op {
            I32WrapI64 => self.cast(x, "i32"),
            I32TruncF32S => widened("numerics::i32_trunc_s"),
            I32TruncF32U => widened("numerics::i32_trunc_u"),
            I64TruncF32S => widened("numerics::i64_trunc_s"),
            I64TruncF32U => widened("numerics::i64_trunc_u"),
            I32TruncF64S => self.call("numerics::i32_trunc_s", &[x], true),
            I32TruncF64U => self.call("numerics::i32_trunc_u", &[x], true),
            I64TruncF64S => self.call("numerics::i64_trunc_s", &[x], true),
            I64TruncF64U => self.call("numerics::i64_trunc_u", &[x], true),
            I64ExtendI32S => self.cast(x, "i64"),
            I64ExtendI32U => self.cast(x, "u32 as i64"),
            F32ConvertI32S | F32ConvertI64S | F32DemoteF64 => self.cast(x, "f32"),
            F32ConvertI32U => self.cast(x, "u32 as f32"),
            F32ConvertI64U => self.cast(x, "u64 as f32"),
            F64ConvertI32S | F64ConvertI64S | F64PromoteF32 => self.cast(x, "f64"),
            F64ConvertI32U => self.cast(x, "u32 as f64"),
            F64ConvertI64U => self.cast(x, "u64 as f64"),
            I32ReinterpretF32 => {
                let (bits, _) = self.method(x, "to_bits", None);
                (format!("({bits} as i32)"), ATOM)
            }
            I64ReinterpretF64 => {
                let (bits, _) = self.method(x, "to_bits", None);
                (format!("({bits} as i64)"), ATOM)
            }
            F32ReinterpretI32 => (
                format!("f32::from_bits({})", self.unsigned(x)),
                ATOM,
            ),
            F64ReinterpretI64 => (
                format!("f64::from_bits({})", self.unsigned(x)),
                ATOM,
            ),
            I32TruncSatF32S | I32TruncSatF64S => self.cast(x, "i32"),
            I32TruncSatF32U | I32TruncSatF64U => self.cast(x, "u32 as i32"),
            I64TruncSatF32S | I64TruncSatF64S => self.cast(x, "i64"),
            I64TruncSatF32U | I64TruncSatF64U => self.cast(x, "u64 as i64"),
        }
    }
}
