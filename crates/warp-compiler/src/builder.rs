//! Function body construction.
//!
//! The builder walks a validated instruction sequence once, simulating the
//! operand stack with [`Node`]s. Pure values stay pending and are inlined
//! into their single consumer; anything whose evaluation order matters is
//! materialized into a temporary before the statement that would reorder
//! it. Structured control flow maps onto Rust directly:
//!
//! | Wasm        | Rust                                               |
//! |-------------|----------------------------------------------------|
//! | `block`     | `'lN: { ... }` (inline when never branched to)      |
//! | `loop`      | `'lN: loop { ...; break 'lN; }`                     |
//! | `if`/`else` | `if c { ... } else { ... }`                        |
//! | `br`        | `break 'lN` / `continue 'lN` / `return`             |
//! | `br_table`  | `match idx { 0 \| 2 => { ... } _ => { ... } }`      |
//!
//! Block results travel through temporaries assigned at every exit.

use std::collections::BTreeSet;
use std::mem;

use warp_wasm::{
    BinaryOp, BlockType, CompareOp, ConvertOp, FunctionScope, Instruction, LoadOp, MemArg,
    Scope, StoreOp, TestOp, UnaryOp, ValueType,
};

use crate::classify;
use crate::emit::{Emitter, Position};
use crate::error::{internal, CompileError, CompileResult};
use crate::evaluate;
use crate::ir::{Effects, Expr, GlobalSlot, Literal, Node, NodeId, Stmt, Type};

/// Module-level facts every function body needs.
pub(crate) struct Context<'a> {
    /// Rust name of every function, by function index.
    pub names: &'a [String],
    /// Access path and type of every global, by global index.
    pub globals: &'a [(GlobalSlot, ValueType)],
    pub untyped_literals: bool,
}

/// A finished function body.
#[derive(Debug)]
pub(crate) struct Body {
    /// Types of the temporaries `t0..`.
    pub temps: Vec<Type>,
    pub stmts: Vec<Stmt>,
    /// Type indices reached through `call_indirect`.
    pub indirect_types: BTreeSet<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Function,
    Block,
    Loop,
    If,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    label: u32,
    /// Operand stack height below the block's parameters.
    height: usize,
    /// Parameter values on entry; re-pushed at `else`.
    params: Vec<NodeId>,
    outs: Vec<ValueType>,
    /// Loop parameters, reassigned by `continue`.
    in_temps: Vec<u32>,
    out_temps: Vec<u32>,
    branch_target: bool,
    unreachable: bool,
    /// Opened in dead code; nothing inside is emitted.
    never_reachable: bool,
    cond: String,
    has_else: bool,
    then_reachable: bool,
    then_body: Vec<Stmt>,
    body: Vec<Stmt>,
}

impl Block {
    fn new(kind: BlockKind, label: u32, height: usize) -> Self {
        Self {
            kind,
            label,
            height,
            params: Vec::new(),
            outs: Vec::new(),
            in_temps: Vec::new(),
            out_temps: Vec::new(),
            branch_target: false,
            unreachable: false,
            never_reachable: false,
            cond: String::new(),
            has_else: false,
            then_reachable: false,
            then_body: Vec::new(),
            body: Vec::new(),
        }
    }

    fn dead() -> Self {
        Self {
            never_reachable: true,
            unreachable: true,
            ..Self::new(BlockKind::Block, 0, 0)
        }
    }
}

pub(crate) struct Builder<'a> {
    scope: &'a FunctionScope<'a>,
    ctx: &'a Context<'a>,
    nodes: Vec<Node>,
    stack: Vec<NodeId>,
    blocks: Vec<Block>,
    temps: Vec<Type>,
    labels: u32,
    indirect_types: BTreeSet<u32>,
    output: Option<Vec<Stmt>>,
}

impl<'a> Builder<'a> {
    pub fn new(scope: &'a FunctionScope<'a>, ctx: &'a Context<'a>) -> Self {
        Self {
            scope,
            ctx,
            nodes: Vec::new(),
            stack: Vec::new(),
            blocks: Vec::new(),
            temps: Vec::new(),
            labels: 0,
            indirect_types: BTreeSet::new(),
            output: None,
        }
    }

    pub fn build(mut self, code: &[Instruction]) -> CompileResult<Body> {
        let mut function = Block::new(BlockKind::Function, 0, 0);
        function.outs = self.scope.func_type().results().to_vec();
        self.blocks.push(function);

        for instruction in code {
            if self.blocks.is_empty() {
                return internal("instructions after the end of the function body");
            }
            self.instruction(instruction)?;
        }

        match self.output {
            Some(stmts) => Ok(Body {
                temps: self.temps,
                stmts,
                indirect_types: self.indirect_types,
            }),
            None => internal("function body is not terminated by `end`"),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════════

    fn instruction(&mut self, instruction: &Instruction) -> CompileResult<()> {
        if self.is_unreachable() {
            return self.skip(instruction);
        }
        match instruction {
            Instruction::Unreachable => {
                self.spill_all()?;
                self.line("return Err(Trap::Unreachable);".to_string())?;
                self.set_unreachable()
            }
            Instruction::Nop => Ok(()),
            Instruction::Block(ty) => self.open(BlockKind::Block, *ty),
            Instruction::Loop(ty) => self.open(BlockKind::Loop, *ty),
            Instruction::If(ty) => self.open(BlockKind::If, *ty),
            Instruction::Else => self.else_arm(),
            Instruction::End => self.end(),
            Instruction::Br(depth) => self.br(*depth),
            Instruction::BrIf(depth) => self.br_if(*depth),
            Instruction::BrTable { targets, default } => self.br_table(targets, *default),
            Instruction::Return => {
                let depth = self.blocks.len().saturating_sub(1) as u32;
                self.br(depth)
            }
            Instruction::Call(index) => self.call(*index),
            Instruction::CallIndirect(type_index) => self.call_indirect(*type_index),
            Instruction::Drop => self.drop_value(),
            Instruction::Select => self.select(),
            Instruction::LocalGet(index) => self.local_get(*index),
            Instruction::LocalSet(index) => self.local_set(*index),
            Instruction::LocalTee(index) => {
                self.local_set(*index)?;
                self.local_get(*index)
            }
            Instruction::GlobalGet(index) => self.global_get(*index),
            Instruction::GlobalSet(index) => self.global_set(*index),
            Instruction::Load(op, arg) => self.load(*op, *arg),
            Instruction::Store(op, arg) => self.store(*op, *arg),
            Instruction::MemorySize => {
                self.require_memory()?;
                self.push(Expr::MemorySize, Type::I32, Effects::LOAD_MEM);
                Ok(())
            }
            Instruction::MemoryGrow => self.memory_grow(),
            Instruction::I32Const(v) => self.constant(Literal::I32(*v)),
            Instruction::I64Const(v) => self.constant(Literal::I64(*v)),
            Instruction::F32Const(bits) => self.constant(Literal::F32(*bits)),
            Instruction::F64Const(bits) => self.constant(Literal::F64(*bits)),
            Instruction::Test(op) => self.test(*op),
            Instruction::Compare(op) => self.compare(*op),
            Instruction::Unary(op) => self.unary(*op),
            Instruction::Binary(op) => self.binary(*op),
            Instruction::Convert(op) => self.convert(*op),
        }
    }

    /// Dead code: only block structure is tracked.
    fn skip(&mut self, instruction: &Instruction) -> CompileResult<()> {
        match instruction {
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => {
                self.blocks.push(Block::dead());
                Ok(())
            }
            Instruction::Else => self.else_arm(),
            Instruction::End => self.end(),
            Instruction::Unreachable
            | Instruction::Nop
            | Instruction::Br(_)
            | Instruction::BrIf(_)
            | Instruction::BrTable { .. }
            | Instruction::Return
            | Instruction::Call(_)
            | Instruction::CallIndirect(_)
            | Instruction::Drop
            | Instruction::Select
            | Instruction::LocalGet(_)
            | Instruction::LocalSet(_)
            | Instruction::LocalTee(_)
            | Instruction::GlobalGet(_)
            | Instruction::GlobalSet(_)
            | Instruction::Load(..)
            | Instruction::Store(..)
            | Instruction::MemorySize
            | Instruction::MemoryGrow
            | Instruction::I32Const(_)
            | Instruction::I64Const(_)
            | Instruction::F32Const(_)
            | Instruction::F64Const(_)
            | Instruction::Test(_)
            | Instruction::Compare(_)
            | Instruction::Unary(_)
            | Instruction::Binary(_)
            | Instruction::Convert(_) => Ok(()),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Nodes and the operand stack
    // ══════════════════════════════════════════════════════════════════════════

    fn emitter(&self) -> Emitter<'_> {
        Emitter::new(&self.nodes, self.ctx.globals)
    }

    fn render(&self, id: NodeId, pos: Position) -> String {
        self.emitter().expr(id, pos)
    }

    fn literal_of(&self, id: NodeId) -> Option<Literal> {
        match self.nodes.get(id).map(|n| &n.expr) {
            Some(Expr::Const(lit)) => Some(*lit),
            _ => None,
        }
    }

    fn fold(&self, expr: &Expr) -> Option<Literal> {
        match expr {
            Expr::Test(op, x) => evaluate::test(*op, self.literal_of(*x)?),
            Expr::Not(x) => Some(Literal::Bool(!self.literal_of(*x)?.as_bool()?)),
            Expr::Compare(op, a, b) => {
                evaluate::compare(*op, self.literal_of(*a)?, self.literal_of(*b)?)
            }
            Expr::Unary(op, x) => evaluate::unary(*op, self.literal_of(*x)?),
            Expr::Binary(op, a, b) => {
                evaluate::binary(*op, self.literal_of(*a)?, self.literal_of(*b)?)
            }
            Expr::Convert(op, x) => evaluate::convert(*op, self.literal_of(*x)?),
            Expr::BoolToInt(x) => Some(Literal::I32(i32::from(self.literal_of(*x)?.as_bool()?))),
            Expr::IntToBool(x) => Some(Literal::Bool(self.literal_of(*x)?.as_i32()? != 0)),
            Expr::Const(_)
            | Expr::Temp(_)
            | Expr::Local(_)
            | Expr::Global(_)
            | Expr::Load { .. }
            | Expr::MemorySize
            | Expr::Select { .. } => None,
        }
    }

    /// Creates a node, folding it when all operands are constants.
    fn node(&mut self, expr: Expr, ty: Type, own: Effects) -> NodeId {
        let untyped = self.ctx.untyped_literals && classify::untyped(&expr, &self.nodes);
        let node = match self.fold(&expr) {
            Some(lit) => Node {
                expr: Expr::Const(lit),
                ty: lit.ty(),
                effects: Effects::NONE,
                reads: Vec::new(),
                untyped,
            },
            None => {
                let mut effects = own;
                let mut reads = Vec::new();
                if let Expr::Local(index) = expr {
                    reads.push(index);
                }
                for operand in expr.operands() {
                    if let Some(n) = self.nodes.get(operand) {
                        effects = effects | n.effects;
                        reads.extend_from_slice(&n.reads);
                    }
                }
                reads.sort_unstable();
                reads.dedup();
                Node {
                    expr,
                    ty,
                    effects,
                    reads,
                    untyped,
                }
            }
        };
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn push(&mut self, expr: Expr, ty: Type, own: Effects) -> NodeId {
        let id = self.node(expr, ty, own);
        self.stack.push(id);
        id
    }

    fn temp_node(&mut self, k: u32, ty: Type) -> NodeId {
        self.node(Expr::Temp(k), ty, Effects::NONE)
    }

    fn new_temp(&mut self, ty: Type) -> u32 {
        self.temps.push(ty);
        (self.temps.len() - 1) as u32
    }

    fn pop(&mut self) -> CompileResult<NodeId> {
        self.stack
            .pop()
            .ok_or_else(|| CompileError::Internal("operand stack underflow".to_string()))
    }

    /// A boolean consumed as an integer becomes `(b as i32)`.
    fn widen(&mut self, id: NodeId) -> NodeId {
        match self.nodes.get(id) {
            Some(n) if n.ty == Type::Bool => self.node(Expr::BoolToInt(id), Type::I32, Effects::NONE),
            _ => id,
        }
    }

    /// Whether evaluating `id` does more than read locals and constants.
    fn effectful(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.effects.intersects(Effects::CALL))
    }

    fn pop_value(&mut self) -> CompileResult<NodeId> {
        let id = self.pop()?;
        Ok(self.widen(id))
    }

    /// Pops the operands of an instruction with the given parameter types,
    /// returning them in stack order.
    fn pop_values(&mut self, count: usize) -> CompileResult<Vec<NodeId>> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop_value()?);
        }
        values.reverse();
        Ok(values)
    }

    fn pop_cond(&mut self) -> CompileResult<NodeId> {
        let id = self.pop()?;
        match self.nodes.get(id).map(|n| (&n.expr, n.ty)) {
            Some((_, Type::Bool)) => Ok(id),
            Some((Expr::BoolToInt(inner), _)) => Ok(*inner),
            _ => Ok(self.node(Expr::IntToBool(id), Type::Bool, Effects::NONE)),
        }
    }

    fn is_value(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_value)
    }

    fn effects(&self, id: NodeId) -> Effects {
        self.nodes.get(id).map_or(Effects::NONE, |n| n.effects)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Statements and ordering
    // ══════════════════════════════════════════════════════════════════════════

    fn top(&self) -> CompileResult<&Block> {
        self.blocks
            .last()
            .ok_or_else(|| CompileError::Internal("no open block".to_string()))
    }

    fn top_mut(&mut self) -> CompileResult<&mut Block> {
        self.blocks
            .last_mut()
            .ok_or_else(|| CompileError::Internal("no open block".to_string()))
    }

    fn line(&mut self, text: String) -> CompileResult<()> {
        self.top_mut()?.body.push(Stmt::Line(text));
        Ok(())
    }

    fn is_unreachable(&self) -> bool {
        self.blocks.last().is_some_and(|b| b.unreachable)
    }

    /// Ends the current straight-line code: everything after is dead until
    /// the enclosing `else` or `end`.
    fn set_unreachable(&mut self) -> CompileResult<()> {
        let block = self.top_mut()?;
        block.unreachable = true;
        let height = block.height;
        self.stack.truncate(height);
        Ok(())
    }

    /// Materializes a pending node into a fresh temporary.
    fn spill(&mut self, id: NodeId) -> CompileResult<NodeId> {
        if self.is_value(id) {
            return Ok(id);
        }
        let ty = self.nodes.get(id).map_or(Type::I32, |n| n.ty);
        let k = self.new_temp(ty);
        let text = format!("t{k} = {};", self.render(id, Position::ARG));
        self.line(text)?;
        Ok(self.temp_node(k, ty))
    }

    fn spill_all(&mut self) -> CompileResult<()> {
        for i in 0..self.stack.len() {
            let spilled = self.spill(self.stack[i])?;
            self.stack[i] = spilled;
        }
        Ok(())
    }

    /// Spills, bottom to top, every pending node that may not be evaluated
    /// after a statement with `effects` writing `writes`.
    fn spill_conflicting(&mut self, effects: Effects, writes: &[u32]) -> CompileResult<()> {
        for i in 0..self.stack.len() {
            let id = self.stack[i];
            let movable = self
                .nodes
                .get(id)
                .map_or(true, |n| n.is_value() || n.can_move_after(effects, writes));
            if !movable {
                let spilled = self.spill(id)?;
                self.stack[i] = spilled;
            }
        }
        Ok(())
    }

    /// Prepares the stack for a statement consuming `operands`.
    fn ordered(&mut self, operands: &[NodeId], own: Effects, writes: &[u32]) -> CompileResult<()> {
        let effects = operands
            .iter()
            .fold(own, |acc, id| acc | self.effects(*id));
        self.spill_conflicting(effects, writes)
    }

    fn args(&self, values: &[NodeId]) -> String {
        values
            .iter()
            .map(|v| format!(", {}", self.render(*v, Position::ARG)))
            .collect()
    }

    /// Binds the results of a call-like expression to fresh temporaries.
    fn bind_results(&mut self, call: String, results: &[ValueType]) -> CompileResult<()> {
        match results {
            [] => self.line(format!("{call};")),
            [ty] => {
                let ty = Type::from(*ty);
                let k = self.new_temp(ty);
                self.line(format!("t{k} = {call};"))?;
                let id = self.temp_node(k, ty);
                self.stack.push(id);
                Ok(())
            }
            many => {
                let mut names = Vec::with_capacity(many.len());
                let mut ids = Vec::with_capacity(many.len());
                for ty in many {
                    let ty = Type::from(*ty);
                    let k = self.new_temp(ty);
                    names.push(format!("t{k}"));
                    ids.push(self.temp_node(k, ty));
                }
                self.line(format!("({}) = {call};", names.join(", ")))?;
                self.stack.extend(ids);
                Ok(())
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Variables and memory
    // ══════════════════════════════════════════════════════════════════════════

    fn local_type(&self, index: u32) -> CompileResult<Type> {
        self.scope
            .local_type(index)
            .map(Type::from)
            .ok_or_else(|| CompileError::Internal(format!("unknown local {index}")))
    }

    fn local_get(&mut self, index: u32) -> CompileResult<()> {
        let ty = self.local_type(index)?;
        self.push(Expr::Local(index), ty, Effects::LOAD_LOCAL);
        Ok(())
    }

    fn local_set(&mut self, index: u32) -> CompileResult<()> {
        let value = self.pop_value()?;
        self.ordered(&[value], Effects::STORE_LOCAL, &[index])?;
        let text = format!("v{index} = {};", self.render(value, Position::ARG));
        self.line(text)
    }

    fn global_get(&mut self, index: u32) -> CompileResult<()> {
        let ty = self
            .scope
            .global_type(index)
            .ok_or_else(|| CompileError::Internal(format!("unknown global {index}")))?;
        self.push(Expr::Global(index), ty.content.into(), Effects::LOAD_GLOBAL);
        Ok(())
    }

    fn global_set(&mut self, index: u32) -> CompileResult<()> {
        let value = self.pop_value()?;
        self.ordered(&[value], Effects::STORE_GLOBAL, &[])?;
        let text = self.emitter().global_set(index, value);
        self.line(text)
    }

    fn require_memory(&self) -> CompileResult<()> {
        if self.scope.has_memory() {
            Ok(())
        } else {
            Err(CompileError::InvalidMemoryIndex(0))
        }
    }

    fn load(&mut self, op: LoadOp, arg: MemArg) -> CompileResult<()> {
        self.require_memory()?;
        let addr = self.pop_value()?;
        let expr = Expr::Load {
            op,
            addr,
            offset: arg.offset,
        };
        self.push(
            expr,
            op.result_type().into(),
            Effects::LOAD_MEM | Effects::MAY_TRAP,
        );
        Ok(())
    }

    fn store(&mut self, op: StoreOp, arg: MemArg) -> CompileResult<()> {
        self.require_memory()?;
        let value = self.pop_value()?;
        let addr = self.pop_value()?;
        self.ordered(&[addr, value], Effects::STORE_MEM | Effects::MAY_TRAP, &[])?;
        let text = self.emitter().store(op, addr, arg.offset, value);
        self.line(text)
    }

    fn memory_grow(&mut self) -> CompileResult<()> {
        self.require_memory()?;
        let delta = self.pop_value()?;
        self.ordered(&[delta], Effects::LOAD_MEM | Effects::STORE_MEM, &[])?;
        let call = format!(
            "m.mem0()?.grow({}).map_or(-1, |p| p as i32)",
            self.unsigned(delta)
        );
        self.bind_results(call, &[ValueType::I32])
    }

    fn unsigned(&self, id: NodeId) -> String {
        match self.literal_of(id) {
            Some(Literal::I32(v)) => (v as u32).to_string(),
            _ => format!("({} as u32)", self.render(id, Position::CAST)),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════════

    fn call(&mut self, index: u32) -> CompileResult<()> {
        let ty = self
            .scope
            .function_type(index)
            .ok_or_else(|| CompileError::Internal(format!("unknown function {index}")))?
            .clone();
        let name = self
            .ctx
            .names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| CompileError::Internal(format!("unnamed function {index}")))?;
        let args = self.pop_values(ty.params().len())?;
        self.ordered(&args, Effects::CALL, &[])?;
        let call = format!("{name}(m, t{})?", self.args(&args));
        self.bind_results(call, ty.results())
    }

    fn call_indirect(&mut self, type_index: u32) -> CompileResult<()> {
        if !self.scope.has_table() {
            return Err(CompileError::InvalidTableIndex(0));
        }
        let ty = self
            .scope
            .signature(type_index)
            .ok_or_else(|| CompileError::Internal(format!("unknown type {type_index}")))?
            .clone();
        let index = self.pop_value()?;
        let mut args = self.pop_values(ty.params().len())?;
        args.push(index);
        self.ordered(&args, Effects::CALL, &[])?;
        self.indirect_types.insert(type_index);
        let call = format!("call_indirect_{type_index}(m, t{})?", self.args(&args));
        self.bind_results(call, ty.results())
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Parametric and numeric
    // ══════════════════════════════════════════════════════════════════════════

    fn drop_value(&mut self) -> CompileResult<()> {
        let id = self.pop()?;
        if self.is_value(id) || !self.effects(id).intersects(Effects::MAY_TRAP) {
            return Ok(());
        }
        self.ordered(&[id], Effects::NONE, &[])?;
        let text = format!("let _ = {};", self.render(id, Position::ARG));
        self.line(text)
    }

    fn select(&mut self) -> CompileResult<()> {
        let cond = self.pop_cond()?;
        let mut otherwise = self.pop_value()?;
        let mut then = self.pop_value()?;
        let trapping = self.effects(then) | self.effects(otherwise);
        if trapping.intersects(Effects::MAY_TRAP) {
            // Both arms are evaluated before the condition.
            self.spill_conflicting(trapping, &[])?;
            then = self.spill(then)?;
            otherwise = self.spill(otherwise)?;
        }
        let ty = self.nodes.get(then).map_or(Type::I32, |n| n.ty);
        self.push(
            Expr::Select {
                then,
                otherwise,
                cond,
            },
            ty,
            Effects::NONE,
        );
        Ok(())
    }

    fn constant(&mut self, lit: Literal) -> CompileResult<()> {
        self.push(Expr::Const(lit), lit.ty(), Effects::NONE);
        Ok(())
    }

    fn test(&mut self, op: TestOp) -> CompileResult<()> {
        let x = self.pop()?;
        let is_bool = self.nodes.get(x).is_some_and(|n| n.ty == Type::Bool);
        if is_bool && op == TestOp::I32Eqz {
            self.push(Expr::Not(x), Type::Bool, Effects::NONE);
        } else {
            let x = self.widen(x);
            self.push(Expr::Test(op, x), Type::Bool, Effects::NONE);
        }
        Ok(())
    }

    fn compare(&mut self, op: CompareOp) -> CompileResult<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        self.push(Expr::Compare(op, a, b), Type::Bool, Effects::NONE);
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp) -> CompileResult<()> {
        let x = self.pop_value()?;
        self.push(Expr::Unary(op, x), op.value_type().into(), Effects::NONE);
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp) -> CompileResult<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let own = if op.may_trap() {
            Effects::MAY_TRAP
        } else {
            Effects::NONE
        };
        self.push(Expr::Binary(op, a, b), op.value_type().into(), own);
        Ok(())
    }

    fn convert(&mut self, op: ConvertOp) -> CompileResult<()> {
        let x = self.pop_value()?;
        let own = if op.may_trap() {
            Effects::MAY_TRAP
        } else {
            Effects::NONE
        };
        self.push(Expr::Convert(op, x), op.result_type().into(), own);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Control flow
    // ══════════════════════════════════════════════════════════════════════════

    fn next_label(&mut self) -> u32 {
        self.labels += 1;
        self.labels
    }

    fn open(&mut self, kind: BlockKind, ty: BlockType) -> CompileResult<()> {
        let (ins, outs) = self
            .scope
            .block_type(ty)
            .ok_or_else(|| CompileError::Internal(format!("unknown block type {ty:?}")))?;
        let cond = match kind {
            BlockKind::If => Some(self.pop_cond()?),
            BlockKind::Function | BlockKind::Block | BlockKind::Loop => None,
        };
        self.spill_all()?;
        let params = self.pop_values(ins.len())?;
        let height = self.stack.len();
        let label = self.next_label();

        let mut block = Block::new(kind, label, height);
        if kind == BlockKind::Loop {
            for (value, ty) in params.iter().zip(&ins) {
                let ty = Type::from(*ty);
                let k = self.new_temp(ty);
                let text = format!("t{k} = {};", self.render(*value, Position::ARG));
                self.line(text)?;
                block.in_temps.push(k);
                let id = self.temp_node(k, ty);
                self.stack.push(id);
            }
        } else {
            self.stack.extend_from_slice(&params);
        }
        block.out_temps = outs.iter().map(|ty| self.new_temp((*ty).into())).collect();
        block.outs = outs;
        block.params = params;
        if let Some(cond) = cond {
            block.cond = self.render(cond, Position::COND);
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Pops the block's results from the stack into its output temporaries.
    fn assign_outputs(&mut self) -> CompileResult<()> {
        let temps = self.top()?.out_temps.clone();
        let values = self.pop_values(temps.len())?;
        for (k, value) in temps.iter().zip(values) {
            let text = format!("t{k} = {};", self.render(value, Position::ARG));
            self.line(text)?;
        }
        Ok(())
    }

    fn else_arm(&mut self) -> CompileResult<()> {
        let top = self.top()?;
        if top.never_reachable {
            return Ok(());
        }
        if top.kind != BlockKind::If {
            return internal("`else` outside of `if`");
        }
        if !top.unreachable {
            self.assign_outputs()?;
        }
        let block = self.top_mut()?;
        block.then_reachable = !block.unreachable;
        block.then_body = mem::take(&mut block.body);
        block.has_else = true;
        block.unreachable = false;
        let height = block.height;
        let params = block.params.clone();
        self.stack.truncate(height);
        self.stack.extend(params);
        Ok(())
    }

    fn end(&mut self) -> CompileResult<()> {
        let top = self.top()?;
        if top.never_reachable {
            self.blocks.pop();
            return Ok(());
        }
        if top.kind == BlockKind::Function {
            return self.finish();
        }
        if !top.unreachable {
            self.assign_outputs()?;
        }
        let block = self
            .blocks
            .pop()
            .ok_or_else(|| CompileError::Internal("no open block".to_string()))?;

        let fallthrough = !block.unreachable;
        let reachable_after = match block.kind {
            BlockKind::Loop => fallthrough,
            BlockKind::If => {
                fallthrough || block.branch_target || !block.has_else || block.then_reachable
            }
            BlockKind::Function | BlockKind::Block => fallthrough || block.branch_target,
        };

        let mut stmts = Vec::new();
        match block.kind {
            BlockKind::Block if block.branch_target => stmts.push(Stmt::Block {
                label: block.label,
                body: block.body,
            }),
            BlockKind::Loop if block.branch_target => {
                let mut body = block.body;
                if fallthrough {
                    body.push(Stmt::Line(format!("break 'l{};", block.label)));
                }
                stmts.push(Stmt::Loop {
                    label: block.label,
                    body,
                });
            }
            BlockKind::Function | BlockKind::Block | BlockKind::Loop => stmts = block.body,
            BlockKind::If => {
                let (then, otherwise) = if block.has_else {
                    (block.then_body, block.body)
                } else {
                    // Without an `else`, the parameters pass straight through.
                    for (k, value) in block.out_temps.iter().zip(&block.params) {
                        let text = format!("t{k} = {};", self.render(*value, Position::ARG));
                        stmts.push(Stmt::Line(text));
                    }
                    (block.body, Vec::new())
                };
                stmts.push(Stmt::If {
                    label: block.branch_target.then_some(block.label),
                    cond: block.cond,
                    then,
                    otherwise,
                });
            }
        }

        let parent = self.top_mut()?;
        parent.body.extend(stmts);
        parent.unreachable = !reachable_after;

        self.stack.truncate(block.height);
        for (k, ty) in block.out_temps.iter().zip(&block.outs) {
            let id = self.temp_node(*k, (*ty).into());
            self.stack.push(id);
        }
        Ok(())
    }

    /// The final `end`: returns the function's results.
    fn finish(&mut self) -> CompileResult<()> {
        if self.top()?.unreachable {
            self.line("return Err(Trap::Unreachable);".to_string())?;
        } else {
            let depth = self.blocks.len().saturating_sub(1) as u32;
            let lines = self.branch(depth)?;
            for text in lines {
                self.line(text)?;
            }
        }
        let block = self
            .blocks
            .pop()
            .ok_or_else(|| CompileError::Internal("no open block".to_string()))?;
        self.output = Some(block.body);
        self.stack.clear();
        Ok(())
    }

    /// Statements transferring control to the block `depth` levels up,
    /// carrying the values on top of the stack.
    fn branch(&mut self, depth: u32) -> CompileResult<Vec<String>> {
        let count = self.blocks.len();
        let Some(index) = count.checked_sub(depth as usize + 1) else {
            return internal(format!("branch depth {depth} out of range"));
        };
        let (kind, label, temps, arity) = {
            let target = &mut self.blocks[index];
            if target.kind != BlockKind::Function {
                target.branch_target = true;
            }
            let temps = match target.kind {
                BlockKind::Loop => target.in_temps.clone(),
                BlockKind::Function | BlockKind::Block | BlockKind::If => target.out_temps.clone(),
            };
            let arity = match target.kind {
                BlockKind::Function => target.outs.len(),
                BlockKind::Block | BlockKind::Loop | BlockKind::If => temps.len(),
            };
            (target.kind, target.label, temps, arity)
        };

        let Some(start) = self.stack.len().checked_sub(arity) else {
            return internal("operand stack underflow at branch");
        };
        let values: Vec<NodeId> = self.stack[start..].to_vec();
        let values: Vec<NodeId> = values.into_iter().map(|v| self.widen(v)).collect();
        let rendered: Vec<String> = values
            .iter()
            .map(|v| self.render(*v, Position::ARG))
            .collect();

        let mut lines = Vec::new();
        match kind {
            BlockKind::Function => {
                let value = match rendered.as_slice() {
                    [] => "()".to_string(),
                    [one] => one.clone(),
                    many => format!("({})", many.join(", ")),
                };
                // The frame stays entered until the returned values exist.
                if values.iter().any(|v| self.effectful(*v)) {
                    lines.push(format!("let ret = {value};"));
                    lines.push("t.leave();".to_string());
                    lines.push("return Ok(ret);".to_string());
                } else {
                    lines.push("t.leave();".to_string());
                    lines.push(format!("return Ok({value});"));
                }
            }
            BlockKind::Loop => {
                lines.extend(assign(&temps, &rendered));
                lines.push(format!("continue 'l{label};"));
            }
            BlockKind::Block | BlockKind::If => {
                lines.extend(assign(&temps, &rendered));
                lines.push(format!("break 'l{label};"));
            }
        }
        Ok(lines)
    }

    fn br(&mut self, depth: u32) -> CompileResult<()> {
        self.spill_all()?;
        for text in self.branch(depth)? {
            self.line(text)?;
        }
        self.set_unreachable()
    }

    fn br_if(&mut self, depth: u32) -> CompileResult<()> {
        let cond = self.pop_cond()?;
        self.spill_all()?;
        let lines = self.branch(depth)?;
        let cond = self.render(cond, Position::COND);
        self.top_mut()?.body.push(Stmt::If {
            label: None,
            cond,
            then: lines.into_iter().map(Stmt::Line).collect(),
            otherwise: Vec::new(),
        });
        Ok(())
    }

    fn br_table(&mut self, targets: &[u32], default: u32) -> CompileResult<()> {
        let index = self.pop_value()?;
        self.spill_all()?;

        // Cases sharing a target share an arm, in order of first appearance.
        let mut groups: Vec<(u32, Vec<usize>)> = Vec::new();
        for (case, depth) in targets.iter().enumerate() {
            if *depth == default {
                continue;
            }
            match groups.iter_mut().find(|(d, _)| d == depth) {
                Some((_, cases)) => cases.push(case),
                None => groups.push((*depth, vec![case])),
            }
        }

        let mut arms = Vec::with_capacity(groups.len() + 1);
        for (depth, cases) in groups {
            let pattern = cases
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            let lines = self.branch(depth)?;
            arms.push((pattern, lines.into_iter().map(Stmt::Line).collect()));
        }
        let lines = self.branch(default)?;
        arms.push(("_".to_string(), lines.into_iter().map(Stmt::Line).collect()));

        let scrutinee = self.render(index, Position::COND);
        self.top_mut()?.body.push(Stmt::Match { scrutinee, arms });
        self.set_unreachable()
    }
}

/// Assigns `values` to temporaries. Several values are assigned at once, since
/// a loop may pass its own parameters back in a different order.
fn assign(temps: &[u32], values: &[String]) -> Option<String> {
    match (temps, values) {
        ([], _) => None,
        ([k], [value]) => Some(format!("t{k} = {value};")),
        _ => {
            let temps: Vec<String> = temps.iter().map(|k| format!("t{k}")).collect();
            Some(format!("({}) = ({});", temps.join(", "), values.join(", ")))
        }
    }
}
