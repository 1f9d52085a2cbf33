//! Binary decoding through `wasmparser`.
//!
//! [`parse`] validates the binary first, so every conversion below can
//! assume well-formed input and only has to reject features outside the
//! supported subset.

use wasmparser::{
    BinaryReaderError, ElementItems, ElementKind, ExternalKind, KnownCustom, Name, Operator,
    Parser, Payload, RefType, TableInit, TypeRef, ValType,
};

use crate::error::{unsupported, DecodeResult};
use crate::instruction::{
    BinaryOp, CompareOp, ConvertOp, Instruction, LoadOp, MemArg, StoreOp, TestOp, UnaryOp,
};
use crate::module::{
    ConstExpr, DataSegment, ElementSegment, Export, FunctionBody, Global, Import, ImportDesc,
    Module,
};
use crate::types::{
    BlockType, ExternKind, FuncType, GlobalType, Limits, MemoryType, TableType, ValueType,
};

/// Validates `bytes` and converts them into a [`Module`].
pub fn parse(bytes: &[u8]) -> DecodeResult<Module> {
    wasmparser::validate(bytes)?;

    let mut module = Module::default();
    for payload in Parser::new(0).parse_all(bytes) {
        match payload? {
            Payload::Version { .. } | Payload::End(_) => {}
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    let ty = ty?;
                    let params = value_types(ty.params())?;
                    let results = value_types(ty.results())?;
                    module.types.push(FuncType::new(params, results));
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    let desc = match import.ty {
                        TypeRef::Func(index) => ImportDesc::Func(index),
                        TypeRef::Table(ty) => ImportDesc::Table(table_type(&ty)?),
                        TypeRef::Memory(ty) => ImportDesc::Memory(memory_type(&ty)?),
                        TypeRef::Global(ty) => ImportDesc::Global(global_type(&ty)?),
                        _ => return unsupported("tag import"),
                    };
                    module.imports.push(Import {
                        module: import.module.to_string(),
                        field: import.name.to_string(),
                        desc,
                    });
                }
            }
            Payload::FunctionSection(reader) => {
                for ty in reader {
                    module.functions.push(ty?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    let table = table?;
                    if !matches!(table.init, TableInit::RefNull) {
                        return unsupported("table initializer expression");
                    }
                    module.tables.push(table_type(&table.ty)?);
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    module.memories.push(memory_type(&memory?)?);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    module.globals.push(Global {
                        ty: global_type(&global.ty)?,
                        init: const_expr(&global.init_expr)?,
                    });
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExternKind::Func,
                        ExternalKind::Table => ExternKind::Table,
                        ExternalKind::Memory => ExternKind::Memory,
                        ExternalKind::Global => ExternKind::Global,
                        _ => return unsupported("tag export"),
                    };
                    module.exports.push(Export {
                        name: export.name.to_string(),
                        kind,
                        index: export.index,
                    });
                }
            }
            Payload::StartSection { func, .. } => module.start = Some(func),
            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element?;
                    let (table, offset) = match element.kind {
                        ElementKind::Active {
                            table_index,
                            offset_expr,
                        } => (table_index.unwrap_or(0), const_expr(&offset_expr)?),
                        _ => return unsupported("passive or declared element segment"),
                    };
                    let functions = match element.items {
                        ElementItems::Functions(items) => {
                            items.into_iter().collect::<Result<Vec<_>, _>>()?
                        }
                        ElementItems::Expressions(..) => {
                            return unsupported("element segment expressions")
                        }
                    };
                    module.elements.push(ElementSegment {
                        table,
                        offset,
                        functions,
                    });
                }
            }
            Payload::DataCountSection { .. } => {}
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data?;
                    let (memory, offset) = match data.kind {
                        wasmparser::DataKind::Active {
                            memory_index,
                            offset_expr,
                        } => (memory_index, const_expr(&offset_expr)?),
                        wasmparser::DataKind::Passive => {
                            return unsupported("passive data segment")
                        }
                    };
                    module.data.push(DataSegment {
                        memory,
                        offset,
                        bytes: data.data.to_vec(),
                    });
                }
            }
            Payload::CodeSectionStart { .. } => {}
            Payload::CodeSectionEntry(body) => {
                let mut locals = Vec::new();
                for entry in body.get_locals_reader()? {
                    let (count, ty) = entry?;
                    let ty = value_type(ty)?;
                    locals.extend(std::iter::repeat(ty).take(count as usize));
                }
                let mut code = Vec::new();
                let mut reader = body.get_operators_reader()?;
                while !reader.eof() {
                    code.push(instruction(&reader.read()?)?);
                }
                module.bodies.push(FunctionBody { locals, code });
            }
            Payload::CustomSection(section) => {
                if let KnownCustom::Name(reader) = section.as_known() {
                    // A malformed name section is ignored, as engines do.
                    let _ = function_names(reader, &mut module);
                }
            }
            _ => return unsupported("section outside the core module format"),
        }
    }

    Ok(module)
}

fn function_names(
    reader: wasmparser::NameSectionReader<'_>,
    module: &mut Module,
) -> Result<(), BinaryReaderError> {
    for name in reader {
        if let Name::Function(map) = name? {
            for naming in map {
                let naming = naming?;
                module.names.insert(naming.index, naming.name.to_string());
            }
        }
    }
    Ok(())
}

// ── Types ──

fn value_type(ty: ValType) -> DecodeResult<ValueType> {
    match ty {
        ValType::I32 => Ok(ValueType::I32),
        ValType::I64 => Ok(ValueType::I64),
        ValType::F32 => Ok(ValueType::F32),
        ValType::F64 => Ok(ValueType::F64),
        ValType::V128 => unsupported("v128 value type"),
        ValType::Ref(_) => unsupported("reference value type"),
    }
}

fn value_types(types: &[ValType]) -> DecodeResult<Vec<ValueType>> {
    types.iter().map(|t| value_type(*t)).collect()
}

fn limits(initial: u64, maximum: Option<u64>, what: &str) -> DecodeResult<Limits> {
    let min = match u32::try_from(initial) {
        Ok(min) => min,
        Err(_) => return unsupported(format!("{what} minimum beyond 32 bits")),
    };
    let max = match maximum.map(u32::try_from) {
        None => None,
        Some(Ok(max)) => Some(max),
        Some(Err(_)) => return unsupported(format!("{what} maximum beyond 32 bits")),
    };
    Ok(Limits::new(min, max))
}

fn table_type(ty: &wasmparser::TableType) -> DecodeResult<TableType> {
    if ty.element_type != RefType::FUNCREF {
        return unsupported("table of non-funcref elements");
    }
    if ty.table64 || ty.shared {
        return unsupported("64-bit or shared table");
    }
    Ok(TableType {
        limits: limits(ty.initial, ty.maximum, "table")?,
    })
}

fn memory_type(ty: &wasmparser::MemoryType) -> DecodeResult<MemoryType> {
    if ty.memory64 {
        return unsupported("64-bit memory");
    }
    if ty.shared {
        return unsupported("shared memory");
    }
    if ty.page_size_log2.is_some() {
        return unsupported("custom page size");
    }
    Ok(MemoryType {
        limits: limits(ty.initial, ty.maximum, "memory")?,
    })
}

fn global_type(ty: &wasmparser::GlobalType) -> DecodeResult<GlobalType> {
    if ty.shared {
        return unsupported("shared global");
    }
    Ok(GlobalType::new(value_type(ty.content_type)?, ty.mutable))
}

fn block_type(ty: wasmparser::BlockType) -> DecodeResult<BlockType> {
    match ty {
        wasmparser::BlockType::Empty => Ok(BlockType::Empty),
        wasmparser::BlockType::Type(ty) => Ok(BlockType::Value(value_type(ty)?)),
        wasmparser::BlockType::FuncType(index) => Ok(BlockType::Func(index)),
    }
}

fn const_expr(expr: &wasmparser::ConstExpr<'_>) -> DecodeResult<ConstExpr> {
    let mut reader = expr.get_operators_reader();
    let value = match reader.read()? {
        Operator::I32Const { value } => ConstExpr::I32(value),
        Operator::I64Const { value } => ConstExpr::I64(value),
        Operator::F32Const { value } => ConstExpr::F32(value.bits()),
        Operator::F64Const { value } => ConstExpr::F64(value.bits()),
        Operator::GlobalGet { global_index } => ConstExpr::GlobalGet(global_index),
        _ => return unsupported("extended constant expression"),
    };
    match reader.read()? {
        Operator::End => Ok(value),
        _ => unsupported("extended constant expression"),
    }
}

// ── Operators ──

fn mem_arg(memarg: &wasmparser::MemArg) -> DecodeResult<MemArg> {
    if memarg.memory != 0 {
        return unsupported("multiple memories");
    }
    match u32::try_from(memarg.offset) {
        Ok(offset) => Ok(MemArg {
            align: memarg.align as u32,
            offset,
        }),
        Err(_) => unsupported("64-bit memory offset"),
    }
}

/// Maps operators whose name is shared with a sub-enum variant.
macro_rules! lift {
    ($op:expr, $wrap:path, $kind:ident, [$($name:ident),* $(,)?]) => {
        match $op {
            $(Operator::$name => Some($wrap($kind::$name)),)*
            _ => None,
        }
    };
}

/// Same as [`lift!`] for loads and stores, which carry a memory immediate.
macro_rules! lift_memory {
    ($op:expr, $wrap:path, $kind:ident, [$($name:ident),* $(,)?]) => {
        match $op {
            $(Operator::$name { memarg } => Some($wrap($kind::$name, mem_arg(memarg)?)),)*
            _ => None,
        }
    };
}

fn instruction(op: &Operator<'_>) -> DecodeResult<Instruction> {
    let ins = match op {
        Operator::Unreachable => Instruction::Unreachable,
        Operator::Nop => Instruction::Nop,
        Operator::Block { blockty } => Instruction::Block(block_type(*blockty)?),
        Operator::Loop { blockty } => Instruction::Loop(block_type(*blockty)?),
        Operator::If { blockty } => Instruction::If(block_type(*blockty)?),
        Operator::Else => Instruction::Else,
        Operator::End => Instruction::End,
        Operator::Br { relative_depth } => Instruction::Br(*relative_depth),
        Operator::BrIf { relative_depth } => Instruction::BrIf(*relative_depth),
        Operator::BrTable { targets } => Instruction::BrTable {
            targets: targets.targets().collect::<Result<Vec<_>, _>>()?,
            default: targets.default(),
        },
        Operator::Return => Instruction::Return,
        Operator::Call { function_index } => Instruction::Call(*function_index),
        Operator::CallIndirect {
            type_index,
            table_index,
            ..
        } => {
            if *table_index != 0 {
                return unsupported("call_indirect through a table other than 0");
            }
            Instruction::CallIndirect(*type_index)
        }
        Operator::Drop => Instruction::Drop,
        Operator::Select => Instruction::Select,
        Operator::TypedSelect { ty } => {
            value_type(*ty)?;
            Instruction::Select
        }
        Operator::LocalGet { local_index } => Instruction::LocalGet(*local_index),
        Operator::LocalSet { local_index } => Instruction::LocalSet(*local_index),
        Operator::LocalTee { local_index } => Instruction::LocalTee(*local_index),
        Operator::GlobalGet { global_index } => Instruction::GlobalGet(*global_index),
        Operator::GlobalSet { global_index } => Instruction::GlobalSet(*global_index),
        Operator::MemorySize { mem, .. } | Operator::MemoryGrow { mem, .. } if *mem != 0 => {
            return unsupported("multiple memories");
        }
        Operator::MemorySize { .. } => Instruction::MemorySize,
        Operator::MemoryGrow { .. } => Instruction::MemoryGrow,
        Operator::I32Const { value } => Instruction::I32Const(*value),
        Operator::I64Const { value } => Instruction::I64Const(*value),
        Operator::F32Const { value } => Instruction::F32Const(value.bits()),
        Operator::F64Const { value } => Instruction::F64Const(value.bits()),
        other => return numeric(other),
    };
    Ok(ins)
}

fn numeric(op: &Operator<'_>) -> DecodeResult<Instruction> {
    if let Some(ins) = lift_memory!(op, Instruction::Load, LoadOp, [
        I32Load, I64Load, F32Load, F64Load, I32Load8S, I32Load8U, I32Load16S, I32Load16U,
        I64Load8S, I64Load8U, I64Load16S, I64Load16U, I64Load32S, I64Load32U,
    ]) {
        return Ok(ins);
    }
    if let Some(ins) = lift_memory!(op, Instruction::Store, StoreOp, [
        I32Store, I64Store, F32Store, F64Store, I32Store8, I32Store16, I64Store8, I64Store16,
        I64Store32,
    ]) {
        return Ok(ins);
    }

    let ins = lift!(op, Instruction::Test, TestOp, [I32Eqz, I64Eqz])
        .or_else(|| {
            lift!(op, Instruction::Compare, CompareOp, [
                I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU,
                I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU,
                F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
                F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,
            ])
        })
        .or_else(|| {
            lift!(op, Instruction::Unary, UnaryOp, [
                I32Clz, I32Ctz, I32Popcnt, I32Extend8S, I32Extend16S,
                I64Clz, I64Ctz, I64Popcnt, I64Extend8S, I64Extend16S, I64Extend32S,
                F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt,
                F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt,
            ])
        })
        .or_else(|| {
            lift!(op, Instruction::Binary, BinaryOp, [
                I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
                I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
                I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
                I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,
                F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
                F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,
            ])
        })
        .or_else(|| {
            lift!(op, Instruction::Convert, ConvertOp, [
                I32WrapI64, I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
                I64ExtendI32S, I64ExtendI32U, I64TruncF32S, I64TruncF32U, I64TruncF64S,
                I64TruncF64U, F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U,
                F32DemoteF64, F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U,
                F64PromoteF32, I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32,
                F64ReinterpretI64, I32TruncSatF32S, I32TruncSatF32U, I32TruncSatF64S,
                I32TruncSatF64U, I64TruncSatF32S, I64TruncSatF32U, I64TruncSatF64S,
                I64TruncSatF64U,
            ])
        });

    match ins {
        Some(ins) => Ok(ins),
        None => unsupported(format!("operator {op:?}")),
    }
}
