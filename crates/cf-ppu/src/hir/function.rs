//! HIR functions and modules

use std::fmt;

use super::instruction::{BlockId, Callee, FunctionId, Inst, InstKind, ValueId};
use super::types::{Constant, Type};
use crate::analyzer::Reg;

/// Where a value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    Constant(Constant),
    /// Function parameter by position
    Argument(u32),
    /// Result of an instruction in the given block
    Result(BlockId),
    /// Placeholder for a refused instruction
    Undef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub ty: Type,
    pub def: ValueDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub insts: Vec<Inst>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Inst> {
        self.insts.last().filter(|inst| inst.kind.is_terminator())
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator()
            .map(|inst| inst.kind.successors())
            .unwrap_or_default()
    }
}

/// Where a lowered guest function lives and how it takes its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAbi {
    pub address: u32,
    /// Register carrying each parameter
    pub params: Vec<Reg>,
    /// Register receiving the return value
    pub ret: Option<Reg>,
}

/// A function; one with no blocks is a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub blocks: Vec<Block>,
    pub values: Vec<ValueData>,
    pub guest: Option<GuestAbi>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            blocks: Vec::new(),
            values: Vec::new(),
            guest: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueData> {
        self.values.get(id.index())
    }

    pub fn value_type(&self, id: ValueId) -> Type {
        self.value(id).map_or(Type::Void, |data| data.ty)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Inst> + '_ {
        self.blocks.iter().flat_map(|block| block.insts.iter())
    }

    /// Structural checks: one terminator per block, at its end, with
    /// targets that exist
    pub fn verify(&self) -> Result<(), String> {
        for block in &self.blocks {
            let Some(last) = block.insts.last() else {
                return Err(format!("block {} is empty", block.name));
            };
            if !last.kind.is_terminator() {
                return Err(format!("block {} has no terminator", block.name));
            }
            let terminators = block.insts.iter().filter(|inst| inst.kind.is_terminator()).count();
            if terminators != 1 {
                return Err(format!("block {} has {} terminators", block.name, terminators));
            }
            for target in last.kind.successors() {
                if self.block(target).is_none() {
                    return Err(format!("block {} branches to missing block {}", block.name, target.0));
                }
            }
            for inst in &block.insts {
                for operand in inst.kind.operands() {
                    if self.value(operand).is_none() {
                        return Err(format!("block {} uses undefined value %{}", block.name, operand.0));
                    }
                }
            }
        }
        Ok(())
    }

    fn write_value(&self, f: &mut fmt::Formatter<'_>, id: ValueId) -> fmt::Result {
        match self.value(id).map(|data| &data.def) {
            Some(ValueDef::Constant(constant)) => write!(f, "{}", constant),
            Some(ValueDef::Argument(n)) => write!(f, "%arg{}", n),
            Some(ValueDef::Undef) => write!(f, "undef"),
            _ => write!(f, "%{}", id.0),
        }
    }

    fn write_values(&self, f: &mut fmt::Formatter<'_>, ids: &[ValueId]) -> fmt::Result {
        for (n, id) in ids.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            self.write_value(f, *id)?;
        }
        Ok(())
    }

    fn block_name(&self, id: BlockId) -> &str {
        self.block(id).map_or("?", |block| block.name.as_str())
    }

    fn write_inst(&self, f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
        if let Some(result) = inst.result {
            write!(f, "%{} = ", result.0)?;
        }
        match &inst.kind {
            InstKind::Alloca { ty } => write!(f, "alloca {}", ty),
            InstKind::Load { ty, addr, big_endian } => {
                write!(f, "load{} {}, ", if *big_endian { ".be" } else { "" }, ty)?;
                self.write_value(f, *addr)
            }
            InstKind::Store { addr, value, big_endian } => {
                write!(f, "store{} ", if *big_endian { ".be" } else { "" })?;
                self.write_values(f, &[*addr, *value])
            }
            InstKind::CtxLoad { ty, offset } => write!(f, "ctx_load {}, +{}", ty, offset),
            InstKind::CtxStore { offset, value } => {
                write!(f, "ctx_store +{}, ", offset)?;
                self.write_value(f, *value)
            }
            InstKind::Binary { op, lhs, rhs } => {
                write!(f, "{} ", op)?;
                self.write_values(f, &[*lhs, *rhs])
            }
            InstKind::Unary { op, value } => {
                write!(f, "{} ", op)?;
                self.write_value(f, *value)
            }
            InstKind::Cast { op, value, ty } => {
                write!(f, "{} ", op)?;
                self.write_value(f, *value)?;
                write!(f, " to {}", ty)
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                write!(f, "cmp {} ", pred)?;
                self.write_values(f, &[*lhs, *rhs])
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                f.write_str("select ")?;
                self.write_values(f, &[*cond, *then_value, *else_value])
            }
            InstKind::Intrinsic { op, args } => {
                write!(f, "{}(", op)?;
                self.write_values(f, args)?;
                f.write_str(")")
            }
            InstKind::Call { callee, args } => {
                match callee {
                    Callee::Function(id) => write!(f, "call @{}(", id.0)?,
                    Callee::Extern(name) => write!(f, "call extern {}(", name)?,
                }
                self.write_values(f, args)?;
                f.write_str(")")
            }
            InstKind::Fence => f.write_str("fence"),
            InstKind::Br { target } => write!(f, "br {}", self.block_name(*target)),
            InstKind::BrCond {
                cond,
                then_block,
                else_block,
            } => {
                f.write_str("br_cond ")?;
                self.write_value(f, *cond)?;
                write!(f, ", {}, {}", self.block_name(*then_block), self.block_name(*else_block))
            }
            InstKind::Ret { value: None } => f.write_str("ret"),
            InstKind::Ret { value: Some(value) } => {
                f.write_str("ret ")?;
                self.write_value(f, *value)
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(guest) = &self.guest {
            writeln!(f, "; guest 0x{:08x}", guest.address)?;
        }
        let keyword = if self.is_declaration() { "declare" } else { "define" };
        write!(f, "{} {} @{}(", keyword, self.ret, self.name)?;
        for (n, ty) in self.params.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} %arg{}", ty, n)?;
        }
        f.write_str(")")?;
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.name)?;
            for inst in &block.insts {
                f.write_str("    ")?;
                self.write_inst(f, inst)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Translation unit handed to a code generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Add a body-less function, to be defined later
    pub fn declare(&mut self, name: impl Into<String>, params: Vec<Type>, ret: Type) -> FunctionId {
        self.add(Function::new(name, params, ret))
    }

    pub fn add(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    /// Replace a declaration with its body
    pub fn define(&mut self, id: FunctionId, function: Function) {
        if let Some(slot) = self.functions.get_mut(id.index()) {
            *slot = function;
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn find(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|function| function.name == name)
            .map(|n| FunctionId(n as u32))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
