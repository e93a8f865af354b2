//! Instruction builder
//!
//! The builder appends to one block at a time. Once the block has its
//! terminator, further instructions are refused with a warning: they are
//! not recorded and any result they would have produced is `undef`.

use std::collections::HashMap;

use cf_core::ppu_warn;

use super::function::{Block, Function, ValueData, ValueDef};
use super::instruction::{
    BinaryOp, BlockId, Callee, CastOp, CmpPred, Inst, InstKind, Intrinsic, UnaryOp, ValueId,
};
use super::types::{Constant, Type};

pub struct Builder {
    function: Function,
    current: Option<BlockId>,
    constants: HashMap<Constant, ValueId>,
}

impl Builder {
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        let mut function = Function::new(name, params, ret);
        function.values = function
            .params
            .iter()
            .enumerate()
            .map(|(n, ty)| ValueData {
                ty: *ty,
                def: ValueDef::Argument(n as u32),
            })
            .collect();
        Self {
            function,
            current: None,
            constants: HashMap::new(),
        }
    }

    /// Parameter `n`; parameters occupy the first value ids
    pub fn arg(&self, n: usize) -> ValueId {
        ValueId(n as u32)
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn create_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.function.blocks.len() as u32);
        self.function.blocks.push(Block {
            id,
            name: name.into(),
            insts: Vec::new(),
        });
        id
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    /// Whether the insertion block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        self.current
            .and_then(|id| self.function.block(id))
            .is_some_and(|block| block.terminator().is_some())
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.function.value_type(value)
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId(self.function.values.len() as u32);
        self.function.values.push(ValueData { ty, def });
        id
    }

    pub fn constant(&mut self, constant: Constant) -> ValueId {
        if let Some(id) = self.constants.get(&constant) {
            return *id;
        }
        let id = self.new_value(constant.ty(), ValueDef::Constant(constant));
        self.constants.insert(constant, id);
        id
    }

    pub fn const_i8(&mut self, value: u8) -> ValueId {
        self.constant(Constant::I8(value))
    }

    pub fn const_i16(&mut self, value: u16) -> ValueId {
        self.constant(Constant::I16(value))
    }

    pub fn const_i32(&mut self, value: u32) -> ValueId {
        self.constant(Constant::I32(value))
    }

    pub fn const_i64(&mut self, value: u64) -> ValueId {
        self.constant(Constant::I64(value))
    }

    pub fn const_f32(&mut self, value: f32) -> ValueId {
        self.constant(Constant::F32(value))
    }

    pub fn const_f64(&mut self, value: f64) -> ValueId {
        self.constant(Constant::F64(value))
    }

    pub fn const_v128(&mut self, value: u128) -> ValueId {
        self.constant(Constant::V128(value))
    }

    /// Append to the insertion block, refusing when it is missing or terminated
    fn push(&mut self, kind: InstKind, ty: Type) -> Option<ValueId> {
        let Some(block) = self.current else {
            ppu_warn!("HIR builder: no insertion block in {}", self.function.name);
            return (ty != Type::Void).then(|| self.new_value(ty, ValueDef::Undef));
        };
        if self.is_terminated() {
            ppu_warn!(
                "HIR builder: refusing {:?} after the terminator of {}::{}",
                kind,
                self.function.name,
                self.function.block(block).map_or("?", |b| b.name.as_str())
            );
            return (ty != Type::Void).then(|| self.new_value(ty, ValueDef::Undef));
        }
        let result = (ty != Type::Void).then(|| self.new_value(ty, ValueDef::Result(block)));
        if let Some(target) = self.function.blocks.get_mut(block.index()) {
            target.insts.push(Inst { result, kind });
        }
        result
    }

    /// Append an instruction that always produces a value
    fn push_value(&mut self, kind: InstKind, ty: Type) -> ValueId {
        match self.push(kind, ty) {
            Some(value) => value,
            None => self.new_value(ty, ValueDef::Undef),
        }
    }

    // Memory

    pub fn alloca(&mut self, ty: Type) -> ValueId {
        self.push_value(InstKind::Alloca { ty }, Type::Ptr)
    }

    pub fn load(&mut self, ty: Type, addr: ValueId, big_endian: bool) -> ValueId {
        self.push_value(InstKind::Load { ty, addr, big_endian }, ty)
    }

    pub fn store(&mut self, addr: ValueId, value: ValueId, big_endian: bool) {
        self.push(InstKind::Store { addr, value, big_endian }, Type::Void);
    }

    pub fn ctx_load(&mut self, ty: Type, offset: usize) -> ValueId {
        let offset = offset as u32;
        self.push_value(InstKind::CtxLoad { ty, offset }, ty)
    }

    pub fn ctx_store(&mut self, offset: usize, value: ValueId) {
        let offset = offset as u32;
        self.push(InstKind::CtxStore { offset, value }, Type::Void);
    }

    // Arithmetic

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.value_type(lhs);
        self.push_value(InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn and(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Or, lhs, rhs)
    }

    pub fn xor(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Xor, lhs, rhs)
    }

    pub fn shl(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::Shl, lhs, rhs)
    }

    pub fn lshr(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::LShr, lhs, rhs)
    }

    pub fn ashr(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryOp::AShr, lhs, rhs)
    }

    pub fn unary(&mut self, op: UnaryOp, value: ValueId) -> ValueId {
        let ty = self.value_type(value);
        self.push_value(InstKind::Unary { op, value }, ty)
    }

    pub fn not(&mut self, value: ValueId) -> ValueId {
        self.unary(UnaryOp::Not, value)
    }

    pub fn cast(&mut self, op: CastOp, value: ValueId, ty: Type) -> ValueId {
        self.push_value(InstKind::Cast { op, value, ty }, ty)
    }

    pub fn zext(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.cast(CastOp::ZExt, value, ty)
    }

    pub fn sext(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.cast(CastOp::SExt, value, ty)
    }

    pub fn trunc(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.cast(CastOp::Trunc, value, ty)
    }

    pub fn bitcast(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.cast(CastOp::Bitcast, value, ty)
    }

    /// Comparison, `i8` 0 or 1
    pub fn cmp(&mut self, pred: CmpPred, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push_value(InstKind::Cmp { pred, lhs, rhs }, Type::I8)
    }

    pub fn select(&mut self, cond: ValueId, then_value: ValueId, else_value: ValueId) -> ValueId {
        let ty = self.value_type(then_value);
        self.push_value(
            InstKind::Select {
                cond,
                then_value,
                else_value,
            },
            ty,
        )
    }

    pub fn intrinsic(&mut self, op: Intrinsic, args: Vec<ValueId>) -> ValueId {
        let ty = match op {
            Intrinsic::AddCarry | Intrinsic::AddOverflow => Type::I8,
            Intrinsic::Fma | Intrinsic::RoundToIntegral => {
                args.first().map_or(Type::F64, |arg| self.value_type(*arg))
            }
            Intrinsic::VSplat32 | Intrinsic::VCmpEq32 | Intrinsic::VMaddF32 => Type::V128,
        };
        self.push_value(InstKind::Intrinsic { op, args }, ty)
    }

    /// Call returning `ret`; `None` for void calls
    pub fn call(&mut self, callee: Callee, args: Vec<ValueId>, ret: Type) -> Option<ValueId> {
        self.push(InstKind::Call { callee, args }, ret)
    }

    pub fn fence(&mut self) {
        self.push(InstKind::Fence, Type::Void);
    }

    // Terminators

    pub fn br(&mut self, target: BlockId) {
        self.push(InstKind::Br { target }, Type::Void);
    }

    pub fn br_cond(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.push(
            InstKind::BrCond {
                cond,
                then_block,
                else_block,
            },
            Type::Void,
        );
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.push(InstKind::Ret { value }, Type::Void);
    }

    pub fn finish(self) -> Function {
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_shared() {
        let mut b = Builder::new("f", vec![], Type::Void);
        let x = b.const_i64(7);
        let y = b.const_i64(7);
        let z = b.const_i32(7);
        assert_eq!(x, y);
        assert_ne!(x, z);
    }

    #[test]
    fn test_arguments_come_first() {
        let mut b = Builder::new("f", vec![Type::I64, Type::F64], Type::I64);
        assert_eq!(b.value_type(b.arg(0)), Type::I64);
        assert_eq!(b.value_type(b.arg(1)), Type::F64);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let one = b.const_i64(1);
        let sum = b.add(b.arg(0), one);
        b.ret(Some(sum));
        let function = b.finish();
        assert!(function.verify().is_ok());
        assert_eq!(function.value_type(sum), Type::I64);
    }

    #[test]
    fn test_refuses_after_terminator() {
        let mut b = Builder::new("f", vec![], Type::Void);
        let entry = b.create_block("entry");
        let exit = b.create_block("exit");
        b.set_insert_point(entry);
        b.br(exit);
        assert!(b.is_terminated());

        let one = b.const_i64(1);
        let refused = b.add(one, one);
        b.ret(None);
        b.set_insert_point(exit);
        b.ret(None);

        let function = b.finish();
        assert_eq!(function.blocks[0].insts.len(), 1);
        assert_eq!(function.value(refused).map(|v| &v.def), Some(&ValueDef::Undef));
        assert_eq!(function.blocks[0].successors(), vec![exit]);
        assert!(function.verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_open_block() {
        let mut b = Builder::new("f", vec![], Type::Void);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        b.fence();
        assert!(b.finish().verify().is_err());
    }

    #[test]
    fn test_display() {
        let mut b = Builder::new("double", vec![Type::I64], Type::I64);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let two = b.const_i64(2);
        let product = b.mul(b.arg(0), two);
        let flag = b.cmp(CmpPred::Eq, product, two);
        let _ = flag;
        b.ret(Some(product));
        let text = b.finish().to_string();
        assert!(text.starts_with("define i64 @double(i64 %arg0) {"));
        assert!(text.contains("mul %arg0, i64 0x2"));
        assert!(text.contains("cmp eq"));
        assert!(text.contains("ret %"));
    }
}
