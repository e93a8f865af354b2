//! Reference code generator that evaluates HIR directly
//!
//! Values are carried as raw bit patterns in a `u128`, zero-extended to
//! the width of their type. Storage slots created by `alloca` live in a
//! per-call frame; every other address is a host address inside the guest
//! memory reservation.

use std::sync::Arc;

use cf_core::error::PpuError;
use cf_core::{ppu_error, ppu_trace};

use super::{CodeGenerator, CompiledFunction};
use crate::analyzer::Reg;
use crate::hir::{
    BinaryOp, BlockId, Callee, CastOp, CmpPred, Function, FunctionId, Inst, InstKind, Intrinsic, Module, Type,
    UnaryOp, ValueDef, ValueId,
};
use crate::instructions::load_store::{load_reserved, store_conditional};
use crate::instructions::system::{syscall, time_base};
use crate::interpreter::PpuInterpreter;
use crate::recompiler::{
    context_offset, slot_type, PPU_DISPATCH, PPU_RESERVE_LOAD32, PPU_RESERVE_LOAD64, PPU_RESERVE_STORE32,
    PPU_RESERVE_STORE64, PPU_SYSCALL, PPU_TIMEBASE, PPU_TRAP,
};
use crate::thread::{PpuRegisters, PpuThread};
use crate::vmx::V128;

/// Nested guest calls allowed before the evaluator gives up
pub const MAX_CALL_DEPTH: usize = 256;

/// Code generator whose output interprets the HIR it was given
///
/// Guest code outside the module runs on the wrapped interpreter.
pub struct HirEvaluator {
    interpreter: Arc<PpuInterpreter>,
}

impl HirEvaluator {
    pub fn new(interpreter: Arc<PpuInterpreter>) -> Self {
        Self { interpreter }
    }
}

impl CodeGenerator for HirEvaluator {
    fn name(&self) -> &'static str {
        "hir-evaluator"
    }

    fn compile(&self, module: &Module) -> Result<Vec<Arc<dyn CompiledFunction>>, PpuError> {
        for function in module.functions.iter().filter(|f| !f.is_declaration()) {
            function
                .verify()
                .map_err(|e| PpuError::Codegen(format!("{}: {}", function.name, e)))?;
        }

        let module = Arc::new(module.clone());
        let mut compiled: Vec<Arc<dyn CompiledFunction>> = Vec::new();
        for (n, function) in module.functions.iter().enumerate() {
            if function.is_declaration() {
                continue;
            }
            let Some(guest) = &function.guest else {
                continue;
            };
            compiled.push(Arc::new(EvaluatedFunction {
                module: Arc::clone(&module),
                id: FunctionId(n as u32),
                address: guest.address,
                name: function.name.clone(),
                interpreter: Arc::clone(&self.interpreter),
            }));
        }
        Ok(compiled)
    }
}

struct EvaluatedFunction {
    module: Arc<Module>,
    id: FunctionId,
    address: u32,
    name: String,
    interpreter: Arc<PpuInterpreter>,
}

impl CompiledFunction for EvaluatedFunction {
    fn address(&self) -> u32 {
        self.address
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        let evaluation = Evaluation {
            module: &self.module,
            interpreter: &self.interpreter,
            depth: 0,
        };
        evaluation.call_from_context(thread, self.id)
    }
}

/// Control transfer out of one instruction
enum Flow {
    Next,
    Jump(BlockId),
    Return(Option<u128>),
}

struct Evaluation<'a> {
    module: &'a Module,
    interpreter: &'a PpuInterpreter,
    depth: usize,
}

impl<'a> Evaluation<'a> {
    fn deeper(&self) -> Result<Evaluation<'a>, PpuError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(PpuError::Thread(format!("guest call depth exceeded {}", MAX_CALL_DEPTH)));
        }
        Ok(Evaluation {
            module: self.module,
            interpreter: self.interpreter,
            depth: self.depth + 1,
        })
    }

    fn function(&self, id: FunctionId) -> Result<&'a Function, PpuError> {
        self.module
            .function(id)
            .ok_or_else(|| PpuError::Codegen(format!("no function {:?} in module {}", id, self.module.name)))
    }

    /// Defined function lowered from the guest function at `address`
    fn defined_at(&self, address: u32) -> Option<FunctionId> {
        self.module
            .functions
            .iter()
            .position(|f| !f.is_declaration() && f.guest.as_ref().is_some_and(|g| g.address == address))
            .map(|n| FunctionId(n as u32))
    }

    /// Call with arguments taken from, and the result put back into, the
    /// thread's registers
    fn call_from_context(&self, thread: &mut PpuThread, id: FunctionId) -> Result<(), PpuError> {
        let function = self.function(id)?;
        let Some(guest) = &function.guest else {
            return Err(PpuError::Codegen(format!("{} has no guest entry", function.name)));
        };
        let args: Vec<u128> = guest.params.iter().map(|reg| read_reg(thread, *reg)).collect();
        let result = self.run(thread, id, &args)?;
        if let (Some(value), Some(reg)) = (result, guest.ret) {
            write_reg(thread, reg, value);
        }
        Ok(())
    }

    fn run(&self, thread: &mut PpuThread, id: FunctionId, args: &[u128]) -> Result<Option<u128>, PpuError> {
        let function = self.function(id)?;
        if function.is_declaration() {
            return self.call_declared(thread, function, args);
        }

        let mut frame = Frame::new(function, args);
        let mut block = BlockId(0);
        loop {
            let current = function
                .block(block)
                .ok_or_else(|| PpuError::Codegen(format!("{}: missing block {:?}", function.name, block)))?;
            let mut next = None;
            for inst in &current.insts {
                match self.execute(thread, &mut frame, inst)? {
                    Flow::Next => {}
                    Flow::Jump(target) => {
                        next = Some(target);
                        break;
                    }
                    Flow::Return(value) => return Ok(value),
                }
            }
            block = next.ok_or_else(|| PpuError::Codegen(format!("{}: {:?} falls through", function.name, block)))?;
        }
    }

    /// Body-less callee: run the guest function it names
    fn call_declared(&self, thread: &mut PpuThread, function: &Function, args: &[u128]) -> Result<Option<u128>, PpuError> {
        let Some(guest) = &function.guest else {
            return Err(PpuError::Codegen(format!("call to external {} with no guest entry", function.name)));
        };
        for (reg, value) in guest.params.iter().zip(args) {
            write_reg(thread, *reg, *value);
        }
        match self.defined_at(guest.address) {
            Some(id) => self.deeper()?.call_from_context(thread, id)?,
            None => self.dispatch(thread, guest.address)?,
        }
        Ok(guest.ret.map(|reg| read_reg(thread, reg)))
    }

    /// Run guest code at `target` until it returns to the current LR
    fn dispatch(&self, thread: &mut PpuThread, target: u32) -> Result<(), PpuError> {
        if let Some(id) = self.defined_at(target) {
            return self.deeper()?.call_from_context(thread, id);
        }
        let ret = thread.regs.lr;
        ppu_trace!("Evaluator: dispatch 0x{:08x} to the interpreter, returning to 0x{:08x}", target, ret);
        thread.set_pc(target as u64);
        while thread.pc() != ret && thread.pc() != 0 {
            self.interpreter.step(thread)?;
        }
        Ok(())
    }

    fn call_extern(&self, thread: &mut PpuThread, name: &str, args: &[u128]) -> Result<Option<u128>, PpuError> {
        let arg = |n: usize| args.get(n).copied().unwrap_or(0);
        match name {
            PPU_DISPATCH => {
                self.dispatch(thread, arg(0) as u32)?;
                Ok(None)
            }
            PPU_SYSCALL => {
                syscall(self.interpreter, thread);
                Ok(None)
            }
            PPU_TRAP => {
                if arg(1) != 0 {
                    ppu_error!("Trap at 0x{:08x}", arg(0) as u32);
                }
                Ok(None)
            }
            PPU_TIMEBASE => Ok(Some(time_base() as u128)),
            PPU_RESERVE_LOAD32 | PPU_RESERVE_LOAD64 => {
                let double = name == PPU_RESERVE_LOAD64;
                let value = load_reserved(self.interpreter, thread, arg(0) as u32, double)?;
                Ok(Some(value as u128))
            }
            PPU_RESERVE_STORE32 | PPU_RESERVE_STORE64 => {
                let double = name == PPU_RESERVE_STORE64;
                let stored = store_conditional(self.interpreter, thread, arg(0) as u32, arg(1) as u64, double)?;
                Ok(Some(stored as u128))
            }
            other => Err(PpuError::Codegen(format!("unknown runtime symbol {}", other))),
        }
    }

    fn execute(&self, thread: &mut PpuThread, frame: &mut Frame<'_>, inst: &Inst) -> Result<Flow, PpuError> {
        let function = frame.function;
        let value = match &inst.kind {
            InstKind::Alloca { .. } => {
                frame.slots.push(0);
                Some((frame.slots.len() - 1) as u128)
            }
            InstKind::Load { ty, addr, big_endian } => Some(if function.value_type(*addr) == Type::Ptr {
                let slot = frame.get(*addr) as usize;
                frame.slots.get(slot).copied().unwrap_or(0) & mask(*ty)
            } else {
                read_host(thread, frame.get(*addr), *ty, *big_endian)?
            }),
            InstKind::Store { addr, value, big_endian } => {
                let bits = frame.get(*value);
                if function.value_type(*addr) == Type::Ptr {
                    let slot = frame.get(*addr) as usize;
                    if let Some(stored) = frame.slots.get_mut(slot) {
                        *stored = bits;
                    }
                } else {
                    write_host(thread, frame.get(*addr), function.value_type(*value), bits, *big_endian)?;
                }
                None
            }
            InstKind::CtxLoad { ty, offset } => Some(ctx_read(&thread.regs, *offset as usize, *ty)?),
            InstKind::CtxStore { offset, value } => {
                ctx_write(&mut thread.regs, *offset as usize, frame.get(*value))?;
                None
            }
            InstKind::Binary { op, lhs, rhs } => {
                let ty = function.value_type(*lhs);
                Some(binary(*op, ty, frame.get(*lhs), frame.get(*rhs)))
            }
            InstKind::Unary { op, value } => Some(unary(*op, function.value_type(*value), frame.get(*value))),
            InstKind::Cast { op, value, ty } => Some(cast(*op, function.value_type(*value), *ty, frame.get(*value))),
            InstKind::Cmp { pred, lhs, rhs } => {
                let ty = function.value_type(*lhs);
                Some(compare(*pred, ty, frame.get(*lhs), frame.get(*rhs)) as u128)
            }
            InstKind::Select { cond, then_value, else_value } => Some(if frame.get(*cond) & 1 != 0 {
                frame.get(*then_value)
            } else {
                frame.get(*else_value)
            }),
            InstKind::Intrinsic { op, args } => {
                let values: Vec<u128> = args.iter().map(|arg| frame.get(*arg)).collect();
                let types: Vec<Type> = args.iter().map(|arg| function.value_type(*arg)).collect();
                Some(intrinsic(*op, &types, &values))
            }
            InstKind::Call { callee, args } => {
                let values: Vec<u128> = args.iter().map(|arg| frame.get(*arg)).collect();
                match callee {
                    Callee::Function(id) => self.deeper()?.run(thread, *id, &values)?,
                    Callee::Extern(name) => self.call_extern(thread, name, &values)?,
                }
            }
            InstKind::Fence => {
                std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
                None
            }
            InstKind::Br { target } => return Ok(Flow::Jump(*target)),
            InstKind::BrCond { cond, then_block, else_block } => {
                let target = if frame.get(*cond) & 1 != 0 { then_block } else { else_block };
                return Ok(Flow::Jump(*target));
            }
            InstKind::Ret { value } => return Ok(Flow::Return(value.map(|v| frame.get(v)))),
        };

        if let (Some(result), Some(bits)) = (inst.result, value) {
            frame.set(result, bits & mask(function.value_type(result)));
        }
        Ok(Flow::Next)
    }
}

/// Values and slots of one active call
struct Frame<'f> {
    function: &'f Function,
    values: Vec<u128>,
    slots: Vec<u128>,
}

impl<'f> Frame<'f> {
    fn new(function: &'f Function, args: &[u128]) -> Self {
        let values = function
            .values
            .iter()
            .map(|data| match &data.def {
                ValueDef::Constant(constant) => constant.bits(),
                ValueDef::Argument(n) => args.get(*n as usize).copied().unwrap_or(0) & mask(data.ty),
                ValueDef::Result(_) | ValueDef::Undef => 0,
            })
            .collect();
        Self {
            function,
            values,
            slots: Vec::new(),
        }
    }

    #[inline]
    fn get(&self, id: ValueId) -> u128 {
        self.values.get(id.index()).copied().unwrap_or(0)
    }

    #[inline]
    fn set(&mut self, id: ValueId, bits: u128) {
        if let Some(value) = self.values.get_mut(id.index()) {
            *value = bits;
        }
    }
}

// Register file access by guest register and by context offset

fn read_reg(thread: &PpuThread, reg: Reg) -> u128 {
    match reg {
        Reg::Cr(field) => thread.cr_field(field as usize) as u128,
        _ => ctx_read(&thread.regs, context_offset(reg), slot_type(reg)).unwrap_or(0),
    }
}

fn write_reg(thread: &mut PpuThread, reg: Reg, value: u128) {
    match reg {
        Reg::Cr(field) => thread.set_cr_field(field as usize, value as u32),
        _ => {
            // Offsets produced by context_offset always resolve
            let _ = ctx_write(&mut thread.regs, context_offset(reg), value);
        }
    }
}

/// Index of the `stride`-sized element at `offset` in an array starting at `base`
fn element(offset: usize, base: usize, stride: usize) -> Option<usize> {
    let rel = offset.checked_sub(base)?;
    (rel % stride == 0 && rel / stride < 32).then_some(rel / stride)
}

fn ctx_read(regs: &PpuRegisters, offset: usize, ty: Type) -> Result<u128, PpuError> {
    let bits = if let Some(n) = element(offset, PpuRegisters::gpr_offset(0), 8) {
        regs.gpr[n] as u128
    } else if let Some(n) = element(offset, PpuRegisters::fpr_offset(0), 8) {
        regs.fpr[n].to_bits() as u128
    } else if let Some(n) = element(offset, PpuRegisters::vr_offset(0), 16) {
        regs.vr[n].as_u128()
    } else {
        match offset {
            PpuRegisters::LR_OFFSET => regs.lr as u128,
            PpuRegisters::CTR_OFFSET => regs.ctr as u128,
            PpuRegisters::XER_OFFSET => regs.xer as u128,
            PpuRegisters::PC_OFFSET => regs.pc as u128,
            PpuRegisters::CR_OFFSET => regs.cr as u128,
            PpuRegisters::FPSCR_OFFSET => regs.fpscr as u128,
            PpuRegisters::VSCR_OFFSET => regs.vscr as u128,
            PpuRegisters::VRSAVE_OFFSET => regs.vrsave as u128,
            _ => return Err(PpuError::Codegen(format!("no register at context offset {}", offset))),
        }
    };
    Ok(bits & mask(ty))
}

fn ctx_write(regs: &mut PpuRegisters, offset: usize, bits: u128) -> Result<(), PpuError> {
    if let Some(n) = element(offset, PpuRegisters::gpr_offset(0), 8) {
        regs.gpr[n] = bits as u64;
    } else if let Some(n) = element(offset, PpuRegisters::fpr_offset(0), 8) {
        regs.fpr[n] = f64::from_bits(bits as u64);
    } else if let Some(n) = element(offset, PpuRegisters::vr_offset(0), 16) {
        regs.vr[n] = V128::from_u128(bits);
    } else {
        match offset {
            PpuRegisters::LR_OFFSET => regs.lr = bits as u64,
            PpuRegisters::CTR_OFFSET => regs.ctr = bits as u64,
            PpuRegisters::XER_OFFSET => regs.xer = bits as u64,
            PpuRegisters::PC_OFFSET => regs.pc = bits as u64,
            PpuRegisters::CR_OFFSET => regs.cr = bits as u32,
            PpuRegisters::FPSCR_OFFSET => regs.fpscr = bits as u32,
            PpuRegisters::VSCR_OFFSET => regs.vscr = bits as u32,
            PpuRegisters::VRSAVE_OFFSET => regs.vrsave = bits as u32,
            _ => return Err(PpuError::Codegen(format!("no register at context offset {}", offset))),
        }
    }
    Ok(())
}

// Guest memory through host addresses

fn guest_address(thread: &PpuThread, host: u128) -> u32 {
    (host as u64).wrapping_sub(thread.memory().base_addr() as u64) as u32
}

fn read_host(thread: &PpuThread, host: u128, ty: Type, big_endian: bool) -> Result<u128, PpuError> {
    let ea = guest_address(thread, host);
    let size = (ty.bits() / 8) as usize;
    let mut buf = [0u8; 16];
    thread
        .memory()
        .read_bytes(ea, &mut buf[..size])
        .map_err(thread.fault(ea))?;
    let bytes = &buf[..size];
    let fold = |acc: u128, b: &u8| (acc << 8) | *b as u128;
    Ok(if big_endian {
        bytes.iter().fold(0, fold)
    } else {
        bytes.iter().rev().fold(0, fold)
    })
}

fn write_host(thread: &PpuThread, host: u128, ty: Type, bits: u128, big_endian: bool) -> Result<(), PpuError> {
    let ea = guest_address(thread, host);
    let size = (ty.bits() / 8) as usize;
    let mut buf = [0u8; 16];
    for (n, byte) in buf[..size].iter_mut().enumerate() {
        let shift = if big_endian { 8 * (size - 1 - n) } else { 8 * n };
        *byte = (bits >> shift) as u8;
    }
    thread.memory().write_bytes(ea, &buf[..size]).map_err(thread.fault(ea))
}

// Operation semantics

#[inline]
fn mask(ty: Type) -> u128 {
    match ty.bits() {
        0 => 0,
        128 => u128::MAX,
        bits => (1u128 << bits) - 1,
    }
}

/// `bits` of type `ty` sign-extended to 128 bits
#[inline]
fn signed(bits: u128, ty: Type) -> i128 {
    let unused = 128 - ty.bits().max(1);
    ((bits << unused) as i128) >> unused
}

#[inline]
fn f32_of(bits: u128) -> f32 {
    f32::from_bits(bits as u32)
}

#[inline]
fn f64_of(bits: u128) -> f64 {
    f64::from_bits(bits as u64)
}

/// Apply a float operation at the precision of `ty`
fn float2(ty: Type, a: u128, b: u128, f32_op: fn(f32, f32) -> f32, f64_op: fn(f64, f64) -> f64) -> u128 {
    if ty == Type::F32 {
        f32_op(f32_of(a), f32_of(b)).to_bits() as u128
    } else {
        f64_op(f64_of(a), f64_of(b)).to_bits() as u128
    }
}

/// Apply `op` to each `width`-bit lane of two vectors
fn lanes(a: u128, b: u128, width: u32, op: impl Fn(u128, u128) -> u128) -> u128 {
    let lane_mask = (1u128 << width) - 1;
    (0..128 / width).fold(0, |acc, n| {
        let shift = n * width;
        let lane = op((a >> shift) & lane_mask, (b >> shift) & lane_mask) & lane_mask;
        acc | (lane << shift)
    })
}

fn binary(op: BinaryOp, ty: Type, a: u128, b: u128) -> u128 {
    let width = ty.bits();
    let m = mask(ty);
    match op {
        BinaryOp::Add => a.wrapping_add(b) & m,
        BinaryOp::Sub => a.wrapping_sub(b) & m,
        BinaryOp::Mul => a.wrapping_mul(b) & m,
        BinaryOp::MulHiS => ((signed(a, ty).wrapping_mul(signed(b, ty)) >> width) as u128) & m,
        BinaryOp::MulHiU => (a.wrapping_mul(b) >> width) & m,
        BinaryOp::SDiv => match signed(b, ty) {
            0 => 0,
            divisor => (signed(a, ty).wrapping_div(divisor) as u128) & m,
        },
        BinaryOp::UDiv => a.checked_div(b).unwrap_or(0),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => {
            if b >= width as u128 {
                0
            } else {
                (a << b) & m
            }
        }
        BinaryOp::LShr => {
            if b >= width as u128 {
                0
            } else {
                a >> b
            }
        }
        BinaryOp::AShr => {
            let amount = b.min(width as u128 - 1) as u32;
            ((signed(a, ty) >> amount) as u128) & m
        }
        BinaryOp::Rotl => {
            let amount = (b % width as u128) as u32;
            if amount == 0 {
                a
            } else {
                ((a << amount) | (a >> (width - amount))) & m
            }
        }
        BinaryOp::FAdd => float2(ty, a, b, |x, y| x + y, |x, y| x + y),
        BinaryOp::FSub => float2(ty, a, b, |x, y| x - y, |x, y| x - y),
        BinaryOp::FMul => float2(ty, a, b, |x, y| x * y, |x, y| x * y),
        BinaryOp::FDiv => float2(ty, a, b, |x, y| x / y, |x, y| x / y),
        BinaryOp::VAdd8 => lanes(a, b, 8, u128::wrapping_add),
        BinaryOp::VAdd16 => lanes(a, b, 16, u128::wrapping_add),
        BinaryOp::VAdd32 => lanes(a, b, 32, u128::wrapping_add),
        BinaryOp::VSub8 => lanes(a, b, 8, u128::wrapping_sub),
        BinaryOp::VSub16 => lanes(a, b, 16, u128::wrapping_sub),
        BinaryOp::VSub32 => lanes(a, b, 32, u128::wrapping_sub),
        BinaryOp::VAddF32 => lanes(a, b, 32, |x, y| (f32_of(x) + f32_of(y)).to_bits() as u128),
        BinaryOp::VSubF32 => lanes(a, b, 32, |x, y| (f32_of(x) - f32_of(y)).to_bits() as u128),
    }
}

fn unary(op: UnaryOp, ty: Type, v: u128) -> u128 {
    let width = ty.bits();
    let m = mask(ty);
    let sign = 1u128 << (width.max(1) - 1);
    match op {
        UnaryOp::Not => !v & m,
        UnaryOp::Neg => v.wrapping_neg() & m,
        UnaryOp::FNeg => v ^ sign,
        UnaryOp::FAbs => v & !sign,
        UnaryOp::FSqrt if ty == Type::F32 => f32_of(v).sqrt().to_bits() as u128,
        UnaryOp::FSqrt => f64_of(v).sqrt().to_bits() as u128,
        UnaryOp::FTrunc if ty == Type::F32 => f32_of(v).trunc().to_bits() as u128,
        UnaryOp::FTrunc => f64_of(v).trunc().to_bits() as u128,
        UnaryOp::Ctlz => (v.leading_zeros() - (128 - width)) as u128,
        UnaryOp::ByteSwap => v.swap_bytes() >> (128 - width),
    }
}

fn cast(op: CastOp, from: Type, to: Type, v: u128) -> u128 {
    match op {
        CastOp::Trunc => v & mask(to),
        CastOp::ZExt => v,
        CastOp::SExt => (signed(v, from) as u128) & mask(to),
        CastOp::FpTrunc => (f64_of(v) as f32).to_bits() as u128,
        CastOp::FpExt => (f32_of(v) as f64).to_bits() as u128,
        CastOp::FpToSi => {
            let value = if from == Type::F32 { f32_of(v) as f64 } else { f64_of(v) };
            let int = match to {
                Type::I8 => saturate(value, i8::MIN as i64, i8::MAX as i64),
                Type::I16 => saturate(value, i16::MIN as i64, i16::MAX as i64),
                Type::I32 => saturate(value, i32::MIN as i64, i32::MAX as i64),
                _ => saturate(value, i64::MIN, i64::MAX),
            };
            (int as u128) & mask(to)
        }
        CastOp::SiToFp => {
            let int = signed(v, from);
            if to == Type::F32 {
                (int as f32).to_bits() as u128
            } else {
                (int as f64).to_bits() as u128
            }
        }
        CastOp::Bitcast => v & mask(to),
    }
}

/// Truncate toward zero, clamping to `[min, max]`; NaN gives `min`
fn saturate(value: f64, min: i64, max: i64) -> i64 {
    if value.is_nan() {
        min
    } else {
        (value as i64).clamp(min, max)
    }
}

fn compare(pred: CmpPred, ty: Type, a: u128, b: u128) -> bool {
    let floats = || {
        if ty == Type::F32 {
            (f32_of(a) as f64, f32_of(b) as f64)
        } else {
            (f64_of(a), f64_of(b))
        }
    };
    match pred {
        CmpPred::Eq => a == b,
        CmpPred::Ne => a != b,
        CmpPred::Slt => signed(a, ty) < signed(b, ty),
        CmpPred::Sle => signed(a, ty) <= signed(b, ty),
        CmpPred::Sgt => signed(a, ty) > signed(b, ty),
        CmpPred::Sge => signed(a, ty) >= signed(b, ty),
        CmpPred::Ult => a < b,
        CmpPred::Ule => a <= b,
        CmpPred::Ugt => a > b,
        CmpPred::Uge => a >= b,
        CmpPred::FOeq => {
            let (x, y) = floats();
            x == y
        }
        CmpPred::FOlt => {
            let (x, y) = floats();
            x < y
        }
        CmpPred::FOgt => {
            let (x, y) = floats();
            x > y
        }
        CmpPred::FOge => {
            let (x, y) = floats();
            x >= y
        }
        CmpPred::FUno => {
            let (x, y) = floats();
            x.is_nan() || y.is_nan()
        }
    }
}

fn intrinsic(op: Intrinsic, types: &[Type], args: &[u128]) -> u128 {
    let arg = |n: usize| args.get(n).copied().unwrap_or(0);
    let ty = types.first().copied().unwrap_or(Type::Void);
    match op {
        Intrinsic::AddCarry => {
            let sum = arg(0) + arg(1) + (arg(2) & 1);
            (sum >> ty.bits()) & 1
        }
        Intrinsic::AddOverflow => {
            let sum = signed(arg(0), ty) + signed(arg(1), ty) + (arg(2) & 1) as i128;
            (sum != signed(sum as u128 & mask(ty), ty)) as u128
        }
        Intrinsic::Fma if ty == Type::F32 => f32_of(arg(0)).mul_add(f32_of(arg(1)), f32_of(arg(2))).to_bits() as u128,
        Intrinsic::Fma => f64_of(arg(0)).mul_add(f64_of(arg(1)), f64_of(arg(2))).to_bits() as u128,
        Intrinsic::RoundToIntegral => {
            let value = f64_of(arg(0));
            let rounded = match arg(1) & 3 {
                0 => value.round_ties_even(),
                1 => value.trunc(),
                2 => value.ceil(),
                _ => value.floor(),
            };
            rounded.to_bits() as u128
        }
        Intrinsic::VSplat32 => {
            let words = V128::from_u128(arg(0)).as_u32x4();
            V128::from_u32x4([words[(arg(1) & 3) as usize]; 4]).as_u128()
        }
        Intrinsic::VCmpEq32 => lanes(arg(0), arg(1), 32, |x, y| if x == y { u32::MAX as u128 } else { 0 }),
        Intrinsic::VMaddF32 => {
            let (a, b, c) = (
                V128::from_u128(arg(0)).as_f32x4(),
                V128::from_u128(arg(1)).as_f32x4(),
                V128::from_u128(arg(2)).as_f32x4(),
            );
            V128::from_f32x4(std::array::from_fn(|n| a[n].mul_add(b[n], c[n]))).as_u128()
        }
    }
}
