//! Guest instruction lowering to HIR
//!
//! A discovered guest function becomes one HIR function: a prolog that
//! allocates a storage slot per guest register, one HIR block per guest
//! block (named `loc_XXXXXXXX`) and a shared epilog that writes modified
//! registers back to the thread context and returns. Every dispatch table
//! entry carries a handler in one of the submodules that emits the HIR for
//! its instruction at the current insertion point.
//!
//! Anything the lowering cannot express directly is left to runtime symbols
//! the code generator provides (see the `PPU_*` names below).

pub mod branch;
pub mod float;
pub mod integer;
pub mod load_store;
pub mod system;
pub mod vector;

use std::collections::{BTreeMap, HashMap};

use cf_core::error::PpuError;
use cf_core::{ppu_debug, ppu_error, ppu_warn};
use cf_memory::MemoryManager;

use crate::analyzer::{ArgKind, Reg, ReturnKind};
use crate::decoder;
use crate::frontend::{self, Segment};
use crate::hir::{BlockId, Builder, Callee, CmpPred, Function, FunctionId, GuestAbi, Module, Type, ValueId};
use crate::instruction::Instruction;
use crate::thread::{PpuRegisters, XER_CA, XER_OV, XER_SO};

/// `(target: i64)`: run guest code at `target` until it returns to LR
pub const PPU_DISPATCH: &str = "ppu_dispatch";
/// `(number: i64)`: hand the thread context to the syscall collaborator
pub const PPU_SYSCALL: &str = "ppu_syscall";
/// `(address: i64, taken: i8)`: report a trap instruction
pub const PPU_TRAP: &str = "ppu_trap";
/// `() -> i64`: current guest time base
pub const PPU_TIMEBASE: &str = "ppu_timebase";
/// `(ea: i64) -> i64`: load-and-reserve a word
pub const PPU_RESERVE_LOAD32: &str = "ppu_reserve_load32";
/// `(ea: i64) -> i64`: load-and-reserve a doubleword
pub const PPU_RESERVE_LOAD64: &str = "ppu_reserve_load64";
/// `(ea: i64, value: i64) -> i8`: conditional word store, 1 when stored
pub const PPU_RESERVE_STORE32: &str = "ppu_reserve_store32";
/// `(ea: i64, value: i64) -> i8`: conditional doubleword store, 1 when stored
pub const PPU_RESERVE_STORE64: &str = "ppu_reserve_store64";

/// Lowered module plus the number of instructions that could not be lowered
#[derive(Debug, Clone)]
pub struct Translation {
    pub module: Module,
    pub errors: usize,
    /// Guest addresses of the functions that lost instructions
    pub incomplete: Vec<u32>,
}

/// HIR type of the storage slot for a guest register
pub fn slot_type(reg: Reg) -> Type {
    match reg {
        Reg::Gpr(_) | Reg::Lr | Reg::Ctr | Reg::Xer => Type::I64,
        Reg::Fpr(_) => Type::F64,
        Reg::Vr(_) => Type::V128,
        Reg::Cr(_) => Type::I8,
        Reg::Fpscr | Reg::Vscr => Type::I32,
    }
}

/// Byte offset of a register in [`PpuRegisters`]; CR fields share the CR word
pub fn context_offset(reg: Reg) -> usize {
    match reg {
        Reg::Gpr(n) => PpuRegisters::gpr_offset(n as usize),
        Reg::Fpr(n) => PpuRegisters::fpr_offset(n as usize),
        Reg::Vr(n) => PpuRegisters::vr_offset(n as usize),
        Reg::Cr(_) => PpuRegisters::CR_OFFSET,
        Reg::Lr => PpuRegisters::LR_OFFSET,
        Reg::Ctr => PpuRegisters::CTR_OFFSET,
        Reg::Xer => PpuRegisters::XER_OFFSET,
        Reg::Fpscr => PpuRegisters::FPSCR_OFFSET,
        Reg::Vscr => PpuRegisters::VSCR_OFFSET,
    }
}

pub fn arg_type(kind: ArgKind) -> Type {
    match kind {
        ArgKind::Integer => Type::I64,
        ArgKind::Float => Type::F64,
        ArgKind::Vector => Type::V128,
    }
}

/// Register holding the value a function returns
pub fn return_register(kind: ReturnKind) -> Option<Reg> {
    match kind {
        ReturnKind::Void => None,
        ReturnKind::Integer => Some(Reg::Gpr(3)),
        ReturnKind::Float | ReturnKind::FloatX2 | ReturnKind::FloatX3 | ReturnKind::FloatX4 => Some(Reg::Fpr(1)),
        ReturnKind::Vector => Some(Reg::Vr(2)),
    }
}

pub fn return_type(kind: ReturnKind) -> Type {
    return_register(kind).map_or(Type::Void, slot_type)
}

/// Body-less HIR function with the signature inferred for `function`
pub fn declaration(function: &frontend::Function) -> Function {
    let params = function.argument_shape.iter().map(|kind| arg_type(*kind)).collect();
    let mut declared = Function::new(function.name.clone(), params, return_type(function.return_shape));
    declared.guest = Some(guest_abi(function));
    declared
}

fn guest_abi(function: &frontend::Function) -> GuestAbi {
    GuestAbi {
        address: function.address,
        params: function.argument_regs.clone(),
        ret: return_register(function.return_shape),
    }
}

/// Per-function lowering state
pub struct Recompiler<'a> {
    builder: Builder,
    memory: &'a MemoryManager,
    segment: &'a Segment,
    function: &'a frontend::Function,
    /// Module ids of the functions this one may call directly
    callees: &'a HashMap<u32, FunctionId>,
    /// Address of the instruction being lowered
    address: u32,
    blocks: BTreeMap<u32, BlockId>,
    prolog: BlockId,
    epilog: BlockId,
    slots: [Option<ValueId>; Reg::COUNT],
    /// Slot may hold a value the thread context does not
    dirty: [bool; Reg::COUNT],
    errors: usize,
}

impl<'a> Recompiler<'a> {
    pub fn new(
        memory: &'a MemoryManager,
        segment: &'a Segment,
        function: &'a frontend::Function,
        callees: &'a HashMap<u32, FunctionId>,
    ) -> Self {
        let signature = declaration(function);
        let mut builder = Builder::new(signature.name, signature.params, signature.ret);
        let prolog = builder.create_block("prolog");
        let blocks = function
            .blocks
            .keys()
            .map(|addr| (*addr, builder.create_block(format!("loc_{:08X}", addr))))
            .collect();
        let epilog = builder.create_block("epilog");
        Self {
            builder,
            memory,
            segment,
            function,
            callees,
            address: function.address,
            blocks,
            prolog,
            epilog,
            slots: [None; Reg::COUNT],
            dirty: [false; Reg::COUNT],
            errors: 0,
        }
    }

    /// Address of the instruction being lowered
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Instructions that failed to lower so far
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Lower the whole function, returning it with its error count
    pub fn lower(mut self) -> (Function, usize) {
        let function = self.function;
        for reg in function.usage.used() {
            self.slot(reg);
        }
        for block in function.blocks.values() {
            self.lower_block(block);
        }
        self.emit_epilog();

        let entry = self.block_at(function.address);
        self.builder.set_insert_point(self.prolog);
        self.builder.br(entry);

        let mut lowered = self.builder.finish();
        lowered.guest = Some(guest_abi(function));
        if let Err(err) = lowered.verify() {
            ppu_error!("Recompiler: {} is malformed: {}", lowered.name, err);
            self.errors += 1;
        }
        ppu_debug!(
            "Recompiler: lowered {} ({} blocks, {} errors)",
            lowered.name,
            lowered.blocks.len(),
            self.errors
        );
        (lowered, self.errors)
    }

    fn lower_block(&mut self, block: &frontend::Block) {
        let Some(id) = self.blocks.get(&block.address).copied() else {
            return;
        };
        self.builder.set_insert_point(id);
        for addr in block.instructions() {
            self.address = addr;
            let word = match self.memory.read_be32(addr) {
                Ok(word) => word,
                Err(err) => {
                    ppu_error!("Recompiler: cannot read instruction at 0x{:08x}: {}", addr, err);
                    self.errors += 1;
                    continue;
                }
            };
            let instr = Instruction(word);
            (decoder::decode(instr).recompile)(self, instr);
        }
        if !self.builder.is_terminated() {
            let next = self.block_at(block.end() as u32);
            self.builder.br(next);
        }
    }

    fn emit_epilog(&mut self) {
        self.builder.set_insert_point(self.epilog);
        for reg in Reg::all() {
            let Some(slot) = self.slots[reg.index()] else {
                continue;
            };
            if self.dirty[reg.index()] || self.function.usage.is_written(reg) {
                let value = self.builder.load(slot_type(reg), slot, false);
                self.store_context(reg, value);
            }
        }
        let value = return_register(self.function.return_shape).map(|reg| self.reg(reg));
        self.builder.ret(value);
    }

    /// HIR block of the guest block at `addr`, the epilog when there is none
    fn block_at(&mut self, addr: u32) -> BlockId {
        match self.blocks.get(&addr) {
            Some(block) => *block,
            None => {
                ppu_warn!(
                    "Recompiler: no block at 0x{:08x} in {}, leaving through the epilog",
                    addr,
                    self.function.name
                );
                self.epilog
            }
        }
    }

    /// Where a branch to `addr` continues: the local block, or a tail call
    fn jump_target(&mut self, addr: u32) -> BlockId {
        if let Some(block) = self.blocks.get(&addr) {
            return *block;
        }
        let resume = self.builder.current_block();
        let tail = self.builder.create_block(format!("tail_{:08X}_{:08X}", self.address, addr));
        self.builder.set_insert_point(tail);
        self.call_function(addr);
        self.builder.br(self.epilog);
        if let Some(block) = resume {
            self.builder.set_insert_point(block);
        }
        tail
    }

    /// Run `body` when `cond` holds (always for `None`) and continue at `exit`;
    /// otherwise continue with the next instruction
    fn guarded(&mut self, cond: Option<ValueId>, exit: BlockId, body: impl FnOnce(&mut Self)) {
        if let Some(cond) = cond {
            let taken = self.builder.create_block(format!("loc_{:08X}_taken", self.address));
            let fallthrough = self.block_at(self.address.wrapping_add(4));
            self.builder.br_cond(cond, taken, fallthrough);
            self.builder.set_insert_point(taken);
        }
        body(self);
        self.builder.br(exit);
    }

    // Register slots

    /// Slot of `reg`, created in the prolog on first use
    fn slot(&mut self, reg: Reg) -> ValueId {
        if let Some(slot) = self.slots[reg.index()] {
            return slot;
        }
        let resume = self.builder.current_block();
        self.builder.set_insert_point(self.prolog);
        let slot = self.builder.alloca(slot_type(reg));
        let initial = match self.function.argument_regs.iter().position(|r| *r == reg) {
            Some(n) => {
                self.dirty[reg.index()] = true;
                self.builder.arg(n)
            }
            None => self.load_context(reg),
        };
        self.builder.store(slot, initial, false);
        if let Some(block) = resume {
            self.builder.set_insert_point(block);
        }
        self.slots[reg.index()] = Some(slot);
        slot
    }

    fn reg(&mut self, reg: Reg) -> ValueId {
        let slot = self.slot(reg);
        self.builder.load(slot_type(reg), slot, false)
    }

    fn set_reg(&mut self, reg: Reg, value: ValueId) {
        let slot = self.slot(reg);
        self.builder.store(slot, value, false);
        self.dirty[reg.index()] = true;
    }

    fn load_context(&mut self, reg: Reg) -> ValueId {
        match reg {
            Reg::Cr(field) => {
                let cr = self.builder.ctx_load(Type::I32, PpuRegisters::CR_OFFSET);
                let shift = self.builder.const_i32(cr_shift(field));
                let bits = self.builder.lshr(cr, shift);
                let mask = self.builder.const_i32(0xF);
                let bits = self.builder.and(bits, mask);
                self.builder.trunc(bits, Type::I8)
            }
            _ => self.builder.ctx_load(slot_type(reg), context_offset(reg)),
        }
    }

    fn store_context(&mut self, reg: Reg, value: ValueId) {
        match reg {
            Reg::Cr(field) => {
                let shift = cr_shift(field);
                let cr = self.builder.ctx_load(Type::I32, PpuRegisters::CR_OFFSET);
                let keep = self.builder.const_i32(!(0xF << shift));
                let cr = self.builder.and(cr, keep);
                let bits = self.builder.zext(value, Type::I32);
                let mask = self.builder.const_i32(0xF);
                let bits = self.builder.and(bits, mask);
                let amount = self.builder.const_i32(shift);
                let bits = self.builder.shl(bits, amount);
                let cr = self.builder.or(cr, bits);
                self.builder.ctx_store(PpuRegisters::CR_OFFSET, cr);
            }
            _ => self.builder.ctx_store(context_offset(reg), value),
        }
    }

    /// Write every slot the context may not hold yet
    fn spill(&mut self) {
        for reg in Reg::all() {
            if let Some(slot) = self.slots[reg.index()] {
                if self.dirty[reg.index()] {
                    let value = self.builder.load(slot_type(reg), slot, false);
                    self.store_context(reg, value);
                }
            }
        }
    }

    /// Refresh slots from the context after code outside the function ran
    fn reload(&mut self, regs: impl Iterator<Item = Reg>) {
        for reg in regs {
            if let Some(slot) = self.slots[reg.index()] {
                let value = self.load_context(reg);
                self.builder.store(slot, value, false);
            }
        }
    }

    // Calls

    /// Direct call to the function at `target`, through dispatch when unknown
    fn call_function(&mut self, target: u32) {
        let segment = self.segment;
        let callee = segment
            .function_at(target)
            .and_then(|function| Some((function, *self.callees.get(&target)?)));
        let Some((callee, id)) = callee else {
            let target = self.builder.const_i64(target as u64);
            self.dispatch(target);
            return;
        };

        self.spill();
        let args: Vec<ValueId> = callee.argument_regs.iter().map(|reg| self.reg(*reg)).collect();
        let result = self
            .builder
            .call(Callee::Function(id), args, return_type(callee.return_shape));
        self.reload(callee.usage.written());
        if let (Some(value), Some(reg)) = (result, return_register(callee.return_shape)) {
            self.set_reg(reg, value);
        }
    }

    /// Call the runtime to run guest code at a computed address
    fn dispatch(&mut self, target: ValueId) {
        self.spill();
        self.builder.call(Callee::Extern(PPU_DISPATCH), vec![target], Type::Void);
        self.reload(Reg::all());
    }

    // Register helpers shared by the instruction groups

    fn gpr(&mut self, n: usize) -> ValueId {
        self.reg(Reg::Gpr(n as u8))
    }

    fn set_gpr(&mut self, n: usize, value: ValueId) {
        self.set_reg(Reg::Gpr(n as u8), value);
    }

    /// `(rA|0)`
    fn gpr_or_zero(&mut self, n: usize) -> ValueId {
        if n == 0 {
            self.builder.const_i64(0)
        } else {
            self.gpr(n)
        }
    }

    fn fpr(&mut self, n: usize) -> ValueId {
        self.reg(Reg::Fpr(n as u8))
    }

    fn set_fpr(&mut self, n: usize, value: ValueId) {
        self.set_reg(Reg::Fpr(n as u8), value);
    }

    fn vr(&mut self, n: usize) -> ValueId {
        self.reg(Reg::Vr(n as u8))
    }

    fn set_vr(&mut self, n: usize, value: ValueId) {
        self.set_reg(Reg::Vr(n as u8), value);
    }

    fn cr_field(&mut self, field: usize) -> ValueId {
        self.reg(Reg::Cr(field as u8))
    }

    fn set_cr_field(&mut self, field: usize, value: ValueId) {
        self.set_reg(Reg::Cr(field as u8), value);
    }

    /// CR bit `bit` (0 is CR0[LT]) as an `i8` 0 or 1
    fn cr_bit(&mut self, bit: u32) -> ValueId {
        let field = self.cr_field((bit / 4) as usize);
        let shift = self.builder.const_i8((3 - bit % 4) as u8);
        let value = self.builder.lshr(field, shift);
        let one = self.builder.const_i8(1);
        self.builder.and(value, one)
    }

    fn set_cr_bit(&mut self, bit: u32, value: ValueId) {
        let index = (bit / 4) as usize;
        let shift = 3 - bit % 4;
        let field = self.cr_field(index);
        let keep = self.builder.const_i8(!(1u8 << shift));
        let field = self.builder.and(field, keep);
        let one = self.builder.const_i8(1);
        let value = self.builder.and(value, one);
        let amount = self.builder.const_i8(shift as u8);
        let value = self.builder.shl(value, amount);
        let field = self.builder.or(field, value);
        self.set_cr_field(index, field);
    }

    /// XER bit selected by `mask` as an `i8` 0 or 1
    fn xer_flag(&mut self, mask: u64) -> ValueId {
        let xer = self.reg(Reg::Xer);
        let shift = self.builder.const_i64(mask.trailing_zeros() as u64);
        let value = self.builder.lshr(xer, shift);
        let value = self.builder.trunc(value, Type::I8);
        let one = self.builder.const_i8(1);
        self.builder.and(value, one)
    }

    fn xer_ca(&mut self) -> ValueId {
        self.xer_flag(XER_CA)
    }

    fn xer_so(&mut self) -> ValueId {
        self.xer_flag(XER_SO)
    }

    fn set_xer_ca(&mut self, flag: ValueId) {
        let xer = self.reg(Reg::Xer);
        let keep = self.builder.const_i64(!XER_CA);
        let xer = self.builder.and(xer, keep);
        let bit = self.builder.zext(flag, Type::I64);
        let shift = self.builder.const_i64(XER_CA.trailing_zeros() as u64);
        let bit = self.builder.shl(bit, shift);
        let xer = self.builder.or(xer, bit);
        self.set_reg(Reg::Xer, xer);
    }

    /// Set XER[OV] from `flag`; a set overflow also sticks in XER[SO]
    fn set_xer_ov(&mut self, flag: ValueId) {
        let xer = self.reg(Reg::Xer);
        let keep = self.builder.const_i64(!XER_OV);
        let xer = self.builder.and(xer, keep);
        let bit = self.builder.zext(flag, Type::I64);
        let ov_shift = self.builder.const_i64(XER_OV.trailing_zeros() as u64);
        let ov = self.builder.shl(bit, ov_shift);
        let so_shift = self.builder.const_i64(XER_SO.trailing_zeros() as u64);
        let so = self.builder.shl(bit, so_shift);
        let xer = self.builder.or(xer, ov);
        let xer = self.builder.or(xer, so);
        self.set_reg(Reg::Xer, xer);
    }

    /// Field value `lt << 3 | gt << 2 | eq << 1 | so` from three `i8` flags
    fn cr_value(&mut self, lt: ValueId, gt: ValueId, eq: ValueId, so: ValueId) -> ValueId {
        let mut value = so;
        for (flag, shift) in [(lt, 3u8), (gt, 2), (eq, 1)] {
            let amount = self.builder.const_i8(shift);
            let bit = self.builder.shl(flag, amount);
            value = self.builder.or(value, bit);
        }
        value
    }

    fn update_cr(&mut self, field: usize, lhs: ValueId, rhs: ValueId, signed: bool) {
        let (less, greater) = if signed {
            (CmpPred::Slt, CmpPred::Sgt)
        } else {
            (CmpPred::Ult, CmpPred::Ugt)
        };
        let lt = self.builder.cmp(less, lhs, rhs);
        let gt = self.builder.cmp(greater, lhs, rhs);
        let eq = self.builder.cmp(CmpPred::Eq, lhs, rhs);
        let so = self.xer_so();
        let value = self.cr_value(lt, gt, eq, so);
        self.set_cr_field(field, value);
    }

    fn update_cr0(&mut self, value: ValueId) {
        let zero = self.builder.const_i64(0);
        self.update_cr(0, value, zero, true);
    }

    /// Record form: compare the result against zero into CR0
    fn record(&mut self, instr: Instruction, value: ValueId) {
        if instr.rc() {
            self.update_cr0(value);
        }
    }

    /// Floating-point record form: copy FPSCR[0:3] into CR1
    fn fp_record(&mut self, instr: Instruction) {
        if instr.rc() {
            let fpscr = self.reg(Reg::Fpscr);
            let shift = self.builder.const_i32(28);
            let bits = self.builder.lshr(fpscr, shift);
            let bits = self.builder.trunc(bits, Type::I8);
            self.set_cr_field(1, bits);
        }
    }

    // Guest memory

    /// Host address of the guest effective address `ea`
    fn host_address(&mut self, ea: ValueId) -> ValueId {
        let ea = self.builder.trunc(ea, Type::I32);
        let ea = self.builder.zext(ea, Type::I64);
        let base = self.builder.const_i64(self.memory.base_addr() as u64);
        self.builder.add(base, ea)
    }

    fn load_guest(&mut self, ty: Type, ea: ValueId, big_endian: bool) -> ValueId {
        let addr = self.host_address(ea);
        self.builder.load(ty, addr, big_endian)
    }

    fn store_guest(&mut self, ea: ValueId, value: ValueId, big_endian: bool) {
        let addr = self.host_address(ea);
        self.builder.store(addr, value, big_endian);
    }
}

#[inline]
fn cr_shift(field: u8) -> u32 {
    28 - 4 * field as u32
}

/// Handler of the unknown entry
pub fn unknown(r: &mut Recompiler<'_>, instr: Instruction) {
    ppu_error!(
        "Recompiler: unknown instruction 0x{:08x} at 0x{:08x} (opcode {})",
        instr.word(),
        r.address,
        instr.opcode()
    );
    r.errors += 1;
}

/// Handler of instructions the interpreter runs but nothing lowers yet
pub fn unlowered(r: &mut Recompiler<'_>, instr: Instruction) {
    ppu_error!(
        "Recompiler: no lowering for {} (0x{:08x}) at 0x{:08x}",
        decoder::mnemonic(instr.word()),
        instr.word(),
        r.address
    );
    r.errors += 1;
}

/// Lower one function of `segment` into its own module
///
/// Functions it calls directly are declared in the module so the calls
/// resolve; their bodies are not lowered.
pub fn translate_function(memory: &MemoryManager, segment: &Segment, address: u32) -> Result<Translation, PpuError> {
    let function = segment
        .function_at(address)
        .ok_or_else(|| PpuError::Codegen(format!("no function at 0x{:08x}", address)))?;

    let mut module = Module::new(function.name.clone());
    let mut callees = HashMap::new();
    let id = module.add(declaration(function));
    callees.insert(address, id);
    for target in &function.calls {
        if callees.contains_key(target) {
            continue;
        }
        if let Some(callee) = segment.function_at(*target) {
            callees.insert(*target, module.add(declaration(callee)));
        }
    }

    let (lowered, errors) = Recompiler::new(memory, segment, function, &callees).lower();
    module.define(id, lowered);
    let incomplete = if errors > 0 { vec![address] } else { Vec::new() };
    Ok(Translation {
        module,
        errors,
        incomplete,
    })
}

/// Lower every function of `segment` into one module
pub fn translate_segment(memory: &MemoryManager, segment: &Segment) -> Translation {
    let mut module = Module::new(format!("segment_{:08X}", segment.address));
    let callees: HashMap<u32, FunctionId> = segment
        .functions
        .iter()
        .map(|(addr, function)| (*addr, module.add(declaration(function))))
        .collect();

    let mut errors = 0;
    let mut incomplete = Vec::new();
    for (addr, function) in &segment.functions {
        let Some(id) = callees.get(addr).copied() else {
            continue;
        };
        let (lowered, failed) = Recompiler::new(memory, segment, function, &callees).lower();
        module.define(id, lowered);
        if failed > 0 {
            errors += failed;
            incomplete.push(*addr);
        }
    }
    Translation {
        module,
        errors,
        incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lower `words` at 0x10000, one guest block per instruction
    pub(super) fn lower(words: &[u32]) -> Function {
        let memory = MemoryManager::new().unwrap();
        let mut blocks = BTreeMap::new();
        for (n, word) in words.iter().enumerate() {
            let addr = 0x10000 + 4 * n as u32;
            memory.write_be32(addr, *word).unwrap();
            let block = frontend::Block {
                size: 4,
                initial: n == 0,
                ..frontend::Block::new(addr)
            };
            blocks.insert(addr, block);
        }
        let function = frontend::Function::new(0x10000, blocks);
        let segment = Segment::new(0x10000, 0x1000);
        let callees = HashMap::new();
        let (lowered, errors) = Recompiler::new(&memory, &segment, &function, &callees).lower();
        assert_eq!(errors, 0);
        lowered
    }

    #[test]
    fn test_slot_types_match_register_file() {
        assert_eq!(slot_type(Reg::Gpr(3)), Type::I64);
        assert_eq!(slot_type(Reg::Fpr(1)), Type::F64);
        assert_eq!(slot_type(Reg::Vr(2)), Type::V128);
        assert_eq!(slot_type(Reg::Cr(7)), Type::I8);
        assert_eq!(slot_type(Reg::Fpscr), Type::I32);
        assert_eq!(context_offset(Reg::Gpr(1)), PpuRegisters::gpr_offset(1));
        assert_eq!(context_offset(Reg::Cr(5)), PpuRegisters::CR_OFFSET);
    }

    #[test]
    fn test_return_registers() {
        assert_eq!(return_register(ReturnKind::Integer), Some(Reg::Gpr(3)));
        assert_eq!(return_register(ReturnKind::FloatX3), Some(Reg::Fpr(1)));
        assert_eq!(return_register(ReturnKind::Vector), Some(Reg::Vr(2)));
        assert_eq!(return_type(ReturnKind::Void), Type::Void);
        assert_eq!(cr_shift(0), 28);
        assert_eq!(cr_shift(7), 0);
    }
}
