//! System, SPR, trap and cache-control lowering

use cf_core::ppu_warn;

use super::{cr_shift, Recompiler, PPU_SYSCALL, PPU_TIMEBASE, PPU_TRAP};
use crate::analyzer::Reg;
use crate::hir::{Callee, CmpPred, Type, ValueId};
use crate::instruction::Instruction;
use crate::instructions::system::{SPR_CTR, SPR_LR, SPR_TBL, SPR_TBU, SPR_VRSAVE, SPR_XER};
use crate::thread::PpuRegisters;

/// XER bits that survive `mtxer`: SO, OV, CA and the byte count
const XER_WRITABLE: u64 = 0xE000_007F;

impl Recompiler<'_> {
    fn time_base(&mut self) -> ValueId {
        match self.builder.call(Callee::Extern(PPU_TIMEBASE), Vec::new(), Type::I64) {
            Some(tb) => tb,
            None => self.builder.const_i64(0),
        }
    }

    /// Report a trap when any comparison selected by TO holds
    fn trap(&mut self, i: Instruction, a: ValueId, b: ValueId) {
        let to = i.to();
        if to == 0 {
            return;
        }
        let preds = [
            (0x10, CmpPred::Slt),
            (0x08, CmpPred::Sgt),
            (0x04, CmpPred::Eq),
            (0x02, CmpPred::Ult),
            (0x01, CmpPred::Ugt),
        ];
        let mut cond = None;
        for (bit, pred) in preds {
            if to & bit == 0 {
                continue;
            }
            let test = self.builder.cmp(pred, a, b);
            cond = Some(match cond {
                Some(any) => self.builder.or(any, test),
                None => test,
            });
        }
        let Some(cond) = cond else {
            return;
        };
        let address = self.builder.const_i64(self.address as u64);
        self.builder.call(Callee::Extern(PPU_TRAP), vec![address, cond], Type::Void);
    }

    fn sign_extended_word(&mut self, value: ValueId) -> ValueId {
        let word = self.builder.trunc(value, Type::I32);
        self.builder.sext(word, Type::I64)
    }

    /// The given fields packed into a CR word, the rest zero
    fn pack_cr(&mut self, fields: impl Iterator<Item = usize>) -> ValueId {
        let mut cr = self.builder.const_i32(0);
        for field in fields {
            let value = self.cr_field(field);
            let bits = self.builder.zext(value, Type::I32);
            let shift = self.builder.const_i32(cr_shift(field as u8));
            let bits = self.builder.shl(bits, shift);
            cr = self.builder.or(cr, bits);
        }
        cr
    }
}

/// Fields named by a CRM mask, CR0 first
fn crm_fields(crm: u32) -> impl Iterator<Item = usize> {
    (0..8).filter(move |field| crm & (0x80 >> field) != 0)
}

pub fn sc(r: &mut Recompiler<'_>, i: Instruction) {
    if i.lev() != 0 {
        ppu_warn!("Recompiler: sc with LEV {} at 0x{:08x} ignored", i.lev(), r.address);
        return;
    }
    let number = r.gpr(11);
    r.spill();
    r.builder.call(Callee::Extern(PPU_SYSCALL), vec![number], Type::Void);
    r.reload(Reg::all());
}

// Traps

pub fn tw(r: &mut Recompiler<'_>, i: Instruction) {
    let (ra, rb) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let a = r.sign_extended_word(ra);
    let b = r.sign_extended_word(rb);
    r.trap(i, a, b);
}

pub fn twi(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.sign_extended_word(ra);
    let b = r.builder.const_i64(i.simm() as u64);
    r.trap(i, a, b);
}

pub fn td(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    r.trap(i, a, b);
}

pub fn tdi(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let b = r.builder.const_i64(i.simm() as u64);
    r.trap(i, a, b);
}

// Special purpose registers

pub fn mfspr(r: &mut Recompiler<'_>, i: Instruction) {
    let value = match i.spr() {
        SPR_XER => r.reg(Reg::Xer),
        SPR_LR => r.reg(Reg::Lr),
        SPR_CTR => r.reg(Reg::Ctr),
        SPR_VRSAVE => {
            let vrsave = r.builder.ctx_load(Type::I32, PpuRegisters::VRSAVE_OFFSET);
            r.builder.zext(vrsave, Type::I64)
        }
        SPR_TBL => r.time_base(),
        SPR_TBU => {
            let tb = r.time_base();
            let shift = r.builder.const_i64(32);
            r.builder.lshr(tb, shift)
        }
        spr => {
            ppu_warn!("Recompiler: mfspr from unsupported SPR {} at 0x{:08x}", spr, r.address);
            return;
        }
    };
    r.set_gpr(i.rd(), value);
}

pub fn mtspr(r: &mut Recompiler<'_>, i: Instruction) {
    let value = r.gpr(i.rs());
    match i.spr() {
        SPR_XER => {
            let mask = r.builder.const_i64(XER_WRITABLE);
            let xer = r.builder.and(value, mask);
            r.set_reg(Reg::Xer, xer);
        }
        SPR_LR => r.set_reg(Reg::Lr, value),
        SPR_CTR => r.set_reg(Reg::Ctr, value),
        SPR_VRSAVE => {
            let word = r.builder.trunc(value, Type::I32);
            r.builder.ctx_store(PpuRegisters::VRSAVE_OFFSET, word);
        }
        spr => ppu_warn!("Recompiler: mtspr to unsupported SPR {} at 0x{:08x}", spr, r.address),
    }
}

pub fn mftb(r: &mut Recompiler<'_>, i: Instruction) {
    let mut value = r.time_base();
    if i.spr() == SPR_TBU {
        let shift = r.builder.const_i64(32);
        value = r.builder.lshr(value, shift);
    }
    r.set_gpr(i.rd(), value);
}

// Condition register moves

pub fn mfocrf(r: &mut Recompiler<'_>, i: Instruction) {
    let cr = if i.l11() {
        r.pack_cr(crm_fields(i.crm()))
    } else {
        r.pack_cr(0..8)
    };
    let value = r.builder.zext(cr, Type::I64);
    r.set_gpr(i.rd(), value);
}

pub fn mtocrf(r: &mut Recompiler<'_>, i: Instruction) {
    let rs = r.gpr(i.rs());
    for field in crm_fields(i.crm()) {
        let shift = r.builder.const_i64(cr_shift(field as u8) as u64);
        let bits = r.builder.lshr(rs, shift);
        let mask = r.builder.const_i64(0xF);
        let bits = r.builder.and(bits, mask);
        let value = r.builder.trunc(bits, Type::I8);
        r.set_cr_field(field, value);
    }
}

// Synchronisation and cache hints

pub fn sync(r: &mut Recompiler<'_>, _: Instruction) {
    r.builder.fence();
}

pub fn eieio(r: &mut Recompiler<'_>, _: Instruction) {
    r.builder.fence();
}

pub fn isync(_: &mut Recompiler<'_>, _: Instruction) {}

pub fn dcbf(_: &mut Recompiler<'_>, _: Instruction) {}

pub fn dcbst(_: &mut Recompiler<'_>, _: Instruction) {}

pub fn dcbt(_: &mut Recompiler<'_>, _: Instruction) {}

pub fn dcbtst(_: &mut Recompiler<'_>, _: Instruction) {}

pub fn icbi(_: &mut Recompiler<'_>, _: Instruction) {}

/// Zero the 128-byte cache line containing the effective address
pub fn dcbz(r: &mut Recompiler<'_>, i: Instruction) {
    let base = r.gpr_or_zero(i.ra());
    let index = r.gpr(i.rb());
    let ea = r.builder.add(base, index);
    let mask = r.builder.const_i64(0xFFFF_FF80);
    let line = r.builder.and(ea, mask);
    let zero = r.builder.const_i64(0);
    for n in 0..16u64 {
        let offset = r.builder.const_i64(8 * n);
        let ea = r.builder.add(line, offset);
        r.store_guest(ea, zero, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::InstKind;
    use crate::recompiler::tests::lower;

    #[test]
    fn test_crm_fields() {
        assert_eq!(crm_fields(0x80).collect::<Vec<_>>(), vec![0]);
        assert_eq!(crm_fields(0x21).collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(crm_fields(0xFF).count(), 8);
    }

    #[test]
    fn test_sc_spills_and_reloads() {
        // li r11, 1 ; sc ; blr
        let f = lower(&[0x39600001, 0x44000002, 0x4E800020]);
        let text = f.to_string();
        assert!(text.contains("call extern ppu_syscall("));
        let block = f.blocks.iter().find(|b| b.name == "loc_00010004").unwrap();
        assert!(block.insts.iter().any(|inst| matches!(inst.kind, InstKind::CtxStore { .. })));
        assert!(block.insts.iter().any(|inst| matches!(inst.kind, InstKind::CtxLoad { .. })));
    }

    #[test]
    fn test_trap_never_is_dropped() {
        // tw 0, r0, r0 ; blr
        let f = lower(&[0x7C000008, 0x4E800020]);
        assert!(!f.to_string().contains("ppu_trap"));
        // twi 31, r0, 0 (trap always) ; blr
        let f = lower(&[0x0FE00000, 0x4E800020]);
        assert!(f.to_string().contains("call extern ppu_trap("));
    }

    #[test]
    fn test_mtctr_writes_slot() {
        // mtctr r9 ; blr
        let f = lower(&[0x7D2903A6, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(
            inst.kind,
            InstKind::CtxStore { offset, .. } if offset as usize == PpuRegisters::CTR_OFFSET
        )));
    }

    #[test]
    fn test_dcbz_clears_line() {
        // dcbz r0, r3 ; blr
        let f = lower(&[0x7C001FEC, 0x4E800020]);
        let stores = f
            .instructions()
            .filter(|inst| matches!(inst.kind, InstKind::Store { big_endian: true, .. }))
            .count();
        assert_eq!(stores, 16);
    }
}
