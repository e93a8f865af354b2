//! Branch and condition register lowering

use super::Recompiler;
use crate::analyzer::Reg;
use crate::hir::{BinaryOp, CmpPred, ValueId};
use crate::instruction::Instruction;

impl Recompiler<'_> {
    /// `i8` condition of a BO/BI pair, `None` when the branch is always taken
    ///
    /// With `use_ctr` the CTR is decremented first unless BO[2] is set.
    fn branch_condition(&mut self, bo: u32, bi: u32, use_ctr: bool) -> Option<ValueId> {
        let mut cond = None;
        if use_ctr && bo & 0x04 == 0 {
            let ctr = self.reg(Reg::Ctr);
            let one = self.builder.const_i64(1);
            let ctr = self.builder.sub(ctr, one);
            self.set_reg(Reg::Ctr, ctr);
            let zero = self.builder.const_i64(0);
            let pred = if bo & 0x02 != 0 { CmpPred::Eq } else { CmpPred::Ne };
            cond = Some(self.builder.cmp(pred, ctr, zero));
        }
        if bo & 0x10 == 0 {
            let bit = self.cr_bit(bi);
            let test = if bo & 0x08 != 0 {
                bit
            } else {
                let one = self.builder.const_i8(1);
                self.builder.xor(bit, one)
            };
            cond = Some(match cond {
                Some(ctr_ok) => self.builder.and(ctr_ok, test),
                None => test,
            });
        }
        cond
    }

    fn link(&mut self) {
        let next = self.builder.const_i64(self.address.wrapping_add(4) as u64);
        self.set_reg(Reg::Lr, next);
    }

    /// Branch target held in LR or CTR, word aligned within the guest space
    fn register_target(&mut self, reg: Reg) -> ValueId {
        let value = self.reg(reg);
        let mask = self.builder.const_i64(0xFFFF_FFFC);
        self.builder.and(value, mask)
    }
}

pub fn b(r: &mut Recompiler<'_>, i: Instruction) {
    let target = i.target(r.address);
    if i.lk() {
        r.link();
        let next = r.block_at(r.address.wrapping_add(4));
        r.guarded(None, next, |r| r.call_function(target));
    } else {
        let block = r.jump_target(target);
        r.builder.br(block);
    }
}

pub fn bc(r: &mut Recompiler<'_>, i: Instruction) {
    let target = i.target(r.address);
    let cond = r.branch_condition(i.bo(), i.bi(), true);
    if i.lk() {
        r.link();
        let next = r.block_at(r.address.wrapping_add(4));
        r.guarded(cond, next, |r| r.call_function(target));
        return;
    }
    let taken = r.jump_target(target);
    match cond {
        None => r.builder.br(taken),
        Some(cond) => {
            let fallthrough = r.block_at(r.address.wrapping_add(4));
            r.builder.br_cond(cond, taken, fallthrough);
        }
    }
}

pub fn bclr(r: &mut Recompiler<'_>, i: Instruction) {
    let cond = r.branch_condition(i.bo(), i.bi(), true);
    if i.lk() {
        let target = r.register_target(Reg::Lr);
        r.link();
        let next = r.block_at(r.address.wrapping_add(4));
        r.guarded(cond, next, |r| r.dispatch(target));
        return;
    }
    match cond {
        None => r.builder.br(r.epilog),
        Some(cond) => {
            let fallthrough = r.block_at(r.address.wrapping_add(4));
            r.builder.br_cond(cond, r.epilog, fallthrough);
        }
    }
}

pub fn bcctr(r: &mut Recompiler<'_>, i: Instruction) {
    let cond = r.branch_condition(i.bo(), i.bi(), false);
    let target = r.register_target(Reg::Ctr);
    let exit = if i.lk() {
        r.link();
        r.block_at(r.address.wrapping_add(4))
    } else {
        r.epilog
    };
    r.guarded(cond, exit, |r| r.dispatch(target));
}

pub fn mcrf(r: &mut Recompiler<'_>, i: Instruction) {
    let value = r.cr_field(i.crfs());
    r.set_cr_field(i.crfd(), value);
}

/// `crbD = op(crbA, crbB)`, inverted for the negated forms
fn cr_logic(r: &mut Recompiler<'_>, i: Instruction, op: BinaryOp, invert_b: bool, invert: bool) {
    let a = r.cr_bit(i.crba());
    let mut b = r.cr_bit(i.crbb());
    let one = r.builder.const_i8(1);
    if invert_b {
        b = r.builder.xor(b, one);
    }
    let mut value = r.builder.binary(op, a, b);
    if invert {
        value = r.builder.xor(value, one);
    }
    r.set_cr_bit(i.crbd(), value);
}

pub fn crand(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::And, false, false);
}

pub fn crandc(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::And, true, false);
}

pub fn creqv(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::Xor, false, true);
}

pub fn crnand(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::And, false, true);
}

pub fn crnor(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::Or, false, true);
}

pub fn cror(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::Or, false, false);
}

pub fn crorc(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::Or, true, false);
}

pub fn crxor(r: &mut Recompiler<'_>, i: Instruction) {
    cr_logic(r, i, BinaryOp::Xor, false, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{InstKind, Type};
    use crate::recompiler::tests::lower;

    #[test]
    fn test_blr_returns_through_epilog() {
        // blr
        let f = lower(&[0x4E800020]);
        let block = f.blocks.iter().find(|b| b.name == "loc_00010000").unwrap();
        let epilog = f.blocks.iter().find(|b| b.name == "epilog").unwrap();
        assert_eq!(block.successors(), vec![epilog.id]);
        assert!(matches!(epilog.terminator().unwrap().kind, InstKind::Ret { value: None }));
        assert!(f.verify().is_ok());
    }

    #[test]
    fn test_bdnz_decrements_ctr() {
        // bdnz -0 (to itself), blr
        let f = lower(&[0x42000000, 0x4E800020]);
        let text = f.to_string();
        assert!(text.contains("br_cond"));
        assert!(text.contains("cmp ne"));
        assert!(f.instructions().any(|inst| matches!(
            inst.kind,
            InstKind::CtxStore { offset, .. } if offset as usize == crate::thread::PpuRegisters::CTR_OFFSET
        )));
    }

    #[test]
    fn test_bctrl_dispatches() {
        // bctrl, blr
        let f = lower(&[0x4E800421, 0x4E800020]);
        let text = f.to_string();
        assert!(text.contains("call extern ppu_dispatch("));
        assert_eq!(f.ret, Type::Void);
    }

    #[test]
    fn test_cr_logic() {
        // crxor 6, 6, 6 ; blr
        let f = lower(&[0x4CC63182, 0x4E800020]);
        assert!(f.to_string().contains("xor"));
        assert!(f.verify().is_ok());
    }
}
