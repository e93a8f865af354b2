//! Branch and condition register instructions

use super::Step;
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::thread::PpuThread;

/// BO[2] clear: decrement CTR and test it against BO[3]
#[inline]
fn ctr_ok(t: &mut PpuThread, bo: u32) -> bool {
    if bo & 0x04 != 0 {
        return true;
    }
    t.regs.ctr = t.regs.ctr.wrapping_sub(1);
    (t.regs.ctr != 0) ^ (bo & 0x02 != 0)
}

/// BO[0] set ignores the condition, otherwise CR[BI] must equal BO[1]
#[inline]
fn cond_ok(t: &PpuThread, bo: u32, bi: u32) -> bool {
    bo & 0x10 != 0 || t.cr_bit(bi) == (bo & 0x08 != 0)
}

#[inline]
fn link(t: &mut PpuThread, i: Instruction) {
    if i.lk() {
        t.regs.lr = t.pc().wrapping_add(4);
    }
}

pub fn b(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let target = i.target(t.pc() as u32) as u64;
    link(t, i);
    t.branch_to(target);
    Ok(())
}

pub fn bc(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let bo = i.bo();
    let taken = ctr_ok(t, bo) && cond_ok(t, bo, i.bi());
    let target = i.target(t.pc() as u32) as u64;
    link(t, i);
    if taken {
        t.branch_to(target);
    }
    Ok(())
}

pub fn bclr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let bo = i.bo();
    let taken = ctr_ok(t, bo) && cond_ok(t, bo, i.bi());
    let target = t.regs.lr & !3 & 0xFFFF_FFFF;
    link(t, i);
    if taken {
        t.branch_to(target);
    }
    Ok(())
}

pub fn bcctr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let taken = cond_ok(t, i.bo(), i.bi());
    let target = t.regs.ctr & !3 & 0xFFFF_FFFF;
    link(t, i);
    if taken {
        t.branch_to(target);
    }
    Ok(())
}

pub fn mcrf(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.cr_field(i.crfs());
    t.set_cr_field(i.crfd(), value);
    Ok(())
}

#[inline]
fn cr_logic(t: &mut PpuThread, i: Instruction, op: impl FnOnce(bool, bool) -> bool) {
    let value = op(t.cr_bit(i.crba()), t.cr_bit(i.crbb()));
    t.set_cr_bit(i.crbd(), value);
}

pub fn crand(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a & b);
    Ok(())
}

pub fn crandc(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a & !b);
    Ok(())
}

pub fn creqv(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a == b);
    Ok(())
}

pub fn crnand(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| !(a & b));
    Ok(())
}

pub fn crnor(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| !(a | b));
    Ok(())
}

pub fn cror(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a | b);
    Ok(())
}

pub fn crorc(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a | !b);
    Ok(())
}

pub fn crxor(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    cr_logic(t, i, |a, b| a ^ b);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::CR_EQ;
    use cf_memory::MemoryManager;

    fn setup() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        (PpuInterpreter::new(memory.clone()), PpuThread::new(0, memory))
    }

    #[test]
    fn test_bl_sets_link() {
        let (interp, mut t) = setup();
        t.set_pc(0x1000);
        // bl +0x100
        b(&interp, &mut t, Instruction(0x48000101)).unwrap();
        assert_eq!(t.regs.lr, 0x1004);
        assert_eq!(t.pc() + 4, 0x1100);
    }

    #[test]
    fn test_beq_taken_and_not_taken() {
        let (interp, mut t) = setup();
        t.set_pc(0x2000);
        // beq -8
        let beq = Instruction(0x4182FFF8);
        bc(&interp, &mut t, beq).unwrap();
        assert_eq!(t.pc(), 0x2000);

        t.set_cr_field(0, CR_EQ);
        bc(&interp, &mut t, beq).unwrap();
        assert_eq!(t.pc() + 4, 0x1FF8);
    }

    #[test]
    fn test_bdnz_counts_down() {
        let (interp, mut t) = setup();
        t.set_pc(0x3000);
        t.regs.ctr = 2;
        // bdnz -4
        let bdnz = Instruction(0x4200FFFC);
        bc(&interp, &mut t, bdnz).unwrap();
        assert_eq!(t.regs.ctr, 1);
        assert_eq!(t.pc() + 4, 0x2FFC);

        t.set_pc(0x3000);
        bc(&interp, &mut t, bdnz).unwrap();
        assert_eq!(t.regs.ctr, 0);
        assert_eq!(t.pc(), 0x3000);
    }

    #[test]
    fn test_blr_and_bctrl() {
        let (interp, mut t) = setup();
        t.set_pc(0x4000);
        t.regs.lr = 0x5000;
        bclr(&interp, &mut t, Instruction(0x4E800020)).unwrap();
        assert_eq!(t.pc() + 4, 0x5000);

        t.set_pc(0x4000);
        t.regs.ctr = 0x6000;
        bcctr(&interp, &mut t, Instruction(0x4E800421)).unwrap();
        assert_eq!(t.pc() + 4, 0x6000);
        assert_eq!(t.regs.lr, 0x4004);
    }

    #[test]
    fn test_cr_logic() {
        let (interp, mut t) = setup();
        t.set_cr_bit(2, true);
        // crclr 6 (cr1 EQ)
        t.set_cr_bit(6, true);
        crxor(&interp, &mut t, Instruction(0x4CC63182)).unwrap();
        assert!(!t.cr_bit(6));
        // cror 0, 2, 6
        cror(&interp, &mut t, Instruction(0x4C023382)).unwrap();
        assert!(t.cr_bit(0));
        // mcrf cr7, cr0
        mcrf(&interp, &mut t, Instruction(0x4F800000)).unwrap();
        assert_eq!(t.cr_field(7), t.cr_field(0));
    }
}
