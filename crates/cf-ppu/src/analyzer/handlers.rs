//! Analyze handlers, one per operand pattern
//!
//! Dispatch entries share these by operand layout rather than by mnemonic:
//! `rd_ra_rb` covers every XO-form `rD = f(rA, rB)` instruction, and so on.
//! Partial updates of XER (CA, OV) and of a CR field count as read plus write.

use super::{Reg, RegisterUsage};
use crate::instruction::Instruction;
use crate::instructions::system::{SPR_CTR, SPR_LR, SPR_XER};

#[inline]
fn oe(u: &mut RegisterUsage, i: Instruction) {
    if i.oe() {
        u.modify(Reg::Xer);
    }
}

/// Integer record form: CR0 takes LT/GT/EQ and a copy of XER[SO]
#[inline]
fn rc(u: &mut RegisterUsage, i: Instruction) {
    if i.rc() {
        u.read(Reg::Xer);
        u.write_cr(0);
    }
}

/// FP record form: CR1 takes FPSCR[0:3]
#[inline]
fn fp_rc(u: &mut RegisterUsage, i: Instruction) {
    if i.rc() {
        u.read(Reg::Fpscr);
        u.write_cr(1);
    }
}

pub fn none(_: &mut RegisterUsage, _: Instruction) {}

// Traps

pub fn trap_imm(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
}

pub fn trap_reg(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
}

// Integer arithmetic

pub fn rd_ra(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    oe(u, i);
    rc(u, i);
    u.write_gpr(i.rd());
}

pub fn rd_ra_imm(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.write_gpr(i.rd());
}

pub fn rd_ra_imm_ca(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.modify(Reg::Xer);
    u.write_gpr(i.rd());
}

pub fn rd_ra_ca(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.modify(Reg::Xer);
    oe(u, i);
    rc(u, i);
    u.write_gpr(i.rd());
}

pub fn rd_ra_ca_cr0(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.modify(Reg::Xer);
    u.write_cr(0);
    u.write_gpr(i.rd());
}

pub fn rd_ra0(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.write_gpr(i.rd());
}

pub fn rd_ra_rb(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    oe(u, i);
    rc(u, i);
    u.write_gpr(i.rd());
}

pub fn rd_ra_rb_ca(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.modify(Reg::Xer);
    oe(u, i);
    rc(u, i);
    u.write_gpr(i.rd());
}

pub fn cmp_imm(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read(Reg::Xer);
    u.write_cr(i.crfd());
}

pub fn cmp_reg(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.read(Reg::Xer);
    u.write_cr(i.crfd());
}

// Logic, rotate and shift (rS source, rA destination)

pub fn ra_rs(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    rc(u, i);
    u.write_gpr(i.ra());
}

/// Insert forms merge into the old value of rA
pub fn ra_rs_insert(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.read_gpr(i.ra());
    rc(u, i);
    u.write_gpr(i.ra());
}

pub fn ra_rs_rb(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.read_gpr(i.rb());
    rc(u, i);
    u.write_gpr(i.ra());
}

pub fn ra_rs_imm(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.write_gpr(i.ra());
}

pub fn ra_rs_cr0(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.read(Reg::Xer);
    u.write_cr(0);
    u.write_gpr(i.ra());
}

pub fn ra_rs_rb_ca(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.read_gpr(i.rb());
    u.modify(Reg::Xer);
    rc(u, i);
    u.write_gpr(i.ra());
}

pub fn ra_rs_ca(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    u.modify(Reg::Xer);
    rc(u, i);
    u.write_gpr(i.ra());
}

// Branch and system

#[inline]
fn branch_condition(u: &mut RegisterUsage, i: Instruction) {
    let bo = i.bo();
    if bo & 0x04 == 0 {
        u.modify(Reg::Ctr);
    }
    if bo & 0x10 == 0 {
        u.modify_cr(i.bi() as usize / 4);
    }
}

#[inline]
fn link(u: &mut RegisterUsage, i: Instruction) {
    if i.lk() {
        u.write(Reg::Lr);
    }
}

pub fn b(u: &mut RegisterUsage, i: Instruction) {
    link(u, i);
}

pub fn bc(u: &mut RegisterUsage, i: Instruction) {
    branch_condition(u, i);
    link(u, i);
}

pub fn bclr(u: &mut RegisterUsage, i: Instruction) {
    branch_condition(u, i);
    u.read(Reg::Lr);
    link(u, i);
}

pub fn bcctr(u: &mut RegisterUsage, i: Instruction) {
    if i.bo() & 0x10 == 0 {
        u.modify_cr(i.bi() as usize / 4);
    }
    u.read(Reg::Ctr);
    link(u, i);
}

/// The syscall number is in r11, arguments in r3-r10 and the result in r3
pub fn sc(u: &mut RegisterUsage, _: Instruction) {
    u.read_gpr(11);
    for n in 3..=10 {
        u.read_gpr(n);
    }
    u.write_gpr(3);
}

// Condition register

pub fn mcrf(u: &mut RegisterUsage, i: Instruction) {
    u.read_cr(i.crfs());
    u.write_cr(i.crfd());
}

pub fn cr_logic(u: &mut RegisterUsage, i: Instruction) {
    u.read_cr(i.crba() as usize / 4);
    u.read_cr(i.crbb() as usize / 4);
    u.modify_cr(i.crbd() as usize / 4);
}

pub fn mfocrf(u: &mut RegisterUsage, i: Instruction) {
    for field in 0..8 {
        u.read_cr(field);
    }
    u.write_gpr(i.rd());
}

pub fn mtocrf(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    for field in 0..8 {
        if i.crm() & (0x80 >> field) != 0 {
            u.write_cr(field);
        }
    }
}

pub fn mfspr(u: &mut RegisterUsage, i: Instruction) {
    match i.spr() {
        SPR_XER => u.read(Reg::Xer),
        SPR_LR => u.read(Reg::Lr),
        SPR_CTR => u.read(Reg::Ctr),
        _ => {}
    }
    u.write_gpr(i.rd());
}

pub fn mtspr(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.rs());
    match i.spr() {
        SPR_XER => u.write(Reg::Xer),
        SPR_LR => u.write(Reg::Lr),
        SPR_CTR => u.write(Reg::Ctr),
        _ => {}
    }
}

pub fn rd(u: &mut RegisterUsage, i: Instruction) {
    u.write_gpr(i.rd());
}

/// Cache hints and `dcbz`: `(rA|0) + rB`
pub fn ra0_rb(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
}

// Integer loads and stores

pub fn load_d(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.write_gpr(i.rd());
}

pub fn load_du(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.write_gpr(i.rd());
    u.write_gpr(i.ra());
}

pub fn store_d(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rs());
}

pub fn store_du(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rs());
    u.write_gpr(i.ra());
}

pub fn load_x(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.write_gpr(i.rd());
}

pub fn load_xu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.write_gpr(i.rd());
    u.write_gpr(i.ra());
}

pub fn store_x(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.read_gpr(i.rs());
}

/// `stwcx.`/`stdcx.` report success in CR0
pub fn store_x_cr0(u: &mut RegisterUsage, i: Instruction) {
    store_x(u, i);
    u.read(Reg::Xer);
    u.write_cr(0);
}

pub fn store_xu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.read_gpr(i.rs());
    u.write_gpr(i.ra());
}

pub fn lmw(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    for n in i.rd()..32 {
        u.write_gpr(n);
    }
}

pub fn stmw(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    for n in i.rs()..32 {
        u.read_gpr(n);
    }
}

/// Registers touched by a string instruction moving NB bytes from `first`
fn string_regs(i: Instruction, first: usize) -> impl Iterator<Item = usize> {
    let count = if i.nb() == 0 { 32 } else { i.nb() } as usize;
    (0..count.div_ceil(4)).map(move |n| (first + n) % 32)
}

pub fn lswi(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    for n in string_regs(i, i.rd()) {
        u.write_gpr(n);
    }
}

pub fn stswi(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    for n in string_regs(i, i.rs()) {
        u.read_gpr(n);
    }
}

// Floating point loads and stores

pub fn load_fd(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.write_fpr(i.frd());
}

pub fn load_fdu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.write_fpr(i.frd());
    u.write_gpr(i.ra());
}

pub fn store_fd(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_fpr(i.frs());
}

pub fn store_fdu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_fpr(i.frs());
    u.write_gpr(i.ra());
}

pub fn load_fx(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.write_fpr(i.frd());
}

pub fn load_fxu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.write_fpr(i.frd());
    u.write_gpr(i.ra());
}

pub fn store_fx(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.read_fpr(i.frs());
}

pub fn store_fxu(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr(i.ra());
    u.read_gpr(i.rb());
    u.read_fpr(i.frs());
    u.write_gpr(i.ra());
}

// Vector loads and stores

pub fn load_vx(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.write_vr(i.vd());
}

pub fn store_vx(u: &mut RegisterUsage, i: Instruction) {
    u.read_gpr_or_zero(i.ra());
    u.read_gpr(i.rb());
    u.read_vr(i.vs());
}

// Floating point arithmetic

pub fn frd_fra_frb(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.fra());
    u.read_fpr(i.frb());
    fp_rc(u, i);
    u.write_fpr(i.frd());
}

pub fn frd_frb(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.frb());
    fp_rc(u, i);
    u.write_fpr(i.frd());
}

pub fn frd_fra_frc(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.fra());
    u.read_fpr(i.frc());
    fp_rc(u, i);
    u.write_fpr(i.frd());
}

pub fn frd_fra_frb_frc(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.fra());
    u.read_fpr(i.frb());
    u.read_fpr(i.frc());
    fp_rc(u, i);
    u.write_fpr(i.frd());
}

pub fn fcmp(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.fra());
    u.read_fpr(i.frb());
    u.modify(Reg::Fpscr);
    u.write_cr(i.crfd());
}

pub fn fpscr_write(u: &mut RegisterUsage, i: Instruction) {
    u.modify(Reg::Fpscr);
    fp_rc(u, i);
}

pub fn frd(u: &mut RegisterUsage, i: Instruction) {
    u.read(Reg::Fpscr);
    fp_rc(u, i);
    u.write_fpr(i.frd());
}

pub fn mtfsf(u: &mut RegisterUsage, i: Instruction) {
    u.read_fpr(i.frb());
    u.modify(Reg::Fpscr);
    fp_rc(u, i);
}

// Vector

pub fn vd_va_vb_vc(u: &mut RegisterUsage, i: Instruction) {
    u.read_vr(i.va());
    u.read_vr(i.vb());
    u.read_vr(i.vc());
    u.write_vr(i.vd());
}

pub fn vd_va_vb(u: &mut RegisterUsage, i: Instruction) {
    u.read_vr(i.va());
    u.read_vr(i.vb());
    u.write_vr(i.vd());
}

pub fn vd_va_vb_cr6(u: &mut RegisterUsage, i: Instruction) {
    vd_va_vb(u, i);
    if i.vrc() {
        u.write_cr(6);
    }
}

pub fn vd_vb(u: &mut RegisterUsage, i: Instruction) {
    u.read_vr(i.vb());
    u.write_vr(i.vd());
}

pub fn vd(u: &mut RegisterUsage, i: Instruction) {
    u.read(Reg::Vscr);
    u.write_vr(i.vd());
}

pub fn vb(u: &mut RegisterUsage, i: Instruction) {
    u.read_vr(i.vb());
    u.write(Reg::Vscr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    fn analyze(words: &[u32]) -> RegisterUsage {
        let mut usage = RegisterUsage::new();
        for &word in words {
            let instr = Instruction(word);
            (decode(instr).analyze)(&mut usage, instr);
        }
        usage
    }

    #[test]
    fn test_add_reads_sources_writes_destination() {
        // add r3, r4, r5
        let usage = analyze(&[0x7C642A14]);
        assert!(usage.is_read_orig(Reg::Gpr(4)));
        assert!(usage.is_read_orig(Reg::Gpr(5)));
        assert!(usage.is_written(Reg::Gpr(3)));
        assert!(!usage.is_read_orig(Reg::Gpr(3)));
        assert!(!usage.is_used(Reg::Xer));
        assert!(!usage.is_used(Reg::Cr(0)));
    }

    #[test]
    fn test_record_and_overflow_forms() {
        // addo. r3, r4, r5
        let usage = analyze(&[0x7C642E15]);
        assert!(usage.is_written(Reg::Cr(0)));
        assert!(usage.is_written(Reg::Xer));
        assert!(usage.is_read_orig(Reg::Xer));
    }

    #[test]
    fn test_li_does_not_read_r0() {
        // li r3, 100
        let usage = analyze(&[0x38600064]);
        assert!(!usage.is_used(Reg::Gpr(0)));
        assert!(usage.is_written(Reg::Gpr(3)));
    }

    #[test]
    fn test_bdnz_and_blr() {
        // bdnz -4; blr
        let usage = analyze(&[0x4200FFFC, 0x4E800020]);
        assert!(usage.is_written(Reg::Ctr));
        assert!(usage.is_read_orig(Reg::Ctr));
        assert!(usage.is_read_orig(Reg::Lr));
        assert!(!usage.is_used(Reg::Cr(0)));
    }

    #[test]
    fn test_mflr_stwu_prologue() {
        // mflr r0; stwu r1, -16(r1)
        let usage = analyze(&[0x7C0802A6, 0x9421FFF0]);
        assert!(usage.is_read_orig(Reg::Lr));
        assert!(usage.is_written(Reg::Gpr(0)));
        assert!(usage.is_read_orig(Reg::Gpr(1)));
        assert!(usage.is_written(Reg::Gpr(1)));
    }

    #[test]
    fn test_stmw_reads_tail_registers() {
        // stmw r29, -12(r1)
        let usage = analyze(&[0xBFA1FFF4]);
        for n in 29..32 {
            assert!(usage.is_read_orig(Reg::Gpr(n)));
        }
        assert!(!usage.is_used(Reg::Gpr(28)));
    }

    #[test]
    fn test_fp_record_form() {
        // fadd. f1, f2, f3
        let usage = analyze(&[0xFC22182B]);
        assert!(usage.is_written(Reg::Fpr(1)));
        assert!(usage.is_written(Reg::Cr(1)));
        assert!(usage.is_read_orig(Reg::Fpscr));
    }
}
