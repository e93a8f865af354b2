//! Integer arithmetic, logic, compare, rotate and shift instructions

use super::{add_overflows, add_with_carry, mask64, record, rotl32, rotl64, Step};
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::thread::PpuThread;

// Immediate arithmetic

pub fn mulli(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.rd(), (t.gpr(i.ra()) as i64).wrapping_mul(i.simm()) as u64);
    Ok(())
}

pub fn subfic(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (r, ca) = add_with_carry(!t.gpr(i.ra()), i.simm() as u64, true);
    t.set_gpr(i.rd(), r);
    t.set_xer_ca(ca);
    Ok(())
}

pub fn addic(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (r, ca) = add_with_carry(t.gpr(i.ra()), i.simm() as u64, false);
    t.set_gpr(i.rd(), r);
    t.set_xer_ca(ca);
    Ok(())
}

pub fn addic_(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    addic(interp, t, i)?;
    t.update_cr0(t.gpr(i.rd()));
    Ok(())
}

pub fn addi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.rd(), t.gpr_or_zero(i.ra()).wrapping_add(i.simm() as u64));
    Ok(())
}

pub fn addis(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.rd(), t.gpr_or_zero(i.ra()).wrapping_add((i.simm() << 16) as u64));
    Ok(())
}

// XO-form arithmetic

fn finish_xo(t: &mut PpuThread, i: Instruction, value: u64, overflow: bool) {
    t.set_gpr(i.rd(), value);
    if i.oe() {
        t.set_xer_ov(overflow);
    }
    record(t, i, value);
}

/// `a + b + cin` with CA always updated
fn carrying(t: &mut PpuThread, i: Instruction, a: u64, b: u64, cin: bool) {
    let (r, ca) = add_with_carry(a, b, cin);
    t.set_xer_ca(ca);
    finish_xo(t, i, r, add_overflows(a, b, r));
}

pub fn addx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.gpr(i.ra()), t.gpr(i.rb()));
    let r = a.wrapping_add(b);
    finish_xo(t, i, r, add_overflows(a, b, r));
    Ok(())
}

pub fn addcx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (t.gpr(i.ra()), t.gpr(i.rb()), false);
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn addex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (t.gpr(i.ra()), t.gpr(i.rb()), t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn addmex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (t.gpr(i.ra()), u64::MAX, t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn addzex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (t.gpr(i.ra()), 0, t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn subfx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (!t.gpr(i.ra()), t.gpr(i.rb()));
    let r = a.wrapping_add(b).wrapping_add(1);
    finish_xo(t, i, r, add_overflows(a, b, r));
    Ok(())
}

pub fn subfcx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (!t.gpr(i.ra()), t.gpr(i.rb()), true);
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn subfex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (!t.gpr(i.ra()), t.gpr(i.rb()), t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn subfmex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (!t.gpr(i.ra()), u64::MAX, t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn subfzex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, cin) = (!t.gpr(i.ra()), 0, t.xer_ca());
    carrying(t, i, a, b, cin);
    Ok(())
}

pub fn negx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra());
    finish_xo(t, i, a.wrapping_neg(), a == 1 << 63);
    Ok(())
}

pub fn mullwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra()) as i32 as i64;
    let b = t.gpr(i.rb()) as i32 as i64;
    let r = a * b;
    finish_xo(t, i, r as u64, r != r as i32 as i64);
    Ok(())
}

pub fn mulldx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (r, overflow) = (t.gpr(i.ra()) as i64).overflowing_mul(t.gpr(i.rb()) as i64);
    finish_xo(t, i, r as u64, overflow);
    Ok(())
}

pub fn mulhwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = ((t.gpr(i.ra()) as i32 as i64) * (t.gpr(i.rb()) as i32 as i64)) >> 32;
    t.set_gpr(i.rd(), r as u64);
    record(t, i, r as u64);
    Ok(())
}

pub fn mulhwux(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = ((t.gpr(i.ra()) as u32 as u64) * (t.gpr(i.rb()) as u32 as u64)) >> 32;
    t.set_gpr(i.rd(), r);
    record(t, i, r);
    Ok(())
}

pub fn mulhdx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = ((t.gpr(i.ra()) as i64 as i128 * t.gpr(i.rb()) as i64 as i128) >> 64) as u64;
    t.set_gpr(i.rd(), r);
    record(t, i, r);
    Ok(())
}

pub fn mulhdux(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = ((t.gpr(i.ra()) as u128 * t.gpr(i.rb()) as u128) >> 64) as u64;
    t.set_gpr(i.rd(), r);
    record(t, i, r);
    Ok(())
}

// Undefined quotients (divide by zero, MIN / -1) produce 0 and flag OV

pub fn divwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra()) as i32;
    let b = t.gpr(i.rb()) as i32;
    match a.checked_div(b) {
        Some(q) => finish_xo(t, i, q as u32 as u64, false),
        None => finish_xo(t, i, 0, true),
    }
    Ok(())
}

pub fn divwux(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra()) as u32;
    let b = t.gpr(i.rb()) as u32;
    match a.checked_div(b) {
        Some(q) => finish_xo(t, i, q as u64, false),
        None => finish_xo(t, i, 0, true),
    }
    Ok(())
}

pub fn divdx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra()) as i64;
    let b = t.gpr(i.rb()) as i64;
    match a.checked_div(b) {
        Some(q) => finish_xo(t, i, q as u64, false),
        None => finish_xo(t, i, 0, true),
    }
    Ok(())
}

pub fn divdux(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    match t.gpr(i.ra()).checked_div(t.gpr(i.rb())) {
        Some(q) => finish_xo(t, i, q, false),
        None => finish_xo(t, i, 0, true),
    }
    Ok(())
}

// Compare

pub fn cmp(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.gpr(i.ra()), t.gpr(i.rb()));
    if i.l10() {
        t.update_cr_signed(i.crfd(), a as i64, b as i64);
    } else {
        t.update_cr_signed(i.crfd(), a as i32 as i64, b as i32 as i64);
    }
    Ok(())
}

pub fn cmpi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra());
    if i.l10() {
        t.update_cr_signed(i.crfd(), a as i64, i.simm());
    } else {
        t.update_cr_signed(i.crfd(), a as i32 as i64, i.simm());
    }
    Ok(())
}

pub fn cmpl(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.gpr(i.ra()), t.gpr(i.rb()));
    if i.l10() {
        t.update_cr_unsigned(i.crfd(), a, b);
    } else {
        t.update_cr_unsigned(i.crfd(), a as u32 as u64, b as u32 as u64);
    }
    Ok(())
}

pub fn cmpli(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.gpr(i.ra());
    if i.l10() {
        t.update_cr_unsigned(i.crfd(), a, i.uimm());
    } else {
        t.update_cr_unsigned(i.crfd(), a as u32 as u64, i.uimm());
    }
    Ok(())
}

// Logic

fn logical(t: &mut PpuThread, i: Instruction, value: u64) {
    t.set_gpr(i.ra(), value);
    record(t, i, value);
}

pub fn andx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) & t.gpr(i.rb());
    logical(t, i, r);
    Ok(())
}

pub fn andcx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) & !t.gpr(i.rb());
    logical(t, i, r);
    Ok(())
}

pub fn orx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) | t.gpr(i.rb());
    logical(t, i, r);
    Ok(())
}

pub fn orcx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) | !t.gpr(i.rb());
    logical(t, i, r);
    Ok(())
}

pub fn xorx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) ^ t.gpr(i.rb());
    logical(t, i, r);
    Ok(())
}

pub fn norx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = !(t.gpr(i.rs()) | t.gpr(i.rb()));
    logical(t, i, r);
    Ok(())
}

pub fn nandx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = !(t.gpr(i.rs()) & t.gpr(i.rb()));
    logical(t, i, r);
    Ok(())
}

pub fn eqvx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = !(t.gpr(i.rs()) ^ t.gpr(i.rb()));
    logical(t, i, r);
    Ok(())
}

pub fn ori(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.ra(), t.gpr(i.rs()) | i.uimm());
    Ok(())
}

pub fn oris(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.ra(), t.gpr(i.rs()) | (i.uimm() << 16));
    Ok(())
}

pub fn xori(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.ra(), t.gpr(i.rs()) ^ i.uimm());
    Ok(())
}

pub fn xoris(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_gpr(i.ra(), t.gpr(i.rs()) ^ (i.uimm() << 16));
    Ok(())
}

pub fn andi_(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) & i.uimm();
    t.set_gpr(i.ra(), r);
    t.update_cr0(r);
    Ok(())
}

pub fn andis_(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) & (i.uimm() << 16);
    t.set_gpr(i.ra(), r);
    t.update_cr0(r);
    Ok(())
}

pub fn extsbx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) as i8 as i64 as u64;
    logical(t, i, r);
    Ok(())
}

pub fn extshx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) as i16 as i64 as u64;
    logical(t, i, r);
    Ok(())
}

pub fn extswx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()) as i32 as i64 as u64;
    logical(t, i, r);
    Ok(())
}

pub fn cntlzwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = (t.gpr(i.rs()) as u32).leading_zeros() as u64;
    logical(t, i, r);
    Ok(())
}

pub fn cntlzdx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = t.gpr(i.rs()).leading_zeros() as u64;
    logical(t, i, r);
    Ok(())
}

// Rotate

pub fn rlwinm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = rotl32(t.gpr(i.rs()), i.sh()) & mask64(i.mb() + 32, i.me() + 32);
    logical(t, i, r);
    Ok(())
}

pub fn rlwnm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = (t.gpr(i.rb()) & 0x1F) as u32;
    let r = rotl32(t.gpr(i.rs()), n) & mask64(i.mb() + 32, i.me() + 32);
    logical(t, i, r);
    Ok(())
}

pub fn rlwimi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let mask = mask64(i.mb() + 32, i.me() + 32);
    let r = (rotl32(t.gpr(i.rs()), i.sh()) & mask) | (t.gpr(i.ra()) & !mask);
    logical(t, i, r);
    Ok(())
}

pub fn rldicl(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = rotl64(t.gpr(i.rs()), i.sh64()) & mask64(i.mb64(), 63);
    logical(t, i, r);
    Ok(())
}

pub fn rldicr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let r = rotl64(t.gpr(i.rs()), i.sh64()) & mask64(0, i.mb64());
    logical(t, i, r);
    Ok(())
}

pub fn rldic(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let sh = i.sh64();
    let r = rotl64(t.gpr(i.rs()), sh) & mask64(i.mb64(), 63 - sh);
    logical(t, i, r);
    Ok(())
}

pub fn rldimi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let sh = i.sh64();
    let mask = mask64(i.mb64(), 63 - sh);
    let r = (rotl64(t.gpr(i.rs()), sh) & mask) | (t.gpr(i.ra()) & !mask);
    logical(t, i, r);
    Ok(())
}

/// `rldcl` and `rldcr` share an MD-form slot; bit 30 selects the mask side
pub fn rldc_lr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = (t.gpr(i.rb()) & 0x3F) as u32;
    let mask = if is_rldcr(i) {
        mask64(0, i.mb64())
    } else {
        mask64(i.mb64(), 63)
    };
    let r = rotl64(t.gpr(i.rs()), n) & mask;
    logical(t, i, r);
    Ok(())
}

#[inline]
pub(crate) fn is_rldcr(i: Instruction) -> bool {
    (i.word() >> 1) & 1 != 0
}

// Shift

pub fn slwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = t.gpr(i.rb()) & 0x3F;
    let r = if n > 31 { 0 } else { ((t.gpr(i.rs()) as u32) << n) as u64 };
    logical(t, i, r);
    Ok(())
}

pub fn srwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = t.gpr(i.rb()) & 0x3F;
    let r = if n > 31 { 0 } else { ((t.gpr(i.rs()) as u32) >> n) as u64 };
    logical(t, i, r);
    Ok(())
}

fn shift_right_word(t: &mut PpuThread, i: Instruction, n: u32) {
    let s = t.gpr(i.rs()) as i32;
    let (r, ca) = if n > 31 {
        (s >> 31, s < 0)
    } else {
        (s >> n, s < 0 && (s as u32) & ((1u32 << n) - 1) != 0)
    };
    t.set_xer_ca(ca);
    let r = r as i64 as u64;
    logical(t, i, r);
}

pub fn srawx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = (t.gpr(i.rb()) & 0x3F) as u32;
    shift_right_word(t, i, n);
    Ok(())
}

pub fn srawix(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    shift_right_word(t, i, i.sh());
    Ok(())
}

pub fn sldx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = t.gpr(i.rb()) & 0x7F;
    let r = if n > 63 { 0 } else { t.gpr(i.rs()) << n };
    logical(t, i, r);
    Ok(())
}

pub fn srdx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = t.gpr(i.rb()) & 0x7F;
    let r = if n > 63 { 0 } else { t.gpr(i.rs()) >> n };
    logical(t, i, r);
    Ok(())
}

fn shift_right_double(t: &mut PpuThread, i: Instruction, n: u32) {
    let s = t.gpr(i.rs()) as i64;
    let (r, ca) = if n > 63 {
        (s >> 63, s < 0)
    } else {
        (s >> n, s < 0 && (s as u64) & ((1u64 << n) - 1) != 0)
    };
    t.set_xer_ca(ca);
    let r = r as u64;
    logical(t, i, r);
}

pub fn sradx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let n = (t.gpr(i.rb()) & 0x7F) as u32;
    shift_right_double(t, i, n);
    Ok(())
}

pub fn sradix(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    shift_right_double(t, i, i.sh64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{CR_EQ, CR_GT, CR_LT, XER_CA};
    use cf_memory::MemoryManager;

    fn setup() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        (PpuInterpreter::new(memory.clone()), PpuThread::new(0, memory))
    }

    #[test]
    fn test_addi_ra_zero() {
        let (interp, mut t) = setup();
        t.set_gpr(0, 1234);
        // addi r3, 0, -1
        addi(&interp, &mut t, Instruction(0x3860FFFF)).unwrap();
        assert_eq!(t.gpr(3), u64::MAX);
        // addis r3, r3, 1
        addis(&interp, &mut t, Instruction(0x3C630001)).unwrap();
        assert_eq!(t.gpr(3), 0xFFFF);
    }

    #[test]
    fn test_addc_carry_out() {
        let (interp, mut t) = setup();
        t.set_gpr(4, u64::MAX);
        t.set_gpr(5, 1);
        // addc r3, r4, r5
        addcx(&interp, &mut t, Instruction(0x7C642814)).unwrap();
        assert_eq!(t.gpr(3), 0);
        assert!(t.xer_ca());
    }

    #[test]
    fn test_subf_and_overflow() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 3);
        t.set_gpr(5, 10);
        // subf r3, r4, r5
        subfx(&interp, &mut t, Instruction(0x7C642850)).unwrap();
        assert_eq!(t.gpr(3), 7);

        t.set_gpr(4, i64::MAX as u64);
        t.set_gpr(5, 1);
        // addo. r3, r4, r5
        addx(&interp, &mut t, Instruction(0x7C642E15)).unwrap();
        assert_eq!(t.gpr(3), 1 << 63);
        assert!(t.xer_ov());
        assert!(t.xer_so());
        assert_eq!(t.cr_field(0), CR_LT | 1);
    }

    #[test]
    fn test_divide_by_zero() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 100);
        t.set_gpr(5, 0);
        // divwo r3, r4, r5
        divwx(&interp, &mut t, Instruction(0x7C642FD6)).unwrap();
        assert_eq!(t.gpr(3), 0);
        assert!(t.xer_ov());
    }

    #[test]
    fn test_compare_word_vs_double() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 0x1_0000_0000);
        t.set_gpr(5, 0);
        // cmpw cr0, r4, r5
        cmp(&interp, &mut t, Instruction(0x7C042800)).unwrap();
        assert_eq!(t.cr_field(0), CR_EQ);
        // cmpd cr7, r4, r5
        cmp(&interp, &mut t, Instruction(0x7FA42800)).unwrap();
        assert_eq!(t.cr_field(7), CR_GT);
    }

    #[test]
    fn test_rlwinm_slwi() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 0x1234_5678);
        // rlwinm r3, r4, 2, 0, 29 (slwi r3, r4, 2)
        rlwinm(&interp, &mut t, Instruction(0x5483103A)).unwrap();
        assert_eq!(t.gpr(3), 0x48D1_59E0);
    }

    #[test]
    fn test_rldicl_clrldi() {
        let (interp, mut t) = setup();
        t.set_gpr(3, 0xDEAD_BEEF_1234_5678);
        // clrldi r3, r3, 32
        rldicl(&interp, &mut t, Instruction(0x78630020)).unwrap();
        assert_eq!(t.gpr(3), 0x1234_5678);
    }

    #[test]
    fn test_sradi_carry() {
        let (interp, mut t) = setup();
        t.set_gpr(3, (-5i64) as u64);
        // sradi r3, r3, 63
        sradix(&interp, &mut t, Instruction(0x7C63FE76)).unwrap();
        assert_eq!(t.gpr(3), u64::MAX);
        assert_ne!(t.regs.xer & XER_CA, 0);

        t.set_gpr(4, (-8i32) as u32 as u64);
        // srawi r3, r4, 2
        srawix(&interp, &mut t, Instruction(0x7C831670)).unwrap();
        assert_eq!(t.gpr(3) as i64, -2);
        assert!(!t.xer_ca());
    }

    #[test]
    fn test_cntlzw_and_extsh() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 0x0000_8000);
        // cntlzw r3, r4
        cntlzwx(&interp, &mut t, Instruction(0x7C830034)).unwrap();
        assert_eq!(t.gpr(3), 16);
        // extsh r3, r4
        extshx(&interp, &mut t, Instruction(0x7C830734)).unwrap();
        assert_eq!(t.gpr(3), 0xFFFF_FFFF_FFFF_8000);
    }
}
