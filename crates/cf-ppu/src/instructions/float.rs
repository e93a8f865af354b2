//! Floating-point instructions
//!
//! Arithmetic runs on host `f64`; single-precision forms round the result
//! through `f32`. Exception and sticky status bits of FPSCR are not tracked,
//! only FPRF/FPCC from compares and the fields written by the FPSCR moves.

use super::Step;
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::thread::{PpuThread, CR_EQ, CR_GT, CR_LT, CR_SO};

/// FPSCR[FPCC] position (bits 16-19)
const FPSCR_FPCC_SHIFT: u32 = 12;

#[inline]
fn round_single(value: f64) -> f64 {
    value as f32 as f64
}

/// Record form: copy FPSCR[0:3] into CR1
#[inline]
fn fp_record(t: &mut PpuThread, i: Instruction) {
    if i.rc() {
        let bits = t.regs.fpscr >> 28;
        t.set_cr_field(1, bits);
    }
}

#[inline]
fn set_result(t: &mut PpuThread, i: Instruction, value: f64) {
    t.set_fpr(i.frd(), value);
    fp_record(t, i);
}

macro_rules! binary {
    ($($name:ident, $single:ident: |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            pub fn $name(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ($a, $b) = (t.fpr(i.fra()), t.fpr(i.frb()));
                set_result(t, i, $body);
                Ok(())
            }

            pub fn $single(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ($a, $b) = (t.fpr(i.fra()), t.fpr(i.frb()));
                set_result(t, i, round_single($body));
                Ok(())
            }
        )*
    };
}

binary! {
    faddx, faddsx: |a, b| a + b;
    fsubx, fsubsx: |a, b| a - b;
    fdivx, fdivsx: |a, b| a / b;
}

pub fn fmulx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.fpr(i.fra()) * t.fpr(i.frc());
    set_result(t, i, value);
    Ok(())
}

pub fn fmulsx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = round_single(t.fpr(i.fra()) * t.fpr(i.frc()));
    set_result(t, i, value);
    Ok(())
}

// Fused multiply-add family: frD = +/-(frA * frC +/- frB)

macro_rules! fused {
    ($($name:ident, $single:ident: |$a:ident, $b:ident, $c:ident| $body:expr;)*) => {
        $(
            pub fn $name(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ($a, $b, $c) = (t.fpr(i.fra()), t.fpr(i.frb()), t.fpr(i.frc()));
                set_result(t, i, $body);
                Ok(())
            }

            pub fn $single(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ($a, $b, $c) = (t.fpr(i.fra()), t.fpr(i.frb()), t.fpr(i.frc()));
                set_result(t, i, round_single($body));
                Ok(())
            }
        )*
    };
}

fused! {
    fmaddx, fmaddsx: |a, b, c| a.mul_add(c, b);
    fmsubx, fmsubsx: |a, b, c| a.mul_add(c, -b);
    fnmaddx, fnmaddsx: |a, b, c| -a.mul_add(c, b);
    fnmsubx, fnmsubsx: |a, b, c| -a.mul_add(c, -b);
}

pub fn fsqrtx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.fpr(i.frb()).sqrt();
    set_result(t, i, value);
    Ok(())
}

pub fn fsqrtsx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = round_single(t.fpr(i.frb()).sqrt());
    set_result(t, i, value);
    Ok(())
}

/// Reciprocal estimate, computed exactly
pub fn fresx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = round_single(1.0 / t.fpr(i.frb()));
    set_result(t, i, value);
    Ok(())
}

pub fn frsqrtex(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = 1.0 / t.fpr(i.frb()).sqrt();
    set_result(t, i, value);
    Ok(())
}

pub fn fselx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = if t.fpr(i.fra()) >= 0.0 {
        t.fpr(i.frc())
    } else {
        t.fpr(i.frb())
    };
    set_result(t, i, value);
    Ok(())
}

// Compare

fn compare(t: &mut PpuThread, i: Instruction) {
    let (a, b) = (t.fpr(i.fra()), t.fpr(i.frb()));
    let c = if a.is_nan() || b.is_nan() {
        CR_SO
    } else if a < b {
        CR_LT
    } else if a > b {
        CR_GT
    } else {
        CR_EQ
    };
    t.set_cr_field(i.crfd(), c);
    t.regs.fpscr = (t.regs.fpscr & !(0xF << FPSCR_FPCC_SHIFT)) | (c << FPSCR_FPCC_SHIFT);
}

pub fn fcmpu(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    compare(t, i);
    Ok(())
}

pub fn fcmpo(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    compare(t, i);
    Ok(())
}

// Rounding and conversion

/// Round per FPSCR[RN]
fn round_mode(t: &PpuThread, value: f64) -> f64 {
    match t.regs.fpscr & 3 {
        0 => value.round_ties_even(),
        1 => value.trunc(),
        2 => value.ceil(),
        _ => value.floor(),
    }
}

fn to_word(value: f64) -> f64 {
    let word = if value.is_nan() { i32::MIN } else { value as i32 };
    f64::from_bits(word as u32 as u64)
}

fn to_doubleword(value: f64) -> f64 {
    let dword = if value.is_nan() { i64::MIN } else { value as i64 };
    f64::from_bits(dword as u64)
}

pub fn frspx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = round_single(t.fpr(i.frb()));
    set_result(t, i, value);
    Ok(())
}

pub fn fctiwx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = to_word(round_mode(t, t.fpr(i.frb())));
    set_result(t, i, value);
    Ok(())
}

pub fn fctiwzx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = to_word(t.fpr(i.frb()).trunc());
    set_result(t, i, value);
    Ok(())
}

pub fn fctidx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = to_doubleword(round_mode(t, t.fpr(i.frb())));
    set_result(t, i, value);
    Ok(())
}

pub fn fctidzx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = to_doubleword(t.fpr(i.frb()).trunc());
    set_result(t, i, value);
    Ok(())
}

pub fn fcfidx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.fpr(i.frb()).to_bits() as i64 as f64;
    set_result(t, i, value);
    Ok(())
}

// Moves

pub fn fmrx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.fpr(i.frb());
    set_result(t, i, value);
    Ok(())
}

pub fn fnegx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = -t.fpr(i.frb());
    set_result(t, i, value);
    Ok(())
}

pub fn fabsx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.fpr(i.frb()).abs();
    set_result(t, i, value);
    Ok(())
}

pub fn fnabsx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = -t.fpr(i.frb()).abs();
    set_result(t, i, value);
    Ok(())
}

// FPSCR moves

pub fn mffsx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = f64::from_bits(t.regs.fpscr as u64);
    set_result(t, i, value);
    Ok(())
}

pub fn mtfsfx(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let mask = super::crm_mask(i.fm());
    let bits = t.fpr(i.frb()).to_bits() as u32;
    t.regs.fpscr = (t.regs.fpscr & !mask) | (bits & mask);
    fp_record(t, i);
    Ok(())
}

pub fn mtfsfix(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let shift = 28 - i.crfd() as u32 * 4;
    t.regs.fpscr = (t.regs.fpscr & !(0xF << shift)) | (i.fpimm() << shift);
    fp_record(t, i);
    Ok(())
}

pub fn mtfsb0x(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.regs.fpscr &= !(1 << (31 - i.crbd()));
    fp_record(t, i);
    Ok(())
}

pub fn mtfsb1x(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.regs.fpscr |= 1 << (31 - i.crbd());
    fp_record(t, i);
    Ok(())
}
