//! Floating-point lowering

use super::Recompiler;
use crate::analyzer::Reg;
use crate::hir::{BinaryOp, CastOp, CmpPred, Intrinsic, Type, UnaryOp, ValueId};
use crate::instruction::Instruction;

/// FPSCR[FPCC] position
const FPSCR_FPCC_SHIFT: u32 = 12;

impl Recompiler<'_> {
    fn round_single(&mut self, value: ValueId) -> ValueId {
        let single = self.builder.cast(CastOp::FpTrunc, value, Type::F32);
        self.builder.cast(CastOp::FpExt, single, Type::F64)
    }

    fn set_fp_result(&mut self, i: Instruction, value: ValueId) {
        self.set_fpr(i.frd(), value);
        self.fp_record(i);
    }

    /// Integer result placed in the low bits of an FPR
    fn set_fp_integer(&mut self, i: Instruction, value: ValueId) {
        let bits = self.builder.zext(value, Type::I64);
        let value = self.builder.bitcast(bits, Type::F64);
        self.set_fp_result(i, value);
    }

    /// `frB` rounded per FPSCR[RN]
    fn round_mode(&mut self, value: ValueId) -> ValueId {
        let fpscr = self.reg(Reg::Fpscr);
        let mask = self.builder.const_i32(3);
        let mode = self.builder.and(fpscr, mask);
        self.builder.intrinsic(Intrinsic::RoundToIntegral, vec![value, mode])
    }
}

macro_rules! binary {
    ($($name:ident, $single:ident: $op:ident, $rhs:ident;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let (a, b) = (r.fpr(i.fra()), r.fpr(i.$rhs()));
                let value = r.builder.binary(BinaryOp::$op, a, b);
                r.set_fp_result(i, value);
            }

            pub fn $single(r: &mut Recompiler<'_>, i: Instruction) {
                let (a, b) = (r.fpr(i.fra()), r.fpr(i.$rhs()));
                let value = r.builder.binary(BinaryOp::$op, a, b);
                let value = r.round_single(value);
                r.set_fp_result(i, value);
            }
        )*
    };
}

binary! {
    faddx, faddsx: FAdd, frb;
    fsubx, fsubsx: FSub, frb;
    fdivx, fdivsx: FDiv, frb;
    fmulx, fmulsx: FMul, frc;
}

// frD = +/-(frA * frC +/- frB), rounded once

macro_rules! fused {
    ($($name:ident, $single:ident: $negate_b:literal, $negate:literal;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let value = fused(r, i, $negate_b, $negate);
                r.set_fp_result(i, value);
            }

            pub fn $single(r: &mut Recompiler<'_>, i: Instruction) {
                let value = fused(r, i, $negate_b, $negate);
                let value = r.round_single(value);
                r.set_fp_result(i, value);
            }
        )*
    };
}

fn fused(r: &mut Recompiler<'_>, i: Instruction, negate_b: bool, negate: bool) -> ValueId {
    let (a, c) = (r.fpr(i.fra()), r.fpr(i.frc()));
    let mut b = r.fpr(i.frb());
    if negate_b {
        b = r.builder.unary(UnaryOp::FNeg, b);
    }
    let value = r.builder.intrinsic(Intrinsic::Fma, vec![a, c, b]);
    if negate {
        r.builder.unary(UnaryOp::FNeg, value)
    } else {
        value
    }
}

fused! {
    fmaddx, fmaddsx: false, false;
    fmsubx, fmsubsx: true, false;
    fnmaddx, fnmaddsx: false, true;
    fnmsubx, fnmsubsx: true, true;
}

pub fn fsqrtx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.builder.unary(UnaryOp::FSqrt, b);
    r.set_fp_result(i, value);
}

pub fn fsqrtsx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.builder.unary(UnaryOp::FSqrt, b);
    let value = r.round_single(value);
    r.set_fp_result(i, value);
}

pub fn fresx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let one = r.builder.const_f64(1.0);
    let value = r.builder.binary(BinaryOp::FDiv, one, b);
    let value = r.round_single(value);
    r.set_fp_result(i, value);
}

pub fn frsqrtex(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let root = r.builder.unary(UnaryOp::FSqrt, b);
    let one = r.builder.const_f64(1.0);
    let value = r.builder.binary(BinaryOp::FDiv, one, root);
    r.set_fp_result(i, value);
}

pub fn fselx(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b, c) = (r.fpr(i.fra()), r.fpr(i.frb()), r.fpr(i.frc()));
    let zero = r.builder.const_f64(0.0);
    let non_negative = r.builder.cmp(CmpPred::FOge, a, zero);
    let value = r.builder.select(non_negative, c, b);
    r.set_fp_result(i, value);
}

// Compare: one of LT, GT, EQ or FU lands in both crfD and FPSCR[FPCC]

fn compare(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.fpr(i.fra()), r.fpr(i.frb()));
    let lt = r.builder.cmp(CmpPred::FOlt, a, b);
    let gt = r.builder.cmp(CmpPred::FOgt, a, b);
    let eq = r.builder.cmp(CmpPred::FOeq, a, b);
    let unordered = r.builder.cmp(CmpPred::FUno, a, b);
    let c = r.cr_value(lt, gt, eq, unordered);
    r.set_cr_field(i.crfd(), c);

    let fpscr = r.reg(Reg::Fpscr);
    let keep = r.builder.const_i32(!(0xF << FPSCR_FPCC_SHIFT));
    let fpscr = r.builder.and(fpscr, keep);
    let bits = r.builder.zext(c, Type::I32);
    let shift = r.builder.const_i32(FPSCR_FPCC_SHIFT);
    let bits = r.builder.shl(bits, shift);
    let fpscr = r.builder.or(fpscr, bits);
    r.set_reg(Reg::Fpscr, fpscr);
}

pub fn fcmpu(r: &mut Recompiler<'_>, i: Instruction) {
    compare(r, i);
}

pub fn fcmpo(r: &mut Recompiler<'_>, i: Instruction) {
    compare(r, i);
}

// Rounding and conversion

pub fn frspx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.round_single(b);
    r.set_fp_result(i, value);
}

pub fn fctiwx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let rounded = r.round_mode(b);
    let word = r.builder.cast(CastOp::FpToSi, rounded, Type::I32);
    r.set_fp_integer(i, word);
}

pub fn fctiwzx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let word = r.builder.cast(CastOp::FpToSi, b, Type::I32);
    r.set_fp_integer(i, word);
}

pub fn fctidx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let rounded = r.round_mode(b);
    let dword = r.builder.cast(CastOp::FpToSi, rounded, Type::I64);
    r.set_fp_integer(i, dword);
}

pub fn fctidzx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let dword = r.builder.cast(CastOp::FpToSi, b, Type::I64);
    r.set_fp_integer(i, dword);
}

pub fn fcfidx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let bits = r.builder.bitcast(b, Type::I64);
    let value = r.builder.cast(CastOp::SiToFp, bits, Type::F64);
    r.set_fp_result(i, value);
}

// Moves

pub fn fmrx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    r.set_fp_result(i, b);
}

pub fn fnegx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.builder.unary(UnaryOp::FNeg, b);
    r.set_fp_result(i, value);
}

pub fn fabsx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.builder.unary(UnaryOp::FAbs, b);
    r.set_fp_result(i, value);
}

pub fn fnabsx(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.fpr(i.frb());
    let value = r.builder.unary(UnaryOp::FAbs, b);
    let value = r.builder.unary(UnaryOp::FNeg, value);
    r.set_fp_result(i, value);
}

#[cfg(test)]
mod tests {
    use crate::hir::{CastOp, InstKind, Intrinsic};
    use crate::recompiler::tests::lower;

    #[test]
    fn test_single_arithmetic_rounds() {
        // fadds f1, f2, f3 ; blr
        let f = lower(&[0xEC22182A, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(inst.kind, InstKind::Cast { op: CastOp::FpTrunc, .. })));
        assert!(f.to_string().contains("fadd"));
    }

    #[test]
    fn test_fmadd_is_fused() {
        // fmadd f1, f2, f3, f4 ; blr
        let f = lower(&[0xFC2220FA, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(
            inst.kind,
            InstKind::Intrinsic { op: Intrinsic::Fma, .. }
        )));
    }

    #[test]
    fn test_fctiwz_truncates_without_mode() {
        // fctiwz f1, f2 ; blr
        let f = lower(&[0xFC20101E, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(inst.kind, InstKind::Cast { op: CastOp::FpToSi, .. })));
        assert!(!f.to_string().contains("round_to_integral"));
    }
}
