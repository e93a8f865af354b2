//! Integer arithmetic, logic, compare, rotate and shift lowering

use super::Recompiler;
use crate::hir::{BinaryOp, CastOp, CmpPred, Intrinsic, Type, UnaryOp, ValueId};
use crate::instruction::Instruction;
use crate::instructions::integer::is_rldcr;
use crate::instructions::mask64;

impl Recompiler<'_> {
    fn const_simm(&mut self, i: Instruction) -> ValueId {
        self.builder.const_i64(i.simm() as u64)
    }

    /// Sign- or zero-extend the low word of a doubleword
    fn extend_word(&mut self, value: ValueId, signed: bool) -> ValueId {
        let word = self.builder.trunc(value, Type::I32);
        if signed {
            self.builder.sext(word, Type::I64)
        } else {
            self.builder.zext(word, Type::I64)
        }
    }

    /// Low word copied into both halves, as the 64-bit rotate unit sees it
    fn duplicate_word(&mut self, value: ValueId) -> ValueId {
        let word = self.extend_word(value, false);
        let shift = self.builder.const_i64(32);
        let high = self.builder.shl(word, shift);
        self.builder.or(word, high)
    }

    /// `a + b + cin` setting CA, plus OV under OE
    fn carrying(&mut self, i: Instruction, a: ValueId, b: ValueId, cin: ValueId) {
        let sum = self.builder.add(a, b);
        let carry = self.builder.zext(cin, Type::I64);
        let sum = self.builder.add(sum, carry);
        let ca = self.builder.intrinsic(Intrinsic::AddCarry, vec![a, b, cin]);
        self.set_xer_ca(ca);
        if i.oe() {
            let ov = self.builder.intrinsic(Intrinsic::AddOverflow, vec![a, b, cin]);
            self.set_xer_ov(ov);
        }
        self.set_gpr(i.rd(), sum);
        self.record(i, sum);
    }

    /// Store an XO-form result; `overflow` builds the OV flag when OE is set
    fn finish_xo(&mut self, i: Instruction, value: ValueId, overflow: impl FnOnce(&mut Self) -> ValueId) {
        if i.oe() {
            let ov = overflow(self);
            self.set_xer_ov(ov);
        }
        self.set_gpr(i.rd(), value);
        self.record(i, value);
    }

    /// rA = value, CR0 under Rc
    fn logical(&mut self, i: Instruction, value: ValueId) {
        self.set_gpr(i.ra(), value);
        self.record(i, value);
    }

    fn logical_op(&mut self, i: Instruction, op: BinaryOp, invert_b: bool, invert: bool) {
        let a = self.gpr(i.rs());
        let mut b = self.gpr(i.rb());
        if invert_b {
            b = self.builder.not(b);
        }
        let mut value = self.builder.binary(op, a, b);
        if invert {
            value = self.builder.not(value);
        }
        self.logical(i, value);
    }

    fn immediate_op(&mut self, i: Instruction, op: BinaryOp, shifted: bool, record: bool) {
        let imm = if shifted { i.uimm() << 16 } else { i.uimm() };
        let a = self.gpr(i.rs());
        let imm = self.builder.const_i64(imm);
        let value = self.builder.binary(op, a, imm);
        self.set_gpr(i.ra(), value);
        if record {
            self.update_cr0(value);
        }
    }

    /// Divide with undefined quotients (by zero, MIN / -1) producing 0 and OV
    fn divide(&mut self, i: Instruction, ty: Type, signed: bool) {
        let (mut a, mut b) = (self.gpr(i.ra()), self.gpr(i.rb()));
        if ty == Type::I32 {
            a = self.builder.trunc(a, Type::I32);
            b = self.builder.trunc(b, Type::I32);
        }
        let (zero, one, all_ones, min) = match ty {
            Type::I32 => (
                self.builder.const_i32(0),
                self.builder.const_i32(1),
                self.builder.const_i32(u32::MAX),
                self.builder.const_i32(1 << 31),
            ),
            _ => (
                self.builder.const_i64(0),
                self.builder.const_i64(1),
                self.builder.const_i64(u64::MAX),
                self.builder.const_i64(1 << 63),
            ),
        };
        let mut bad = self.builder.cmp(CmpPred::Eq, b, zero);
        if signed {
            let is_min = self.builder.cmp(CmpPred::Eq, a, min);
            let is_minus_one = self.builder.cmp(CmpPred::Eq, b, all_ones);
            let wraps = self.builder.and(is_min, is_minus_one);
            bad = self.builder.or(bad, wraps);
        }
        let divisor = self.builder.select(bad, one, b);
        let op = if signed { BinaryOp::SDiv } else { BinaryOp::UDiv };
        let mut quotient = self.builder.binary(op, a, divisor);
        if ty == Type::I32 {
            quotient = self.builder.zext(quotient, Type::I64);
        }
        let zero = self.builder.const_i64(0);
        let value = self.builder.select(bad, zero, quotient);
        self.finish_xo(i, value, |_| bad);
    }

    fn compare(&mut self, i: Instruction, b: Option<ValueId>, signed: bool) {
        let mut a = self.gpr(i.ra());
        let mut b = match b {
            Some(imm) => imm,
            None => self.gpr(i.rb()),
        };
        if !i.l10() {
            a = self.extend_word(a, signed);
            b = self.extend_word(b, signed);
        }
        self.update_cr(i.crfd(), a, b, signed);
    }

    fn extend(&mut self, i: Instruction, ty: Type) {
        let value = self.gpr(i.rs());
        let value = self.builder.trunc(value, ty);
        let value = self.builder.sext(value, Type::I64);
        self.logical(i, value);
    }

    /// rA = rotate(rS, n) & mask, keeping rA outside the mask when inserting
    fn rotate(&mut self, i: Instruction, word: bool, n: ValueId, mask: u64, insert: bool) {
        let rs = self.gpr(i.rs());
        let source = if word { self.duplicate_word(rs) } else { rs };
        let rotated = self.builder.binary(BinaryOp::Rotl, source, n);
        let keep = self.builder.const_i64(mask);
        let mut value = self.builder.and(rotated, keep);
        if insert {
            let ra = self.gpr(i.ra());
            let clear = self.builder.const_i64(!mask);
            let rest = self.builder.and(ra, clear);
            value = self.builder.or(value, rest);
        }
        self.logical(i, value);
    }

    /// Shift amount register masked to `bits`
    fn shift_amount(&mut self, i: Instruction, bits: u64) -> ValueId {
        let rb = self.gpr(i.rb());
        let mask = self.builder.const_i64(bits);
        self.builder.and(rb, mask)
    }

    /// Algebraic right shift setting CA when a negative value loses one bits
    fn shift_right_algebraic(&mut self, i: Instruction, word: bool, n: ValueId) {
        let rs = self.gpr(i.rs());
        let source = if word { self.extend_word(rs, true) } else { rs };
        let value = self.builder.ashr(source, n);

        let one = self.builder.const_i64(1);
        let zero = self.builder.const_i64(0);
        let bit = self.builder.shl(one, n);
        let lost_mask = self.builder.sub(bit, one);
        let lost = self.builder.and(source, lost_mask);
        let negative = self.builder.cmp(CmpPred::Slt, source, zero);
        let inexact = self.builder.cmp(CmpPred::Ne, lost, zero);
        let ca = self.builder.and(negative, inexact);
        self.set_xer_ca(ca);
        self.logical(i, value);
    }
}

// Immediate arithmetic

pub fn mulli(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let imm = r.const_simm(i);
    let value = r.builder.mul(a, imm);
    r.set_gpr(i.rd(), value);
}

pub fn subfic(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.const_simm(i);
    let cin = r.builder.const_i8(1);
    let sum = r.builder.add(a, b);
    let one = r.builder.const_i64(1);
    let value = r.builder.add(sum, one);
    let ca = r.builder.intrinsic(Intrinsic::AddCarry, vec![a, b, cin]);
    r.set_gpr(i.rd(), value);
    r.set_xer_ca(ca);
}

pub fn addic(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let b = r.const_simm(i);
    let cin = r.builder.const_i8(0);
    let value = r.builder.add(a, b);
    let ca = r.builder.intrinsic(Intrinsic::AddCarry, vec![a, b, cin]);
    r.set_gpr(i.rd(), value);
    r.set_xer_ca(ca);
}

pub fn addic_(r: &mut Recompiler<'_>, i: Instruction) {
    addic(r, i);
    let value = r.gpr(i.rd());
    r.update_cr0(value);
}

pub fn addi(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr_or_zero(i.ra());
    let imm = r.const_simm(i);
    let value = r.builder.add(a, imm);
    r.set_gpr(i.rd(), value);
}

pub fn addis(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr_or_zero(i.ra());
    let imm = r.builder.const_i64((i.simm() << 16) as u64);
    let value = r.builder.add(a, imm);
    r.set_gpr(i.rd(), value);
}

// XO-form arithmetic

pub fn addx(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let value = r.builder.add(a, b);
    r.finish_xo(i, value, |r| {
        let cin = r.builder.const_i8(0);
        r.builder.intrinsic(Intrinsic::AddOverflow, vec![a, b, cin])
    });
}

pub fn addcx(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let cin = r.builder.const_i8(0);
    r.carrying(i, a, b, cin);
}

pub fn addex(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn addmex(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let b = r.builder.const_i64(u64::MAX);
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn addzex(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let b = r.builder.const_i64(0);
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn subfx(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.gpr(i.rb());
    let value = r.builder.sub(b, ra);
    r.finish_xo(i, value, |r| {
        let cin = r.builder.const_i8(1);
        r.builder.intrinsic(Intrinsic::AddOverflow, vec![a, b, cin])
    });
}

pub fn subfcx(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.gpr(i.rb());
    let cin = r.builder.const_i8(1);
    r.carrying(i, a, b, cin);
}

pub fn subfex(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.gpr(i.rb());
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn subfmex(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.builder.const_i64(u64::MAX);
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn subfzex(r: &mut Recompiler<'_>, i: Instruction) {
    let ra = r.gpr(i.ra());
    let a = r.builder.not(ra);
    let b = r.builder.const_i64(0);
    let cin = r.xer_ca();
    r.carrying(i, a, b, cin);
}

pub fn negx(r: &mut Recompiler<'_>, i: Instruction) {
    let a = r.gpr(i.ra());
    let value = r.builder.unary(UnaryOp::Neg, a);
    r.finish_xo(i, value, |r| {
        let min = r.builder.const_i64(1 << 63);
        r.builder.cmp(CmpPred::Eq, a, min)
    });
}

pub fn mullwx(r: &mut Recompiler<'_>, i: Instruction) {
    let (ra, rb) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let a = r.extend_word(ra, true);
    let b = r.extend_word(rb, true);
    let value = r.builder.mul(a, b);
    r.finish_xo(i, value, |r| {
        let narrowed = r.extend_word(value, true);
        r.builder.cmp(CmpPred::Ne, value, narrowed)
    });
}

pub fn mulldx(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let value = r.builder.mul(a, b);
    r.finish_xo(i, value, |r| {
        let high = r.builder.binary(BinaryOp::MulHiS, a, b);
        let shift = r.builder.const_i64(63);
        let sign = r.builder.ashr(value, shift);
        r.builder.cmp(CmpPred::Ne, high, sign)
    });
}

pub fn mulhwx(r: &mut Recompiler<'_>, i: Instruction) {
    let (ra, rb) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let a = r.extend_word(ra, true);
    let b = r.extend_word(rb, true);
    let product = r.builder.mul(a, b);
    let shift = r.builder.const_i64(32);
    let value = r.builder.ashr(product, shift);
    r.set_gpr(i.rd(), value);
    r.record(i, value);
}

pub fn mulhwux(r: &mut Recompiler<'_>, i: Instruction) {
    let (ra, rb) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let a = r.extend_word(ra, false);
    let b = r.extend_word(rb, false);
    let product = r.builder.mul(a, b);
    let shift = r.builder.const_i64(32);
    let value = r.builder.lshr(product, shift);
    r.set_gpr(i.rd(), value);
    r.record(i, value);
}

pub fn mulhdx(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let value = r.builder.binary(BinaryOp::MulHiS, a, b);
    r.set_gpr(i.rd(), value);
    r.record(i, value);
}

pub fn mulhdux(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.gpr(i.ra()), r.gpr(i.rb()));
    let value = r.builder.binary(BinaryOp::MulHiU, a, b);
    r.set_gpr(i.rd(), value);
    r.record(i, value);
}

pub fn divwx(r: &mut Recompiler<'_>, i: Instruction) {
    r.divide(i, Type::I32, true);
}

pub fn divwux(r: &mut Recompiler<'_>, i: Instruction) {
    r.divide(i, Type::I32, false);
}

pub fn divdx(r: &mut Recompiler<'_>, i: Instruction) {
    r.divide(i, Type::I64, true);
}

pub fn divdux(r: &mut Recompiler<'_>, i: Instruction) {
    r.divide(i, Type::I64, false);
}

// Compare

pub fn cmp(r: &mut Recompiler<'_>, i: Instruction) {
    r.compare(i, None, true);
}

pub fn cmpi(r: &mut Recompiler<'_>, i: Instruction) {
    let imm = r.const_simm(i);
    r.compare(i, Some(imm), true);
}

pub fn cmpl(r: &mut Recompiler<'_>, i: Instruction) {
    r.compare(i, None, false);
}

pub fn cmpli(r: &mut Recompiler<'_>, i: Instruction) {
    let imm = r.builder.const_i64(i.uimm());
    r.compare(i, Some(imm), false);
}

// Logic

pub fn andx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::And, false, false);
}

pub fn andcx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::And, true, false);
}

pub fn orx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::Or, false, false);
}

pub fn orcx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::Or, true, false);
}

pub fn xorx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::Xor, false, false);
}

pub fn norx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::Or, false, true);
}

pub fn nandx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::And, false, true);
}

pub fn eqvx(r: &mut Recompiler<'_>, i: Instruction) {
    r.logical_op(i, BinaryOp::Xor, false, true);
}

pub fn ori(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::Or, false, false);
}

pub fn oris(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::Or, true, false);
}

pub fn xori(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::Xor, false, false);
}

pub fn xoris(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::Xor, true, false);
}

pub fn andi_(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::And, false, true);
}

pub fn andis_(r: &mut Recompiler<'_>, i: Instruction) {
    r.immediate_op(i, BinaryOp::And, true, true);
}

pub fn extsbx(r: &mut Recompiler<'_>, i: Instruction) {
    r.extend(i, Type::I8);
}

pub fn extshx(r: &mut Recompiler<'_>, i: Instruction) {
    r.extend(i, Type::I16);
}

pub fn extswx(r: &mut Recompiler<'_>, i: Instruction) {
    r.extend(i, Type::I32);
}

pub fn cntlzwx(r: &mut Recompiler<'_>, i: Instruction) {
    let rs = r.gpr(i.rs());
    let word = r.builder.trunc(rs, Type::I32);
    let count = r.builder.unary(UnaryOp::Ctlz, word);
    let value = r.builder.cast(CastOp::ZExt, count, Type::I64);
    r.logical(i, value);
}

pub fn cntlzdx(r: &mut Recompiler<'_>, i: Instruction) {
    let rs = r.gpr(i.rs());
    let value = r.builder.unary(UnaryOp::Ctlz, rs);
    r.logical(i, value);
}

// Rotate

pub fn rlwinm(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh() as u64);
    r.rotate(i, true, n, mask64(i.mb() + 32, i.me() + 32), false);
}

pub fn rlwnm(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x1F);
    r.rotate(i, true, n, mask64(i.mb() + 32, i.me() + 32), false);
}

pub fn rlwimi(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh() as u64);
    r.rotate(i, true, n, mask64(i.mb() + 32, i.me() + 32), true);
}

pub fn rldicl(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh64() as u64);
    r.rotate(i, false, n, mask64(i.mb64(), 63), false);
}

pub fn rldicr(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh64() as u64);
    r.rotate(i, false, n, mask64(0, i.mb64()), false);
}

pub fn rldic(r: &mut Recompiler<'_>, i: Instruction) {
    let sh = i.sh64();
    let n = r.builder.const_i64(sh as u64);
    r.rotate(i, false, n, mask64(i.mb64(), 63 - sh), false);
}

pub fn rldimi(r: &mut Recompiler<'_>, i: Instruction) {
    let sh = i.sh64();
    let n = r.builder.const_i64(sh as u64);
    r.rotate(i, false, n, mask64(i.mb64(), 63 - sh), true);
}

pub fn rldc_lr(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x3F);
    let mask = if is_rldcr(i) {
        mask64(0, i.mb64())
    } else {
        mask64(i.mb64(), 63)
    };
    r.rotate(i, false, n, mask, false);
}

// Shift. Word shifts work on the zero-extended low word, so amounts of 32
// and up already clear the result.

pub fn slwx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x3F);
    let rs = r.gpr(i.rs());
    let word = r.extend_word(rs, false);
    let shifted = r.builder.shl(word, n);
    let value = r.extend_word(shifted, false);
    r.logical(i, value);
}

pub fn srwx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x3F);
    let rs = r.gpr(i.rs());
    let word = r.extend_word(rs, false);
    let value = r.builder.lshr(word, n);
    r.logical(i, value);
}

pub fn srawx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x3F);
    r.shift_right_algebraic(i, true, n);
}

pub fn srawix(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh() as u64);
    r.shift_right_algebraic(i, true, n);
}

pub fn sldx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x7F);
    let rs = r.gpr(i.rs());
    let value = r.builder.shl(rs, n);
    r.logical(i, value);
}

pub fn srdx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x7F);
    let rs = r.gpr(i.rs());
    let value = r.builder.lshr(rs, n);
    r.logical(i, value);
}

pub fn sradx(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.shift_amount(i, 0x7F);
    r.shift_right_algebraic(i, false, n);
}

pub fn sradix(r: &mut Recompiler<'_>, i: Instruction) {
    let n = r.builder.const_i64(i.sh64() as u64);
    r.shift_right_algebraic(i, false, n);
}
