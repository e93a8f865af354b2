//! VMX lowering

use super::Recompiler;
use crate::hir::{BinaryOp, CmpPred, Intrinsic};
use crate::instruction::Instruction;
use crate::vmx::V128;

macro_rules! lanes {
    ($($name:ident: $op:ident;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let (a, b) = (r.vr(i.va()), r.vr(i.vb()));
                let value = r.builder.binary(BinaryOp::$op, a, b);
                r.set_vr(i.vd(), value);
            }
        )*
    };
}

lanes! {
    vand: And;
    vor: Or;
    vxor: Xor;
    vaddubm: VAdd8;
    vadduhm: VAdd16;
    vadduwm: VAdd32;
    vsububm: VSub8;
    vsubuhm: VSub16;
    vsubuwm: VSub32;
    vaddfp: VAddF32;
    vsubfp: VSubF32;
}

pub fn vandc(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.vr(i.va()), r.vr(i.vb()));
    let not_b = r.builder.not(b);
    let value = r.builder.and(a, not_b);
    r.set_vr(i.vd(), value);
}

pub fn vnor(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.vr(i.va()), r.vr(i.vb()));
    let value = r.builder.or(a, b);
    let value = r.builder.not(value);
    r.set_vr(i.vd(), value);
}

/// Bits of vB where vC is set, of vA elsewhere
pub fn vsel(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b, c) = (r.vr(i.va()), r.vr(i.vb()), r.vr(i.vc()));
    let from_b = r.builder.and(b, c);
    let not_c = r.builder.not(c);
    let from_a = r.builder.and(a, not_c);
    let value = r.builder.or(from_b, from_a);
    r.set_vr(i.vd(), value);
}

pub fn vmaddfp(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b, c) = (r.vr(i.va()), r.vr(i.vb()), r.vr(i.vc()));
    let value = r.builder.intrinsic(Intrinsic::VMaddF32, vec![a, c, b]);
    r.set_vr(i.vd(), value);
}

pub fn vspltw(r: &mut Recompiler<'_>, i: Instruction) {
    let b = r.vr(i.vb());
    let index = r.builder.const_i32(i.vuimm() & 3);
    let value = r.builder.intrinsic(Intrinsic::VSplat32, vec![b, index]);
    r.set_vr(i.vd(), value);
}

pub fn vspltisw(r: &mut Recompiler<'_>, i: Instruction) {
    let splat = V128::from_u32x4([i.vsimm() as u32; 4]);
    let value = r.builder.const_v128(splat.as_u128());
    r.set_vr(i.vd(), value);
}

/// Record form sets CR6 to all equal (0b1000) or none equal (0b0010)
pub fn vcmpequw(r: &mut Recompiler<'_>, i: Instruction) {
    let (a, b) = (r.vr(i.va()), r.vr(i.vb()));
    let value = r.builder.intrinsic(Intrinsic::VCmpEq32, vec![a, b]);
    r.set_vr(i.vd(), value);
    if i.vrc() {
        let ones = r.builder.const_v128(u128::MAX);
        let zero = r.builder.const_v128(0);
        let all = r.builder.cmp(CmpPred::Eq, value, ones);
        let none = r.builder.cmp(CmpPred::Eq, value, zero);
        let three = r.builder.const_i8(3);
        let all = r.builder.shl(all, three);
        let one = r.builder.const_i8(1);
        let none = r.builder.shl(none, one);
        let field = r.builder.or(all, none);
        r.set_cr_field(6, field);
    }
}

#[cfg(test)]
mod tests {
    use crate::hir::{Constant, InstKind, ValueDef};
    use crate::recompiler::tests::lower;

    #[test]
    fn test_vspltisw_is_constant() {
        // vspltisw v1, -1 ; blr
        let f = lower(&[0x103F038C, 0x4E800020]);
        assert!(f
            .values
            .iter()
            .any(|value| matches!(value.def, ValueDef::Constant(Constant::V128(u128::MAX)))));
    }

    #[test]
    fn test_vcmpequw_record_sets_cr6() {
        // vcmpequw. v1, v2, v3 ; blr
        let f = lower(&[0x10221C86, 0x4E800020]);
        assert!(f.to_string().contains("vcmpeq32("));
        assert!(f.instructions().any(|inst| matches!(inst.kind, InstKind::Cmp { .. })));
    }
}
