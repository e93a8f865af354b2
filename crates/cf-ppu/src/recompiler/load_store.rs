//! Load and store lowering
//!
//! Guest accesses become host loads and stores at the memory base plus the
//! 32-bit effective address. Load-reserve and store-conditional go through
//! runtime calls, which own the reservation state.

use super::{
    Recompiler, PPU_RESERVE_LOAD32, PPU_RESERVE_LOAD64, PPU_RESERVE_STORE32, PPU_RESERVE_STORE64,
};
use crate::hir::{Callee, CastOp, Type, ValueId};
use crate::instruction::Instruction;

impl Recompiler<'_> {
    /// `base + offset` wrapped to the 32-bit guest space
    fn effective_address(&mut self, base: ValueId, offset: ValueId) -> ValueId {
        let sum = self.builder.add(base, offset);
        let mask = self.builder.const_i64(0xFFFF_FFFF);
        self.builder.and(sum, mask)
    }

    fn ea_d(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr_or_zero(i.ra());
        let d = self.builder.const_i64(i.d() as u64);
        self.effective_address(base, d)
    }

    fn ea_du(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr(i.ra());
        let d = self.builder.const_i64(i.d() as u64);
        self.effective_address(base, d)
    }

    fn ea_ds(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr_or_zero(i.ra());
        let ds = self.builder.const_i64(i.ds() as u64);
        self.effective_address(base, ds)
    }

    fn ea_dsu(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr(i.ra());
        let ds = self.builder.const_i64(i.ds() as u64);
        self.effective_address(base, ds)
    }

    fn ea_x(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr_or_zero(i.ra());
        let index = self.gpr(i.rb());
        self.effective_address(base, index)
    }

    fn ea_xu(&mut self, i: Instruction) -> ValueId {
        let base = self.gpr(i.ra());
        let index = self.gpr(i.rb());
        self.effective_address(base, index)
    }

    /// Widen a loaded integer to a register value
    fn widen(&mut self, value: ValueId, signed: bool) -> ValueId {
        if self.builder.value_type(value) == Type::I64 {
            value
        } else if signed {
            self.builder.sext(value, Type::I64)
        } else {
            self.builder.zext(value, Type::I64)
        }
    }

    fn narrow(&mut self, value: ValueId, ty: Type) -> ValueId {
        if ty == Type::I64 {
            value
        } else {
            self.builder.trunc(value, ty)
        }
    }
}

// Integer loads: name, width, address form, update, sign extension, big endian

macro_rules! load {
    ($($name:ident: $ty:ident, $ea:ident, $update:literal, $signed:literal, $be:literal;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let ea = r.$ea(i);
                let value = r.load_guest(Type::$ty, ea, $be);
                let value = r.widen(value, $signed);
                r.set_gpr(i.rd(), value);
                if $update {
                    r.set_gpr(i.ra(), ea);
                }
            }
        )*
    };
}

load! {
    lbz: I8, ea_d, false, false, true;
    lbzu: I8, ea_du, true, false, true;
    lbzx: I8, ea_x, false, false, true;
    lbzux: I8, ea_xu, true, false, true;
    lhz: I16, ea_d, false, false, true;
    lhzu: I16, ea_du, true, false, true;
    lhzx: I16, ea_x, false, false, true;
    lhzux: I16, ea_xu, true, false, true;
    lha: I16, ea_d, false, true, true;
    lhau: I16, ea_du, true, true, true;
    lhax: I16, ea_x, false, true, true;
    lhaux: I16, ea_xu, true, true, true;
    lwz: I32, ea_d, false, false, true;
    lwzu: I32, ea_du, true, false, true;
    lwzx: I32, ea_x, false, false, true;
    lwzux: I32, ea_xu, true, false, true;
    lwa: I32, ea_ds, false, true, true;
    lwax: I32, ea_x, false, true, true;
    lwaux: I32, ea_xu, true, true, true;
    ld: I64, ea_ds, false, false, true;
    ldu: I64, ea_dsu, true, false, true;
    ldx: I64, ea_x, false, false, true;
    ldux: I64, ea_xu, true, false, true;
    lhbrx: I16, ea_x, false, false, false;
    lwbrx: I32, ea_x, false, false, false;
    ldbrx: I64, ea_x, false, false, false;
}

// Integer stores: name, width, address form, update, big endian

macro_rules! store {
    ($($name:ident: $ty:ident, $ea:ident, $update:literal, $be:literal;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let ea = r.$ea(i);
                let value = r.gpr(i.rs());
                let value = r.narrow(value, Type::$ty);
                r.store_guest(ea, value, $be);
                if $update {
                    r.set_gpr(i.ra(), ea);
                }
            }
        )*
    };
}

store! {
    stb: I8, ea_d, false, true;
    stbu: I8, ea_du, true, true;
    stbx: I8, ea_x, false, true;
    stbux: I8, ea_xu, true, true;
    sth: I16, ea_d, false, true;
    sthu: I16, ea_du, true, true;
    sthx: I16, ea_x, false, true;
    sthux: I16, ea_xu, true, true;
    stw: I32, ea_d, false, true;
    stwu: I32, ea_du, true, true;
    stwx: I32, ea_x, false, true;
    stwux: I32, ea_xu, true, true;
    std: I64, ea_ds, false, true;
    stdu: I64, ea_dsu, true, true;
    stdx: I64, ea_x, false, true;
    stdux: I64, ea_xu, true, true;
    sthbrx: I16, ea_x, false, false;
    stwbrx: I32, ea_x, false, false;
    stdbrx: I64, ea_x, false, false;
}

// Multiple word, unrolled over the register range

pub fn lmw(r: &mut Recompiler<'_>, i: Instruction) {
    let base = r.ea_d(i);
    for (n, reg) in (i.rd()..32).enumerate() {
        let offset = r.builder.const_i64(4 * n as u64);
        let ea = r.effective_address(base, offset);
        let value = r.load_guest(Type::I32, ea, true);
        let value = r.widen(value, false);
        r.set_gpr(reg, value);
    }
}

pub fn stmw(r: &mut Recompiler<'_>, i: Instruction) {
    let base = r.ea_d(i);
    for (n, reg) in (i.rs()..32).enumerate() {
        let offset = r.builder.const_i64(4 * n as u64);
        let ea = r.effective_address(base, offset);
        let value = r.gpr(reg);
        let value = r.narrow(value, Type::I32);
        r.store_guest(ea, value, true);
    }
}

// Load-reserve / store-conditional

fn load_reserved(r: &mut Recompiler<'_>, i: Instruction, runtime: &'static str) {
    let ea = r.ea_x(i);
    let value = r.builder.call(Callee::Extern(runtime), vec![ea], Type::I64);
    if let Some(value) = value {
        r.set_gpr(i.rd(), value);
    }
}

/// CR0 = stored ? EQ|SO : SO
fn store_conditional(r: &mut Recompiler<'_>, i: Instruction, runtime: &'static str) {
    let ea = r.ea_x(i);
    let value = r.gpr(i.rs());
    let Some(stored) = r.builder.call(Callee::Extern(runtime), vec![ea, value], Type::I8) else {
        return;
    };
    let shift = r.builder.const_i8(1);
    let eq = r.builder.shl(stored, shift);
    let so = r.xer_so();
    let field = r.builder.or(eq, so);
    r.set_cr_field(0, field);
}

pub fn lwarx(r: &mut Recompiler<'_>, i: Instruction) {
    load_reserved(r, i, PPU_RESERVE_LOAD32);
}

pub fn ldarx(r: &mut Recompiler<'_>, i: Instruction) {
    load_reserved(r, i, PPU_RESERVE_LOAD64);
}

pub fn stwcx_(r: &mut Recompiler<'_>, i: Instruction) {
    store_conditional(r, i, PPU_RESERVE_STORE32);
}

pub fn stdcx_(r: &mut Recompiler<'_>, i: Instruction) {
    store_conditional(r, i, PPU_RESERVE_STORE64);
}

// Floating point. Singles are widened on load and rounded on store.

macro_rules! load_float {
    ($($name:ident: $single:literal, $ea:ident, $update:literal;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let ea = r.$ea(i);
                let value = if $single {
                    let value = r.load_guest(Type::F32, ea, true);
                    r.builder.cast(CastOp::FpExt, value, Type::F64)
                } else {
                    r.load_guest(Type::F64, ea, true)
                };
                r.set_fpr(i.frd(), value);
                if $update {
                    r.set_gpr(i.ra(), ea);
                }
            }
        )*
    };
}

load_float! {
    lfs: true, ea_d, false;
    lfsu: true, ea_du, true;
    lfsx: true, ea_x, false;
    lfsux: true, ea_xu, true;
    lfd: false, ea_d, false;
    lfdu: false, ea_du, true;
    lfdx: false, ea_x, false;
    lfdux: false, ea_xu, true;
}

macro_rules! store_float {
    ($($name:ident: $single:literal, $ea:ident, $update:literal;)*) => {
        $(
            pub fn $name(r: &mut Recompiler<'_>, i: Instruction) {
                let ea = r.$ea(i);
                let mut value = r.fpr(i.frs());
                if $single {
                    value = r.builder.cast(CastOp::FpTrunc, value, Type::F32);
                }
                r.store_guest(ea, value, true);
                if $update {
                    r.set_gpr(i.ra(), ea);
                }
            }
        )*
    };
}

store_float! {
    stfs: true, ea_d, false;
    stfsu: true, ea_du, true;
    stfsx: true, ea_x, false;
    stfsux: true, ea_xu, true;
    stfd: false, ea_d, false;
    stfdu: false, ea_du, true;
    stfdx: false, ea_x, false;
    stfdux: false, ea_xu, true;
}

pub fn stfiwx(r: &mut Recompiler<'_>, i: Instruction) {
    let ea = r.ea_x(i);
    let value = r.fpr(i.frs());
    let bits = r.builder.bitcast(value, Type::I64);
    let word = r.builder.trunc(bits, Type::I32);
    r.store_guest(ea, word, true);
}

// Vector, quadword aligned

fn vector_address(r: &mut Recompiler<'_>, i: Instruction) -> ValueId {
    let ea = r.ea_x(i);
    let mask = r.builder.const_i64(!0xF);
    r.builder.and(ea, mask)
}

pub fn lvx(r: &mut Recompiler<'_>, i: Instruction) {
    let ea = vector_address(r, i);
    let value = r.load_guest(Type::V128, ea, true);
    r.set_vr(i.vd(), value);
}

pub fn stvx(r: &mut Recompiler<'_>, i: Instruction) {
    let ea = vector_address(r, i);
    let value = r.vr(i.vs());
    r.store_guest(ea, value, true);
}

#[cfg(test)]
mod tests {
    use crate::recompiler::tests::lower;
    use crate::hir::{InstKind, Type};

    #[test]
    fn test_lwz_loads_big_endian_word() {
        // lwz r5, 8(r4) ; blr
        let f = lower(&[0x80A40008, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(
            inst.kind,
            InstKind::Load { ty: Type::I32, big_endian: true, .. }
        )));
        assert!(f.to_string().contains("zext"));
    }

    #[test]
    fn test_byte_reversed_store() {
        // stwbrx r3, r4, r5 ; blr
        let f = lower(&[0x7C642D2C, 0x4E800020]);
        assert!(f.instructions().any(|inst| matches!(
            inst.kind,
            InstKind::Store { big_endian: false, .. }
        )));
    }

    #[test]
    fn test_store_conditional_calls_runtime() {
        // stwcx. r3, 0, r4 ; blr
        let f = lower(&[0x7C60212D, 0x4E800020]);
        assert!(f.to_string().contains("call extern ppu_reserve_store32("));
    }

    #[test]
    fn test_stmw_unrolls() {
        // stmw r29, -12(r1) ; blr
        let f = lower(&[0xBFA1FFF4, 0x4E800020]);
        let stores = f
            .instructions()
            .filter(|inst| matches!(inst.kind, InstKind::Store { big_endian: true, .. }))
            .count();
        assert_eq!(stores, 3);
    }
}
