//! Load and store instructions
//!
//! Effective addresses wrap at 64 bits and are truncated to the 32-bit guest
//! address space. `(rA|0)` forms treat r0 as zero; update forms write the
//! effective address back to rA after the access succeeds.

use cf_core::error::PpuError;
use cf_memory::GuestValue;

use super::Step;
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::thread::{PpuThread, CR_EQ, CR_SO};
use crate::vmx::V128;

#[inline]
fn ea_d(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr_or_zero(i.ra()).wrapping_add(i.d() as u64) as u32
}

#[inline]
fn ea_du(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr(i.ra()).wrapping_add(i.d() as u64) as u32
}

#[inline]
fn ea_ds(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr_or_zero(i.ra()).wrapping_add(i.ds() as u64) as u32
}

#[inline]
fn ea_dsu(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr(i.ra()).wrapping_add(i.ds() as u64) as u32
}

#[inline]
fn ea_x(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr_or_zero(i.ra()).wrapping_add(t.gpr(i.rb())) as u32
}

#[inline]
fn ea_xu(t: &PpuThread, i: Instruction) -> u32 {
    t.gpr(i.ra()).wrapping_add(t.gpr(i.rb())) as u32
}

#[inline]
fn read<T: GuestValue>(interp: &PpuInterpreter, t: &PpuThread, ea: u32) -> Result<T, PpuError> {
    interp.memory().read::<T>(ea).map_err(t.fault(ea))
}

#[inline]
fn write<T: GuestValue>(interp: &PpuInterpreter, t: &PpuThread, ea: u32, value: T) -> Step {
    interp.memory().write::<T>(ea, value).map_err(t.fault(ea))
}

// Integer loads. `$load` turns the guest value into the register value.

macro_rules! load {
    ($($name:ident: $ty:ty, $ea:ident, $update:literal, $load:expr;)*) => {
        $(
            pub fn $name(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ea = $ea(t, i);
                let value: $ty = read(interp, t, ea)?;
                let convert: fn($ty) -> u64 = $load;
                t.set_gpr(i.rd(), convert(value));
                if $update {
                    t.set_gpr(i.ra(), ea as u64);
                }
                Ok(())
            }
        )*
    };
}

load! {
    lbz: u8, ea_d, false, |v| v as u64;
    lbzu: u8, ea_du, true, |v| v as u64;
    lbzx: u8, ea_x, false, |v| v as u64;
    lbzux: u8, ea_xu, true, |v| v as u64;
    lhz: u16, ea_d, false, |v| v as u64;
    lhzu: u16, ea_du, true, |v| v as u64;
    lhzx: u16, ea_x, false, |v| v as u64;
    lhzux: u16, ea_xu, true, |v| v as u64;
    lha: i16, ea_d, false, |v| v as i64 as u64;
    lhau: i16, ea_du, true, |v| v as i64 as u64;
    lhax: i16, ea_x, false, |v| v as i64 as u64;
    lhaux: i16, ea_xu, true, |v| v as i64 as u64;
    lwz: u32, ea_d, false, |v| v as u64;
    lwzu: u32, ea_du, true, |v| v as u64;
    lwzx: u32, ea_x, false, |v| v as u64;
    lwzux: u32, ea_xu, true, |v| v as u64;
    lwa: i32, ea_ds, false, |v| v as i64 as u64;
    lwax: i32, ea_x, false, |v| v as i64 as u64;
    lwaux: i32, ea_xu, true, |v| v as i64 as u64;
    ld: u64, ea_ds, false, |v| v;
    ldu: u64, ea_dsu, true, |v| v;
    ldx: u64, ea_x, false, |v| v;
    ldux: u64, ea_xu, true, |v| v;
    lhbrx: u16, ea_x, false, |v| v.swap_bytes() as u64;
    lwbrx: u32, ea_x, false, |v| v.swap_bytes() as u64;
    ldbrx: u64, ea_x, false, |v| v.swap_bytes();
}

// Integer stores. `$store` narrows the register value.

macro_rules! store {
    ($($name:ident: $ty:ty, $ea:ident, $update:literal, $store:expr;)*) => {
        $(
            pub fn $name(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ea = $ea(t, i);
                let convert: fn(u64) -> $ty = $store;
                write(interp, t, ea, convert(t.gpr(i.rs())))?;
                if $update {
                    t.set_gpr(i.ra(), ea as u64);
                }
                Ok(())
            }
        )*
    };
}

store! {
    stb: u8, ea_d, false, |v| v as u8;
    stbu: u8, ea_du, true, |v| v as u8;
    stbx: u8, ea_x, false, |v| v as u8;
    stbux: u8, ea_xu, true, |v| v as u8;
    sth: u16, ea_d, false, |v| v as u16;
    sthu: u16, ea_du, true, |v| v as u16;
    sthx: u16, ea_x, false, |v| v as u16;
    sthux: u16, ea_xu, true, |v| v as u16;
    stw: u32, ea_d, false, |v| v as u32;
    stwu: u32, ea_du, true, |v| v as u32;
    stwx: u32, ea_x, false, |v| v as u32;
    stwux: u32, ea_xu, true, |v| v as u32;
    std: u64, ea_ds, false, |v| v;
    stdu: u64, ea_dsu, true, |v| v;
    stdx: u64, ea_x, false, |v| v;
    stdux: u64, ea_xu, true, |v| v;
    sthbrx: u16, ea_x, false, |v| (v as u16).swap_bytes();
    stwbrx: u32, ea_x, false, |v| (v as u32).swap_bytes();
    stdbrx: u64, ea_x, false, |v| v.swap_bytes();
}

// Multiple and string

pub fn lmw(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let mut ea = ea_d(t, i);
    for reg in i.rd()..32 {
        let value: u32 = read(interp, t, ea)?;
        t.set_gpr(reg, value as u64);
        ea = ea.wrapping_add(4);
    }
    Ok(())
}

pub fn stmw(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let mut ea = ea_d(t, i);
    for reg in i.rs()..32 {
        write(interp, t, ea, t.gpr(reg) as u32)?;
        ea = ea.wrapping_add(4);
    }
    Ok(())
}

pub fn lswi(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let count = if i.nb() == 0 { 32 } else { i.nb() };
    let base = t.gpr_or_zero(i.ra()) as u32;
    let mut reg = i.rd();
    let mut word = 0u32;
    for n in 0..count {
        let byte: u8 = read(interp, t, base.wrapping_add(n))?;
        word |= (byte as u32) << (24 - 8 * (n % 4));
        if n % 4 == 3 || n == count - 1 {
            t.set_gpr(reg, word as u64);
            reg = (reg + 1) % 32;
            word = 0;
        }
    }
    Ok(())
}

pub fn stswi(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let count = if i.nb() == 0 { 32 } else { i.nb() };
    let base = t.gpr_or_zero(i.ra()) as u32;
    let mut reg = i.rs();
    for n in 0..count {
        let byte = (t.gpr(reg) as u32 >> (24 - 8 * (n % 4))) as u8;
        write(interp, t, base.wrapping_add(n), byte)?;
        if n % 4 == 3 {
            reg = (reg + 1) % 32;
        }
    }
    Ok(())
}

// Load-reserve / store-conditional

/// Take a reservation on `ea` and load the 4 or 8 byte value there
pub(crate) fn load_reserved(interp: &PpuInterpreter, t: &mut PpuThread, ea: u32, double: bool) -> Result<u64, PpuError> {
    let time = interp.memory().reservation(ea).acquire();
    let value = if double {
        read::<u64>(interp, t, ea)?
    } else {
        read::<u32>(interp, t, ea)? as u64
    };
    t.regs.reserve_addr = ea as u64;
    t.regs.reserve_value = value;
    t.regs.reserve_time = time;
    t.regs.reserved = 1;
    Ok(value)
}

/// Commit a conditional store if the reservation on `ea` is still intact
///
/// The reservation is dropped either way. Returns whether the store happened.
pub(crate) fn store_conditional(
    interp: &PpuInterpreter,
    t: &mut PpuThread,
    ea: u32,
    value: u64,
    double: bool,
) -> Result<bool, PpuError> {
    let memory = interp.memory();
    let stored = if t.regs.reserved != 0 && t.regs.reserve_addr == ea as u64 {
        let reservation = memory.reservation(ea);
        if reservation.try_lock(t.regs.reserve_time) {
            let expected = t.regs.reserve_value;
            let result = if double {
                memory.compare_exchange_be64(ea, expected, value)
            } else {
                memory.compare_exchange_be32(ea, expected as u32, value as u32)
            };
            reservation.unlock_and_increment();
            result.map_err(t.fault(ea))?
        } else {
            false
        }
    } else {
        false
    };
    t.clear_reservation();
    Ok(stored)
}

pub fn lwarx(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i);
    let value = load_reserved(interp, t, ea, false)?;
    t.set_gpr(i.rd(), value);
    Ok(())
}

pub fn ldarx(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i);
    let value = load_reserved(interp, t, ea, true)?;
    t.set_gpr(i.rd(), value);
    Ok(())
}

fn record_store(t: &mut PpuThread, stored: bool) {
    let so = if t.xer_so() { CR_SO } else { 0 };
    t.set_cr_field(0, if stored { CR_EQ | so } else { so });
}

pub fn stwcx_(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i);
    let value = t.gpr(i.rs());
    let stored = store_conditional(interp, t, ea, value, false)?;
    record_store(t, stored);
    Ok(())
}

pub fn stdcx_(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i);
    let value = t.gpr(i.rs());
    let stored = store_conditional(interp, t, ea, value, true)?;
    record_store(t, stored);
    Ok(())
}

// Floating point

macro_rules! load_float {
    ($($name:ident: $single:literal, $ea:ident, $update:literal;)*) => {
        $(
            pub fn $name(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ea = $ea(t, i);
                let value = if $single {
                    f32::from_bits(read::<u32>(interp, t, ea)?) as f64
                } else {
                    f64::from_bits(read::<u64>(interp, t, ea)?)
                };
                t.set_fpr(i.frd(), value);
                if $update {
                    t.set_gpr(i.ra(), ea as u64);
                }
                Ok(())
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
            pub fn $name(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ea = $ea(t, i);
                let value = t.fpr(i.frs());
                if $single {
                    write(interp, t, ea, (value as f32).to_bits())?;
                } else {
                    write(interp, t, ea, value.to_bits())?;
                }
                if $update {
                    t.set_gpr(i.ra(), ea as u64);
                }
                Ok(())
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

/// Store the low word of the raw FPR bits
pub fn stfiwx(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i);
    write(interp, t, ea, t.fpr(i.frs()).to_bits() as u32)
}

// Vector (the low four address bits are ignored)

pub fn lvx(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i) & !0xF;
    let mut data = [0u8; 16];
    interp.memory().read_bytes(ea, &mut data).map_err(t.fault(ea))?;
    t.set_vr(i.vd(), V128::from_bytes(data));
    Ok(())
}

pub fn stvx(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = ea_x(t, i) & !0xF;
    interp
        .memory()
        .write_bytes(ea, &t.vr(i.vs()).data)
        .map_err(t.fault(ea))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::error::MemoryError;
    use cf_memory::MemoryManager;

    const DATA: u32 = 0x0010_0000;

    fn setup() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        let mut t = PpuThread::new(0, memory.clone());
        t.set_gpr(4, DATA as u64);
        (PpuInterpreter::new(memory), t)
    }

    #[test]
    fn test_load_store_word() {
        let (interp, mut t) = setup();
        t.set_gpr(3, 0xCAFE_BABE);
        // stw r3, 8(r4)
        stw(&interp, &mut t, Instruction(0x90640008)).unwrap();
        assert_eq!(interp.memory().read_be32(DATA + 8).unwrap(), 0xCAFE_BABE);
        // lwz r5, 8(r4)
        lwz(&interp, &mut t, Instruction(0x80A40008)).unwrap();
        assert_eq!(t.gpr(5), 0xCAFE_BABE);
    }

    #[test]
    fn test_algebraic_and_update() {
        let (interp, mut t) = setup();
        interp.memory().write_be16(DATA + 2, 0x8001).unwrap();
        // lhau r5, 2(r4)
        lhau(&interp, &mut t, Instruction(0xACA40002)).unwrap();
        assert_eq!(t.gpr(5), 0xFFFF_FFFF_FFFF_8001);
        assert_eq!(t.gpr(4), (DATA + 2) as u64);
    }

    #[test]
    fn test_byte_reversed() {
        let (interp, mut t) = setup();
        interp.memory().write_be32(DATA, 0x1122_3344).unwrap();
        t.set_gpr(5, 0);
        // lwbrx r3, r4, r5 (rA = r4, rB = r5)
        lwbrx(&interp, &mut t, Instruction(0x7C642C2C)).unwrap();
        assert_eq!(t.gpr(3), 0x4433_2211);
    }

    #[test]
    fn test_load_multiple() {
        let (interp, mut t) = setup();
        interp.memory().write_be32(DATA, 0x1111).unwrap();
        interp.memory().write_be32(DATA + 4, 0x2222).unwrap();
        // lmw r30, 0(r4)
        lmw(&interp, &mut t, Instruction(0xBBC40000)).unwrap();
        assert_eq!(t.gpr(30), 0x1111);
        assert_eq!(t.gpr(31), 0x2222);
    }

    #[test]
    fn test_reservation_pair() {
        let (interp, mut t) = setup();
        interp.memory().write_be32(DATA, 5).unwrap();
        t.set_gpr(5, 0);
        // lwarx r3, r4, r5
        lwarx(&interp, &mut t, Instruction(0x7C642828)).unwrap();
        assert_eq!(t.gpr(3), 5);
        t.set_gpr(6, 6);
        // stwcx. r6, r4, r5
        stwcx_(&interp, &mut t, Instruction(0x7CC4292D)).unwrap();
        assert_eq!(t.cr_field(0), CR_EQ);
        assert_eq!(interp.memory().read_be32(DATA).unwrap(), 6);
        assert_eq!(t.regs.reserved, 0);

        // A second store-conditional without a reservation fails
        stwcx_(&interp, &mut t, Instruction(0x7CC4292D)).unwrap();
        assert_eq!(t.cr_field(0), 0);
    }

    #[test]
    fn test_unmapped_access_faults() {
        let (interp, mut t) = setup();
        t.set_gpr(4, 0x4000_0000);
        let err = lwz(&interp, &mut t, Instruction(0x80A40000)).unwrap_err();
        assert!(matches!(
            err,
            PpuError::Memory {
                addr: 0x4000_0000,
                source: MemoryError::Unmapped { .. } | MemoryError::AccessViolation { .. }
            }
        ));
    }

    #[test]
    fn test_float_single_round_trip() {
        let (interp, mut t) = setup();
        t.set_fpr(1, 1.5);
        // stfs f1, 0(r4)
        stfs(&interp, &mut t, Instruction(0xD0240000)).unwrap();
        assert_eq!(interp.memory().read_be32(DATA).unwrap(), 1.5f32.to_bits());
        // lfs f2, 0(r4)
        lfs(&interp, &mut t, Instruction(0xC0440000)).unwrap();
        assert_eq!(t.fpr(2), 1.5);
    }

    #[test]
    fn test_vector_load_ignores_low_bits() {
        let (interp, mut t) = setup();
        let bytes: Vec<u8> = (0..16).collect();
        interp.memory().write_bytes(DATA, &bytes).unwrap();
        t.set_gpr(5, 7);
        // lvx v1, r4, r5
        lvx(&interp, &mut t, Instruction(0x7C2428CE)).unwrap();
        assert_eq!(t.vr(1).data[15], 15);
    }
}
