//! PPU instruction implementations
//!
//! One plain function per mnemonic, registered in the dispatch tables. Every
//! handler runs with `pc` pointing at the instruction itself; the interpreter
//! adds 4 afterwards, so branch handlers go through [`PpuThread::branch_to`].

pub mod branch;
pub mod float;
pub mod integer;
pub mod load_store;
pub mod system;
pub mod vector;

use cf_core::error::PpuError;

use crate::instruction::Instruction;
use crate::thread::PpuThread;

/// Result of executing one instruction
pub type Step = Result<(), PpuError>;

/// Rotate the low word duplicated into both halves, as the 64-bit rotate unit does
#[inline]
pub fn rotl32(value: u64, n: u32) -> u64 {
    let word = value as u32 as u64;
    (word | (word << 32)).rotate_left(n)
}

#[inline]
pub fn rotl64(value: u64, n: u32) -> u64 {
    value.rotate_left(n)
}

/// MASK(mb, me) over 64 bits, wrapping when `mb > me`
#[inline]
pub fn mask64(mb: u32, me: u32) -> u64 {
    let begin = u64::MAX >> mb;
    let end = u64::MAX << (63 - me);
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}

/// CRM field mask for `mtocrf`/`mfocrf` (bit 7 selects CR0)
#[inline]
pub fn crm_mask(crm: u32) -> u32 {
    (0..8)
        .filter(|field| crm & (0x80 >> field) != 0)
        .fold(0, |mask, field| mask | (0xF << (28 - field * 4)))
}

/// `a + b + carry` with carry-out
#[inline]
pub fn add_with_carry(a: u64, b: u64, carry: bool) -> (u64, bool) {
    let (sum, c1) = a.overflowing_add(b);
    let (sum, c2) = sum.overflowing_add(carry as u64);
    (sum, c1 | c2)
}

/// Signed overflow of `a + b = result`
#[inline]
pub fn add_overflows(a: u64, b: u64, result: u64) -> bool {
    ((a ^ result) & (b ^ result)) >> 63 != 0
}

/// Record form: update CR0 from the result
#[inline]
pub(crate) fn record(thread: &mut PpuThread, instr: Instruction, value: u64) {
    if instr.rc() {
        thread.update_cr0(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask64() {
        assert_eq!(mask64(0, 63), u64::MAX);
        assert_eq!(mask64(32, 63), 0x0000_0000_FFFF_FFFF);
        assert_eq!(mask64(0, 31), 0xFFFF_FFFF_0000_0000);
        assert_eq!(mask64(63, 0), 0x8000_0000_0000_0001);
    }

    #[test]
    fn test_rotl32_duplicates_word() {
        assert_eq!(rotl32(0x8000_0001, 1) as u32, 0x0000_0003);
        assert_eq!(rotl32(0xFFFF_FFFF_1234_5678, 0), 0x1234_5678_1234_5678);
    }

    #[test]
    fn test_crm_mask() {
        assert_eq!(crm_mask(0x80), 0xF000_0000);
        assert_eq!(crm_mask(0x01), 0x0000_000F);
        assert_eq!(crm_mask(0xFF), 0xFFFF_FFFF);
    }

    #[test]
    fn test_carry_and_overflow() {
        assert_eq!(add_with_carry(u64::MAX, 1, false), (0, true));
        assert_eq!(add_with_carry(u64::MAX, 0, true), (0, true));
        assert_eq!(add_with_carry(1, 2, true), (4, false));
        let a = i64::MAX as u64;
        assert!(add_overflows(a, 1, a.wrapping_add(1)));
        assert!(!add_overflows(1, 1, 2));
    }
}
