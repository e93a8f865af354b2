//! PPU instruction word view
//!
//! Field accessors follow the architecture manual's bit numbering, where bit 0
//! is the most significant bit of the word. Every accessor is a plain
//! shift-and-mask, so garbage words still decode without faulting.

use std::fmt;

/// A 32-bit PPU instruction word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    #[inline]
    pub const fn new(word: u32) -> Self {
        Self(word)
    }

    #[inline]
    pub const fn word(self) -> u32 {
        self.0
    }

    /// Extract bits `from..=to` (MSB-first numbering)
    #[inline]
    const fn bits(self, from: u32, to: u32) -> u32 {
        (self.0 >> (31 - to)) & (u32::MAX >> (31 - (to - from)))
    }

    #[inline]
    const fn bit(self, n: u32) -> bool {
        (self.0 >> (31 - n)) & 1 != 0
    }

    // Opcode groups

    #[inline]
    pub const fn opcode(self) -> u32 {
        self.bits(0, 5)
    }

    /// VA-form extended opcode (primary 4)
    #[inline]
    pub const fn op4(self) -> u32 {
        self.bits(26, 31)
    }

    /// VX/VC-form extended opcode (primary 4)
    #[inline]
    pub const fn op4_(self) -> u32 {
        self.bits(21, 31)
    }

    #[inline]
    pub const fn op19(self) -> u32 {
        self.bits(21, 30)
    }

    /// MD/MDS-form extended opcode (primary 30)
    #[inline]
    pub const fn op30(self) -> u32 {
        self.bits(27, 29)
    }

    #[inline]
    pub const fn op31(self) -> u32 {
        self.bits(21, 30)
    }

    #[inline]
    pub const fn op58(self) -> u32 {
        self.bits(30, 31)
    }

    #[inline]
    pub const fn op59(self) -> u32 {
        self.bits(26, 30)
    }

    #[inline]
    pub const fn op62(self) -> u32 {
        self.bits(30, 31)
    }

    /// A-form extended opcode (primary 63)
    #[inline]
    pub const fn op63(self) -> u32 {
        self.bits(26, 30)
    }

    /// X-form extended opcode (primary 63)
    #[inline]
    pub const fn op63_(self) -> u32 {
        self.bits(21, 30)
    }

    // Flag bits

    #[inline]
    pub const fn aa(self) -> bool {
        self.bit(30)
    }

    #[inline]
    pub const fn lk(self) -> bool {
        self.bit(31)
    }

    #[inline]
    pub const fn rc(self) -> bool {
        self.bit(31)
    }

    #[inline]
    pub const fn oe(self) -> bool {
        self.bit(21)
    }

    /// L field of compare instructions (64-bit compare when set)
    #[inline]
    pub const fn l10(self) -> bool {
        self.bit(10)
    }

    /// Single-field flag of mtocrf/mfocrf
    #[inline]
    pub const fn l11(self) -> bool {
        self.bit(11)
    }

    // Register fields

    #[inline]
    pub const fn rd(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn rs(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn ra(self) -> usize {
        self.bits(11, 15) as usize
    }

    #[inline]
    pub const fn rb(self) -> usize {
        self.bits(16, 20) as usize
    }

    #[inline]
    pub const fn frd(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn frs(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn fra(self) -> usize {
        self.bits(11, 15) as usize
    }

    #[inline]
    pub const fn frb(self) -> usize {
        self.bits(16, 20) as usize
    }

    #[inline]
    pub const fn frc(self) -> usize {
        self.bits(21, 25) as usize
    }

    #[inline]
    pub const fn vd(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn vs(self) -> usize {
        self.bits(6, 10) as usize
    }

    #[inline]
    pub const fn va(self) -> usize {
        self.bits(11, 15) as usize
    }

    #[inline]
    pub const fn vb(self) -> usize {
        self.bits(16, 20) as usize
    }

    #[inline]
    pub const fn vc(self) -> usize {
        self.bits(21, 25) as usize
    }

    // Condition register fields

    #[inline]
    pub const fn crfd(self) -> usize {
        self.bits(6, 8) as usize
    }

    #[inline]
    pub const fn crfs(self) -> usize {
        self.bits(11, 13) as usize
    }

    #[inline]
    pub const fn crbd(self) -> u32 {
        self.bits(6, 10)
    }

    #[inline]
    pub const fn crba(self) -> u32 {
        self.bits(11, 15)
    }

    #[inline]
    pub const fn crbb(self) -> u32 {
        self.bits(16, 20)
    }

    #[inline]
    pub const fn crm(self) -> u32 {
        self.bits(12, 19)
    }

    // Branch fields

    #[inline]
    pub const fn bo(self) -> u32 {
        self.bits(6, 10)
    }

    #[inline]
    pub const fn bi(self) -> u32 {
        self.bits(11, 15)
    }

    /// Conditional branch displacement in bytes
    #[inline]
    pub const fn bd(self) -> i32 {
        ((self.0 & 0xFFFC) as u16 as i16) as i32
    }

    /// Unconditional branch displacement in bytes
    #[inline]
    pub const fn li(self) -> i32 {
        ((self.0 & 0x03FF_FFFC) << 6) as i32 >> 6
    }

    // Immediates

    #[inline]
    pub const fn simm(self) -> i64 {
        (self.0 as u16 as i16) as i64
    }

    #[inline]
    pub const fn d(self) -> i64 {
        self.simm()
    }

    #[inline]
    pub const fn uimm(self) -> u64 {
        (self.0 & 0xFFFF) as u64
    }

    /// DS-form displacement in bytes
    #[inline]
    pub const fn ds(self) -> i64 {
        ((self.0 & 0xFFFC) as u16 as i16) as i64
    }

    /// Word shift amount (SH of M-form/X-form)
    #[inline]
    pub const fn sh(self) -> u32 {
        self.bits(16, 20)
    }

    /// Doubleword shift amount (MD/XS-form, split field)
    #[inline]
    pub const fn sh64(self) -> u32 {
        self.bits(16, 20) | (self.bits(30, 30) << 5)
    }

    #[inline]
    pub const fn mb(self) -> u32 {
        self.bits(21, 25)
    }

    #[inline]
    pub const fn me(self) -> u32 {
        self.bits(26, 30)
    }

    /// Doubleword mask begin/end (MD/MDS-form, split field)
    #[inline]
    pub const fn mb64(self) -> u32 {
        self.bits(21, 25) | (self.bits(26, 26) << 5)
    }

    #[inline]
    pub const fn nb(self) -> u32 {
        self.bits(16, 20)
    }

    #[inline]
    pub const fn to(self) -> u32 {
        self.bits(6, 10)
    }

    /// SPR number with its two 5-bit halves swapped back
    #[inline]
    pub const fn spr(self) -> u32 {
        let raw = self.bits(11, 20);
        (raw >> 5) | ((raw & 0x1F) << 5)
    }

    #[inline]
    pub const fn lev(self) -> u32 {
        self.bits(20, 26)
    }

    /// FPSCR field mask of mtfsf
    #[inline]
    pub const fn fm(self) -> u32 {
        self.bits(7, 14)
    }

    /// Immediate of mtfsfi
    #[inline]
    pub const fn fpimm(self) -> u32 {
        self.bits(16, 19)
    }

    /// Unsigned immediate of vector splat instructions
    #[inline]
    pub const fn vuimm(self) -> u32 {
        self.bits(11, 15)
    }

    /// Signed 5-bit immediate of vector splat instructions
    #[inline]
    pub const fn vsimm(self) -> i32 {
        ((self.bits(11, 15) << 27) as i32) >> 27
    }

    /// Record bit of vector compare instructions
    #[inline]
    pub const fn vrc(self) -> bool {
        self.bit(21)
    }

    // Classification

    /// `bc`, `b`, `bclr` or `bcctr`
    pub const fn is_branch(self) -> bool {
        match self.opcode() {
            0x10 | 0x12 => true,
            0x13 => matches!(self.op19(), 0x010 | 0x210),
            _ => false,
        }
    }

    /// Conditional branches; `bclr` counts as conditional unless BO ignores both CR and CTR
    pub const fn is_branch_conditional(self) -> bool {
        match self.opcode() {
            0x10 => true,
            0x13 if self.op19() == 0x010 => {
                let bo = self.bo();
                (bo & 0x10) == 0 || (bo & 0x04) == 0
            }
            _ => false,
        }
    }

    pub const fn is_branch_unconditional(self) -> bool {
        self.opcode() == 0x12
    }

    /// `bl` and `bla`: the target is encoded in the word
    pub const fn is_call_known(self) -> bool {
        self.opcode() == 0x12 && self.lk()
    }

    /// `bcctrl`: the target is only known at run time
    pub const fn is_call_unknown(self) -> bool {
        self.opcode() == 0x13 && self.op19() == 0x210 && self.lk()
    }

    pub const fn is_call(self) -> bool {
        self.is_call_known() || self.is_call_unknown()
    }

    /// Unconditional `bclr` (`blr`)
    pub const fn is_return(self) -> bool {
        self.opcode() == 0x13 && self.op19() == 0x010 && (self.bo() & 0x14) == 0x14
    }

    /// Indirect branch through CTR
    pub const fn is_branch_ctr(self) -> bool {
        self.opcode() == 0x13 && self.op19() == 0x210
    }

    /// Static target of a branch at `addr`, or 0 when not statically known
    pub const fn target(self, addr: u32) -> u32 {
        match self.opcode() {
            0x10 => {
                let bd = self.bd() as u32;
                if self.aa() {
                    bd
                } else {
                    addr.wrapping_add(bd)
                }
            }
            0x12 => {
                let li = self.li() as u32;
                if self.aa() {
                    li
                } else {
                    addr.wrapping_add(li)
                }
            }
            0x13 if self.op19() == 0x010 && self.is_branch_conditional() => addr.wrapping_add(4),
            _ => 0,
        }
    }

    /// Whether the word resolves to a known instruction
    pub fn is_valid(self) -> bool {
        crate::decoder::decode(self).is_valid()
    }
}

impl From<u32> for Instruction {
    fn from(word: u32) -> Self {
        Self(word)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({:08X} {})", self.0, crate::decoder::decode(*self).name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_d_form_fields() {
        // addi r3, r1, 8
        let i = Instruction(0x38610008);
        assert_eq!(i.opcode(), 14);
        assert_eq!(i.rd(), 3);
        assert_eq!(i.ra(), 1);
        assert_eq!(i.simm(), 8);

        // addi r3, r0, -1
        let i = Instruction(0x3860FFFF);
        assert_eq!(i.simm(), -1);
        assert_eq!(i.uimm(), 0xFFFF);
    }

    #[test]
    fn test_branch_fields() {
        // b +0x100
        let i = Instruction(0x48000100);
        assert_eq!(i.li(), 0x100);
        assert!(!i.aa() && !i.lk());
        assert_eq!(i.target(0x1000), 0x1100);

        // bl -4
        let i = Instruction(0x4BFFFFFD);
        assert_eq!(i.li(), -4);
        assert!(i.is_call_known());
        assert_eq!(i.target(0x1000), 0x0FFC);

        // beq cr0, -8
        let i = Instruction(0x4182FFF8);
        assert_eq!(i.bo(), 12);
        assert_eq!(i.bi(), 2);
        assert_eq!(i.bd(), -8);
        assert!(i.is_branch_conditional());
        assert_eq!(i.target(0x2000), 0x1FF8);
    }

    #[test]
    fn test_absolute_branch_target() {
        // ba 0x100
        let i = Instruction(0x48000102);
        assert!(i.aa());
        assert_eq!(i.target(0x8000), 0x100);
    }

    #[test]
    fn test_return_and_indirect_calls() {
        // blr
        let blr = Instruction(0x4E800020);
        assert!(blr.is_branch());
        assert!(blr.is_return());
        assert!(!blr.is_branch_conditional());
        assert_eq!(blr.target(0x100), 0);

        // beqlr
        let beqlr = Instruction(0x4D820020);
        assert!(!beqlr.is_return());
        assert!(beqlr.is_branch_conditional());
        assert_eq!(beqlr.target(0x100), 0x104);

        // bctrl
        let bctrl = Instruction(0x4E800421);
        assert!(bctrl.is_call_unknown());
        assert!(bctrl.is_call());
        assert!(!bctrl.is_call_known());

        // bctr
        let bctr = Instruction(0x4E800420);
        assert!(bctr.is_branch() && !bctr.is_call());
    }

    #[test]
    fn test_spr_swap() {
        // mflr r0
        assert_eq!(Instruction(0x7C0802A6).spr(), 8);
        // mtctr r9
        assert_eq!(Instruction(0x7D2903A6).spr(), 9);
        // mftb r3
        assert_eq!(Instruction(0x7C6C42E6).spr(), 268);
    }

    #[test]
    fn test_rotate_fields() {
        // rlwinm r3, r4, 2, 0, 29
        let i = Instruction(0x5483103A);
        assert_eq!(i.rs(), 4);
        assert_eq!(i.ra(), 3);
        assert_eq!(i.sh(), 2);
        assert_eq!(i.mb(), 0);
        assert_eq!(i.me(), 29);

        // rldicl r3, r3, 0, 32 (clrldi r3, r3, 32)
        let i = Instruction(0x78630020);
        assert_eq!(i.op30(), 0);
        assert_eq!(i.sh64(), 0);
        assert_eq!(i.mb64(), 32);

        // sradi r3, r3, 63
        let i = Instruction(0x7C63FE76);
        assert_eq!(i.sh64(), 63);
    }

    #[test]
    fn test_ds_form() {
        // ld r3, -8(r1)
        let i = Instruction(0xE861FFF8);
        assert_eq!(i.opcode(), 58);
        assert_eq!(i.op58(), 0);
        assert_eq!(i.ds(), -8);
    }

    #[test]
    fn test_non_branch_words() {
        let nop = Instruction(0x60000000);
        assert!(!nop.is_branch());
        assert!(!nop.is_call());
        assert_eq!(nop.target(0x100), 0);

        // Garbage still decodes fields
        let junk = Instruction(0xFFFFFFFF);
        assert_eq!(junk.rd(), 31);
        assert_eq!(junk.simm(), -1);
    }
}
