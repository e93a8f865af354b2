//! PPU thread state

use std::mem::offset_of;
use std::sync::Arc;

use cf_core::error::{MemoryError, PpuError};
use cf_memory::MemoryManager;

use crate::vmx::V128;

/// XER summary overflow bit
pub const XER_SO: u64 = 0x8000_0000;
/// XER overflow bit
pub const XER_OV: u64 = 0x4000_0000;
/// XER carry bit
pub const XER_CA: u64 = 0x2000_0000;
/// XER byte count used by the string instructions
pub const XER_BC_MASK: u64 = 0x7F;

/// CR field bits, most significant first
pub const CR_LT: u32 = 0b1000;
pub const CR_GT: u32 = 0b0100;
pub const CR_EQ: u32 = 0b0010;
pub const CR_SO: u32 = 0b0001;

/// PPU register set
///
/// `repr(C)` so compiled code can address registers by byte offset
/// relative to the start of this structure.
#[derive(Debug, Clone)]
#[repr(C)]
pub struct PpuRegisters {
    /// General Purpose Registers (64-bit)
    pub gpr: [u64; 32],
    /// Floating Point Registers (64-bit)
    pub fpr: [f64; 32],
    /// Vector Registers (128-bit)
    pub vr: [V128; 32],
    /// Link Register
    pub lr: u64,
    /// Count Register
    pub ctr: u64,
    /// Fixed-Point Exception Register
    pub xer: u64,
    /// Program counter
    pub pc: u64,
    /// Reservation address captured by lwarx/ldarx
    pub reserve_addr: u64,
    /// Value observed by lwarx/ldarx at the reservation address
    pub reserve_value: u64,
    /// Reservation granule version observed by lwarx/ldarx
    pub reserve_time: u64,
    /// Condition Register, field 0 in the most significant nibble
    pub cr: u32,
    /// FP Status and Control Register
    pub fpscr: u32,
    /// Vector Status and Control Register
    pub vscr: u32,
    pub vrsave: u32,
    /// Whether a reservation is currently held
    pub reserved: u32,
}

impl Default for PpuRegisters {
    fn default() -> Self {
        Self {
            gpr: [0; 32],
            fpr: [0.0; 32],
            vr: [V128::ZERO; 32],
            lr: 0,
            ctr: 0,
            xer: 0,
            pc: 0,
            reserve_addr: 0,
            reserve_value: 0,
            reserve_time: 0,
            cr: 0,
            fpscr: 0,
            vscr: 0,
            vrsave: 0,
            reserved: 0,
        }
    }
}

impl PpuRegisters {
    pub const fn gpr_offset(index: usize) -> usize {
        offset_of!(PpuRegisters, gpr) + index * 8
    }

    pub const fn fpr_offset(index: usize) -> usize {
        offset_of!(PpuRegisters, fpr) + index * 8
    }

    pub const fn vr_offset(index: usize) -> usize {
        offset_of!(PpuRegisters, vr) + index * 16
    }

    pub const LR_OFFSET: usize = offset_of!(PpuRegisters, lr);
    pub const CTR_OFFSET: usize = offset_of!(PpuRegisters, ctr);
    pub const XER_OFFSET: usize = offset_of!(PpuRegisters, xer);
    pub const PC_OFFSET: usize = offset_of!(PpuRegisters, pc);
    pub const CR_OFFSET: usize = offset_of!(PpuRegisters, cr);
    pub const FPSCR_OFFSET: usize = offset_of!(PpuRegisters, fpscr);
    pub const VSCR_OFFSET: usize = offset_of!(PpuRegisters, vscr);
    pub const VRSAVE_OFFSET: usize = offset_of!(PpuRegisters, vrsave);
}

/// PPU thread: one guest register file plus the memory it runs against
pub struct PpuThread {
    /// Thread ID
    pub id: u32,
    /// Thread name
    pub name: String,
    /// Register state
    pub regs: PpuRegisters,
    memory: Arc<MemoryManager>,
    /// Lowest address of the stack
    pub stack_addr: u32,
    pub stack_size: u32,
    pub priority: u32,
}

impl PpuThread {
    /// Create a new PPU thread
    pub fn new(id: u32, memory: Arc<MemoryManager>) -> Self {
        Self {
            id,
            name: format!("PPU Thread {}", id),
            regs: PpuRegisters::default(),
            memory,
            stack_addr: 0,
            stack_size: 0,
            priority: 0,
        }
    }

    /// Allocate a guest stack and point r1 at its top
    pub fn allocate_stack(&mut self, size: u32) -> Result<(), PpuError> {
        let addr = self
            .memory
            .allocate_stack(size)
            .map_err(|source| PpuError::Memory { addr: 0, source })?;
        self.stack_addr = addr;
        self.stack_size = size;
        // Leave room for the caller's back chain and LR save area
        self.regs.gpr[1] = ((addr + size - 0x70) & !0xF) as u64;
        Ok(())
    }

    /// Prepare the thread to call `entry` with the given TOC; returning ends the thread
    pub fn set_entry(&mut self, entry: u32, toc: u32) {
        self.regs.pc = entry as u64;
        self.regs.gpr[2] = toc as u64;
        self.regs.lr = 0;
    }

    /// Get the current instruction address
    #[inline]
    pub fn pc(&self) -> u64 {
        self.regs.pc
    }

    /// Set the program counter
    #[inline]
    pub fn set_pc(&mut self, addr: u64) {
        self.regs.pc = addr;
    }

    /// Advance the program counter by 4 bytes
    #[inline]
    pub fn advance_pc(&mut self) {
        self.regs.pc = self.regs.pc.wrapping_add(4);
    }

    /// Branch to `target`; the step loop adds the final 4 bytes
    #[inline]
    pub fn branch_to(&mut self, target: u64) {
        self.regs.pc = target.wrapping_sub(4);
    }

    #[inline]
    pub fn gpr(&self, index: usize) -> u64 {
        self.regs.gpr[index]
    }

    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        self.regs.gpr[index] = value;
    }

    /// `(rA|0)`: rA, or zero when the field names r0
    #[inline]
    pub fn gpr_or_zero(&self, index: usize) -> u64 {
        if index == 0 {
            0
        } else {
            self.regs.gpr[index]
        }
    }

    #[inline]
    pub fn fpr(&self, index: usize) -> f64 {
        self.regs.fpr[index]
    }

    #[inline]
    pub fn set_fpr(&mut self, index: usize, value: f64) {
        self.regs.fpr[index] = value;
    }

    #[inline]
    pub fn vr(&self, index: usize) -> V128 {
        self.regs.vr[index]
    }

    #[inline]
    pub fn set_vr(&mut self, index: usize, value: V128) {
        self.regs.vr[index] = value;
    }

    /// Get a reference to the memory manager
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Wrap a memory error with the faulting address
    pub fn fault(&self, addr: u32) -> impl FnOnce(MemoryError) -> PpuError {
        move |source| PpuError::Memory { addr, source }
    }

    /// Get CR field value (0-7)
    #[inline]
    pub fn cr_field(&self, field: usize) -> u32 {
        (self.regs.cr >> (28 - field * 4)) & 0xF
    }

    /// Set CR field value (0-7)
    #[inline]
    pub fn set_cr_field(&mut self, field: usize, value: u32) {
        let shift = 28 - field * 4;
        self.regs.cr = (self.regs.cr & !(0xF << shift)) | ((value & 0xF) << shift);
    }

    /// Get CR bit (0 = field 0 LT)
    #[inline]
    pub fn cr_bit(&self, bit: u32) -> bool {
        (self.regs.cr >> (31 - bit)) & 1 != 0
    }

    #[inline]
    pub fn set_cr_bit(&mut self, bit: u32, value: bool) {
        let mask = 1u32 << (31 - bit);
        if value {
            self.regs.cr |= mask;
        } else {
            self.regs.cr &= !mask;
        }
    }

    /// Set a CR field from a signed comparison, copying XER[SO]
    pub fn update_cr_signed(&mut self, field: usize, a: i64, b: i64) {
        let c = if a < b {
            CR_LT
        } else if a > b {
            CR_GT
        } else {
            CR_EQ
        };
        self.set_cr_field(field, c | self.so_bit());
    }

    /// Set a CR field from an unsigned comparison, copying XER[SO]
    pub fn update_cr_unsigned(&mut self, field: usize, a: u64, b: u64) {
        let c = if a < b {
            CR_LT
        } else if a > b {
            CR_GT
        } else {
            CR_EQ
        };
        self.set_cr_field(field, c | self.so_bit());
    }

    /// Record form: compare the result against zero into CR0
    #[inline]
    pub fn update_cr0(&mut self, value: u64) {
        self.update_cr_signed(0, value as i64, 0);
    }

    #[inline]
    fn so_bit(&self) -> u32 {
        if self.xer_so() {
            CR_SO
        } else {
            0
        }
    }

    #[inline]
    pub fn xer_ca(&self) -> bool {
        self.regs.xer & XER_CA != 0
    }

    #[inline]
    pub fn set_xer_ca(&mut self, value: bool) {
        if value {
            self.regs.xer |= XER_CA;
        } else {
            self.regs.xer &= !XER_CA;
        }
    }

    #[inline]
    pub fn xer_ov(&self) -> bool {
        self.regs.xer & XER_OV != 0
    }

    /// Set XER[OV]; a set overflow also sticks in XER[SO]
    #[inline]
    pub fn set_xer_ov(&mut self, value: bool) {
        if value {
            self.regs.xer |= XER_OV | XER_SO;
        } else {
            self.regs.xer &= !XER_OV;
        }
    }

    #[inline]
    pub fn xer_so(&self) -> bool {
        self.regs.xer & XER_SO != 0
    }

    /// Byte count for lswx/stswx
    #[inline]
    pub fn xer_bc(&self) -> u32 {
        (self.regs.xer & XER_BC_MASK) as u32
    }

    /// Drop any held reservation
    #[inline]
    pub fn clear_reservation(&mut self) {
        self.regs.reserved = 0;
        self.regs.reserve_addr = 0;
        self.regs.reserve_value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_thread() -> PpuThread {
        PpuThread::new(0, MemoryManager::new().unwrap())
    }

    #[test]
    fn test_ppu_thread_creation() {
        let thread = create_test_thread();
        assert_eq!(thread.id, 0);
        assert_eq!(thread.name, "PPU Thread 0");
        assert_eq!(thread.pc(), 0);
    }

    #[test]
    fn test_r0_is_a_normal_register() {
        let mut thread = create_test_thread();
        thread.set_gpr(0, 0xDEADBEEF);
        assert_eq!(thread.gpr(0), 0xDEADBEEF);
        assert_eq!(thread.gpr_or_zero(0), 0);
    }

    #[test]
    fn test_branch_to_lands_after_step() {
        let mut thread = create_test_thread();
        thread.set_pc(0x10000);
        thread.branch_to(0x20000);
        thread.advance_pc();
        assert_eq!(thread.pc(), 0x20000);
    }

    #[test]
    fn test_cr_fields_and_bits() {
        let mut thread = create_test_thread();
        thread.set_cr_field(0, 0b1010);
        thread.set_cr_field(7, 0b0101);
        assert_eq!(thread.cr_field(0), 0b1010);
        assert_eq!(thread.cr_field(7), 0b0101);

        assert!(thread.cr_bit(0));
        assert!(!thread.cr_bit(1));
        assert!(thread.cr_bit(31));

        thread.set_cr_bit(6, true); // cr1 EQ
        assert_eq!(thread.cr_field(1), CR_EQ);
    }

    #[test]
    fn test_cr0_copies_summary_overflow() {
        let mut thread = create_test_thread();
        thread.update_cr0(0);
        assert_eq!(thread.cr_field(0), CR_EQ);

        thread.set_xer_ov(true);
        assert!(thread.xer_so());
        thread.update_cr0(u64::MAX);
        assert_eq!(thread.cr_field(0), CR_LT | CR_SO);

        thread.set_xer_ov(false);
        assert!(thread.xer_so());
    }

    #[test]
    fn test_register_offsets() {
        assert_eq!(PpuRegisters::gpr_offset(0), 0);
        assert_eq!(PpuRegisters::gpr_offset(3), 24);
        assert_eq!(PpuRegisters::fpr_offset(1), 256 + 8);
        assert_eq!(PpuRegisters::vr_offset(0) % 16, 0);
        assert!(PpuRegisters::CR_OFFSET > PpuRegisters::LR_OFFSET);
    }

    #[test]
    fn test_stack_allocation() {
        let mut thread = create_test_thread();
        thread.allocate_stack(0x10000).unwrap();
        let sp = thread.gpr(1) as u32;
        assert_eq!(sp % 16, 0);
        assert!(sp > thread.stack_addr && sp < thread.stack_addr + 0x10000);
        thread.memory().write_be64(sp, 1).unwrap();
    }
}
