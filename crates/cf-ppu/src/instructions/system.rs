//! System, SPR, trap and cache-control instructions

use std::time::Instant;

use cf_core::error::KernelError;
use cf_core::{ppu_error, ppu_warn};
use once_cell::sync::Lazy;

use super::{crm_mask, Step};
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::syscall::{ENOSYS, TIMEBASE_FREQUENCY};
use crate::thread::PpuThread;

pub const SPR_XER: u32 = 1;
pub const SPR_LR: u32 = 8;
pub const SPR_CTR: u32 = 9;
pub const SPR_VRSAVE: u32 = 256;
pub const SPR_TBL: u32 = 268;
pub const SPR_TBU: u32 = 269;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Guest time base, ticking at 79.8 MHz since the first read
pub fn time_base() -> u64 {
    let nanos = EPOCH.elapsed().as_nanos();
    (nanos * TIMEBASE_FREQUENCY as u128 / 1_000_000_000) as u64
}

pub fn sc(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    if i.lev() != 0 {
        ppu_warn!("sc with LEV {} at 0x{:08x} ignored", i.lev(), t.pc());
        return Ok(());
    }
    syscall(interp, t);
    Ok(())
}

/// Run the syscall collaborator, turning its errors into guest error codes in r3
pub(crate) fn syscall(interp: &PpuInterpreter, t: &mut PpuThread) {
    match interp.syscalls().syscall(t) {
        Ok(()) => {}
        Err(KernelError::UnknownSyscall(_)) => t.set_gpr(3, ENOSYS as u64),
        Err(KernelError::Failed { code, .. }) => t.set_gpr(3, code as u64),
    }
}

// Traps

/// TO bits: 0x10 lt, 0x08 gt, 0x04 eq, 0x02 unsigned lt, 0x01 unsigned gt
fn trap_condition(to: u32, a: i64, b: i64) -> bool {
    (to & 0x10 != 0 && a < b)
        || (to & 0x08 != 0 && a > b)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && (a as u64) < (b as u64))
        || (to & 0x01 != 0 && (a as u64) > (b as u64))
}

fn trap(t: &PpuThread, i: Instruction, a: i64, b: i64) {
    if trap_condition(i.to(), a, b) {
        ppu_error!("Trap at 0x{:08x} (TO=0x{:x}, a=0x{:x}, b=0x{:x})", t.pc(), i.to(), a, b);
    }
}

pub fn tw(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    trap(t, i, t.gpr(i.ra()) as i32 as i64, t.gpr(i.rb()) as i32 as i64);
    Ok(())
}

pub fn twi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    trap(t, i, t.gpr(i.ra()) as i32 as i64, i.simm() as i32 as i64);
    Ok(())
}

pub fn td(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    trap(t, i, t.gpr(i.ra()) as i64, t.gpr(i.rb()) as i64);
    Ok(())
}

pub fn tdi(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    trap(t, i, t.gpr(i.ra()) as i64, i.simm());
    Ok(())
}

// Special purpose registers

pub fn mfspr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = match i.spr() {
        SPR_XER => t.regs.xer,
        SPR_LR => t.regs.lr,
        SPR_CTR => t.regs.ctr,
        SPR_VRSAVE => t.regs.vrsave as u64,
        SPR_TBL => time_base(),
        SPR_TBU => time_base() >> 32,
        spr => {
            ppu_warn!("mfspr from unsupported SPR {} at 0x{:08x}", spr, t.pc());
            return Ok(());
        }
    };
    t.set_gpr(i.rd(), value);
    Ok(())
}

pub fn mtspr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = t.gpr(i.rs());
    match i.spr() {
        SPR_XER => t.regs.xer = value & 0xE000_007F,
        SPR_LR => t.regs.lr = value,
        SPR_CTR => t.regs.ctr = value,
        SPR_VRSAVE => t.regs.vrsave = value as u32,
        spr => ppu_warn!("mtspr to unsupported SPR {} at 0x{:08x}", spr, t.pc()),
    }
    Ok(())
}

pub fn mftb(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let tb = time_base();
    let value = if i.spr() == SPR_TBU { tb >> 32 } else { tb };
    t.set_gpr(i.rd(), value);
    Ok(())
}

// Condition register moves

/// `mfcr`, or `mfocrf` with only the selected field defined
pub fn mfocrf(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let value = if i.l11() {
        t.regs.cr & crm_mask(i.crm())
    } else {
        t.regs.cr
    };
    t.set_gpr(i.rd(), value as u64);
    Ok(())
}

pub fn mtocrf(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let mask = crm_mask(i.crm());
    t.regs.cr = (t.regs.cr & !mask) | (t.gpr(i.rs()) as u32 & mask);
    Ok(())
}

// Synchronisation and cache hints

pub fn sync(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    Ok(())
}

pub fn isync(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

pub fn eieio(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    Ok(())
}

pub fn dcbf(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

pub fn dcbst(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

pub fn dcbt(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

pub fn dcbtst(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

pub fn icbi(_: &PpuInterpreter, _: &mut PpuThread, _: Instruction) -> Step {
    Ok(())
}

/// Zero the 128-byte cache line containing the effective address
pub fn dcbz(interp: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let ea = (t.gpr_or_zero(i.ra()).wrapping_add(t.gpr(i.rb())) as u32) & !127;
    interp.memory().fill(ea, 0, 128).map_err(t.fault(ea))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_memory::MemoryManager;

    fn setup() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        (PpuInterpreter::new(memory.clone()), PpuThread::new(0, memory))
    }

    #[test]
    fn test_link_register_moves() {
        let (interp, mut t) = setup();
        t.set_gpr(9, 0x1234);
        // mtctr r9
        mtspr(&interp, &mut t, Instruction(0x7D2903A6)).unwrap();
        assert_eq!(t.regs.ctr, 0x1234);
        t.regs.lr = 0x5678;
        // mflr r0
        mfspr(&interp, &mut t, Instruction(0x7C0802A6)).unwrap();
        assert_eq!(t.gpr(0), 0x5678);
    }

    #[test]
    fn test_time_base_advances() {
        let (interp, mut t) = setup();
        // mftb r3
        mftb(&interp, &mut t, Instruction(0x7C6C42E6)).unwrap();
        let first = t.gpr(3);
        std::thread::sleep(std::time::Duration::from_millis(2));
        mftb(&interp, &mut t, Instruction(0x7C6C42E6)).unwrap();
        assert!(t.gpr(3) > first);
    }

    #[test]
    fn test_cr_moves() {
        let (interp, mut t) = setup();
        t.set_gpr(3, 0x1234_5678);
        // mtcrf 0xFF, r3
        mtocrf(&interp, &mut t, Instruction(0x7C6FF120)).unwrap();
        assert_eq!(t.regs.cr, 0x1234_5678);
        // mfcr r4
        mfocrf(&interp, &mut t, Instruction(0x7C800026)).unwrap();
        assert_eq!(t.gpr(4), 0x1234_5678);
    }

    #[test]
    fn test_dcbz_clears_line() {
        let (interp, mut t) = setup();
        let line = 0x0010_0080u32;
        interp.memory().fill(line, 0xAA, 256).unwrap();
        t.set_gpr(4, (line + 0x10) as u64);
        t.set_gpr(5, 0);
        // dcbz r4, r5
        dcbz(&interp, &mut t, Instruction(0x7C0427EC)).unwrap();
        assert_eq!(interp.memory().read_be32(line).unwrap(), 0);
        assert_eq!(interp.memory().read_be32(line + 124).unwrap(), 0);
        assert_eq!(interp.memory().read_u8(line + 128).unwrap(), 0xAA);
    }

    #[test]
    fn test_unknown_syscall_returns_enosys() {
        let (interp, mut t) = setup();
        t.set_gpr(11, 0xFFFF);
        sc(&interp, &mut t, Instruction(0x44000002)).unwrap();
        assert_eq!(t.gpr(3), ENOSYS as u64);
    }

    #[test]
    fn test_trap_condition() {
        assert!(trap_condition(0x04, 5, 5));
        assert!(trap_condition(0x1F, 1, 2));
        assert!(!trap_condition(0x08, 1, 2));
        assert!(trap_condition(0x01, -1, 0));
    }
}
