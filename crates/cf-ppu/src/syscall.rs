//! System call collaborator
//!
//! `sc` hands the whole register file to a [`SyscallHandler`]. The number is
//! in r11, arguments in r3-r10, and the handler writes the result to r3
//! itself. Errors are turned into guest error codes by the caller.

use cf_core::error::KernelError;
use cf_core::kernel_trace;

use crate::thread::PpuThread;

/// `CELL_ENOSYS`, returned to the guest for syscalls nobody implements
pub const ENOSYS: u32 = 0x8001_0003;

/// Time base frequency of the guest (79.8 MHz)
pub const TIMEBASE_FREQUENCY: u64 = 79_800_000;

/// Services `sc` for guest threads
pub trait SyscallHandler: Send + Sync {
    fn syscall(&self, thread: &mut PpuThread) -> Result<(), KernelError>;
}

/// Minimal handler answering process and time queries
#[derive(Debug, Default)]
pub struct BasicSyscalls;

impl BasicSyscalls {
    pub fn new() -> Self {
        Self
    }
}

impl SyscallHandler for BasicSyscalls {
    fn syscall(&self, thread: &mut PpuThread) -> Result<(), KernelError> {
        let num = thread.gpr(11);
        kernel_trace!("syscall {} from thread {} at 0x{:08x}", num, thread.id, thread.pc());

        let result: u64 = match num {
            // sys_process_getpid
            1 => 1,
            // sys_process_exit
            2 => {
                tracing::info!(target: "kernel", "sys_process_exit({})", thread.gpr(3) as i32);
                0
            }
            // sys_process_get_sdk_version
            25 => 0x0036_0001,
            // sys_ppu_thread_yield
            43 => {
                std::thread::yield_now();
                0
            }
            // sys_ppu_thread_get_id
            44 => thread.id as u64,
            // sys_time_get_timebase_frequency
            147 => TIMEBASE_FREQUENCY,
            // sys_tty_write: report everything as written
            403 => thread.gpr(5),
            _ => {
                tracing::warn!(target: "kernel", "Unknown syscall {}", num);
                return Err(KernelError::UnknownSyscall(num));
            }
        };

        thread.set_gpr(3, result);
        Ok(())
    }
}

/// Handler that services nothing; every guest syscall gets `ENOSYS`
#[derive(Debug, Default)]
pub struct NoSyscalls;

impl SyscallHandler for NoSyscalls {
    fn syscall(&self, thread: &mut PpuThread) -> Result<(), KernelError> {
        Err(KernelError::UnknownSyscall(thread.gpr(11)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_memory::MemoryManager;

    #[test]
    fn test_known_and_unknown_syscalls() {
        let mut thread = PpuThread::new(7, MemoryManager::new().unwrap());
        let handler = BasicSyscalls::new();

        thread.set_gpr(11, 44);
        handler.syscall(&mut thread).unwrap();
        assert_eq!(thread.gpr(3), 7);

        thread.set_gpr(11, 9999);
        assert!(matches!(
            handler.syscall(&mut thread),
            Err(KernelError::UnknownSyscall(9999))
        ));

        thread.set_gpr(11, 44);
        assert!(NoSyscalls.syscall(&mut thread).is_err());
    }
}
