//! PPU interpreter implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cf_core::error::PpuError;
use cf_core::{ppu_error, ppu_trace};
use cf_memory::MemoryManager;

use crate::decoder;
use crate::instruction::Instruction;
use crate::syscall::{BasicSyscalls, SyscallHandler};
use crate::thread::PpuThread;

/// PPU interpreter for instruction execution
pub struct PpuInterpreter {
    memory: Arc<MemoryManager>,
    syscalls: Arc<dyn SyscallHandler>,
    /// Log every executed instruction at trace level
    trace: bool,
    executed: AtomicU64,
}

impl PpuInterpreter {
    /// Create an interpreter answering syscalls with [`BasicSyscalls`]
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self::with_syscalls(memory, Arc::new(BasicSyscalls::new()))
    }

    pub fn with_syscalls(memory: Arc<MemoryManager>, syscalls: Arc<dyn SyscallHandler>) -> Self {
        Self {
            memory,
            syscalls,
            trace: false,
            executed: AtomicU64::new(0),
        }
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    #[inline]
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    #[inline]
    pub fn syscalls(&self) -> &dyn SyscallHandler {
        self.syscalls.as_ref()
    }

    /// Instructions executed by this interpreter across all threads
    pub fn instruction_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Execute a single instruction
    pub fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        let pc = thread.pc() as u32;
        let word = self.memory.fetch(pc).map_err(thread.fault(pc))?;
        let instr = Instruction(word);
        let entry = decoder::decode(instr);

        if self.trace {
            ppu_trace!("0x{:08x}: {:08x} {}", pc, word, entry.name);
        }

        (entry.interpret)(self, thread, instr)?;
        thread.advance_pc();
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Step until the thread returns to address 0 or `max_steps` instructions ran
    ///
    /// Returns the number of instructions executed.
    pub fn run(&self, thread: &mut PpuThread, max_steps: u64) -> Result<u64, PpuError> {
        let mut steps = 0;
        while steps < max_steps && thread.pc() != 0 {
            self.step(thread)?;
            steps += 1;
        }
        Ok(steps)
    }
}

/// Handler of the unknown entry: diagnose and leave the registers alone
pub(crate) fn unknown(_: &PpuInterpreter, thread: &mut PpuThread, instr: Instruction) -> Result<(), PpuError> {
    ppu_error!(
        "Unknown instruction 0x{:08x} at 0x{:08x} (opcode {})",
        instr.word(),
        thread.pc(),
        instr.opcode()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: u32 = 0x0001_0000;

    fn create_test_env() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        let interpreter = PpuInterpreter::new(memory.clone());
        let thread = PpuThread::new(0, memory);
        (interpreter, thread)
    }

    fn load(interp: &PpuInterpreter, words: &[u32]) {
        for (n, word) in words.iter().enumerate() {
            interp.memory().write_be32(CODE + n as u32 * 4, *word).unwrap();
        }
    }

    #[test]
    fn test_step_advances_pc() {
        let (interp, mut thread) = create_test_env();
        // li r3, 100
        load(&interp, &[0x38600064]);
        thread.set_pc(CODE as u64);
        interp.step(&mut thread).unwrap();
        assert_eq!(thread.gpr(3), 100);
        assert_eq!(thread.pc(), (CODE + 4) as u64);
        assert_eq!(interp.instruction_count(), 1);
    }

    #[test]
    fn test_unknown_instruction_is_skipped() {
        let (interp, mut thread) = create_test_env();
        load(&interp, &[0x00000000]);
        thread.set_pc(CODE as u64);
        thread.set_gpr(3, 42);
        let before = thread.regs.gpr;
        interp.step(&mut thread).unwrap();
        assert_eq!(thread.regs.gpr, before);
        assert_eq!(thread.pc(), (CODE + 4) as u64);
    }

    #[test]
    fn test_run_stops_at_null_return() {
        let (interp, mut thread) = create_test_env();
        // li r3, 1; blr
        load(&interp, &[0x38600001, 0x4E800020]);
        thread.set_entry(CODE, 0);
        let steps = interp.run(&mut thread, 100).unwrap();
        assert_eq!(steps, 2);
        assert_eq!(thread.pc(), 0);
        assert_eq!(thread.gpr(3), 1);
    }

    #[test]
    fn test_fetch_fault() {
        let (interp, mut thread) = create_test_env();
        thread.set_pc(0x4000_0000);
        assert!(matches!(
            interp.step(&mut thread),
            Err(PpuError::Memory { addr: 0x4000_0000, .. })
        ));
    }
}
