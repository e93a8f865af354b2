//! Test ROM execution for PPU instruction validation
//!
//! Each ROM is a short guest function assembled from hand-encoded
//! big-endian words, loaded at [`CODE`] and entered with LR = 0 so the
//! final `blr` ends the run. ROMs are checked on the interpreter and again
//! through compiled execution in both translator modes, which must agree.

use std::sync::Arc;

use cf_core::config::TranslatorMode;
use cf_memory::MemoryManager;
use cf_ppu::thread::{CR_EQ, XER_CA};
use cf_ppu::{CompiledExecutor, PpuInterpreter, PpuThread};

const CODE: u32 = 0x0001_0000;
const DATA: u32 = 0x0000_8000;
const MAX_STEPS: u64 = 10_000;

#[derive(Debug, Clone)]
struct TestRom {
    code: Vec<u32>,
    /// Initial GPR values (register number, value)
    initial_regs: Vec<(usize, u64)>,
    /// Expected GPR values after the run (register number, value)
    expected_regs: Vec<(usize, u64)>,
}

impl TestRom {
    fn new(code: &[u32]) -> Self {
        Self {
            code: code.to_vec(),
            initial_regs: Vec::new(),
            expected_regs: Vec::new(),
        }
    }

    fn with(mut self, reg: usize, value: u64) -> Self {
        self.initial_regs.push((reg, value));
        self
    }

    fn expect(mut self, reg: usize, value: u64) -> Self {
        self.expected_regs.push((reg, value));
        self
    }

    fn load(&self) -> (Arc<MemoryManager>, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        for (n, word) in self.code.iter().enumerate() {
            memory.write_be32(CODE + 4 * n as u32, *word).unwrap();
        }
        let mut thread = PpuThread::new(0, Arc::clone(&memory));
        for (reg, value) in &self.initial_regs {
            thread.set_gpr(*reg, *value);
        }
        thread.regs.lr = 0;
        thread.set_pc(CODE as u64);
        (memory, thread)
    }

    fn run_interpreted(&self) -> PpuThread {
        let (memory, mut thread) = self.load();
        let interpreter = PpuInterpreter::new(memory);
        interpreter.run(&mut thread, MAX_STEPS).unwrap();
        assert_eq!(thread.pc(), 0, "ROM did not return");
        thread
    }

    fn run_compiled(&self, mode: TranslatorMode) -> (PpuThread, CompiledExecutor) {
        let (memory, mut thread) = self.load();
        let interpreter = Arc::new(PpuInterpreter::new(memory));
        let executor = CompiledExecutor::with_evaluator(interpreter, mode);
        executor.add_segment(CODE, 4 * self.code.len() as u32).unwrap();
        executor.run(&mut thread, MAX_STEPS).unwrap();
        assert_eq!(thread.pc(), 0, "ROM did not return");
        (thread, executor)
    }

    fn verify(&self, thread: &PpuThread, how: &str) {
        for (reg, expected) in &self.expected_regs {
            let actual = thread.gpr(*reg);
            assert_eq!(
                actual, *expected,
                "{}: r{} expected 0x{:016X}, got 0x{:016X}",
                how, reg, expected, actual
            );
        }
    }

    /// Run on every execution strategy and check the expected registers
    fn execute_and_verify(&self) {
        let interpreted = self.run_interpreted();
        self.verify(&interpreted, "interpreter");
        for mode in [TranslatorMode::Function, TranslatorMode::Module] {
            let (compiled, executor) = self.run_compiled(mode);
            self.verify(&compiled, &format!("{:?}", mode));
            assert!(executor.compiled_calls() > 0, "{:?}: nothing was compiled", mode);
            assert_eq!(compiled.regs.cr, interpreted.regs.cr, "{:?}: CR differs", mode);
            assert_eq!(compiled.regs.xer, interpreted.regs.xer, "{:?}: XER differs", mode);
        }
    }
}

#[test]
fn test_simple_add_rom() {
    TestRom::new(&[
        0x3880000A, // li r4, 10
        0x38A00014, // li r5, 20
        0x7C642A14, // add r3, r4, r5
        0x4E800020, // blr
    ])
    .expect(3, 30)
    .expect(4, 10)
    .expect(5, 20)
    .execute_and_verify();
}

#[test]
fn test_addc_sets_carry() {
    TestRom::new(&[
        0x7C642814, // addc r3, r4, r5
        0x7CC102A6, // mfxer r6
        0x7CE70194, // addze r7, r7
        0x4E800020, // blr
    ])
    .with(4, u64::MAX)
    .with(5, 1)
    .expect(3, 0)
    .expect(6, XER_CA)
    .expect(7, 1)
    .execute_and_verify();
}

#[test]
fn test_counted_loop() {
    TestRom::new(&[
        0x38600000, // li r3, 0
        0x3880000A, // li r4, 10
        0x7C8903A6, // mtctr r4
        0x7C632214, // loop: add r3, r3, r4
        0x3884FFFF, // addi r4, r4, -1
        0x4200FFF8, // bdnz loop
        0x4E800020, // blr
    ])
    .expect(3, 55)
    .execute_and_verify();
}

#[test]
fn test_compare_and_branch() {
    TestRom::new(&[
        0x38600005, // li r3, 5
        0x2C030005, // cmpwi r3, 5
        0x41820008, // beq +8
        0x38600000, // li r3, 0
        0x4E800020, // blr
    ])
    .expect(3, 5)
    .execute_and_verify();
}

#[test]
fn test_rotate_and_divide() {
    TestRom::new(&[
        0x5483463E, // rlwinm r3, r4, 8, 24, 31
        0x7CA62B96, // divwu r5, r6, r5
        0x4E800020, // blr
    ])
    .with(4, 0x1234_5678)
    .with(5, 7)
    .with(6, 100)
    .expect(3, 0x12)
    .expect(5, 14)
    .execute_and_verify();
}

#[test]
fn test_call_and_return() {
    TestRom::new(&[
        0x7C0802A6, // mflr r0
        0x48000011, // bl sub
        0x38630001, // addi r3, r3, 1
        0x7C0803A6, // mtlr r0
        0x4E800020, // blr
        0x38600029, // sub: li r3, 41
        0x4E800020, // blr
    ])
    .expect(3, 42)
    .execute_and_verify();
}

#[test]
fn test_load_store() {
    TestRom::new(&[
        0x38A08000, // li r5, 0x8000 (sign-extended)
        0x54A5043E, // clrlwi r5, r5, 16
        0x38801234, // li r4, 0x1234
        0x90850000, // stw r4, 0(r5)
        0x80650000, // lwz r3, 0(r5)
        0x4E800020, // blr
    ])
    .expect(3, 0x1234)
    .expect(5, DATA as u64)
    .execute_and_verify();
}

#[test]
fn test_reservation_without_interference() {
    let rom = TestRom::new(&[
        0x7C602028, // lwarx r3, 0, r4
        0x7CA0212D, // stwcx. r5, 0, r4
        0x7CC00026, // mfcr r6
        0x4E800020, // blr
    ])
    .with(4, DATA as u64)
    .with(5, 7)
    .expect(6, (CR_EQ as u64) << 28);
    rom.execute_and_verify();

    let thread = rom.run_interpreted();
    assert_eq!(thread.memory().read_be32(DATA).unwrap(), 7);
}

#[test]
fn test_reservation_lost_to_external_write() {
    let rom = TestRom::new(&[
        0x7C602028, // lwarx r3, 0, r4
        0x7CA0212D, // stwcx. r5, 0, r4
        0x4E800020, // blr
    ])
    .with(4, DATA as u64)
    .with(5, 7);
    let (memory, mut thread) = rom.load();
    let interpreter = PpuInterpreter::new(Arc::clone(&memory));

    interpreter.step(&mut thread).unwrap();
    memory.write_be32(DATA, 99).unwrap();
    interpreter.step(&mut thread).unwrap();

    assert_eq!(thread.cr_field(0) & CR_EQ, 0);
    assert_eq!(memory.read_be32(DATA).unwrap(), 99);
}

#[test]
fn test_compiled_calls_fewer_steps() {
    let rom = TestRom::new(&[
        0x38600000, // li r3, 0
        0x3880000A, // li r4, 10
        0x7C8903A6, // mtctr r4
        0x7C632214, // loop: add r3, r3, r4
        0x3884FFFF, // addi r4, r4, -1
        0x4200FFF8, // bdnz loop
        0x4E800020, // blr
    ]);
    let (memory, mut thread) = rom.load();
    let interpreted = PpuInterpreter::new(memory).run(&mut thread, MAX_STEPS).unwrap();

    let (memory, mut thread) = rom.load();
    let executor = CompiledExecutor::with_evaluator(Arc::new(PpuInterpreter::new(memory)), TranslatorMode::Module);
    executor.add_segment(CODE, 28).unwrap();
    let compiled = executor.run(&mut thread, MAX_STEPS).unwrap();

    assert_eq!(compiled, 1);
    assert!(interpreted > compiled);
    assert_eq!(thread.gpr(3), 55);
}
