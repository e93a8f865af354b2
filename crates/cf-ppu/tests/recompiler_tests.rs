//! Lowering checks and compiled-versus-interpreted equivalence
//!
//! Equivalence programs run once on the interpreter and once through the
//! HIR evaluator in module mode, each against its own memory, and the full
//! register file plus a data window must match afterwards.

use std::sync::Arc;

use cf_core::config::TranslatorMode;
use cf_memory::{MemoryManager, PageFlags};
use cf_ppu::hir::InstKind;
use cf_ppu::recompiler::{translate_function, translate_segment};
use cf_ppu::vmx::V128;
use cf_ppu::{CompiledExecutor, PpuInterpreter, PpuThread, Segment};

const CODE: u32 = 0x0001_0000;
const DATA: u32 = 0x0000_8000;
const MAX_STEPS: u64 = 10_000;

fn load(code: &[u32]) -> (Arc<MemoryManager>, Segment) {
    let memory = MemoryManager::new().unwrap();
    for (n, word) in code.iter().enumerate() {
        memory.write_be32(CODE + 4 * n as u32, *word).unwrap();
    }
    let mut segment = Segment::new(CODE, 4 * code.len() as u32);
    segment.analyze(&memory);
    (memory, segment)
}

#[test]
fn test_unconditional_branch_is_single_terminator() {
    let (memory, segment) = load(&[
        0x48000008, // b +8
        0x60000000, // nop (skipped)
        0x38600001, // li r3, 1
        0x4E800020, // blr
    ]);
    let translation = translate_function(&memory, &segment, CODE).unwrap();
    assert_eq!(translation.errors, 0);

    let function = &translation.module.functions[0];
    let entry = function.blocks.iter().find(|b| b.name == "loc_00010000").unwrap();
    let target = function.blocks.iter().find(|b| b.name == "loc_00010008").unwrap();
    let terminators: Vec<_> = entry.insts.iter().filter(|inst| inst.kind.is_terminator()).collect();
    assert_eq!(terminators.len(), 1);
    match &terminators[0].kind {
        InstKind::Br { target: id } => assert_eq!(*id, target.id),
        other => panic!("expected br, got {:?}", other),
    }
    assert!(!function.blocks.iter().any(|b| b.name == "loc_00010004"));
}

const CALL_AND_RETURN: [u32; 7] = [
    0x7C0802A6, // mflr r0
    0x48000011, // bl sub
    0x38630001, // addi r3, r3, 1
    0x7C0803A6, // mtlr r0
    0x4E800020, // blr
    0x38600029, // sub: li r3, 41
    0x4E800020, // blr
];

#[test]
fn test_segment_translation_defines_every_function() {
    let (memory, segment) = load(&CALL_AND_RETURN);
    let translation = translate_segment(&memory, &segment);
    assert_eq!(translation.errors, 0);
    assert!(translation.incomplete.is_empty());
    assert_eq!(translation.module.functions.len(), 2);
    assert!(translation.module.functions.iter().all(|f| !f.is_declaration()));
    for function in &translation.module.functions {
        function.verify().unwrap();
    }

    let dump = translation.module.to_string();
    assert!(dump.contains("; guest 0x00010000"));
    assert!(dump.contains("; guest 0x00010014"));
    assert!(!dump.contains("declare"));
}

#[test]
fn test_function_translation_declares_callees() {
    let (memory, segment) = load(&CALL_AND_RETURN);
    let translation = translate_function(&memory, &segment, CODE).unwrap();
    let module = &translation.module;
    assert_eq!(module.functions.len(), 2);
    assert!(!module.functions[0].is_declaration());
    assert!(module.functions[1].is_declaration());

    let dump = module.to_string();
    assert!(dump.contains("define"));
    assert!(dump.contains("declare"));
}

#[test]
fn test_translation_of_unknown_address_fails() {
    let (memory, segment) = load(&CALL_AND_RETURN);
    assert!(translate_function(&memory, &segment, CODE + 4).is_err());
}

#[test]
fn test_unlowered_instruction_leaves_function_to_interpreter() {
    let code = [
        0x38600003, // li r3, 3
        0xFC00048E, // mffs f0
        0x38630004, // addi r3, r3, 4
        0x4E800020, // blr
    ];
    let (memory, segment) = load(&code);
    let translation = translate_segment(&memory, &segment);
    assert_eq!(translation.errors, 1);
    assert_eq!(translation.incomplete, vec![CODE]);

    let executor = CompiledExecutor::with_evaluator(Arc::new(PpuInterpreter::new(Arc::clone(&memory))), TranslatorMode::Module);
    executor.add_segment(CODE, 16).unwrap();
    assert!(!executor.cache().contains(CODE));

    let mut thread = PpuThread::new(0, memory);
    thread.regs.lr = 0;
    thread.set_pc(CODE as u64);
    executor.run(&mut thread, MAX_STEPS).unwrap();
    assert_eq!(thread.gpr(3), 7);
    assert_eq!(executor.compiled_calls(), 0);
}

#[test]
fn test_function_at_top_of_memory_runs_compiled() {
    let memory = MemoryManager::new().unwrap();
    memory.map(0xFFFF_F000, 0x1000, PageFlags::RWX).unwrap();
    memory.write_be32(0xFFFF_FFF8, 0x38600005).unwrap(); // li r3, 5
    memory.write_be32(0xFFFF_FFFC, 0x4E800020).unwrap(); // blr

    let executor = CompiledExecutor::with_evaluator(Arc::new(PpuInterpreter::new(Arc::clone(&memory))), TranslatorMode::Module);
    assert_eq!(executor.add_segment(0xFFFF_F000, 0x1000).unwrap(), 1);
    assert!(executor.cache().contains(0xFFFF_FFF8));

    let mut thread = PpuThread::new(0, Arc::clone(&memory));
    thread.regs.lr = 0;
    thread.set_pc(0xFFFF_FFF8);
    executor.run(&mut thread, MAX_STEPS).unwrap();
    assert_eq!(thread.gpr(3), 5);

    executor.invalidate(0xFFFF_F000, 0x1000);
    assert!(!executor.cache().contains(0xFFFF_FFF8));
}

/// Program plus the state it starts from
struct Program {
    code: Vec<u32>,
    setup: fn(&mut PpuThread),
}

impl Program {
    fn start(&self) -> PpuThread {
        let memory = MemoryManager::new().unwrap();
        for (n, word) in self.code.iter().enumerate() {
            memory.write_be32(CODE + 4 * n as u32, *word).unwrap();
        }
        let mut thread = PpuThread::new(0, memory);
        (self.setup)(&mut thread);
        thread.regs.lr = 0;
        thread.set_pc(CODE as u64);
        thread
    }

    /// Run both ways and require identical architectural state
    fn check(&self) -> PpuThread {
        let mut interpreted = self.start();
        PpuInterpreter::new(Arc::clone(interpreted.memory()))
            .run(&mut interpreted, MAX_STEPS)
            .unwrap();
        assert_eq!(interpreted.pc(), 0);

        let mut compiled = self.start();
        let executor = CompiledExecutor::with_evaluator(
            Arc::new(PpuInterpreter::new(Arc::clone(compiled.memory()))),
            TranslatorMode::Module,
        );
        executor.add_segment(CODE, 4 * self.code.len() as u32).unwrap();
        assert!(executor.cache().contains(CODE));
        executor.run(&mut compiled, MAX_STEPS).unwrap();
        assert_eq!(compiled.pc(), 0);
        assert!(executor.compiled_calls() > 0);

        let (a, b) = (&interpreted.regs, &compiled.regs);
        for n in 0..32 {
            assert_eq!(a.gpr[n], b.gpr[n], "r{} differs", n);
            assert_eq!(a.fpr[n].to_bits(), b.fpr[n].to_bits(), "f{} differs", n);
            assert_eq!(a.vr[n], b.vr[n], "v{} differs", n);
        }
        assert_eq!(a.cr, b.cr, "CR differs");
        assert_eq!(a.xer, b.xer, "XER differs");
        assert_eq!(a.ctr, b.ctr, "CTR differs");
        assert_eq!(a.lr, b.lr, "LR differs");

        let mut left = [0u8; 64];
        let mut right = [0u8; 64];
        interpreted.memory().read_bytes(DATA, &mut left).unwrap();
        compiled.memory().read_bytes(DATA, &mut right).unwrap();
        assert_eq!(left, right, "data differs");
        interpreted
    }
}

#[test]
fn test_integer_program_matches_interpreter() {
    let thread = Program {
        code: vec![
            0x7CC429D6, // mullw r6, r4, r5
            0x7CE52051, // subf. r7, r5, r4
            0x7C881E70, // srawi r8, r4, 3
            0x7CA90034, // cntlzw r9, r5
            0x7C8A0734, // extsh r10, r4
            0x788B8000, // rldicl r11, r4, 16, 0
            0x4E800020, // blr
        ],
        setup: |t| {
            t.set_gpr(4, 0xFFFF_FFFF_8765_4321);
            t.set_gpr(5, 0x1234);
        },
    }
    .check();
    assert_eq!(thread.gpr(9), 19);
    assert_eq!(thread.gpr(10), 0x4321);
}

#[test]
fn test_float_program_matches_interpreter() {
    let thread = Program {
        code: vec![
            0xFC22182A, // fadd f1, f2, f3
            0xFC8200F2, // fmul f4, f2, f3
            0xFC821800, // fcmpu cr1, f2, f3
            0xFCA0201E, // fctiwz f5, f4
            0xFCC01050, // fneg f6, f2
            0xECE208FA, // fmadds f7, f2, f3, f1
            0x4E800020, // blr
        ],
        setup: |t| {
            t.set_fpr(2, 1.5);
            t.set_fpr(3, -2.25);
        },
    }
    .check();
    assert_eq!(thread.fpr(1), -0.75);
    assert_eq!(thread.fpr(4), -3.375);
    assert_eq!(thread.fpr(5).to_bits(), 0xFFFF_FFFD);
    assert_eq!(thread.fpr(7), -4.125);
}

#[test]
fn test_vector_program_matches_interpreter() {
    let thread = Program {
        code: vec![
            0x10221880, // vadduwm v1, v2, v3
            0x1081128C, // vspltw v4, v2, 1
            0x10A224C4, // vxor v5, v2, v4
            0x10C21C86, // vcmpequw. v6, v2, v3
            0x4E800020, // blr
        ],
        setup: |t| {
            t.set_vr(2, V128::from_u32x4([1, 2, 3, 4]));
            t.set_vr(3, V128::from_u32x4([1, 5, 3, 7]));
        },
    }
    .check();
    assert_eq!(thread.vr(1), V128::from_u32x4([2, 7, 6, 11]));
    assert_eq!(thread.vr(4), V128::from_u32x4([2, 2, 2, 2]));
    assert_eq!(thread.vr(6), V128::from_u32x4([u32::MAX, 0, u32::MAX, 0]));
}

#[test]
fn test_memory_loop_matches_interpreter() {
    let thread = Program {
        code: vec![
            0x38A00004, // li r5, 4
            0x7CA903A6, // mtctr r5
            0x38C4FFFC, // addi r6, r4, -4
            0x94A60004, // loop: stwu r5, 4(r6)
            0x38A5000A, // addi r5, r5, 10
            0x4200FFF8, // bdnz loop
            0x80640008, // lwz r3, 8(r4)
            0x4E800020, // blr
        ],
        setup: |t| t.set_gpr(4, DATA as u64),
    }
    .check();
    assert_eq!(thread.gpr(3), 24);
    assert_eq!(thread.memory().read_be32(DATA + 12).unwrap(), 34);
}
