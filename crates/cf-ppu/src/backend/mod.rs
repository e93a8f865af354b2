//! Code generation seam and compiled-code execution
//!
//! A [`CodeGenerator`] turns an HIR module into callable functions, one per
//! lowered guest function. [`CompiledExecutor`] keeps them in a
//! [`CodeCache`] keyed by guest address and runs a thread through compiled
//! functions where it has them and the interpreter everywhere else.

pub mod evaluator;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cf_core::config::TranslatorMode;
use cf_core::error::PpuError;
use cf_core::{ppu_debug, ppu_info, ppu_warn};
use parking_lot::RwLock;

use crate::frontend::Segment;
use crate::interpreter::PpuInterpreter;
use crate::recompiler::{translate_function, translate_segment, Translation};
use crate::thread::PpuThread;

pub use evaluator::HirEvaluator;

/// Guest function ready to run against a thread's register file
pub trait CompiledFunction: Send + Sync {
    /// Guest address of the function entry
    fn address(&self) -> u32;

    fn name(&self) -> &str;

    /// Run the function to its return; arguments and results travel in
    /// the thread's registers
    fn call(&self, thread: &mut PpuThread) -> Result<(), PpuError>;
}

/// Turns HIR modules into compiled functions
pub trait CodeGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile every defined function of `module` that came from guest code
    fn compile(&self, module: &crate::hir::Module) -> Result<Vec<Arc<dyn CompiledFunction>>, PpuError>;
}

/// Compiled functions by guest entry address
#[derive(Default)]
pub struct CodeCache {
    functions: RwLock<HashMap<u32, Arc<dyn CompiledFunction>>>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u32) -> Option<Arc<dyn CompiledFunction>> {
        self.functions.read().get(&address).cloned()
    }

    pub fn insert(&self, function: Arc<dyn CompiledFunction>) {
        self.functions.write().insert(function.address(), function);
    }

    pub fn contains(&self, address: u32) -> bool {
        self.functions.read().contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Drop functions whose entry lies in `[address, address + size)`
    ///
    /// Returns how many were dropped.
    pub fn invalidate(&self, address: u32, size: u32) -> usize {
        let end = address as u64 + size as u64;
        let mut functions = self.functions.write();
        let before = functions.len();
        functions.retain(|entry, _| (*entry as u64) < address as u64 || *entry as u64 >= end);
        before - functions.len()
    }

    pub fn clear(&self) {
        self.functions.write().clear();
    }
}

/// Runs threads through compiled functions, falling back to the interpreter
///
/// In [`TranslatorMode::Module`] every function of a segment is lowered and
/// compiled when the segment is added. In [`TranslatorMode::Function`] a
/// function is compiled the first time a thread reaches its entry.
pub struct CompiledExecutor {
    interpreter: Arc<PpuInterpreter>,
    generator: Box<dyn CodeGenerator>,
    mode: TranslatorMode,
    cache: CodeCache,
    segments: RwLock<Vec<Segment>>,
    /// Entries left to the interpreter because they could not be compiled
    rejected: RwLock<HashSet<u32>>,
    calls: AtomicU64,
}

impl CompiledExecutor {
    pub fn new(interpreter: Arc<PpuInterpreter>, generator: Box<dyn CodeGenerator>, mode: TranslatorMode) -> Self {
        ppu_info!("Compiled executor using {} in {:?} mode", generator.name(), mode);
        Self {
            interpreter,
            generator,
            mode,
            cache: CodeCache::new(),
            segments: RwLock::new(Vec::new()),
            rejected: RwLock::new(HashSet::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Executor evaluating HIR on top of `interpreter`
    pub fn with_evaluator(interpreter: Arc<PpuInterpreter>, mode: TranslatorMode) -> Self {
        let generator = Box::new(HirEvaluator::new(Arc::clone(&interpreter)));
        Self::new(interpreter, generator, mode)
    }

    pub fn interpreter(&self) -> &Arc<PpuInterpreter> {
        &self.interpreter
    }

    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Compiled functions entered so far
    pub fn compiled_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Analyze the code in `[address, address + size)` and make it eligible
    /// for compilation
    ///
    /// Returns the number of functions discovered.
    pub fn add_segment(&self, address: u32, size: u32) -> Result<usize, PpuError> {
        let mut segment = Segment::new(address, size);
        segment.analyze(self.interpreter.memory());
        let count = segment.functions.len();
        ppu_info!(
            "Segment 0x{:08x}-0x{:08x}: {} functions",
            segment.address,
            segment.end(),
            count
        );

        if self.mode == TranslatorMode::Module {
            let translation = translate_segment(self.interpreter.memory(), &segment);
            self.install(translation)?;
        }
        self.segments.write().push(segment);
        Ok(count)
    }

    /// Forget compiled code for `[address, address + size)` so it is
    /// translated again from current memory
    pub fn invalidate(&self, address: u32, size: u32) {
        let dropped = self.cache.invalidate(address, size);
        let end = address as u64 + size as u64;
        self.rejected
            .write()
            .retain(|entry| (*entry as u64) < address as u64 || *entry as u64 >= end);
        let mut segments = self.segments.write();
        for segment in segments.iter_mut() {
            if (segment.address as u64) < end && segment.end() > address as u64 {
                segment.analyze(self.interpreter.memory());
            }
        }
        ppu_debug!("Invalidated {} compiled functions at 0x{:08x}", dropped, address);
    }

    fn install(&self, translation: Translation) -> Result<(), PpuError> {
        if translation.errors > 0 {
            ppu_warn!(
                "{}: {} instructions could not be lowered, {} functions left to the interpreter",
                translation.module.name,
                translation.errors,
                translation.incomplete.len()
            );
        }
        let compiled = self.generator.compile(&translation.module)?;
        let mut rejected = self.rejected.write();
        rejected.extend(translation.incomplete.iter().copied());
        for function in compiled {
            if !rejected.contains(&function.address()) {
                self.cache.insert(function);
            }
        }
        Ok(())
    }

    /// Compiled function entered at `address`, compiling it when needed
    pub fn lookup(&self, address: u32) -> Option<Arc<dyn CompiledFunction>> {
        if let Some(function) = self.cache.get(address) {
            return Some(function);
        }
        if self.mode != TranslatorMode::Function || self.rejected.read().contains(&address) {
            return None;
        }

        let translation = {
            let segments = self.segments.read();
            let segment = segments.iter().find(|s| s.function_at(address).is_some())?;
            translate_function(self.interpreter.memory(), segment, address)
        };
        let result = translation.and_then(|translation| self.install(translation));
        if let Err(e) = result {
            ppu_warn!("Compiling 0x{:08x} failed: {}", address, e);
            self.rejected.write().insert(address);
        }
        self.cache.get(address)
    }

    /// Run one compiled function to its return, or one instruction
    pub fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        let pc = thread.pc() as u32;
        match self.lookup(pc) {
            Some(function) => {
                function.call(thread)?;
                self.calls.fetch_add(1, Ordering::Relaxed);
                thread.set_pc(thread.regs.lr);
                Ok(())
            }
            None => self.interpreter.step(thread),
        }
    }

    /// Step until the thread returns to address 0 or `max_steps` steps ran
    pub fn run(&self, thread: &mut PpuThread, max_steps: u64) -> Result<u64, PpuError> {
        let mut steps = 0;
        while steps < max_steps && thread.pc() != 0 {
            self.step(thread)?;
            steps += 1;
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_memory::MemoryManager;

    struct Fixed(u32);

    impl CompiledFunction for Fixed {
        fn address(&self) -> u32 {
            self.0
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn call(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
            thread.set_gpr(3, 42);
            Ok(())
        }
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = CodeCache::new();
        cache.insert(Arc::new(Fixed(0x1000)));
        cache.insert(Arc::new(Fixed(0x2000)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.invalidate(0x1000, 0x1000), 1);
        assert!(!cache.contains(0x1000));
        assert!(cache.contains(0x2000));
    }

    fn executor(mode: TranslatorMode, code: &[u32]) -> (CompiledExecutor, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        for (n, word) in code.iter().enumerate() {
            memory.write_be32(0x10000 + 4 * n as u32, *word).unwrap();
        }
        let interpreter = Arc::new(PpuInterpreter::new(Arc::clone(&memory)));
        let executor = CompiledExecutor::with_evaluator(interpreter, mode);
        let mut thread = PpuThread::new(1, memory);
        thread.set_pc(0x10000);
        (executor, thread)
    }

    #[test]
    fn test_function_mode_compiles_on_entry() {
        // li r3, 7 ; addi r3, r3, 1 ; blr
        let (executor, mut thread) = executor(TranslatorMode::Function, &[0x38600007, 0x38630001, 0x4E800020]);
        executor.add_segment(0x10000, 12).unwrap();
        assert!(executor.cache().is_empty());
        let steps = executor.run(&mut thread, 100).unwrap();
        assert_eq!(steps, 1);
        assert_eq!(thread.gpr(3), 8);
        assert_eq!(executor.compiled_calls(), 1);
        assert!(executor.cache().contains(0x10000));
    }

    #[test]
    fn test_module_mode_compiles_up_front() {
        let (executor, mut thread) = executor(TranslatorMode::Module, &[0x38600007, 0x4E800020]);
        executor.add_segment(0x10000, 8).unwrap();
        assert!(executor.cache().contains(0x10000));
        executor.run(&mut thread, 100).unwrap();
        assert_eq!(thread.gpr(3), 7);
        assert_eq!(thread.pc(), 0);
    }

    #[test]
    fn test_unknown_code_is_interpreted() {
        // No segment registered: every step interprets
        let (executor, mut thread) = executor(TranslatorMode::Function, &[0x38600005, 0x4E800020]);
        let steps = executor.run(&mut thread, 100).unwrap();
        assert_eq!(steps, 2);
        assert_eq!(thread.gpr(3), 5);
        assert_eq!(executor.compiled_calls(), 0);
    }
}
