//! PPU (PowerPC Processing Unit) execution engine for cellforge
//!
//! Guest instruction words resolve through the [`decoder`] tables to one
//! entry per mnemonic, which carries three handlers: an interpreter handler
//! that executes the instruction against a [`PpuThread`], an analyzer
//! handler that records the registers it touches and a recompiler handler
//! that lowers it to [`hir`]. The [`frontend`] discovers functions in a code
//! segment ahead of time; the [`backend`] runs lowered functions and
//! [`cell`] drives guest threads on host threads.

pub mod analyzer;
pub mod backend;
pub mod cell;
pub mod decoder;
pub mod frontend;
pub mod hir;
pub mod instruction;
pub mod instructions;
pub mod interpreter;
pub mod recompiler;
pub mod syscall;
pub mod thread;
pub mod vmx;

pub use backend::{CodeGenerator, CompiledExecutor, CompiledFunction, HirEvaluator};
pub use cell::{Executor, GuestThread, ThreadRegistry, ThreadStatus};
pub use frontend::Segment;
pub use instruction::Instruction;
pub use interpreter::PpuInterpreter;
pub use syscall::SyscallHandler;
pub use thread::PpuThread;
