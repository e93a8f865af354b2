//! High-level intermediate representation
//!
//! Typed three-address code in basic blocks. Values are constants,
//! function arguments or the result of exactly one instruction; guest
//! registers live in `alloca` slots, so no phi nodes are needed. Guest
//! register state outside the function is reached with `ctx_load` and
//! `ctx_store` at byte offsets into the thread's register file.

pub mod builder;
pub mod function;
pub mod instruction;
pub mod types;

pub use builder::Builder;
pub use function::{Block, Function, GuestAbi, Module, ValueData, ValueDef};
pub use instruction::{
    BinaryOp, BlockId, Callee, CastOp, CmpPred, FunctionId, Inst, InstKind, Intrinsic, UnaryOp, ValueId,
};
pub use types::{Constant, Type};
