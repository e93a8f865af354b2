//! HIR instructions

use std::fmt;

use super::types::Type;

/// SSA value handle, unique within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Block handle, unique within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Function handle, unique within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FunctionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Two-operand operations, result has the type of the left operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// High half of the signed double-width product
    MulHiS,
    /// High half of the unsigned double-width product
    MulHiU,
    SDiv,
    UDiv,
    And,
    Or,
    Xor,
    // Shift amounts at or past the width shift every bit out; AShr then
    // leaves copies of the sign bit
    Shl,
    LShr,
    AShr,
    /// Rotate left by the amount modulo the width
    Rotl,
    FAdd,
    FSub,
    FMul,
    FDiv,
    // Lane-wise vector arithmetic, wrapping
    VAdd8,
    VAdd16,
    VAdd32,
    VSub8,
    VSub16,
    VSub32,
    VAddF32,
    VSubF32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    FNeg,
    FAbs,
    FSqrt,
    /// Round toward zero, staying a float
    FTrunc,
    /// Count leading zeros
    Ctlz,
    ByteSwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpTrunc,
    FpExt,
    /// Saturating float to signed integer; NaN gives the minimum value
    FpToSi,
    SiToFp,
    Bitcast,
}

/// Comparison predicates, result is an `i8` holding 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
    /// Ordered float comparisons are false when either side is NaN
    FOeq,
    FOlt,
    FOgt,
    FOge,
    /// Either side is NaN
    FUno,
}

/// Operations with no direct single-instruction equivalent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `(a, b, carry_in) -> i8` unsigned carry out of `a + b + carry_in`
    AddCarry,
    /// `(a, b, carry_in) -> i8` signed overflow of `a + b + carry_in`
    AddOverflow,
    /// `(a, b, c) -> a * b + c` with a single rounding
    Fma,
    /// `(value, mode) -> value` rounded to an integral float with an FPSCR[RN] mode
    RoundToIntegral,
    /// `(v, index) -> v` with word `index` copied to all four lanes
    VSplat32,
    /// `(a, b) -> v` all-ones lanes where the words are equal
    VCmpEq32,
    /// `(a, b, c) -> a * b + c` per f32 lane
    VMaddF32,
}

/// Target of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Another function of the module
    Function(FunctionId),
    /// Runtime symbol provided by the code generator's host
    Extern(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Storage slot private to the function
    Alloca { ty: Type },
    Load { ty: Type, addr: ValueId, big_endian: bool },
    Store { addr: ValueId, value: ValueId, big_endian: bool },
    /// Load from the guest thread context at a byte offset
    CtxLoad { ty: Type, offset: u32 },
    CtxStore { offset: u32, value: ValueId },
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
    Unary { op: UnaryOp, value: ValueId },
    Cast { op: CastOp, value: ValueId, ty: Type },
    Cmp { pred: CmpPred, lhs: ValueId, rhs: ValueId },
    Select { cond: ValueId, then_value: ValueId, else_value: ValueId },
    Intrinsic { op: Intrinsic, args: Vec<ValueId> },
    Call { callee: Callee, args: Vec<ValueId> },
    Fence,
    Br { target: BlockId },
    BrCond { cond: ValueId, then_block: BlockId, else_block: BlockId },
    Ret { value: Option<ValueId> },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Br { .. } | InstKind::BrCond { .. } | InstKind::Ret { .. })
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::BrCond {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }

    /// Values read by the instruction
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstKind::Alloca { .. } | InstKind::CtxLoad { .. } | InstKind::Fence | InstKind::Br { .. } => {
                Vec::new()
            }
            InstKind::Load { addr, .. } => vec![*addr],
            InstKind::Store { addr, value, .. } => vec![*addr, *value],
            InstKind::CtxStore { value, .. } => vec![*value],
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Unary { value, .. } | InstKind::Cast { value, .. } => vec![*value],
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => vec![*cond, *then_value, *else_value],
            InstKind::Intrinsic { args, .. } | InstKind::Call { args, .. } => args.clone(),
            InstKind::BrCond { cond, .. } => vec![*cond],
            InstKind::Ret { value } => value.iter().copied().collect(),
        }
    }
}

/// An instruction and the value it defines, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub result: Option<ValueId>,
    pub kind: InstKind,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_ascii_lowercase();
        f.write_str(&name)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_ascii_lowercase();
        f.write_str(&name)
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_ascii_lowercase();
        f.write_str(&name)
    }
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_ascii_lowercase();
        f.write_str(&name)
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intrinsic::AddCarry => "add_carry",
            Intrinsic::AddOverflow => "add_overflow",
            Intrinsic::Fma => "fma",
            Intrinsic::RoundToIntegral => "round_to_integral",
            Intrinsic::VSplat32 => "vsplat32",
            Intrinsic::VCmpEq32 => "vcmpeq32",
            Intrinsic::VMaddF32 => "vmaddf32",
        };
        f.write_str(name)
    }
}
