//! Register usage analysis
//!
//! Every dispatch table entry carries an analyze handler that marks the
//! registers its instruction reads and writes. Accumulating those marks over
//! a function tells which registers carry values in (arguments) and out
//! (return values) of it, and which registers the recompiler has to model.

pub mod handlers;

use bitflags::bitflags;

bitflags! {
    /// Accumulated accesses to one register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegisterFlags: u8 {
        const READ      = 0b001;
        const WRITE     = 0b010;
        /// The value held on entry was read before any write
        const READ_ORIG = 0b100;
    }
}

/// Guest register tracked by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    Gpr(u8),
    Fpr(u8),
    Vr(u8),
    /// One 4-bit condition register field
    Cr(u8),
    Lr,
    Ctr,
    Xer,
    Fpscr,
    Vscr,
}

impl Reg {
    pub const COUNT: usize = 32 * 3 + 8 + 5;

    pub const fn index(self) -> usize {
        match self {
            Reg::Gpr(n) => n as usize,
            Reg::Fpr(n) => 32 + n as usize,
            Reg::Vr(n) => 64 + n as usize,
            Reg::Cr(n) => 96 + n as usize,
            Reg::Lr => 104,
            Reg::Ctr => 105,
            Reg::Xer => 106,
            Reg::Fpscr => 107,
            Reg::Vscr => 108,
        }
    }

    pub const fn from_index(index: usize) -> Option<Reg> {
        Some(match index {
            0..=31 => Reg::Gpr(index as u8),
            32..=63 => Reg::Fpr((index - 32) as u8),
            64..=95 => Reg::Vr((index - 64) as u8),
            96..=103 => Reg::Cr((index - 96) as u8),
            104 => Reg::Lr,
            105 => Reg::Ctr,
            106 => Reg::Xer,
            107 => Reg::Fpscr,
            108 => Reg::Vscr,
            _ => return None,
        })
    }

    /// Every register, in index order
    pub fn all() -> impl Iterator<Item = Reg> {
        (0..Self::COUNT).filter_map(Reg::from_index)
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reg::Gpr(n) => write!(f, "r{}", n),
            Reg::Fpr(n) => write!(f, "f{}", n),
            Reg::Vr(n) => write!(f, "v{}", n),
            Reg::Cr(n) => write!(f, "cr{}", n),
            Reg::Lr => write!(f, "lr"),
            Reg::Ctr => write!(f, "ctr"),
            Reg::Xer => write!(f, "xer"),
            Reg::Fpscr => write!(f, "fpscr"),
            Reg::Vscr => write!(f, "vscr"),
        }
    }
}

/// Kind of a parameter passed in registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// 64-bit integer in r3-r10
    Integer,
    /// Double in f1-f13
    Float,
    /// 128-bit vector in v2-v13
    Vector,
}

/// Kind of value a function leaves in its return registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKind {
    #[default]
    Void,
    /// r3
    Integer,
    /// f1
    Float,
    /// f1-f2
    FloatX2,
    /// f1-f3
    FloatX3,
    /// f1-f4
    FloatX4,
    /// v2
    Vector,
}

/// Per-register access summary
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterUsage {
    flags: [RegisterFlags; Reg::COUNT],
}

impl Default for RegisterUsage {
    fn default() -> Self {
        Self {
            flags: [RegisterFlags::empty(); Reg::COUNT],
        }
    }
}

impl RegisterUsage {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> RegisterFlags {
        self.flags[reg.index()]
    }

    /// Mark a read; the first access decides whether the entry value is live
    #[inline]
    pub fn read(&mut self, reg: Reg) {
        let flags = &mut self.flags[reg.index()];
        if flags.is_empty() {
            *flags = RegisterFlags::READ | RegisterFlags::READ_ORIG;
        }
    }

    #[inline]
    pub fn write(&mut self, reg: Reg) {
        self.flags[reg.index()].insert(RegisterFlags::WRITE);
    }

    #[inline]
    pub fn is_used(&self, reg: Reg) -> bool {
        !self.get(reg).is_empty()
    }

    #[inline]
    pub fn is_written(&self, reg: Reg) -> bool {
        self.get(reg).contains(RegisterFlags::WRITE)
    }

    #[inline]
    pub fn is_read_orig(&self, reg: Reg) -> bool {
        self.get(reg).contains(RegisterFlags::READ_ORIG)
    }

    /// Registers with any recorded access
    pub fn used(&self) -> impl Iterator<Item = Reg> + '_ {
        Reg::all().filter(|reg| self.is_used(*reg))
    }

    pub fn written(&self) -> impl Iterator<Item = Reg> + '_ {
        Reg::all().filter(|reg| self.is_written(*reg))
    }

    #[inline]
    pub fn read_gpr(&mut self, n: usize) {
        self.read(Reg::Gpr(n as u8));
    }

    #[inline]
    pub fn write_gpr(&mut self, n: usize) {
        self.write(Reg::Gpr(n as u8));
    }

    /// `(rA|0)`: r0 as a base means literal zero
    #[inline]
    pub fn read_gpr_or_zero(&mut self, n: usize) {
        if n != 0 {
            self.read_gpr(n);
        }
    }

    #[inline]
    pub fn read_fpr(&mut self, n: usize) {
        self.read(Reg::Fpr(n as u8));
    }

    #[inline]
    pub fn write_fpr(&mut self, n: usize) {
        self.write(Reg::Fpr(n as u8));
    }

    #[inline]
    pub fn read_vr(&mut self, n: usize) {
        self.read(Reg::Vr(n as u8));
    }

    #[inline]
    pub fn write_vr(&mut self, n: usize) {
        self.write(Reg::Vr(n as u8));
    }

    #[inline]
    pub fn read_cr(&mut self, field: usize) {
        self.read(Reg::Cr(field as u8));
    }

    #[inline]
    pub fn write_cr(&mut self, field: usize) {
        self.write(Reg::Cr(field as u8));
    }

    /// Partial update of a field: the untouched bits are carried over
    #[inline]
    pub fn modify_cr(&mut self, field: usize) {
        self.read_cr(field);
        self.write_cr(field);
    }

    #[inline]
    pub fn modify(&mut self, reg: Reg) {
        self.read(reg);
        self.write(reg);
    }

    /// Fold in the summary of a called function
    ///
    /// Values the callee consumed on entry become reads of the caller, and
    /// everything the callee wrote is written by the call.
    pub fn merge_call(&mut self, callee: &RegisterUsage) {
        for reg in Reg::all() {
            let flags = callee.get(reg);
            if flags.contains(RegisterFlags::READ_ORIG) {
                self.read(reg);
            }
            if flags.contains(RegisterFlags::WRITE) {
                self.write(reg);
            }
        }
    }

    /// Parameters in ABI slot order along with the register carrying each
    pub fn argument_shape(&self) -> (Vec<ArgKind>, Vec<Reg>) {
        let mut kinds = Vec::new();
        let mut regs = Vec::new();
        for slot in 0..13u8 {
            if slot < 8 && self.is_read_orig(Reg::Gpr(3 + slot)) {
                kinds.push(ArgKind::Integer);
                regs.push(Reg::Gpr(3 + slot));
            }
            if self.is_read_orig(Reg::Fpr(1 + slot)) {
                kinds.push(ArgKind::Float);
                regs.push(Reg::Fpr(1 + slot));
            }
            if slot < 12 && self.is_read_orig(Reg::Vr(2 + slot)) {
                kinds.push(ArgKind::Vector);
                regs.push(Reg::Vr(2 + slot));
            }
        }
        (kinds, regs)
    }

    pub fn return_shape(&self) -> ReturnKind {
        if self.is_written(Reg::Fpr(1)) {
            if self.is_written(Reg::Fpr(4)) {
                ReturnKind::FloatX4
            } else if self.is_written(Reg::Fpr(3)) {
                ReturnKind::FloatX3
            } else if self.is_written(Reg::Fpr(2)) {
                ReturnKind::FloatX2
            } else {
                ReturnKind::Float
            }
        } else if self.is_written(Reg::Vr(2)) {
            ReturnKind::Vector
        } else if self.is_written(Reg::Gpr(3)) {
            ReturnKind::Integer
        } else {
            ReturnKind::Void
        }
    }
}

impl std::fmt::Debug for RegisterUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.used().map(|reg| (reg, self.get(reg))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_index_roundtrip() {
        for reg in Reg::all() {
            assert_eq!(Reg::from_index(reg.index()), Some(reg));
        }
        assert_eq!(Reg::all().count(), Reg::COUNT);
        assert_eq!(Reg::from_index(Reg::COUNT), None);
    }

    #[test]
    fn test_read_before_write_is_original() {
        let mut usage = RegisterUsage::new();
        usage.read_gpr(3);
        usage.write_gpr(3);
        assert!(usage.is_read_orig(Reg::Gpr(3)));
        assert!(usage.is_written(Reg::Gpr(3)));

        usage.write_gpr(4);
        usage.read_gpr(4);
        assert!(!usage.is_read_orig(Reg::Gpr(4)));
        assert_eq!(usage.get(Reg::Gpr(4)), RegisterFlags::WRITE);
    }

    #[test]
    fn test_argument_shape_slot_order() {
        let mut usage = RegisterUsage::new();
        usage.read_gpr(3);
        usage.read_fpr(1);
        usage.read_gpr(4);
        usage.read_vr(2);
        let (kinds, regs) = usage.argument_shape();
        assert_eq!(
            kinds,
            vec![ArgKind::Integer, ArgKind::Float, ArgKind::Vector, ArgKind::Integer]
        );
        assert_eq!(regs, vec![Reg::Gpr(3), Reg::Fpr(1), Reg::Vr(2), Reg::Gpr(4)]);
    }

    #[test]
    fn test_return_shape() {
        let mut usage = RegisterUsage::new();
        assert_eq!(usage.return_shape(), ReturnKind::Void);
        usage.write_gpr(3);
        assert_eq!(usage.return_shape(), ReturnKind::Integer);
        usage.write_vr(2);
        assert_eq!(usage.return_shape(), ReturnKind::Vector);
        usage.write_fpr(1);
        usage.write_fpr(2);
        assert_eq!(usage.return_shape(), ReturnKind::FloatX2);
        usage.write_fpr(4);
        assert_eq!(usage.return_shape(), ReturnKind::FloatX4);
    }

    #[test]
    fn test_merge_call() {
        let mut callee = RegisterUsage::new();
        callee.read_gpr(3);
        callee.write_gpr(3);
        callee.write_gpr(5);
        callee.write_gpr(6);
        callee.read_gpr(6);

        let mut caller = RegisterUsage::new();
        caller.write_gpr(5);
        caller.merge_call(&callee);
        assert!(caller.is_read_orig(Reg::Gpr(3)));
        assert!(caller.is_written(Reg::Gpr(3)));
        assert!(!caller.is_read_orig(Reg::Gpr(5)));
        assert!(!caller.is_read_orig(Reg::Gpr(6)));
        assert!(caller.is_written(Reg::Gpr(6)));
    }
}
