//! HIR types and constants

use std::fmt;

/// Type of an HIR value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    V128,
    /// Address of a storage slot created by `alloca`
    Ptr,
}

impl Type {
    /// Width in bits, 0 for `Void`
    pub const fn bits(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::I8 => 8,
            Type::I16 => 16,
            Type::I32 | Type::F32 => 32,
            Type::I64 | Type::F64 | Type::Ptr => 64,
            Type::V128 => 128,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::V128 => "v128",
            Type::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// Immediate value
///
/// Integers are stored zero-extended; signedness lives in the operations.
#[derive(Debug, Clone, Copy)]
pub enum Constant {
    I8(u8),
    I16(u16),
    I32(u32),
    I64(u64),
    F32(f32),
    F64(f64),
    V128(u128),
}

impl Constant {
    pub const fn ty(&self) -> Type {
        match self {
            Constant::I8(_) => Type::I8,
            Constant::I16(_) => Type::I16,
            Constant::I32(_) => Type::I32,
            Constant::I64(_) => Type::I64,
            Constant::F32(_) => Type::F32,
            Constant::F64(_) => Type::F64,
            Constant::V128(_) => Type::V128,
        }
    }

    /// Raw bit pattern, zero-extended
    pub fn bits(&self) -> u128 {
        match *self {
            Constant::I8(v) => v as u128,
            Constant::I16(v) => v as u128,
            Constant::I32(v) => v as u128,
            Constant::I64(v) => v as u128,
            Constant::F32(v) => v.to_bits() as u128,
            Constant::F64(v) => v.to_bits() as u128,
            Constant::V128(v) => v,
        }
    }

    /// Integer constant of type `ty` holding the low bits of `value`
    pub fn int(ty: Type, value: u64) -> Option<Constant> {
        Some(match ty {
            Type::I8 => Constant::I8(value as u8),
            Type::I16 => Constant::I16(value as u16),
            Type::I32 => Constant::I32(value as u32),
            Type::I64 => Constant::I64(value),
            _ => return None,
        })
    }
}

// Floats compare by bit pattern so NaN constants stay equal to themselves
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.ty() == other.ty() && self.bits() == other.bits()
    }
}

impl Eq for Constant {}

impl std::hash::Hash for Constant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ty().hash(state);
        self.bits().hash(state);
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::F32(v) => write!(f, "f32 {:?}", v),
            Constant::F64(v) => write!(f, "f64 {:?}", v),
            Constant::V128(v) => write!(f, "v128 0x{:032x}", v),
            other => write!(f, "{} 0x{:x}", other.ty(), other.bits()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::I64(5).ty(), Type::I64);
        assert_eq!(Constant::int(Type::I8, 0x1FF), Some(Constant::I8(0xFF)));
        assert_eq!(Constant::int(Type::F64, 1), None);
    }

    #[test]
    fn test_nan_constants_are_equal() {
        assert_eq!(Constant::F64(f64::NAN), Constant::F64(f64::NAN));
        assert_ne!(Constant::F32(0.0), Constant::F32(-0.0));
        assert_ne!(Constant::I32(1), Constant::I64(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Constant::I32(0x10).to_string(), "i32 0x10");
        assert_eq!(Constant::F64(1.5).to_string(), "f64 1.5");
        assert_eq!(Type::V128.to_string(), "v128");
    }
}
