//! VMX (AltiVec) 128-bit vector values
//!
//! Vectors are kept in guest byte order: element 0 is the most significant
//! (lowest addressed) element, exactly as `lvx` loads it.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// 128-bit vector register value
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C, align(16))]
pub struct V128 {
    pub data: [u8; 16],
}

impl V128 {
    pub const ZERO: V128 = V128 { data: [0; 16] };

    pub const fn new() -> Self {
        Self::ZERO
    }

    pub const fn from_bytes(data: [u8; 16]) -> Self {
        Self { data }
    }

    pub fn from_u32x4(words: [u32; 4]) -> Self {
        let mut v = Self::ZERO;
        v.set_u32x4(words);
        v
    }

    pub fn from_f32x4(values: [f32; 4]) -> Self {
        Self::from_u32x4(bytemuck::cast(values))
    }

    pub fn from_u128(value: u128) -> Self {
        Self {
            data: value.to_be_bytes(),
        }
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.data)
    }

    /// Get as 4 x u32 (big-endian word order)
    pub fn as_u32x4(&self) -> [u32; 4] {
        std::array::from_fn(|i| {
            u32::from_be_bytes([
                self.data[i * 4],
                self.data[i * 4 + 1],
                self.data[i * 4 + 2],
                self.data[i * 4 + 3],
            ])
        })
    }

    /// Set from 4 x u32 (big-endian word order)
    pub fn set_u32x4(&mut self, words: [u32; 4]) {
        for (i, word) in words.iter().enumerate() {
            self.data[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
    }

    /// Get as 8 x u16 (big-endian halfword order)
    pub fn as_u16x8(&self) -> [u16; 8] {
        std::array::from_fn(|i| u16::from_be_bytes([self.data[i * 2], self.data[i * 2 + 1]]))
    }

    pub fn from_u16x8(halves: [u16; 8]) -> Self {
        let mut v = Self::ZERO;
        for (i, half) in halves.iter().enumerate() {
            v.data[i * 2..i * 2 + 2].copy_from_slice(&half.to_be_bytes());
        }
        v
    }

    pub fn as_u8x16(&self) -> [u8; 16] {
        self.data
    }

    /// Get as 4 x f32 (big-endian word order)
    pub fn as_f32x4(&self) -> [f32; 4] {
        bytemuck::cast(self.as_u32x4())
    }

    pub fn set_f32x4(&mut self, values: [f32; 4]) {
        self.set_u32x4(bytemuck::cast(values));
    }
}

impl BitAnd for V128 {
    type Output = V128;

    fn bitand(self, rhs: V128) -> V128 {
        V128::from_u128(self.as_u128() & rhs.as_u128())
    }
}

impl BitOr for V128 {
    type Output = V128;

    fn bitor(self, rhs: V128) -> V128 {
        V128::from_u128(self.as_u128() | rhs.as_u128())
    }
}

impl BitXor for V128 {
    type Output = V128;

    fn bitxor(self, rhs: V128) -> V128 {
        V128::from_u128(self.as_u128() ^ rhs.as_u128())
    }
}

impl Not for V128 {
    type Output = V128;

    fn not(self) -> V128 {
        V128::from_u128(!self.as_u128())
    }
}

impl fmt::Debug for V128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.as_u32x4();
        write!(f, "V128[{:08X} {:08X} {:08X} {:08X}]", w[0], w[1], w[2], w[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_order() {
        let v = V128::from_u32x4([0x12345678, 0x9ABCDEF0, 0x11223344, 0x55667788]);
        assert_eq!(v.data[0], 0x12);
        assert_eq!(v.data[15], 0x88);
        assert_eq!(v.as_u16x8()[1], 0x5678);
        assert_eq!(v.as_u128() >> 96, 0x12345678);
    }

    #[test]
    fn test_f32x4() {
        let mut v = V128::new();
        v.set_f32x4([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(v.as_u32x4()[0], 1.0f32.to_bits());
        assert_eq!(v.as_f32x4(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bitwise() {
        let a = V128::from_u128(0xFF00);
        let b = V128::from_u128(0x0FF0);
        assert_eq!((a & b).as_u128(), 0x0F00);
        assert_eq!((a | b).as_u128(), 0xFFF0);
        assert_eq!((a ^ b).as_u128(), 0xF0F0);
        assert_eq!((!V128::ZERO).as_u128(), u128::MAX);
    }
}
