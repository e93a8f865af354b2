//! Basic blocks

use crate::instruction::Instruction;

/// Maximal straight-line run of guest instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub address: u32,
    /// Size in bytes, a multiple of 4
    pub size: u32,
    /// Whether this is the function entry block
    pub initial: bool,
    /// Taken target, or the only successor
    pub branch_a: Option<u32>,
    /// Fallthrough of a conditional branch
    pub branch_b: Option<u32>,
}

impl Block {
    pub fn new(address: u32) -> Self {
        Self {
            address,
            size: 0,
            initial: false,
            branch_a: None,
            branch_b: None,
        }
    }

    /// One past the last byte, widened so a block ending at the top of
    /// memory does not wrap
    #[inline]
    pub fn end(&self) -> u64 {
        self.address as u64 + self.size as u64
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.address <= addr && (addr as u64) < self.end()
    }

    /// Address of the final instruction
    #[inline]
    pub fn last(&self) -> u32 {
        (self.end() - 4) as u32
    }

    /// Addresses of every instruction in the block
    pub fn instructions(&self) -> impl Iterator<Item = u32> {
        (self.address as u64..self.end()).step_by(4).map(|addr| addr as u32)
    }

    /// Whether execution leaves the block by running into the next one
    ///
    /// True when the final instruction is not a branch, or is a call or an
    /// indirect branch that comes back to the following address.
    pub fn is_split(last: Instruction) -> bool {
        !last.is_branch() || last.is_call() || last.is_branch_ctr()
    }

    /// Cut the block at `addr`, returning the tail
    ///
    /// The tail inherits the outgoing edges; the head keeps its identity and
    /// falls through into the tail.
    pub fn split_at(&mut self, addr: u32) -> Block {
        debug_assert!(self.contains(addr) && addr != self.address);
        let tail = Block {
            address: addr,
            size: (self.end() - addr as u64) as u32,
            initial: false,
            branch_a: self.branch_a,
            branch_b: self.branch_b,
        };
        self.size = addr - self.address;
        self.branch_a = Some(addr);
        self.branch_b = None;
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_end() {
        let block = Block {
            size: 0x10,
            ..Block::new(0x1000)
        };
        assert!(block.contains(0x1000));
        assert!(block.contains(0x100C));
        assert!(!block.contains(0x1010));
        assert!(!block.contains(0xFFC));
        assert_eq!(block.last(), 0x100C);
        assert_eq!(block.instructions().count(), 4);
    }

    #[test]
    fn test_split_at() {
        let mut head = Block {
            size: 0x10,
            initial: true,
            branch_a: Some(0x2000),
            branch_b: Some(0x1010),
            ..Block::new(0x1000)
        };
        let tail = head.split_at(0x1008);
        assert_eq!(head.size, 8);
        assert_eq!(head.branch_a, Some(0x1008));
        assert_eq!(head.branch_b, None);
        assert!(head.initial);
        assert_eq!(tail.address, 0x1008);
        assert_eq!(tail.size, 8);
        assert_eq!(tail.branch_a, Some(0x2000));
        assert_eq!(tail.branch_b, Some(0x1010));
        assert!(!tail.initial);
    }

    #[test]
    fn test_is_split() {
        // li r3, 0
        assert!(Block::is_split(Instruction(0x38600000)));
        // bl +8
        assert!(Block::is_split(Instruction(0x48000009)));
        // bctr
        assert!(Block::is_split(Instruction(0x4E800420)));
        // blr
        assert!(!Block::is_split(Instruction(0x4E800020)));
        // b -8
        assert!(!Block::is_split(Instruction(0x4BFFFFF8)));
    }
}
