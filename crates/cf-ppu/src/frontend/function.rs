//! Guest functions

use std::collections::BTreeMap;

use super::block::Block;
use crate::analyzer::{ArgKind, Reg, RegisterUsage, ReturnKind};

/// Blocks reachable from one entry address
#[derive(Debug, Clone)]
pub struct Function {
    pub address: u32,
    /// Distance from the entry to the end of the furthest block
    pub size: u32,
    pub name: String,
    pub blocks: BTreeMap<u32, Block>,
    /// Parameter kinds in ABI slot order
    pub argument_shape: Vec<ArgKind>,
    /// Register carrying each parameter of `argument_shape`
    pub argument_regs: Vec<Reg>,
    pub return_shape: ReturnKind,
    /// Every register the function or its callees touch
    pub usage: RegisterUsage,
    /// Targets of the known calls made by the function
    pub calls: Vec<u32>,
}

impl Function {
    pub fn new(address: u32, blocks: BTreeMap<u32, Block>) -> Self {
        let end = blocks.values().map(Block::end).max().unwrap_or(address as u64);
        Self {
            address,
            size: (end - address as u64) as u32,
            name: format!("func_{:X}", address),
            blocks,
            argument_shape: Vec::new(),
            argument_regs: Vec::new(),
            return_shape: ReturnKind::Void,
            usage: RegisterUsage::new(),
            calls: Vec::new(),
        }
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.block_containing(addr).is_some()
    }

    pub fn block_containing(&self, addr: u32) -> Option<&Block> {
        self.blocks
            .range(..=addr)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| block.contains(addr))
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.get(&self.address)
    }
}
