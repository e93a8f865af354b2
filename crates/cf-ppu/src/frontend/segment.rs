//! Executable segments and function discovery

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use cf_core::ppu_debug;
use cf_memory::MemoryManager;

use super::block::Block;
use super::function::Function;
use crate::analyzer::{Reg, RegisterUsage};
use crate::decoder;
use crate::instruction::Instruction;

/// Contiguous region of executable guest code
#[derive(Debug, Clone)]
pub struct Segment {
    pub address: u32,
    pub size: u32,
    pub functions: BTreeMap<u32, Function>,
}

impl Segment {
    pub fn new(address: u32, size: u32) -> Self {
        Self {
            address,
            size,
            functions: BTreeMap::new(),
        }
    }

    /// One past the last byte; may be 2^32 for a segment at the top of memory
    #[inline]
    pub fn end(&self) -> u64 {
        self.address as u64 + self.size as u64
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.address <= addr && (addr as u64) < self.end()
    }

    pub fn function_at(&self, addr: u32) -> Option<&Function> {
        self.functions.get(&addr)
    }

    /// Discover the functions of the segment and infer their signatures
    pub fn analyze(&mut self, memory: &MemoryManager) {
        self.functions.clear();
        for entry in self.discover_entries(memory) {
            match self.analyze_cfg(memory, entry) {
                Some(function) => {
                    self.functions.insert(entry, function);
                }
                None => ppu_debug!("Discarding function candidate at 0x{:08x}", entry),
            }
        }
        self.analyze_type(memory);
        ppu_debug!(
            "Segment 0x{:08x}-0x{:08x}: {} functions",
            self.address,
            self.end(),
            self.functions.len()
        );
    }

    /// Linear sweep for function entry points
    ///
    /// Block starts that are never the target of a plain jump begin a
    /// function, as do all targets of direct calls.
    pub fn discover_entries(&self, memory: &MemoryManager) -> BTreeSet<u32> {
        let mut blocks = BTreeSet::new();
        let mut calls = BTreeSet::new();
        let mut jumps = BTreeSet::new();

        let mut current: Option<u32> = None;
        for addr in (self.address as u64..self.end()).step_by(4).map(|addr| addr as u32) {
            let code = Instruction(memory.read_be32(addr).unwrap_or(0));
            if !code.is_valid() {
                current = None;
                continue;
            }
            let start = *current.get_or_insert(addr);

            if code.is_call_known() {
                calls.insert(code.target(addr));
            }
            if code.is_branch() && !code.is_call() {
                if code.is_branch_conditional() {
                    jumps.insert(code.target(addr));
                    jumps.insert(addr.wrapping_add(4));
                }
                if code.is_branch_unconditional() {
                    jumps.insert(code.target(addr));
                }
                blocks.insert(start);
                current = None;
            }
        }

        blocks
            .difference(&jumps)
            .chain(calls.iter())
            .copied()
            .filter(|addr| self.contains(*addr))
            .collect()
    }

    /// Build the control flow graph of the function starting at `entry`
    ///
    /// Returns `None` when a reachable branch leaves the segment, when code
    /// runs off the end of the segment or when code cannot be read.
    pub fn analyze_cfg(&self, memory: &MemoryManager, entry: u32) -> Option<Function> {
        if !self.contains(entry) {
            return None;
        }

        let mut blocks: BTreeMap<u32, Block> = BTreeMap::new();
        let mut labels = VecDeque::from([entry]);

        while let Some(addr) = labels.pop_front() {
            if blocks.contains_key(&addr) {
                continue;
            }

            // A label inside a known block cuts it in two
            let enclosing = blocks
                .range(..addr)
                .next_back()
                .filter(|(_, block)| block.contains(addr))
                .map(|(&start, _)| start);
            if let Some(start) = enclosing {
                let tail = blocks.get_mut(&start)?.split_at(addr);
                blocks.insert(addr, tail);
                continue;
            }

            let limit = blocks
                .range(addr..)
                .next()
                .map_or(self.end(), |(&next, _)| (next as u64).min(self.end()));

            let mut block = Block::new(addr);
            let mut last = None;
            while block.end() < limit {
                let pc = block.end() as u32;
                let code = Instruction(memory.read_be32(pc).ok()?);
                block.size += 4;
                if code.is_branch() && !code.is_call() {
                    last = Some((pc, code));
                    break;
                }
            }

            match last {
                None if limit == self.end() => return None,
                None => block.branch_a = Some(limit as u32),
                Some((pc, code)) => {
                    let next = pc.wrapping_add(4);
                    match code.opcode() {
                        // bc
                        0x10 => {
                            let target = code.target(pc);
                            if !self.contains(target) {
                                return None;
                            }
                            block.branch_a = Some(target);
                            if code.bo() & 0x14 != 0x14 {
                                block.branch_b = Some(next);
                            }
                        }
                        // b
                        0x12 => {
                            let target = code.target(pc);
                            if !self.contains(target) {
                                return None;
                            }
                            block.branch_a = Some(target);
                        }
                        // bclr, bcctr: only a conditional fallthrough is known
                        _ => {
                            let conditional = if code.is_branch_ctr() {
                                code.bo() & 0x10 == 0
                            } else {
                                code.is_branch_conditional()
                            };
                            if conditional {
                                block.branch_b = Some(next);
                            }
                        }
                    }
                    for target in [block.branch_a, block.branch_b].into_iter().flatten() {
                        if !self.contains(target) {
                            return None;
                        }
                    }
                }
            }

            labels.extend(block.branch_a);
            labels.extend(block.branch_b);
            block.initial = addr == entry;
            blocks.insert(addr, block);
        }

        Some(Function::new(entry, blocks))
    }

    /// Run the register analysis over every discovered function
    pub fn analyze_type(&mut self, memory: &MemoryManager) {
        let mut memo = HashMap::new();
        let addresses: Vec<u32> = self.functions.keys().copied().collect();

        let mut shapes = Vec::with_capacity(addresses.len());
        for &addr in &addresses {
            let usage = self.chain_usage(memory, addr, &mut memo, &mut HashSet::new());
            shapes.push((usage.argument_shape(), usage.return_shape()));
        }

        let mut full: HashMap<u32, (RegisterUsage, Vec<u32>)> = addresses
            .iter()
            .filter_map(|&addr| {
                let function = self.functions.get(&addr)?;
                Some((addr, local_usage(memory, function)))
            })
            .collect();

        // Propagate callee effects until nothing changes
        loop {
            let mut changed = false;
            for &addr in &addresses {
                let Some((usage, calls)) = full.get(&addr) else {
                    continue;
                };
                let mut merged = usage.clone();
                for callee in calls {
                    if let Some((callee_usage, _)) = full.get(callee) {
                        merged.merge_call(callee_usage);
                    }
                }
                if merged != *usage {
                    changed = true;
                    if let Some(entry) = full.get_mut(&addr) {
                        entry.0 = merged;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        for (addr, ((arguments, regs), ret)) in addresses.into_iter().zip(shapes) {
            let Some(function) = self.functions.get_mut(&addr) else {
                continue;
            };
            function.argument_shape = arguments;
            function.argument_regs = regs;
            function.return_shape = ret;
            if let Some((usage, calls)) = full.remove(&addr) {
                function.usage = usage;
                function.calls = calls;
            }
        }
    }

    /// Usage along the entry chain of `addr`, following known calls
    ///
    /// The walk starts at the entry block, follows unconditional edges and
    /// stops at the first conditional branch or return.
    fn chain_usage(
        &self,
        memory: &MemoryManager,
        addr: u32,
        memo: &mut HashMap<u32, RegisterUsage>,
        active: &mut HashSet<u32>,
    ) -> RegisterUsage {
        if let Some(usage) = memo.get(&addr) {
            return usage.clone();
        }
        let mut usage = RegisterUsage::new();
        let Some(function) = self.functions.get(&addr) else {
            return usage;
        };
        active.insert(addr);

        let mut visited = HashSet::new();
        let mut current = function.entry_block();
        'blocks: while let Some(block) = current {
            if !visited.insert(block.address) {
                break;
            }
            for pc in block.instructions() {
                let Ok(word) = memory.read_be32(pc) else {
                    break 'blocks;
                };
                let code = Instruction(word);
                if code.is_call_known() {
                    let target = code.target(pc);
                    if !active.contains(&target) {
                        let callee = self.chain_usage(memory, target, memo, active);
                        usage.merge_call(&callee);
                    }
                    usage.write(Reg::Lr);
                } else {
                    (decoder::decode(code).analyze)(&mut usage, code);
                }
                if code.is_branch_conditional() || code.is_return() {
                    break 'blocks;
                }
            }
            current = match (block.branch_a, block.branch_b) {
                (Some(next), None) => function.blocks.get(&next),
                _ => None,
            };
        }

        active.remove(&addr);
        memo.insert(addr, usage.clone());
        usage
    }
}

/// Usage of every instruction of the function, plus its known call targets
fn local_usage(memory: &MemoryManager, function: &Function) -> (RegisterUsage, Vec<u32>) {
    let mut usage = RegisterUsage::new();
    let mut calls = Vec::new();
    for block in function.blocks.values() {
        for pc in block.instructions() {
            let Ok(word) = memory.read_be32(pc) else {
                continue;
            };
            let code = Instruction(word);
            (decoder::decode(code).analyze)(&mut usage, code);
            if code.is_call_known() {
                let target = code.target(pc);
                if !calls.contains(&target) {
                    calls.push(target);
                }
            }
        }
    }
    (usage, calls)
}
