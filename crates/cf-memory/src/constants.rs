//! Guest memory map constants

/// Main memory base address
pub const MAIN_MEM_BASE: u32 = 0x0000_0000;
/// Main memory size (256 MB)
pub const MAIN_MEM_SIZE: u32 = 0x1000_0000;

/// User memory base address
pub const USER_MEM_BASE: u32 = 0x2000_0000;
/// User memory size (256 MB)
pub const USER_MEM_SIZE: u32 = 0x1000_0000;

/// Stack area base
pub const STACK_BASE: u32 = 0xD000_0000;
/// Stack area size
pub const STACK_SIZE: u32 = 0x1000_0000;

/// Guest page size (4 KB)
pub const PAGE_SIZE: u32 = 0x1000;

/// Host commit granularity; covers 4K, 16K and 64K host page sizes
pub const COMMIT_GRANULARITY: usize = 0x1_0000;

/// Reservation granularity for load-reserve/store-conditional (128 byte cache line)
pub const RESERVATION_GRANULARITY: u32 = 128;

/// Number of reservation slots; cache lines hash into this table
pub const RESERVATION_TABLE_SIZE: usize = 1 << 16;

/// Total address space size (4 GB, 32-bit)
pub const ADDRESS_SPACE_SIZE: usize = 0x1_0000_0000;

/// Number of pages in the address space
pub const NUM_PAGES: usize = ADDRESS_SPACE_SIZE / PAGE_SIZE as usize;
