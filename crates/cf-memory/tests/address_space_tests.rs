//! Address space behaviour of the guest memory manager

use cf_core::error::MemoryError;
use cf_memory::{constants::*, MemoryManager, PageFlags};

#[test]
fn test_main_memory_boundaries() {
    let mem = MemoryManager::new().unwrap();

    mem.write::<u32>(MAIN_MEM_BASE, 0xDEADBEEF).unwrap();
    assert_eq!(mem.read::<u32>(MAIN_MEM_BASE).unwrap(), 0xDEADBEEF);

    let last = MAIN_MEM_BASE + MAIN_MEM_SIZE - 4;
    mem.write::<u32>(last, 0xCAFEBABE).unwrap();
    assert_eq!(mem.read::<u32>(last).unwrap(), 0xCAFEBABE);

    // Straddling the end of main memory
    assert!(mem.write::<u64>(MAIN_MEM_BASE + MAIN_MEM_SIZE - 4, 0).is_err());
}

#[test]
fn test_user_allocations_do_not_overlap() {
    let mem = MemoryManager::new().unwrap();

    let size = 0x10_0000;
    let a = mem.allocate(size, 0x1000, PageFlags::RW).unwrap();
    let b = mem.allocate(size, 0x1000, PageFlags::RW).unwrap();
    assert!(a >= USER_MEM_BASE && b < USER_MEM_BASE + USER_MEM_SIZE);
    assert!(b >= a + size || a >= b + size);

    for i in 0..64 {
        mem.write::<u32>(a + i * 4, i).unwrap();
    }
    mem.write::<u32>(b, 0xFFFF_FFFF).unwrap();
    assert_eq!(mem.read::<u32>(a).unwrap(), 0);
    assert_eq!(mem.read::<u32>(a + 4).unwrap(), 1);
}

#[test]
fn test_allocation_alignment_and_rounding() {
    let mem = MemoryManager::new().unwrap();

    let a = mem.allocate(0x1001, 0x1000, PageFlags::RW).unwrap();
    let b = mem.allocate(0x10, 0x1_0000, PageFlags::RW).unwrap();
    assert_eq!(a % PAGE_SIZE, 0);
    assert_eq!(b % 0x1_0000, 0);
    assert!(b >= a + 0x2000);

    assert_eq!(
        mem.allocate(0x10, 3, PageFlags::RW),
        Err(MemoryError::InvalidAlignment { align: 3 })
    );
}

#[test]
fn test_unaligned_access() {
    let mem = MemoryManager::new().unwrap();

    let addr = MAIN_MEM_BASE + 0x2001;
    mem.write::<u32>(addr, 0x12345678).unwrap();
    assert_eq!(mem.read::<u32>(addr).unwrap(), 0x12345678);

    mem.write::<u64>(addr, 0xDEADBEEFCAFEBABE).unwrap();
    assert_eq!(mem.read::<u64>(addr).unwrap(), 0xDEADBEEFCAFEBABE);
}

#[test]
fn test_signed_values() {
    let mem = MemoryManager::new().unwrap();

    mem.write::<i16>(0x3000, -2).unwrap();
    assert_eq!(mem.read_be16(0x3000).unwrap(), 0xFFFE);
    assert_eq!(mem.read::<i16>(0x3000).unwrap(), -2);
}

#[test]
fn test_unmap_releases_pages() {
    let mem = MemoryManager::new().unwrap();
    let before = mem.bytes_mapped();

    let addr = mem.allocate(0x2_0000, 0x1_0000, PageFlags::RW).unwrap();
    assert_eq!(mem.bytes_mapped(), before + 0x2_0000);
    mem.write_be64(addr + 0x1_0000, 5).unwrap();

    mem.unmap(addr, 0x2_0000).unwrap();
    assert_eq!(mem.bytes_mapped(), before);
    assert_eq!(
        mem.read_be64(addr + 0x1_0000),
        Err(MemoryError::Unmapped { addr: addr + 0x1_0000 })
    );

    // Remapping yields zeroed pages again
    mem.map(addr, 0x2_0000, PageFlags::RW).unwrap();
    assert_eq!(mem.read_be64(addr + 0x1_0000).unwrap(), 0);
}

#[test]
fn test_top_of_address_space() {
    let mem = MemoryManager::new().unwrap();
    mem.map(0xFFFF_F000, PAGE_SIZE, PageFlags::RW).unwrap();
    mem.write_be32(0xFFFF_FFFC, 0x0102_0304).unwrap();
    assert_eq!(mem.read_be32(0xFFFF_FFFC).unwrap(), 0x0102_0304);

    // Accesses must not wrap around to address 0
    assert!(mem.read_be64(0xFFFF_FFFC).is_err());
}

#[test]
fn test_base_pointer_views_guest_memory() {
    let mem = MemoryManager::new().unwrap();
    mem.write_be32(0x8000, 0xAABB_CCDD).unwrap();

    let host = unsafe { std::slice::from_raw_parts(mem.base_addr().add(0x8000), 4) };
    assert_eq!(host, &[0xAA, 0xBB, 0xCC, 0xDD]);
}
