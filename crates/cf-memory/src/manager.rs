//! Guest address space manager

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cf_core::error::MemoryError;
use parking_lot::Mutex;

use crate::constants::*;
use crate::host::HostRegion;
use crate::pages::PageFlags;
use crate::reservation::{Reservation, ReservationTable};

/// Integer types that can be stored in guest memory (big-endian)
pub trait GuestValue: Copy {
    fn from_guest(raw: Self) -> Self;
    fn to_guest(self) -> Self;
}

macro_rules! impl_guest_value {
    ($($t:ty),*) => {
        $(
            impl GuestValue for $t {
                #[inline]
                fn from_guest(raw: Self) -> Self {
                    <$t>::from_be(raw)
                }

                #[inline]
                fn to_guest(self) -> Self {
                    self.to_be()
                }
            }
        )*
    };
}

impl_guest_value!(u8, u16, u32, u64, i8, i16, i32, i64);

/// The 4 GB guest address space
///
/// The whole space is reserved up front on the host so that a guest address
/// is always `base_addr() + addr`. Pages become usable once mapped, and every
/// access is checked against the per-page flags before touching host memory.
pub struct MemoryManager {
    host: HostRegion,
    pages: Box<[AtomicU32]>,
    committed: Box<[AtomicBool]>,
    reservations: ReservationTable,
    map_lock: Mutex<()>,
    user_next: Mutex<u32>,
    stack_next: Mutex<u32>,
    bytes_mapped: AtomicU64,
}

impl MemoryManager {
    /// Reserve the guest address space and map main memory
    pub fn new() -> Result<Arc<Self>, MemoryError> {
        let memory = Self::empty()?;
        memory.map(MAIN_MEM_BASE, MAIN_MEM_SIZE, PageFlags::RWX)?;
        Ok(Arc::new(memory))
    }

    /// Reserve the guest address space without mapping anything
    pub fn empty() -> Result<Self, MemoryError> {
        let host = HostRegion::reserve(ADDRESS_SPACE_SIZE)?;
        let chunks = ADDRESS_SPACE_SIZE / COMMIT_GRANULARITY;

        tracing::debug!(
            "Reserved guest address space at {:p} ({} pages)",
            host.as_ptr(),
            NUM_PAGES
        );

        Ok(Self {
            host,
            pages: (0..NUM_PAGES).map(|_| AtomicU32::new(0)).collect(),
            committed: (0..chunks).map(|_| AtomicBool::new(false)).collect(),
            reservations: ReservationTable::new(),
            map_lock: Mutex::new(()),
            user_next: Mutex::new(USER_MEM_BASE),
            stack_next: Mutex::new(STACK_BASE),
            bytes_mapped: AtomicU64::new(0),
        })
    }

    /// Host pointer to guest address 0
    #[inline]
    pub fn base_addr(&self) -> *mut u8 {
        self.host.as_ptr()
    }

    /// Number of bytes currently mapped
    pub fn bytes_mapped(&self) -> u64 {
        self.bytes_mapped.load(Ordering::Relaxed)
    }

    /// Map `[addr, addr + size)` with the given flags
    pub fn map(&self, addr: u32, size: u32, flags: PageFlags) -> Result<(), MemoryError> {
        if addr % PAGE_SIZE != 0 || size == 0 {
            return Err(MemoryError::InvalidAlignment { align: PAGE_SIZE });
        }
        let end = addr as usize + size as usize;
        if end > ADDRESS_SPACE_SIZE {
            return Err(MemoryError::OutOfMemory { size });
        }

        let _guard = self.map_lock.lock();

        let first_chunk = addr as usize / COMMIT_GRANULARITY;
        let last_chunk = (end - 1) / COMMIT_GRANULARITY;
        for chunk in first_chunk..=last_chunk {
            if !self.committed[chunk].load(Ordering::Acquire) {
                self.host
                    .commit(chunk * COMMIT_GRANULARITY, COMMIT_GRANULARITY)?;
                self.committed[chunk].store(true, Ordering::Release);
            }
        }

        let first_page = addr as usize / PAGE_SIZE as usize;
        let last_page = (end - 1) / PAGE_SIZE as usize;
        let mut newly_mapped = 0u64;
        for page in first_page..=last_page {
            let previous = self.pages[page].swap(flags.bits(), Ordering::Release);
            if previous == 0 {
                newly_mapped += PAGE_SIZE as u64;
            }
        }
        self.bytes_mapped.fetch_add(newly_mapped, Ordering::Relaxed);

        tracing::trace!("Mapped 0x{:08x}..0x{:08x} {:?}", addr, end, flags);
        Ok(())
    }

    /// Unmap `[addr, addr + size)`; host chunks left without pages are released
    pub fn unmap(&self, addr: u32, size: u32) -> Result<(), MemoryError> {
        if addr % PAGE_SIZE != 0 || size == 0 {
            return Err(MemoryError::InvalidAlignment { align: PAGE_SIZE });
        }
        let end = (addr as usize + size as usize).min(ADDRESS_SPACE_SIZE);

        let _guard = self.map_lock.lock();

        let first_page = addr as usize / PAGE_SIZE as usize;
        let last_page = (end - 1) / PAGE_SIZE as usize;
        let mut released = 0u64;
        for page in first_page..=last_page {
            if self.pages[page].swap(0, Ordering::Release) != 0 {
                released += PAGE_SIZE as u64;
            }
        }
        self.bytes_mapped.fetch_sub(released, Ordering::Relaxed);

        let pages_per_chunk = COMMIT_GRANULARITY / PAGE_SIZE as usize;
        for chunk in addr as usize / COMMIT_GRANULARITY..=(end - 1) / COMMIT_GRANULARITY {
            let pages = &self.pages[chunk * pages_per_chunk..(chunk + 1) * pages_per_chunk];
            let empty = pages.iter().all(|p| p.load(Ordering::Acquire) == 0);
            if empty && self.committed[chunk].swap(false, Ordering::AcqRel) {
                self.host
                    .decommit(chunk * COMMIT_GRANULARITY, COMMIT_GRANULARITY)?;
            }
        }
        Ok(())
    }

    /// Allocate and map a block in the user memory area
    pub fn allocate(&self, size: u32, align: u32, flags: PageFlags) -> Result<u32, MemoryError> {
        self.bump_allocate(&self.user_next, USER_MEM_BASE + USER_MEM_SIZE, size, align, flags)
    }

    /// Allocate a stack in the stack area; returns its lowest address
    pub fn allocate_stack(&self, size: u32) -> Result<u32, MemoryError> {
        // One unmapped guard page below every stack
        let bottom = self.bump_allocate(
            &self.stack_next,
            STACK_BASE.wrapping_add(STACK_SIZE - 1),
            size + PAGE_SIZE,
            PAGE_SIZE,
            PageFlags::RW,
        )?;
        self.unmap(bottom, PAGE_SIZE)?;
        Ok(bottom + PAGE_SIZE)
    }

    fn bump_allocate(
        &self,
        next: &Mutex<u32>,
        limit: u32,
        size: u32,
        align: u32,
        flags: PageFlags,
    ) -> Result<u32, MemoryError> {
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment { align });
        }
        let align = align.max(PAGE_SIZE);
        let size = size
            .checked_add(PAGE_SIZE - 1)
            .ok_or(MemoryError::OutOfMemory { size })?
            & !(PAGE_SIZE - 1);

        let mut next = next.lock();
        let addr = next
            .checked_add(align - 1)
            .map(|a| a & !(align - 1))
            .ok_or(MemoryError::OutOfMemory { size })?;
        let end = addr
            .checked_add(size)
            .filter(|&end| end <= limit)
            .ok_or(MemoryError::OutOfMemory { size })?;

        self.map(addr, size, flags)?;
        *next = end;
        Ok(addr)
    }

    /// Flags of the page containing `addr`
    #[inline]
    pub fn page_flags(&self, addr: u32) -> PageFlags {
        let page = (addr / PAGE_SIZE) as usize;
        PageFlags::from_bits_truncate(self.pages[page].load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_mapped(&self, addr: u32) -> bool {
        self.page_flags(addr).is_mapped()
    }

    /// Verify that `len` bytes at `addr` are accessible with `required`
    pub fn check_access(&self, addr: u32, len: u32, required: PageFlags) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let end = addr as u64 + len as u64;
        if end > ADDRESS_SPACE_SIZE as u64 {
            return Err(MemoryError::Unmapped { addr });
        }
        let first = addr / PAGE_SIZE;
        let last = ((end - 1) / PAGE_SIZE as u64) as u32;
        for page in first..=last {
            let flags = PageFlags::from_bits_truncate(self.pages[page as usize].load(Ordering::Acquire));
            if !flags.is_mapped() {
                return Err(MemoryError::Unmapped {
                    addr: addr.max(page * PAGE_SIZE),
                });
            }
            if !flags.contains(required) {
                return Err(MemoryError::AccessViolation {
                    addr,
                    flags: flags.bits(),
                });
            }
        }
        Ok(())
    }

    #[inline]
    fn host_ptr(&self, addr: u32) -> *mut u8 {
        // In bounds: the region spans the full 32-bit space
        unsafe { self.host.as_ptr().add(addr as usize) }
    }

    /// Read a big-endian value
    #[inline]
    pub fn read<T: GuestValue>(&self, addr: u32) -> Result<T, MemoryError> {
        self.check_access(addr, std::mem::size_of::<T>() as u32, PageFlags::READ)?;
        let raw = unsafe { std::ptr::read_unaligned(self.host_ptr(addr) as *const T) };
        Ok(T::from_guest(raw))
    }

    /// Write a big-endian value
    #[inline]
    pub fn write<T: GuestValue>(&self, addr: u32, value: T) -> Result<(), MemoryError> {
        let len = std::mem::size_of::<T>() as u32;
        self.check_access(addr, len, PageFlags::WRITE)?;
        unsafe { std::ptr::write_unaligned(self.host_ptr(addr) as *mut T, value.to_guest()) };
        self.reservations.invalidate_range(addr, len);
        Ok(())
    }

    #[inline]
    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        self.read::<u8>(addr)
    }

    #[inline]
    pub fn read_be16(&self, addr: u32) -> Result<u16, MemoryError> {
        self.read::<u16>(addr)
    }

    #[inline]
    pub fn read_be32(&self, addr: u32) -> Result<u32, MemoryError> {
        self.read::<u32>(addr)
    }

    #[inline]
    pub fn read_be64(&self, addr: u32) -> Result<u64, MemoryError> {
        self.read::<u64>(addr)
    }

    #[inline]
    pub fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write(addr, value)
    }

    #[inline]
    pub fn write_be16(&self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write(addr, value)
    }

    #[inline]
    pub fn write_be32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write(addr, value)
    }

    #[inline]
    pub fn write_be64(&self, addr: u32, value: u64) -> Result<(), MemoryError> {
        self.write(addr, value)
    }

    /// Fetch an instruction word; the page must be executable
    #[inline]
    pub fn fetch(&self, addr: u32) -> Result<u32, MemoryError> {
        self.check_access(addr, 4, PageFlags::EXECUTE)?;
        let raw = unsafe { std::ptr::read_unaligned(self.host_ptr(addr) as *const u32) };
        Ok(u32::from_be(raw))
    }

    /// Copy guest memory into `buf`
    pub fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_access(addr, buf.len() as u32, PageFlags::READ)?;
        unsafe { std::ptr::copy_nonoverlapping(self.host_ptr(addr), buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Copy `data` into guest memory
    pub fn write_bytes(&self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.check_access(addr, data.len() as u32, PageFlags::WRITE)?;
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), self.host_ptr(addr), data.len()) };
        self.reservations.invalidate_range(addr, data.len() as u32);
        Ok(())
    }

    /// Fill `len` bytes at `addr` with `byte`
    pub fn fill(&self, addr: u32, byte: u8, len: u32) -> Result<(), MemoryError> {
        self.check_access(addr, len, PageFlags::WRITE)?;
        unsafe { std::ptr::write_bytes(self.host_ptr(addr), byte, len as usize) };
        self.reservations.invalidate_range(addr, len);
        Ok(())
    }

    /// Map a region and copy `data` into it regardless of the final flags
    pub fn load_segment(&self, addr: u32, data: &[u8], flags: PageFlags) -> Result<(), MemoryError> {
        let size = (data.len() as u32).max(1);
        let start = addr & !(PAGE_SIZE - 1);
        let end = (addr as u64 + size as u64 + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1);
        if end > ADDRESS_SPACE_SIZE as u64 {
            return Err(MemoryError::OutOfMemory { size });
        }
        let span = (end - start as u64) as u32;
        self.map(start, span, PageFlags::RW)?;
        self.write_bytes(addr, data)?;
        self.map(start, span, flags)
    }

    /// Reservation slot covering `addr`
    #[inline]
    pub fn reservation(&self, addr: u32) -> &Reservation {
        self.reservations.get(addr)
    }

    /// Atomically replace a big-endian word if it still holds `expected`
    pub fn compare_exchange_be32(&self, addr: u32, expected: u32, new: u32) -> Result<bool, MemoryError> {
        if addr % 4 != 0 {
            return Err(MemoryError::InvalidAlignment { align: 4 });
        }
        self.check_access(addr, 4, PageFlags::RW)?;
        let cell = unsafe { AtomicU32::from_ptr(self.host_ptr(addr) as *mut u32) };
        Ok(cell
            .compare_exchange(expected.to_be(), new.to_be(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    /// Atomically replace a big-endian doubleword if it still holds `expected`
    pub fn compare_exchange_be64(&self, addr: u32, expected: u64, new: u64) -> Result<bool, MemoryError> {
        if addr % 8 != 0 {
            return Err(MemoryError::InvalidAlignment { align: 8 });
        }
        self.check_access(addr, 8, PageFlags::RW)?;
        let cell = unsafe { AtomicU64::from_ptr(self.host_ptr(addr) as *mut u64) };
        Ok(cell
            .compare_exchange(expected.to_be(), new.to_be(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_storage() {
        let mem = MemoryManager::new().unwrap();
        mem.write_be32(0x1000, 0x1122_3344).unwrap();

        let mut raw = [0u8; 4];
        mem.read_bytes(0x1000, &mut raw).unwrap();
        assert_eq!(raw, [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.read_be16(0x1002).unwrap(), 0x3344);
        assert_eq!(mem.read_u8(0x1000).unwrap(), 0x11);
    }

    #[test]
    fn test_unmapped_access() {
        let mem = MemoryManager::new().unwrap();
        let addr = USER_MEM_BASE + 0x0800_0000;
        assert_eq!(mem.read_be32(addr), Err(MemoryError::Unmapped { addr }));
    }

    #[test]
    fn test_write_protected_page() {
        let mem = MemoryManager::new().unwrap();
        mem.map(0x2000_0000, PAGE_SIZE, PageFlags::RX).unwrap();
        assert!(matches!(
            mem.write_be32(0x2000_0000, 1),
            Err(MemoryError::AccessViolation { .. })
        ));
        assert_eq!(mem.fetch(0x2000_0000).unwrap(), 0);
    }

    #[test]
    fn test_load_segment_into_read_only_pages() {
        let mem = MemoryManager::new().unwrap();
        let code = [0x38, 0x60, 0x00, 0x64];
        mem.load_segment(0x2001_0000, &code, PageFlags::RX).unwrap();
        assert_eq!(mem.fetch(0x2001_0000).unwrap(), 0x3860_0064);
        assert_eq!(mem.page_flags(0x2001_0000), PageFlags::RX);
    }

    #[test]
    fn test_store_invalidates_reservation() {
        let mem = MemoryManager::new().unwrap();
        let time = mem.reservation(0x4000).acquire();
        mem.write_be32(0x4010, 7).unwrap();
        assert!(!mem.reservation(0x4000).try_lock(time));
    }

    #[test]
    fn test_compare_exchange() {
        let mem = MemoryManager::new().unwrap();
        mem.write_be32(0x5000, 10).unwrap();
        assert!(!mem.compare_exchange_be32(0x5000, 11, 12).unwrap());
        assert!(mem.compare_exchange_be32(0x5000, 10, 12).unwrap());
        assert_eq!(mem.read_be32(0x5000).unwrap(), 12);

        mem.write_be64(0x5008, u64::MAX).unwrap();
        assert!(mem.compare_exchange_be64(0x5008, u64::MAX, 1).unwrap());
        assert_eq!(mem.read_be64(0x5008).unwrap(), 1);
        assert!(mem.compare_exchange_be32(0x5001, 0, 0).is_err());
    }

    #[test]
    fn test_stack_has_guard_page() {
        let mem = MemoryManager::new().unwrap();
        let stack = mem.allocate_stack(0x4000).unwrap();
        assert!(mem.is_mapped(stack));
        assert!(mem.is_mapped(stack + 0x3FFF));
        assert!(!mem.is_mapped(stack - 1));
    }
}
