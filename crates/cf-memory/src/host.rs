//! Host virtual memory primitives backing the guest address space

use std::ptr::NonNull;

use cf_core::error::MemoryError;

/// A reserved range of host virtual memory. Pages are inaccessible until committed.
pub(crate) struct HostRegion {
    base: NonNull<u8>,
    size: usize,
}

// The region is only a pointer into memory owned by this process
unsafe impl Send for HostRegion {}
unsafe impl Sync for HostRegion {}

impl HostRegion {
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(MemoryError::Os(format!(
                "range 0x{:x}+0x{:x} outside host region",
                offset, len
            )));
        }
        Ok(())
    }
}

#[cfg(unix)]
impl HostRegion {
    pub fn reserve(size: usize) -> Result<Self, MemoryError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(MemoryError::Os(std::io::Error::last_os_error().to_string()));
        }
        let base = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| MemoryError::Os("mmap returned null".to_string()))?;
        Ok(Self { base, size })
    }

    pub fn commit(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        self.check_range(offset, len)?;
        let ret = unsafe {
            libc::mprotect(
                self.base.as_ptr().add(offset) as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            return Err(MemoryError::Os(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    pub fn decommit(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        self.check_range(offset, len)?;
        let ptr = unsafe { self.base.as_ptr().add(offset) } as *mut libc::c_void;
        let ret = unsafe {
            libc::madvise(ptr, len, libc::MADV_DONTNEED);
            libc::mprotect(ptr, len, libc::PROT_NONE)
        };
        if ret != 0 {
            return Err(MemoryError::Os(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for HostRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(windows)]
impl HostRegion {
    pub fn reserve(size: usize) -> Result<Self, MemoryError> {
        use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_RESERVE, PAGE_NOACCESS};

        let ptr = unsafe { VirtualAlloc(std::ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
        let base = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| MemoryError::Os(std::io::Error::last_os_error().to_string()))?;
        Ok(Self { base, size })
    }

    pub fn commit(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, PAGE_READWRITE};

        self.check_range(offset, len)?;
        let ptr = unsafe {
            VirtualAlloc(
                self.base.as_ptr().add(offset) as *const _,
                len,
                MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if ptr.is_null() {
            return Err(MemoryError::Os(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    pub fn decommit(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        use windows_sys::Win32::System::Memory::{VirtualFree, MEM_DECOMMIT};

        self.check_range(offset, len)?;
        let ok = unsafe { VirtualFree(self.base.as_ptr().add(offset) as *mut _, len, MEM_DECOMMIT) };
        if ok == 0 {
            return Err(MemoryError::Os(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }
}

#[cfg(windows)]
impl Drop for HostRegion {
    fn drop(&mut self) {
        use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};

        unsafe {
            VirtualFree(self.base.as_ptr() as *mut _, 0, MEM_RELEASE);
        }
    }
}
