//! Guest page protection flags

use bitflags::bitflags;

bitflags! {
    /// Protection attributes of one guest page. An empty set means unmapped.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const READ    = 0b0001;
        const WRITE   = 0b0010;
        const EXECUTE = 0b0100;

        const RW  = Self::READ.bits() | Self::WRITE.bits();
        const RX  = Self::READ.bits() | Self::EXECUTE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl PageFlags {
    /// Whether a page with these flags is mapped at all
    #[inline]
    pub fn is_mapped(self) -> bool {
        !self.is_empty()
    }

    /// Whether an access needing `required` is allowed
    #[inline]
    pub fn allows(self, required: PageFlags) -> bool {
        self.is_mapped() && self.contains(required)
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_denies_everything() {
        let flags = PageFlags::default();
        assert!(!flags.is_mapped());
        assert!(!flags.allows(PageFlags::empty()));
        assert!(!flags.allows(PageFlags::READ));
    }

    #[test]
    fn test_rx_denies_write() {
        assert!(PageFlags::RX.allows(PageFlags::READ));
        assert!(PageFlags::RX.allows(PageFlags::EXECUTE));
        assert!(!PageFlags::RX.allows(PageFlags::WRITE));
        assert!(PageFlags::RWX.allows(PageFlags::RW));
    }
}
