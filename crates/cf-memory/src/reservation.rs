//! Reservation granules for load-reserve/store-conditional
//!
//! Every 128-byte guest line hashes to one [`Reservation`] slot holding a
//! version counter. `lwarx`/`ldarx` snapshot the counter, every guest store
//! bumps it, and `stwcx.`/`stdcx.` only commit while the counter is unchanged.
//! Two lines sharing a slot can make a store-conditional fail spuriously,
//! which the architecture permits.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{RESERVATION_GRANULARITY, RESERVATION_TABLE_SIZE};

/// Version counter of one reservation slot, lock flag in the LSB
#[repr(C, align(64))]
pub struct Reservation {
    timestamp: AtomicU64,
}

impl Reservation {
    pub const LOCK_BIT: u64 = 1;
    const STEP: u64 = RESERVATION_GRANULARITY as u64;

    pub const fn new() -> Self {
        Self {
            timestamp: AtomicU64::new(0),
        }
    }

    /// Snapshot the counter for a later [`Reservation::try_lock`]
    #[inline]
    pub fn acquire(&self) -> u64 {
        self.timestamp.load(Ordering::Acquire) & !Self::LOCK_BIT
    }

    /// Lock the slot if nothing touched it since `expected_time` was acquired
    #[inline]
    pub fn try_lock(&self, expected_time: u64) -> bool {
        self.timestamp
            .compare_exchange(
                expected_time,
                expected_time | Self::LOCK_BIT,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Release a slot taken by [`Reservation::try_lock`] and publish a new version
    #[inline]
    pub fn unlock_and_increment(&self) {
        let current = self.timestamp.load(Ordering::Relaxed);
        self.timestamp
            .store((current & !Self::LOCK_BIT) + Self::STEP, Ordering::Release);
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        (self.timestamp.load(Ordering::Acquire) & Self::LOCK_BIT) != 0
    }

    /// Break every outstanding reservation on this slot
    #[inline]
    pub fn invalidate(&self) {
        self.timestamp.fetch_add(Self::STEP, Ordering::Release);
    }
}

impl Default for Reservation {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size table of reservation slots indexed by guest cache line
pub struct ReservationTable {
    slots: Box<[Reservation]>,
}

impl ReservationTable {
    pub fn new() -> Self {
        let slots = (0..RESERVATION_TABLE_SIZE)
            .map(|_| Reservation::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    /// Slot covering the cache line of `addr`
    #[inline]
    pub fn get(&self, addr: u32) -> &Reservation {
        let line = (addr / RESERVATION_GRANULARITY) as usize;
        &self.slots[line & (RESERVATION_TABLE_SIZE - 1)]
    }

    /// Invalidate every line touched by a store of `len` bytes at `addr`
    pub fn invalidate_range(&self, addr: u32, len: u32) {
        if len == 0 {
            return;
        }
        let first = addr / RESERVATION_GRANULARITY;
        let last = addr.saturating_add(len - 1) / RESERVATION_GRANULARITY;
        for line in first..=last {
            self.slots[line as usize & (RESERVATION_TABLE_SIZE - 1)].invalidate();
        }
    }
}

impl Default for ReservationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_after_acquire() {
        let res = Reservation::new();
        let time = res.acquire();
        assert!(res.try_lock(time));
        assert!(res.is_locked());
        assert!(!res.try_lock(time));

        res.unlock_and_increment();
        assert!(!res.is_locked());
        assert_eq!(res.acquire(), time + 128);
    }

    #[test]
    fn test_store_breaks_reservation() {
        let res = Reservation::new();
        let time = res.acquire();
        res.invalidate();
        assert!(!res.try_lock(time));
    }

    #[test]
    fn test_table_lines() {
        let table = ReservationTable::new();
        let time = table.get(0x1000).acquire();

        // Same line, different byte
        assert_eq!(table.get(0x107F).acquire(), time);
        table.invalidate_range(0x1040, 4);
        assert!(!table.get(0x1000).try_lock(time));

        // Neighbouring line is untouched
        let next = table.get(0x1080).acquire();
        assert!(table.get(0x1080).try_lock(next));
        table.get(0x1080).unlock_and_increment();
    }

    #[test]
    fn test_invalidate_range_spanning_lines() {
        let table = ReservationTable::new();
        let a = table.get(0x2078).acquire();
        let b = table.get(0x2080).acquire();
        table.invalidate_range(0x207C, 8);
        assert_ne!(table.get(0x2078).acquire(), a);
        assert_ne!(table.get(0x2080).acquire(), b);
    }
}
