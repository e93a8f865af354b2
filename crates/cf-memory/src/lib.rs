//! Guest memory for the cellforge PPU engine
//!
//! A flat 32-bit big-endian guest address space backed by one host
//! reservation, with per-page protection and the reservation granules used
//! by the PPU's load-reserve/store-conditional instructions.

pub mod constants;
mod host;
pub mod manager;
pub mod pages;
pub mod reservation;

pub use manager::{GuestValue, MemoryManager};
pub use pages::PageFlags;
pub use reservation::{Reservation, ReservationTable};
