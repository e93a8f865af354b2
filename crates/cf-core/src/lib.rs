//! Core services for the cellforge PPU engine
//!
//! Error taxonomy, configuration and logging shared by the memory and
//! PPU crates and by the command-line driver.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, TranslatorMode};
pub use error::{ConfigError, KernelError, MemoryError, PpuError};
