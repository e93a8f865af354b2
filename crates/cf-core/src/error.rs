//! Error types shared across the cellforge crates

use thiserror::Error;

/// Guest memory errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Unmapped guest address 0x{addr:08x}")]
    Unmapped { addr: u32 },

    #[error("Access violation at 0x{addr:08x} (page flags 0x{flags:x})")]
    AccessViolation { addr: u32, flags: u32 },

    #[error("Out of guest memory (requested 0x{size:x} bytes)")]
    OutOfMemory { size: u32 },

    #[error("Invalid alignment 0x{align:x}")]
    InvalidAlignment { align: u32 },

    #[error("Host memory operation failed: {0}")]
    Os(String),
}

/// Errors raised by the guest operating-system collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Unknown syscall {0}")]
    UnknownSyscall(u64),

    #[error("Syscall {num} failed with code 0x{code:08x}")]
    Failed { num: u64, code: u32 },
}

/// PPU execution errors
#[derive(Debug, Error)]
pub enum PpuError {
    #[error("Invalid instruction 0x{opcode:08x} at 0x{addr:08x}")]
    InvalidInstruction { addr: u32, opcode: u32 },

    #[error("Memory fault at 0x{addr:08x}: {source}")]
    Memory {
        addr: u32,
        #[source]
        source: MemoryError,
    },

    #[error("Syscall error: {0}")]
    Syscall(#[from] KernelError),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Code generation failed: {0}")]
    Codegen(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_display() {
        let err = MemoryError::Unmapped { addr: 0x1234 };
        assert_eq!(err.to_string(), "Unmapped guest address 0x00001234");
    }

    #[test]
    fn test_ppu_error_wraps_memory() {
        let err = PpuError::Memory {
            addr: 0x10000,
            source: MemoryError::Unmapped { addr: 0x10000 },
        };
        assert!(err.to_string().contains("0x00010000"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_kernel_error_conversion() {
        let err: PpuError = KernelError::UnknownSyscall(999).into();
        assert!(matches!(err, PpuError::Syscall(KernelError::UnknownSyscall(999))));
    }
}
