//! Configuration for the cellforge engine
//!
//! Configuration is stored as TOML in the platform configuration directory
//! (`<config dir>/cellforge/config.toml`). A missing file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ppu: PpuConfig,
    pub debug: DebugConfig,
}

/// Execution strategy used for PPU threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorMode {
    /// Decode and execute one instruction at a time
    #[default]
    Interpreter,
    /// Lower and compile each function when it is first entered
    Function,
    /// Lower every discovered function of a segment ahead of time
    Module,
}

impl TranslatorMode {
    /// Whether this mode needs control-flow discovery before execution
    pub fn requires_analysis(self) -> bool {
        !matches!(self, TranslatorMode::Interpreter)
    }
}

impl std::str::FromStr for TranslatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interpreter" | "instruction" => Ok(TranslatorMode::Interpreter),
            "function" => Ok(TranslatorMode::Function),
            "module" => Ok(TranslatorMode::Module),
            other => Err(format!("unknown translator mode '{}'", other)),
        }
    }
}

/// PPU settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpuConfig {
    pub translator: TranslatorMode,
    /// Stack size given to newly created guest threads
    pub stack_size: u32,
    /// Let the syscall collaborator service `sc` instructions
    pub hle_enabled: bool,
}

impl Default for PpuConfig {
    fn default() -> Self {
        Self {
            translator: TranslatorMode::Interpreter,
            stack_size: 0x10000,
            hle_enabled: true,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Diagnostics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
    /// Emit a trace event for every interpreted instruction
    pub trace_instructions: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("cellforge.log"),
            trace_instructions: false,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("cellforge").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ppu.translator, TranslatorMode::Interpreter);
        assert_eq!(config.debug.log_level, LogLevel::Info);
        assert!(!config.debug.trace_instructions);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [ppu]
            translator = "module"

            [debug]
            log_level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.ppu.translator, TranslatorMode::Module);
        assert_eq!(config.ppu.stack_size, 0x10000);
        assert_eq!(config.debug.log_level, LogLevel::Trace);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.ppu.translator = TranslatorMode::Function;
        config.debug.trace_instructions = true;

        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("cellforge-missing-config-test.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_translator_mode_from_str() {
        assert_eq!("Function".parse::<TranslatorMode>(), Ok(TranslatorMode::Function));
        assert_eq!("instruction".parse::<TranslatorMode>(), Ok(TranslatorMode::Interpreter));
        assert!("jit".parse::<TranslatorMode>().is_err());
        assert!(TranslatorMode::Module.requires_analysis());
    }
}
