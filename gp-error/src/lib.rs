//! Unified error handling for gpuprint
//!
//! This crate provides a single error type used across all gpuprint components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using GpuprintError
pub type Result<T> = std::result::Result<T, GpuprintError>;

/// Unified error type for all gpuprint operations
#[derive(thiserror::Error, Debug)]
pub enum GpuprintError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Hardware discovery unavailable: {0}")]
    HardwareInit(String),

    #[error("PCI inventory scan failed: {reason}")]
    InventoryScan {
        reason: String,
    },

    #[error("Failed to read version for driver {driver}: {reason}")]
    DriverVersion {
        driver: String,
        reason: String,
    },

    // ============================================================================
    // Configuration and Settings Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl GpuprintError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a hardware initialization error from a string
    pub fn hardware_init(msg: impl Into<String>) -> Self {
        Self::HardwareInit(msg.into())
    }

    /// Create an inventory scan error from a string
    pub fn inventory(reason: impl Into<String>) -> Self {
        Self::InventoryScan {
            reason: reason.into(),
        }
    }

    /// Create a driver version lookup error
    pub fn driver_version(driver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DriverVersion {
            driver: driver.into(),
            reason: reason.into(),
        }
    }
}

// Allow converting from String to GpuprintError
impl From<String> for GpuprintError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to GpuprintError
impl From<&str> for GpuprintError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
