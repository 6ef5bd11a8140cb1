//! gpuprint Core Library
//!
//! The device fingerprinting pipeline behind the gpuprint agent.
//!
//! # Pipeline
//!
//! - `inventory` - host inventory and driver-version seams
//! - `classify` - vendor/device/driver filtering, stable publish ordering
//! - `diff` - poll-to-poll change gating
//! - `group` - device group assembly for publication
//! - `fingerprint` - the long-running worker loop and its event stream
//! - `config` - agent configuration with the two standard instances
//!
//! # Example
//!
//! ```no_run
//! use gp_core::{DeviceFilter, SnapshotDiffer};
//!
//! // The pass-through classifier variant.
//! let filter = DeviceFilter::new(0x10de, 0x102d).with_driver("vfio-pci");
//!
//! let differ = SnapshotDiffer::new();
//! assert!(differ.observe(["0000:06:00.0"]));
//! ```

pub mod capability;
pub mod classify;
pub mod config;
pub mod constants;
pub mod diff;
pub mod fingerprint;
pub mod group;
pub mod inventory;
pub mod types;

// Re-export pipeline types
pub use classify::{order_devices, DeviceFilter};
pub use diff::SnapshotDiffer;
pub use group::group_devices;
pub use types::{DeviceCapabilities, FingerprintBatch, FingerprintDevice};

// Re-export host access seams and shipped implementations
pub use capability::{
    AlwaysHealthy, CapabilityProvider, HealthProvider, NullCapabilityProvider,
    StaticCapabilityProvider,
};
pub use inventory::{DriverVersionSource, HostInventory, InventorySource, SysfsDriverVersion};

// Re-export worker machinery
pub use fingerprint::{FingerprintWorker, Shutdown, WorkerSources};

// Re-export configuration
pub use config::{
    load_config, validate_config, AgentConfig, CapabilityMode, DeviceSpec, DEFAULT_CONFIG_PATH,
};

// Re-export error types
pub use gp_error::{GpuprintError, Result};
