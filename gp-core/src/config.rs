//! Agent configuration
//!
//! A single JSON document with per-instance device specs. Missing file means
//! built-in defaults, which ship the two standard instances (native driver
//! and VFIO pass-through).

use crate::classify::DeviceFilter;
use crate::constants::{
    DEFAULT_DEVICE_TYPE, DEFAULT_POLL_PERIOD_SECS, DEFAULT_VENDOR, EVENT_CHANNEL_CAPACITY,
    NVIDIA_DRIVER, VFIO_DRIVER,
};
use gp_error::{GpuprintError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default location of the agent configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gpuprint/config.json";

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds between fingerprint polls, unless a device spec overrides it.
    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: u64,

    /// Bound of each worker's event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Device instances to fingerprint. Each gets its own worker.
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

/// How capability attributes are produced for an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMode {
    /// Static capability block for the supported product.
    #[default]
    Static,
    /// No capability attributes; groups carry only common attributes.
    None,
}

/// One fingerprinted device instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Instance name, unique across the configuration.
    pub name: String,

    /// Vendor label reported on this instance's groups.
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Device type reported on this instance's groups.
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// PCI vendor id as a hex string, `10de` or `0x10de`.
    pub vendor_id: String,

    /// PCI device id as a hex string.
    pub device_id: String,

    /// Require devices to be bound to this kernel driver. Unset means any
    /// binding (including none) is accepted.
    #[serde(default)]
    pub driver: Option<String>,

    /// Driver whose sysfs module version is reported for this instance.
    /// Defaults to `driver` when unset.
    #[serde(default)]
    pub version_driver: Option<String>,

    /// Per-instance override of the polling period.
    #[serde(default)]
    pub poll_period_secs: Option<u64>,

    #[serde(default)]
    pub capabilities: CapabilityMode,
}

fn default_poll_period_secs() -> u64 {
    DEFAULT_POLL_PERIOD_SECS
}

fn default_event_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}

fn default_vendor() -> String {
    DEFAULT_VENDOR.to_string()
}

fn default_device_type() -> String {
    DEFAULT_DEVICE_TYPE.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_period_secs: default_poll_period_secs(),
            event_capacity: default_event_capacity(),
            devices: vec![DeviceSpec::nvidia_default(), DeviceSpec::vfio_default()],
        }
    }
}

impl DeviceSpec {
    /// The native-driver GPU instance.
    pub fn nvidia_default() -> Self {
        Self {
            name: "nvidia-gpu".to_string(),
            vendor: default_vendor(),
            device_type: default_device_type(),
            vendor_id: "10de".to_string(),
            device_id: "102d".to_string(),
            driver: None,
            version_driver: Some(NVIDIA_DRIVER.to_string()),
            poll_period_secs: None,
            capabilities: CapabilityMode::Static,
        }
    }

    /// The VFIO pass-through instance.
    pub fn vfio_default() -> Self {
        Self {
            name: "vfio-gpu".to_string(),
            vendor: default_vendor(),
            device_type: default_device_type(),
            vendor_id: "10de".to_string(),
            device_id: "102d".to_string(),
            driver: Some(VFIO_DRIVER.to_string()),
            version_driver: None,
            poll_period_secs: None,
            capabilities: CapabilityMode::None,
        }
    }

    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id("vendor_id", &self.vendor_id)
    }

    pub fn device_id(&self) -> Result<u16> {
        parse_hex_id("device_id", &self.device_id)
    }

    /// The driver whose version is looked up for this instance.
    pub fn version_driver(&self) -> Option<&str> {
        self.version_driver.as_deref().or(self.driver.as_deref())
    }

    /// Build the classifier for this instance.
    pub fn filter(&self) -> Result<DeviceFilter> {
        let mut filter = DeviceFilter::new(self.vendor_id()?, self.device_id()?);
        if let Some(driver) = &self.driver {
            filter = filter.with_driver(driver.clone());
        }
        Ok(filter)
    }

    /// Effective polling period, falling back to the config-wide default.
    pub fn poll_period(&self, config_default_secs: u64) -> Duration {
        Duration::from_secs(self.poll_period_secs.unwrap_or(config_default_secs))
    }
}

fn parse_hex_id(field: &str, value: &str) -> Result<u16> {
    let digits = value
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|_| GpuprintError::InvalidConfig {
        field: field.to_string(),
        reason: format!("{:?} is not a 16-bit hex id", value),
    })
}

/// Load configuration from `path`, falling back to the built-in defaults when
/// no file exists.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Ok(AgentConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| GpuprintError::config(format!("Failed to read {}: {}", path.display(), e)))?;

    let config: AgentConfig = serde_json::from_str(&content).map_err(|e| {
        GpuprintError::config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    Ok(config)
}

/// Reject configurations the agent cannot run with.
pub fn validate_config(config: &AgentConfig) -> Result<()> {
    if config.poll_period_secs == 0 {
        return Err(GpuprintError::InvalidConfig {
            field: "poll_period_secs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.event_capacity == 0 {
        return Err(GpuprintError::InvalidConfig {
            field: "event_capacity".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.devices.is_empty() {
        return Err(GpuprintError::MissingConfig("devices".to_string()));
    }

    let mut names = HashSet::new();
    for spec in &config.devices {
        if spec.name.is_empty() {
            return Err(GpuprintError::InvalidConfig {
                field: "devices.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !names.insert(spec.name.as_str()) {
            return Err(GpuprintError::InvalidConfig {
                field: "devices.name".to_string(),
                reason: format!("duplicate instance name {:?}", spec.name),
            });
        }

        spec.vendor_id()?;
        spec.device_id()?;

        if spec.poll_period_secs == Some(0) {
            return Err(GpuprintError::InvalidConfig {
                field: format!("devices.{}.poll_period_secs", spec.name),
                reason: "must be at least 1".to_string(),
            });
        }

        if spec.version_driver().is_none() {
            return Err(GpuprintError::InvalidConfig {
                field: format!("devices.{}.version_driver", spec.name),
                reason: "no driver to resolve a version for; set driver or version_driver"
                    .to_string(),
            });
        }
    }

    Ok(())
}
