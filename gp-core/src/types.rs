//! Core data types assembled by the fingerprint pipeline

use serde::{Deserialize, Serialize};

/// Static capability data for one device, as far as the configured provider
/// can supply it. Absent fields are simply not published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub memory_mib: Option<u64>,
    pub power_w: Option<u64>,
    pub bar1_mib: Option<u64>,
    pub pci_bandwidth_mb_per_s: Option<u64>,
    pub cores_clock_mhz: Option<u64>,
    pub memory_clock_mhz: Option<u64>,
    pub display_state: Option<String>,
    pub persistence_mode: Option<String>,
}

/// One discovered device as seen by a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintDevice {
    /// PCI bus address; the stable identity of the device across polls.
    pub id: String,
    /// Product name, when the inventory resolved one. Nameless devices are
    /// grouped under a sentinel name at publication time.
    pub display_name: Option<String>,
    pub capabilities: DeviceCapabilities,
}

impl FingerprintDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            capabilities: DeviceCapabilities::default(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Everything one poll learned about the host: the matching devices in
/// publish order plus the driver version they share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintBatch {
    pub driver_version: String,
    pub devices: Vec<FingerprintDevice>,
}
