use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute key under which the host driver version is published on every group.
pub const DRIVER_VERSION_ATTR: &str = "driver_version";

/// A typed attribute value with an optional unit.
///
/// Exactly one of `string_val` / `int_val` is expected to be set; consumers
/// treat an attribute with neither as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_val: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int_val: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Attribute {
    pub fn string(v: impl Into<String>) -> Self {
        Self {
            string_val: Some(v.into()),
            int_val: None,
            unit: None,
        }
    }

    pub fn int(v: i64) -> Self {
        Self {
            string_val: None,
            int_val: Some(v),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Hardware locality hints for a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLocality {
    pub pci_bus_id: String,
}

/// One discovered device inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier (the PCI bus address).
    pub id: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_locality: Option<DeviceLocality>,
}

/// A set of devices sharing vendor, type, and product name, reported as one
/// schedulable unit with common attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub vendor: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub name: String,
    pub devices: Vec<Device>,
    pub attributes: HashMap<String, Attribute>,
}

/// One event on the fingerprint stream: either a full device snapshot or a
/// terminal error. An error event is always the last event before the stream
/// closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<DeviceGroup>,
}

impl FingerprintResponse {
    /// A snapshot event carrying the complete current set of device groups.
    pub fn devices(groups: Vec<DeviceGroup>) -> Self {
        Self {
            error: None,
            groups,
        }
    }

    /// A terminal error event.
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            groups: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
