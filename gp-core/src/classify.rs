//! Device classification and ordering
//!
//! Narrows a raw PCI scan down to the configured accelerator devices and puts
//! the survivors into a stable publish order. The same filter type covers
//! both standard instances: the native one matches on vendor/device id alone,
//! the pass-through one additionally requires the VFIO driver binding.

use gp_pci::PciDevice;
use std::collections::HashMap;

/// Selects inventory records by vendor and device id, optionally requiring a
/// specific bound kernel driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    vendor_id: u16,
    device_id: u16,
    driver: Option<String>,
}

impl DeviceFilter {
    pub fn new(vendor_id: u16, device_id: u16) -> Self {
        Self {
            vendor_id,
            device_id,
            driver: None,
        }
    }

    /// Additionally require the device to be bound to `driver`.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn matches(&self, device: &PciDevice) -> bool {
        if device.vendor_id != self.vendor_id || device.device_id != self.device_id {
            return false;
        }
        match &self.driver {
            Some(want) => device.driver.as_deref() == Some(want.as_str()),
            None => true,
        }
    }

    /// The matching subset of one inventory scan, in map order. An empty
    /// result is not an error: the host has no matching hardware.
    pub fn select(&self, inventory: &HashMap<String, PciDevice>) -> Vec<PciDevice> {
        inventory
            .values()
            .filter(|d| self.matches(d))
            .cloned()
            .collect()
    }
}

/// Sort devices into publish order, ascending by bus address. Addresses are
/// unique per scan, so the order is total and reproducible regardless of how
/// the inventory map happened to iterate.
pub fn order_devices(devices: &mut [PciDevice]) {
    devices.sort_by(|a, b| a.address.cmp(&b.address));
}
