//! Capability and health provider seams
//!
//! In a full deployment these answers come from vendor management libraries.
//! The shipped providers stand in for those bindings: a static capability
//! block for the supported product, and an always-healthy verdict. Real
//! health data would require management-library bindings.

use crate::types::DeviceCapabilities;
use gp_pci::PciDevice;

/// Supplies static capability data for a discovered device.
pub trait CapabilityProvider: Send {
    fn capabilities(&self, device: &PciDevice) -> DeviceCapabilities;
}

/// Answers health queries for discovered devices.
pub trait HealthProvider: Send {
    fn is_healthy(&self, id: &str) -> bool;
}

// Tesla K80 (GK210GL) capability block.
const K80_MEMORY_MIB: u64 = 11_441;
const K80_POWER_W: u64 = 149;
const K80_BAR1_MIB: u64 = 16_384;
const K80_PCI_BANDWIDTH_MB_PER_S: u64 = 15_760;
const K80_CORES_CLOCK_MHZ: u64 = 875;
const K80_MEMORY_CLOCK_MHZ: u64 = 2_505;

/// Fixed capability data for the supported device family.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCapabilityProvider;

impl CapabilityProvider for StaticCapabilityProvider {
    fn capabilities(&self, _device: &PciDevice) -> DeviceCapabilities {
        DeviceCapabilities {
            memory_mib: Some(K80_MEMORY_MIB),
            power_w: Some(K80_POWER_W),
            bar1_mib: Some(K80_BAR1_MIB),
            pci_bandwidth_mb_per_s: Some(K80_PCI_BANDWIDTH_MB_PER_S),
            cores_clock_mhz: Some(K80_CORES_CLOCK_MHZ),
            memory_clock_mhz: Some(K80_MEMORY_CLOCK_MHZ),
            display_state: Some("Enabled".to_string()),
            persistence_mode: Some("Enabled".to_string()),
        }
    }
}

/// No capability data at all. Pass-through devices are opaque to the host,
/// so their groups carry only the common attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCapabilityProvider;

impl CapabilityProvider for NullCapabilityProvider {
    fn capabilities(&self, _device: &PciDevice) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }
}

/// Reports every device healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

impl HealthProvider for AlwaysHealthy {
    fn is_healthy(&self, _id: &str) -> bool {
        true
    }
}
