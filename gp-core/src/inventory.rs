//! Host inventory and driver-version sources
//!
//! The worker reads the host exclusively through these seams, so tests can
//! drive the whole pipeline with synthetic hardware.

use gp_error::Result;
use gp_pci::PciDevice;
use std::collections::HashMap;
use tracing::debug;

/// Produces one complete inventory scan per call, keyed by bus address.
/// Calls are synchronous and not cancellable; there is no partial result.
pub trait InventorySource: Send {
    fn list_devices(&self) -> Result<HashMap<String, PciDevice>>;
}

/// Looks up the version of a named kernel driver.
pub trait DriverVersionSource: Send {
    fn driver_version(&self, driver: &str) -> Result<String>;
}

/// The local host's PCI bus, scanned via lspci.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInventory;

impl HostInventory {
    pub fn new() -> Self {
        Self
    }

    /// Verify the inventory tool is usable. Run once at startup; a failure
    /// here becomes the single error event a worker publishes before exit.
    pub fn probe(&self) -> Result<()> {
        gp_pci::probe()?;
        debug!("PCI inventory probe succeeded");
        Ok(())
    }
}

impl InventorySource for HostInventory {
    fn list_devices(&self) -> Result<HashMap<String, PciDevice>> {
        gp_pci::list_devices()
    }
}

/// Driver versions from the local host's sysfs module records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysfsDriverVersion;

impl SysfsDriverVersion {
    pub fn new() -> Self {
        Self
    }
}

impl DriverVersionSource for SysfsDriverVersion {
    fn driver_version(&self, driver: &str) -> Result<String> {
        gp_pci::driver_version(driver)
    }
}
