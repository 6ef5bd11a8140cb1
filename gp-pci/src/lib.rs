//! PCI device inventory for gpuprint
//!
//! Discovery via `lspci` in machine-readable mode, driver versions via the
//! sysfs module records under `/sys/bus/pci/drivers`.
//! Requires pciutils; read-only discovery needs no elevated privileges.

use gp_error::{GpuprintError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, trace};

/// Sysfs root holding one directory per bound PCI driver.
const PCI_DRIVERS_ROOT: &str = "/sys/bus/pci/drivers";

/// One PCI function as reported by the host.
///
/// The bus address (domain:bus:device.function) is the stable identifier for
/// the device across rescans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciDevice {
    /// Full bus address, e.g. `0000:06:00.0`.
    pub address: String,
    pub vendor_id: u16,
    pub device_id: u16,
    /// Product name as printed by lspci, without the trailing id tag.
    pub description: String,
    /// Kernel driver currently bound to the function, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// Check that the inventory tool is present and runnable.
pub fn probe() -> Result<()> {
    let output = Command::new("lspci")
        .arg("--version")
        .output()
        .map_err(|e| GpuprintError::HardwareInit(format!("lspci unavailable: {}", e)))?;

    if !output.status.success() {
        return Err(GpuprintError::HardwareInit(
            "lspci --version exited with failure".to_string(),
        ));
    }

    Ok(())
}

/// Scan the host PCI bus and return every function keyed by bus address.
pub fn list_devices() -> Result<HashMap<String, PciDevice>> {
    let output = Command::new("lspci")
        .args(["-D", "-vmm", "-nn", "-k"])
        .output()
        .map_err(|e| GpuprintError::InventoryScan {
            reason: format!("lspci not found: {}", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GpuprintError::InventoryScan {
            reason: format!("lspci failed: {}", stderr.trim()),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let devices = parse_vmm_output(&stdout);
    debug!("PCI scan found {} functions", devices.len());
    Ok(devices)
}

/// Read the version of a loaded kernel driver from its sysfs module record.
pub fn driver_version(driver: &str) -> Result<String> {
    driver_version_at(Path::new(PCI_DRIVERS_ROOT), driver)
}

fn driver_version_at(root: &Path, driver: &str) -> Result<String> {
    let path = root.join(driver).join("module").join("version");
    let raw = fs::read_to_string(&path).map_err(|e| GpuprintError::DriverVersion {
        driver: driver.to_string(),
        reason: format!("{}: {}", path.display(), e),
    })?;

    let version = raw.trim();
    if version.is_empty() {
        return Err(GpuprintError::DriverVersion {
            driver: driver.to_string(),
            reason: "empty version record".to_string(),
        });
    }

    Ok(version.to_string())
}

// ============================================================================
// lspci -vmm Parsing
// ============================================================================

/// Parse the `lspci -Dvmmnnk` record stream: blank-line separated records of
/// `Key:\tValue` lines.
fn parse_vmm_output(text: &str) -> HashMap<String, PciDevice> {
    let mut devices = HashMap::new();

    for block in text.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        match parse_vmm_record(block) {
            Some(dev) => {
                devices.insert(dev.address.clone(), dev);
            }
            None => trace!("Skipping unparseable lspci record: {:?}", block),
        }
    }

    devices
}

fn parse_vmm_record(block: &str) -> Option<PciDevice> {
    let mut address = None;
    let mut vendor_id = None;
    let mut device = None;
    let mut driver = None;

    for line in block.lines() {
        let (key, value) = match line.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => continue,
        };

        match key {
            "Slot" => address = Some(value.to_string()),
            "Vendor" => vendor_id = split_id_suffix(value).map(|(_, id)| id),
            "Device" => device = split_id_suffix(value),
            "Driver" => driver = Some(value.to_string()),
            _ => {}
        }
    }

    let (description, device_id) = device?;
    Some(PciDevice {
        address: address?,
        vendor_id: vendor_id?,
        device_id,
        description: description.to_string(),
        driver,
    })
}

/// Split a `Name [id]` value into the name and its hex id, taking the LAST
/// bracketed token so product names containing brackets stay intact
/// (`GK210GL [Tesla K80] [102d]`).
fn split_id_suffix(value: &str) -> Option<(&str, u16)> {
    let open = value.rfind('[')?;
    let tag = value[open..].strip_prefix('[')?.strip_suffix(']')?;
    let id = u16::from_str_radix(tag, 16).ok()?;
    Some((value[..open].trim_end(), id))
}
