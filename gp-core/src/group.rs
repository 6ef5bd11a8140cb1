//! Device group assembly
//!
//! Turns one poll's device batch into the groups a consumer schedules
//! against. Devices sharing a product name form one group; nameless devices
//! are collected under a sentinel group rather than dropped.

use crate::capability::HealthProvider;
use crate::constants::{attrs, units, NAME_UNAVAILABLE};
use crate::types::{FingerprintBatch, FingerprintDevice};
use gp_protocol::{Attribute, Device, DeviceGroup, DeviceLocality, DRIVER_VERSION_ATTR};
use std::collections::{BTreeMap, HashMap};

/// Group a batch by display name. Group order is deterministic (sorted by
/// name), and an empty batch produces no groups.
pub fn group_devices(
    batch: &FingerprintBatch,
    vendor: &str,
    device_type: &str,
    health: &dyn HealthProvider,
) -> Vec<DeviceGroup> {
    let common_attributes = HashMap::from([(
        DRIVER_VERSION_ATTR.to_string(),
        Attribute::string(batch.driver_version.clone()),
    )]);

    let mut by_name: BTreeMap<&str, Vec<&FingerprintDevice>> = BTreeMap::new();
    for device in &batch.devices {
        let name = device.display_name.as_deref().unwrap_or(NAME_UNAVAILABLE);
        by_name.entry(name).or_default().push(device);
    }

    by_name
        .into_iter()
        .map(|(name, members)| {
            group_from_members(
                name,
                &members,
                &common_attributes,
                vendor,
                device_type,
                health,
            )
        })
        .collect()
}

fn group_from_members(
    name: &str,
    members: &[&FingerprintDevice],
    common_attributes: &HashMap<String, Attribute>,
    vendor: &str,
    device_type: &str,
    health: &dyn HealthProvider,
) -> DeviceGroup {
    // Members of a group are assumed capability-homogeneous, so the first
    // device's attributes speak for all of them. Common attributes overwrite
    // derived ones on key collision.
    let mut attributes = device_attributes(members[0]);
    for (key, value) in common_attributes {
        attributes.insert(key.clone(), value.clone());
    }

    let devices = members
        .iter()
        .map(|d| Device {
            id: d.id.clone(),
            healthy: health.is_healthy(&d.id),
            hw_locality: Some(DeviceLocality {
                pci_bus_id: d.id.clone(),
            }),
        })
        .collect();

    DeviceGroup {
        vendor: vendor.to_string(),
        device_type: device_type.to_string(),
        name: name.to_string(),
        devices,
        attributes,
    }
}

fn device_attributes(device: &FingerprintDevice) -> HashMap<String, Attribute> {
    let caps = &device.capabilities;
    let mut map = HashMap::new();

    let mut put_int = |key: &str, value: Option<u64>, unit: &str| {
        if let Some(v) = value {
            map.insert(key.to_string(), Attribute::int(v as i64).with_unit(unit));
        }
    };

    put_int(attrs::MEMORY, caps.memory_mib, units::MIB);
    put_int(attrs::POWER, caps.power_w, units::WATTS);
    put_int(attrs::BAR1, caps.bar1_mib, units::MIB);
    put_int(attrs::PCI_BANDWIDTH, caps.pci_bandwidth_mb_per_s, units::MB_PER_S);
    put_int(attrs::CORES_CLOCK, caps.cores_clock_mhz, units::MHZ);
    put_int(attrs::MEMORY_CLOCK, caps.memory_clock_mhz, units::MHZ);

    if let Some(state) = &caps.display_state {
        map.insert(attrs::DISPLAY_STATE.to_string(), Attribute::string(state));
    }
    if let Some(mode) = &caps.persistence_mode {
        map.insert(attrs::PERSISTENCE_MODE.to_string(), Attribute::string(mode));
    }

    map
}
