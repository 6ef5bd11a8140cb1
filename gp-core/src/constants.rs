//! Constants shared across the fingerprint pipeline

/// PCI vendor id of the supported GPU family (NVIDIA).
pub const NVIDIA_VENDOR_ID: u16 = 0x10de;

/// PCI device id of the supported GPU product (GK210GL / Tesla K80).
pub const TESLA_K80_DEVICE_ID: u16 = 0x102d;

/// Kernel driver providing the native NVIDIA binding.
pub const NVIDIA_DRIVER: &str = "nvidia";

/// Kernel driver providing VFIO pass-through binding.
pub const VFIO_DRIVER: &str = "vfio-pci";

/// Vendor label reported on device groups.
pub const DEFAULT_VENDOR: &str = "nvidia";

/// Device type reported on device groups.
pub const DEFAULT_DEVICE_TYPE: &str = "gpu";

/// Group name for devices whose product name could not be resolved.
pub const NAME_UNAVAILABLE: &str = "notAvailable";

/// Seconds between fingerprint polls unless configured otherwise.
pub const DEFAULT_POLL_PERIOD_SECS: u64 = 60;

/// Bound of the fingerprint event channel. One slot means an undrained
/// snapshot blocks the worker, throttling polling to the consumer's pace.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Attribute keys published on device groups.
pub mod attrs {
    pub const MEMORY: &str = "memory";
    pub const POWER: &str = "power";
    pub const BAR1: &str = "bar1";
    pub const PCI_BANDWIDTH: &str = "pci_bandwidth";
    pub const CORES_CLOCK: &str = "cores_clock";
    pub const MEMORY_CLOCK: &str = "memory_clock";
    pub const DISPLAY_STATE: &str = "display_state";
    pub const PERSISTENCE_MODE: &str = "persistence_mode";
}

/// Units attached to numeric attributes.
pub mod units {
    pub const MIB: &str = "MiB";
    pub const WATTS: &str = "W";
    pub const MB_PER_S: &str = "MB/s";
    pub const MHZ: &str = "MHz";
}
