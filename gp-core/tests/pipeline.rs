/*
 * Pipeline tests for the fingerprint worker
 *
 * These drive the full loop (inventory -> classify -> order -> diff ->
 * group -> publish) against scripted host sources, with the clock paused so
 * every timing interaction is deterministic.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gp_core::{
    AlwaysHealthy, CapabilityProvider, DeviceFilter, DriverVersionSource, FingerprintWorker,
    GpuprintError, InventorySource, NullCapabilityProvider, Shutdown, StaticCapabilityProvider,
    WorkerSources,
};
use gp_pci::PciDevice;
use gp_protocol::{Attribute, FingerprintResponse, DRIVER_VERSION_ATTR};
use tokio::sync::mpsc;
use tokio::task::yield_now;
use tokio::time::{advance, timeout};

// ============================================================================
// Scripted host sources
// ============================================================================

/// Replays a fixed sequence of scans, one per poll; the last entry repeats.
/// `None` entries simulate a failed scan.
struct ScriptedInventory {
    scans: Vec<Option<Vec<PciDevice>>>,
    cursor: AtomicUsize,
    polls: Arc<AtomicUsize>,
}

impl ScriptedInventory {
    fn new(scans: Vec<Option<Vec<PciDevice>>>) -> (Self, Arc<AtomicUsize>) {
        assert!(!scans.is_empty());
        let polls = Arc::new(AtomicUsize::new(0));
        let source = Self {
            scans,
            cursor: AtomicUsize::new(0),
            polls: Arc::clone(&polls),
        };
        (source, polls)
    }
}

impl InventorySource for ScriptedInventory {
    fn list_devices(&self) -> gp_core::Result<HashMap<String, PciDevice>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let idx = self
            .cursor
            .fetch_add(1, Ordering::SeqCst)
            .min(self.scans.len() - 1);
        match &self.scans[idx] {
            Some(devices) => Ok(devices
                .iter()
                .cloned()
                .map(|d| (d.address.clone(), d))
                .collect()),
            None => Err(GpuprintError::inventory("scripted scan failure")),
        }
    }
}

struct StaticVersion(&'static str);

impl DriverVersionSource for StaticVersion {
    fn driver_version(&self, _driver: &str) -> gp_core::Result<String> {
        Ok(self.0.to_string())
    }
}

struct FailingVersion;

impl DriverVersionSource for FailingVersion {
    fn driver_version(&self, driver: &str) -> gp_core::Result<String> {
        Err(GpuprintError::driver_version(driver, "no module record"))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn vfio_k80(address: &str) -> PciDevice {
    PciDevice {
        address: address.to_string(),
        vendor_id: 0x10de,
        device_id: 0x102d,
        description: "GK210GL [Tesla K80]".to_string(),
        driver: Some("vfio-pci".to_string()),
    }
}

fn amd_gpu(address: &str) -> PciDevice {
    PciDevice {
        address: address.to_string(),
        vendor_id: 0x1002,
        device_id: 0x0000,
        description: "Vega 10".to_string(),
        driver: Some("amdgpu".to_string()),
    }
}

fn vfio_filter() -> DeviceFilter {
    DeviceFilter::new(0x10de, 0x102d).with_driver("vfio-pci")
}

struct Harness {
    rx: mpsc::Receiver<FingerprintResponse>,
    shutdown: Shutdown,
    polls: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

fn start_worker(
    scans: Vec<Option<Vec<PciDevice>>>,
    filter: DeviceFilter,
    versions: Box<dyn DriverVersionSource>,
    capabilities: Box<dyn CapabilityProvider>,
    period_secs: u64,
) -> Harness {
    let (inventory, polls) = ScriptedInventory::new(scans);
    let sources = WorkerSources {
        inventory: Box::new(inventory),
        versions,
        capabilities,
        health: Box::new(AlwaysHealthy),
    };

    let (tx, rx) = mpsc::channel(1);
    let shutdown = Shutdown::new();
    let worker = FingerprintWorker::new("vfio-gpu", filter, "vfio-pci", sources, tx, shutdown.clone())
        .with_poll_period(Duration::from_secs(period_secs));

    let handle = tokio::spawn(worker.run());
    Harness {
        rx,
        shutdown,
        polls,
        handle,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn end_to_end_vfio_scenario() {
    let scan = vec![
        vfio_k80("0000:07:00.0"),
        vfio_k80("0000:06:00.0"),
        amd_gpu("0000:08:00.0"),
    ];
    let mut h = start_worker(
        vec![Some(scan)],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        60,
    );

    // The first tick fires immediately, and a first non-empty scan is always
    // a change.
    let event = h.rx.recv().await.expect("first snapshot");
    assert!(!event.is_error());
    assert_eq!(event.groups.len(), 1);

    let group = &event.groups[0];
    assert_eq!(group.vendor, "nvidia");
    assert_eq!(group.device_type, "gpu");
    assert_eq!(group.name, "GK210GL [Tesla K80]");

    let ids: Vec<&str> = group.devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["0000:06:00.0", "0000:07:00.0"]);
    for device in &group.devices {
        assert!(device.healthy);
        assert_eq!(
            device.hw_locality.as_ref().unwrap().pci_bus_id,
            device.id
        );
    }

    assert_eq!(
        group.attributes[DRIVER_VERSION_ATTR],
        Attribute::string("0.2")
    );

    h.shutdown.trigger();
    h.handle.await.unwrap();
    assert!(h.rx.recv().await.is_none(), "stream closes on shutdown");
}

#[tokio::test(start_paused = true)]
async fn unchanged_inventory_is_published_once() {
    let scan = vec![vfio_k80("0000:06:00.0"), vfio_k80("0000:07:00.0")];
    let mut h = start_worker(
        vec![Some(scan)],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        10,
    );

    let first = h.rx.recv().await.expect("first snapshot");
    assert_eq!(first.groups[0].devices.len(), 2);

    // Several more polls happen while we wait, none of which may publish.
    let quiet = timeout(Duration::from_secs(35), h.rx.recv()).await;
    assert!(quiet.is_err(), "no event for an unchanged device set");
    assert!(h.polls.load(Ordering::SeqCst) >= 3);

    h.shutdown.trigger();
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn membership_change_triggers_republish() {
    let scan_one = vec![vfio_k80("0000:06:00.0")];
    let scan_two = vec![vfio_k80("0000:06:00.0"), vfio_k80("0000:07:00.0")];
    let mut h = start_worker(
        vec![Some(scan_one), Some(scan_two)],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        10,
    );

    let first = h.rx.recv().await.expect("first snapshot");
    assert_eq!(first.groups[0].devices.len(), 1);

    let second = h.rx.recv().await.expect("snapshot after hotplug");
    assert_eq!(second.groups[0].devices.len(), 2);

    h.shutdown.trigger();
    h.handle.await.unwrap();
    assert!(h.rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn inventory_failure_is_fatal_after_one_error_event() {
    let scan = vec![vfio_k80("0000:06:00.0")];
    let mut h = start_worker(
        vec![Some(scan), None],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        10,
    );

    let first = h.rx.recv().await.expect("snapshot before the failure");
    assert!(!first.is_error());

    let second = h.rx.recv().await.expect("error event");
    assert!(second.is_error());
    assert!(second.error.as_deref().unwrap().contains("scan"));

    assert!(h.rx.recv().await.is_none(), "stream closes after the error");
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn driver_version_failure_is_fatal_on_first_poll() {
    let scan = vec![vfio_k80("0000:06:00.0")];
    let mut h = start_worker(
        vec![Some(scan)],
        vfio_filter(),
        Box::new(FailingVersion),
        Box::new(NullCapabilityProvider),
        10,
    );

    let event = h.rx.recv().await.expect("error event");
    assert!(event.is_error());
    assert!(h.rx.recv().await.is_none());
    h.handle.await.unwrap();
    assert_eq!(h.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_idle_closes_without_error() {
    let scan = vec![vfio_k80("0000:06:00.0")];
    let mut h = start_worker(
        vec![Some(scan)],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        60,
    );

    let first = h.rx.recv().await.expect("first snapshot");
    assert!(!first.is_error());

    // Worker is now parked until the next tick; cancel it there.
    h.shutdown.trigger();
    h.handle.await.unwrap();

    assert!(h.rx.recv().await.is_none(), "clean close, no error event");
    assert_eq!(h.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_consumer_stops_the_worker() {
    let scan = vec![vfio_k80("0000:06:00.0")];
    let h = start_worker(
        vec![Some(scan)],
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        10,
    );

    drop(h.rx);
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn full_channel_throttles_polling_until_drained() {
    let scans = vec![
        Some(vec![vfio_k80("0000:06:00.0")]),
        Some(vec![vfio_k80("0000:06:00.0"), vfio_k80("0000:07:00.0")]),
        Some(vec![
            vfio_k80("0000:06:00.0"),
            vfio_k80("0000:07:00.0"),
            vfio_k80("0000:09:00.0"),
        ]),
    ];
    let mut h = start_worker(
        scans,
        vfio_filter(),
        Box::new(StaticVersion("0.2")),
        Box::new(NullCapabilityProvider),
        10,
    );

    // First poll fills the single channel slot.
    while h.polls.load(Ordering::SeqCst) < 1 {
        yield_now().await;
    }

    // Second poll publishes into a full channel and blocks there.
    advance(Duration::from_secs(10)).await;
    while h.polls.load(Ordering::SeqCst) < 2 {
        yield_now().await;
    }

    // However far the clock advances, a blocked worker cannot poll again.
    advance(Duration::from_secs(50)).await;
    for _ in 0..10 {
        yield_now().await;
    }
    assert_eq!(h.polls.load(Ordering::SeqCst), 2);

    let first = h.rx.recv().await.expect("first snapshot");
    assert_eq!(first.groups[0].devices.len(), 1);
    let second = h.rx.recv().await.expect("snapshot queued behind the first");
    assert_eq!(second.groups[0].devices.len(), 2);

    h.shutdown.trigger();
    // Drain anything the worker managed to publish before seeing the signal.
    while h.rx.recv().await.is_some() {}
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn init_error_suppresses_polling_entirely() {
    let (inventory, polls) = ScriptedInventory::new(vec![Some(vec![vfio_k80("0000:06:00.0")])]);
    let sources = WorkerSources {
        inventory: Box::new(inventory),
        versions: Box::new(StaticVersion("0.2")),
        capabilities: Box::new(NullCapabilityProvider),
        health: Box::new(AlwaysHealthy),
    };

    let (tx, mut rx) = mpsc::channel(1);
    let worker = FingerprintWorker::new(
        "vfio-gpu",
        vfio_filter(),
        "vfio-pci",
        sources,
        tx,
        Shutdown::new(),
    )
    .with_init_error(GpuprintError::hardware_init("lspci unavailable"));

    worker.run().await;

    let event = rx.recv().await.expect("single error event");
    assert!(event.is_error());
    assert!(rx.recv().await.is_none());
    assert_eq!(polls.load(Ordering::SeqCst), 0, "init errors never poll");
}

#[tokio::test(start_paused = true)]
async fn static_capabilities_reach_the_wire() {
    let scan = vec![vfio_k80("0000:06:00.0")];
    let mut h = start_worker(
        vec![Some(scan)],
        DeviceFilter::new(0x10de, 0x102d),
        Box::new(StaticVersion("535.161.07")),
        Box::new(StaticCapabilityProvider),
        60,
    );

    let event = h.rx.recv().await.expect("first snapshot");
    let attrs = &event.groups[0].attributes;
    assert_eq!(attrs["memory"], Attribute::int(11_441).with_unit("MiB"));
    assert_eq!(attrs["power"], Attribute::int(149).with_unit("W"));
    assert_eq!(attrs["bar1"], Attribute::int(16_384).with_unit("MiB"));
    assert_eq!(
        attrs["pci_bandwidth"],
        Attribute::int(15_760).with_unit("MB/s")
    );
    assert_eq!(attrs["cores_clock"], Attribute::int(875).with_unit("MHz"));
    assert_eq!(attrs["memory_clock"], Attribute::int(2_505).with_unit("MHz"));
    assert_eq!(
        attrs[DRIVER_VERSION_ATTR],
        Attribute::string("535.161.07")
    );

    h.shutdown.trigger();
    h.handle.await.unwrap();
}
