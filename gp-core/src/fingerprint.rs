//! Fingerprint worker loop
//!
//! One worker per configured device instance. The worker polls the host on a
//! timer, gates publishing on the snapshot differ, and emits grouped
//! fingerprints over a bounded channel. It owns the sending half of that
//! channel: returning from [`FingerprintWorker::run`] drops the sender and
//! closes the stream, so consumers observe termination as end-of-stream.
//!
//! Failure policy: initialization, inventory, and driver-version errors are
//! all fatal. Each produces exactly one error event before the stream closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::capability::{AlwaysHealthy, CapabilityProvider, HealthProvider};
use crate::classify::{order_devices, DeviceFilter};
use crate::constants::{DEFAULT_DEVICE_TYPE, DEFAULT_POLL_PERIOD_SECS, DEFAULT_VENDOR};
use crate::diff::SnapshotDiffer;
use crate::group::group_devices;
use crate::inventory::{DriverVersionSource, HostInventory, InventorySource, SysfsDriverVersion};
use crate::types::{FingerprintBatch, FingerprintDevice};
use gp_error::{GpuprintError, Result};
use gp_protocol::FingerprintResponse;

/// Cooperative cancellation handle shared by every worker.
///
/// Cancellation is observed at iteration boundaries only: a poll or publish
/// in progress always finishes first.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call more than once and from any thread.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once `trigger` has been called. Returns immediately if it
    /// already was.
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before the flag re-check so a trigger racing this
        // call cannot slip between check and wait.
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Host access seams injected into a worker.
pub struct WorkerSources {
    pub inventory: Box<dyn InventorySource>,
    pub versions: Box<dyn DriverVersionSource>,
    pub capabilities: Box<dyn CapabilityProvider>,
    pub health: Box<dyn HealthProvider>,
}

impl WorkerSources {
    /// Seams backed by the local host, with the given capability provider.
    pub fn host(capabilities: Box<dyn CapabilityProvider>) -> Self {
        Self {
            inventory: Box::new(HostInventory::new()),
            versions: Box::new(SysfsDriverVersion::new()),
            capabilities,
            health: Box::new(AlwaysHealthy),
        }
    }
}

/// The long-running fingerprint loop for one device instance.
pub struct FingerprintWorker {
    instance: String,
    vendor: String,
    device_type: String,
    filter: DeviceFilter,
    version_driver: String,
    poll_period: Duration,
    sources: WorkerSources,
    differ: SnapshotDiffer,
    init_err: Option<GpuprintError>,
    events: mpsc::Sender<FingerprintResponse>,
    shutdown: Shutdown,
}

impl FingerprintWorker {
    pub fn new(
        instance: impl Into<String>,
        filter: DeviceFilter,
        version_driver: impl Into<String>,
        sources: WorkerSources,
        events: mpsc::Sender<FingerprintResponse>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            instance: instance.into(),
            vendor: DEFAULT_VENDOR.to_string(),
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            filter,
            version_driver: version_driver.into(),
            poll_period: Duration::from_secs(DEFAULT_POLL_PERIOD_SECS),
            sources,
            differ: SnapshotDiffer::new(),
            init_err: None,
            events,
            shutdown,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Record a startup failure. A worker carrying one publishes a single
    /// error event and exits without ever polling.
    pub fn with_init_error(mut self, err: GpuprintError) -> Self {
        self.init_err = Some(err);
        self
    }

    /// Drive the loop until cancellation, a fatal error, or consumer
    /// departure. The event stream closes when this returns.
    pub async fn run(mut self) {
        if let Some(err) = self.init_err.take() {
            error!(
                instance = %self.instance,
                error = %err,
                "hardware access failed at startup, not fingerprinting"
            );
            let _ = self
                .events
                .send(FingerprintResponse::error(err.to_string()))
                .await;
            return;
        }

        info!(
            instance = %self.instance,
            period_secs = self.poll_period.as_secs(),
            "fingerprint worker starting"
        );

        // The first tick fires immediately; Delay keeps a slow consumer from
        // causing a burst of catch-up polls afterwards.
        let mut ticker = tokio::time::interval(self.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.triggered() => {}
                _ = ticker.tick() => {}
            }

            if self.shutdown.is_triggered() {
                info!(instance = %self.instance, "fingerprint worker shutting down");
                return;
            }

            match self.poll_once() {
                Ok(Some(response)) => {
                    if self.events.send(response).await.is_err() {
                        debug!(instance = %self.instance, "event consumer gone, stopping");
                        return;
                    }
                }
                Ok(None) => {
                    debug!(instance = %self.instance, "device set unchanged, nothing to publish");
                }
                Err(err) => {
                    error!(
                        instance = %self.instance,
                        error = %err,
                        "fingerprint poll failed, stopping"
                    );
                    let _ = self
                        .events
                        .send(FingerprintResponse::error(err.to_string()))
                        .await;
                    return;
                }
            }
        }
    }

    /// One poll: scan, classify, order, version, diff. `None` means the
    /// device set is unchanged and nothing should be published.
    fn poll_once(&self) -> Result<Option<FingerprintResponse>> {
        let inventory = self.sources.inventory.list_devices()?;
        let mut matched = self.filter.select(&inventory);
        order_devices(&mut matched);

        let driver_version = self.sources.versions.driver_version(&self.version_driver)?;

        let devices: Vec<FingerprintDevice> = matched
            .iter()
            .map(|pci| FingerprintDevice {
                id: pci.address.clone(),
                display_name: if pci.description.is_empty() {
                    None
                } else {
                    Some(pci.description.clone())
                },
                capabilities: self.sources.capabilities.capabilities(pci),
            })
            .collect();

        let batch = FingerprintBatch {
            driver_version,
            devices,
        };
        debug!(
            instance = %self.instance,
            devices = batch.devices.len(),
            driver_version = %batch.driver_version,
            "fingerprint scan complete"
        );

        if !self.differ.observe(batch.devices.iter().map(|d| d.id.as_str())) {
            return Ok(None);
        }

        let groups = group_devices(
            &batch,
            &self.vendor,
            &self.device_type,
            self.sources.health.as_ref(),
        );
        Ok(Some(FingerprintResponse::devices(groups)))
    }
}
