//! Receiver discovery over mDNS, plus the tracker that turns raw
//! service events into UI-facing announcements.
//!
//! [`DiscoveryService`] owns the mDNS daemon and translates its browse
//! events onto a channel. [`DeviceTracker`] is pure state fed by the router:
//! it deduplicates devices, announces up/down, and when status watching is
//! requested keeps one [`StatusWatcher`] per device alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use castproto::{Outbound, ReceiverDevice, ReceiverStatusSummary};

use crate::errors::ControlError;

/// What discovery reports back to the router.
#[derive(Clone, Debug)]
pub enum DiscoveryEvent {
    Up(ReceiverDevice),
    Down { id: String },
    Status { id: String, status: ReceiverStatusSummary },
}

/// A live per-device status subscription. Dropping it without calling
/// [`StatusWatcher::stop`] leaks the underlying connection until the device
/// closes it.
pub trait StatusWatcher: Send {
    fn stop(&mut self);
}

/// Opens status watchers. Implemented over the cast protocol by
/// [`crate::status_listener::CastWatcherFactory`] and by test doubles.
pub trait WatcherFactory: Send + Sync {
    fn watch(
        &self,
        device: &ReceiverDevice,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
    ) -> Box<dyn StatusWatcher>;
}

/// Router-owned view of the receivers currently on the network.
pub struct DeviceTracker {
    factory: Arc<dyn WatcherFactory>,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
    out: mpsc::UnboundedSender<Outbound>,
    devices: HashMap<String, ReceiverDevice>,
    watchers: HashMap<String, Box<dyn StatusWatcher>>,
    watch_status: bool,
    started: bool,
}

impl DeviceTracker {
    pub fn new(
        factory: Arc<dyn WatcherFactory>,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
        out: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        DeviceTracker {
            factory,
            events,
            out,
            devices: HashMap::new(),
            watchers: HashMap::new(),
            watch_status: false,
            started: false,
        }
    }

    fn emit(&self, message: Outbound) {
        let _ = self.out.send(message);
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Begins announcing devices. Devices seen before the UI asked are
    /// replayed so it never misses one.
    pub fn start(&mut self, should_watch_status: bool) {
        self.started = true;
        self.watch_status = should_watch_status;

        let known: Vec<ReceiverDevice> = self.devices.values().cloned().collect();
        for device in known {
            self.emit(Outbound::ServiceUp(device.clone()));
            if self.watch_status {
                self.ensure_watcher(&device);
            }
        }
    }

    fn ensure_watcher(&mut self, device: &ReceiverDevice) {
        if self.watchers.contains_key(&device.id) {
            return;
        }
        let watcher = self.factory.watch(device, self.events.clone());
        self.watchers.insert(device.id.clone(), watcher);
    }

    pub fn handle(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Up(device) => {
                let known = self.devices.contains_key(&device.id);
                if known {
                    debug!("Device {} resolved again", device.id);
                } else {
                    info!(
                        "Device up: {} ({}:{})",
                        device.friendly_name, device.host, device.port
                    );
                }
                self.devices.insert(device.id.clone(), device.clone());

                if self.started {
                    self.emit(Outbound::ServiceUp(device.clone()));
                    if self.watch_status {
                        self.ensure_watcher(&device);
                    }
                }
            }

            DiscoveryEvent::Down { id } => {
                let Some(device) = self.devices.remove(&id) else {
                    // Removal for a device we never resolved.
                    return;
                };
                info!("Device down: {} ({})", device.friendly_name, id);

                if let Some(mut watcher) = self.watchers.remove(&id) {
                    watcher.stop();
                }
                if self.started {
                    self.emit(Outbound::ServiceDown { id });
                }
            }

            DiscoveryEvent::Status { id, status } => {
                let Some(device) = self.devices.get_mut(&id) else {
                    return;
                };
                device.status = Some(status.clone());
                if self.started {
                    self.emit(Outbound::UpdateReceiverStatus { id, status });
                }
            }
        }
    }

    pub fn device(&self, id: &str) -> Option<&ReceiverDevice> {
        self.devices.get(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Stops all watchers. Used during shutdown.
    pub fn stop_watchers(&mut self) {
        for (_, mut watcher) in self.watchers.drain() {
            watcher.stop();
        }
    }
}

/// mDNS browse glue. The daemon's events are pumped by a dedicated thread
/// so the async side only ever sees [`DiscoveryEvent`]s.
pub struct DiscoveryService {
    daemon: ServiceDaemon,
}

impl DiscoveryService {
    pub fn start(
        service_type: &str,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
    ) -> Result<Self, ControlError> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(service_type)?;

        let spawned = thread::Builder::new()
            .name("cast-discovery".to_string())
            .spawn(move || {
                // fullname -> announced device id, for removal mapping
                let mut announced: HashMap<String, String> = HashMap::new();

                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            let Some(device) = device_from_service(&info) else {
                                warn!("Resolved service without usable address, skipping");
                                continue;
                            };
                            announced.insert(info.get_fullname().to_string(), device.id.clone());
                            if events.send(DiscoveryEvent::Up(device)).is_err() {
                                break;
                            }
                        }
                        ServiceEvent::ServiceRemoved(_ty, fullname) => {
                            if let Some(id) = announced.remove(&fullname) {
                                if events.send(DiscoveryEvent::Down { id }).is_err() {
                                    break;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            });

        if let Err(err) = spawned {
            return Err(ControlError::Discovery(format!(
                "failed to spawn discovery thread: {err}"
            )));
        }

        Ok(DiscoveryService { daemon })
    }

    pub fn shutdown(&self) {
        if let Err(err) = self.daemon.shutdown() {
            warn!("mDNS daemon shutdown failed: {}", err);
        }
    }
}

fn device_from_service(info: &mdns_sd::ResolvedService) -> Option<ReceiverDevice> {
    let mut addresses: Vec<_> = info.get_addresses_v4().iter().copied().collect();
    addresses.sort();
    let address = addresses.first().map(ToString::to_string)?;
    let port = info.get_port();
    let hostname = info.get_hostname().trim_end_matches('.').to_string();

    let friendly_name = info
        .get_property_val_str("fn")
        .map(str::to_string)
        .unwrap_or_else(|| hostname.clone());

    let id = info
        .get_property_val_str("id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{hostname}:{address}:{port}"));

    Some(ReceiverDevice {
        id,
        host: address,
        port,
        friendly_name,
        status: None,
    })
}
