//! Per-device status watchers.
//!
//! A watcher holds its own connection to the receiver and forwards volume
//! and application changes as [`DiscoveryEvent::Status`]. It exists so the
//! UI can show receiver state without any session being active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::receiver::ReceiverResponse;
use rust_cast::{CastDevice, ChannelMessage};

use castproto::ReceiverDevice;

use crate::RECEIVER_DESTINATION;
use crate::cast_link::convert_receiver_status;
use crate::discovery::{DiscoveryEvent, StatusWatcher, WatcherFactory};

/// Production watcher factory backed by rust_cast.
#[derive(Default)]
pub struct CastWatcherFactory;

impl WatcherFactory for CastWatcherFactory {
    fn watch(
        &self,
        device: &ReceiverDevice,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
    ) -> Box<dyn StatusWatcher> {
        Box::new(CastStatusListener::spawn(device, events))
    }
}

pub struct CastStatusListener {
    stop: Arc<AtomicBool>,
}

impl CastStatusListener {
    fn spawn(device: &ReceiverDevice, events: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let id = device.id.clone();
        let host = device.host.clone();
        let port = device.port;

        let spawned = thread::Builder::new()
            .name(format!("cast-status-{id}"))
            .spawn(move || run_listener(&id, &host, port, &flag, events));

        if let Err(err) = spawned {
            warn!("Failed to spawn status listener thread: {}", err);
        }

        CastStatusListener { stop }
    }
}

impl StatusWatcher for CastStatusListener {
    // The flag is observed when the next message arrives; heartbeat pings
    // bound that to a few seconds.
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_listener(
    id: &str,
    host: &str,
    port: u16,
    stop: &AtomicBool,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
) {
    let device = match CastDevice::connect_without_host_verification(host, port) {
        Ok(device) => device,
        Err(err) => {
            warn!("Status listener for {} failed to connect: {}", id, err);
            return;
        }
    };

    if let Err(err) = device.connection.connect(RECEIVER_DESTINATION) {
        warn!("Status listener for {} failed to attach: {}", id, err);
        return;
    }

    if let Ok(status) = device.receiver.get_status() {
        let summary = convert_receiver_status(&status).summarize();
        if events
            .send(DiscoveryEvent::Status {
                id: id.to_string(),
                status: summary,
            })
            .is_err()
        {
            return;
        }
    }

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!("Status listener for {} stopping", id);
            let _ = device.connection.disconnect(RECEIVER_DESTINATION);
            return;
        }

        match device.receive() {
            Ok(ChannelMessage::Heartbeat(HeartbeatResponse::Ping)) => {
                if device.heartbeat.pong().is_err() {
                    return;
                }
            }
            Ok(ChannelMessage::Heartbeat(_)) => {}
            Ok(ChannelMessage::Receiver(ReceiverResponse::Status(status))) => {
                let summary = convert_receiver_status(&status).summarize();
                if events
                    .send(DiscoveryEvent::Status {
                        id: id.to_string(),
                        status: summary,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                debug!("Status listener for {} ended: {}", id, err);
                return;
            }
        }
    }
}
