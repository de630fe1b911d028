//! The router: one task owning every piece of bridge state.
//!
//! It multiplexes the framed message channel, device link events, discovery
//! events and the outbound queue with `tokio::select!`. Registries, tracker
//! and media server are mutated exclusively here, which is what keeps the
//! per-entity ordering guarantees trivial.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, warn};

use castcontrol::{
    DeviceConnector, DeviceTracker, DiscoveryEvent, DiscoveryService, LinkEvent, MediaRegistry,
    SessionEvent, SessionRegistry, WatcherFactory,
};
use castproto::{DecodedFrame, FrameCodec, Inbound, Outbound};
use castserver::MediaServer;

use crate::config::Config;
use crate::selector::SelectorCoordinator;

pub struct Router {
    config: Config,
    connector: Arc<dyn DeviceConnector>,
    sessions: SessionRegistry,
    media: MediaRegistry,
    tracker: DeviceTracker,
    selector: SelectorCoordinator,
    media_server: Option<MediaServer>,
    discovery: Option<DiscoveryService>,
    link_events: mpsc::UnboundedReceiver<SessionEvent>,
    discovery_events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    discovery_events_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    out: mpsc::UnboundedReceiver<Outbound>,
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl Router {
    pub fn new(
        config: Config,
        connector: Arc<dyn DeviceConnector>,
        watcher_factory: Arc<dyn WatcherFactory>,
    ) -> Router {
        let (link_tx, link_events) = mpsc::unbounded_channel();
        let (discovery_events_tx, discovery_events) = mpsc::unbounded_channel();
        let (out_tx, out) = mpsc::unbounded_channel();

        let sessions = SessionRegistry::new(connector.clone(), link_tx, out_tx.clone());
        let media = MediaRegistry::new(out_tx.clone());
        let tracker = DeviceTracker::new(
            watcher_factory,
            discovery_events_tx.clone(),
            out_tx.clone(),
        );
        let selector = SelectorCoordinator::new(config.selector.clone(), out_tx.clone());

        Router {
            config,
            connector,
            sessions,
            media,
            tracker,
            selector,
            media_server: None,
            discovery: None,
            link_events,
            discovery_events,
            discovery_events_tx,
            out,
            out_tx,
        }
    }

    fn send(&self, message: Outbound) {
        let _ = self.out_tx.send(message);
    }

    /// Runs until the channel breaks or `shutdown` resolves.
    pub async fn run<R, W, S>(mut self, reader: R, writer: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut frames = FramedRead::new(reader, FrameCodec::new());
        let mut sink = FramedWrite::new(writer, FrameCodec::new());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(DecodedFrame::Message(envelope))) => {
                        self.handle_inbound(Inbound::from_envelope(envelope)).await;
                    }
                    Some(Ok(DecodedFrame::Malformed { error })) => {
                        warn!("Dropping malformed frame: {}", error);
                    }
                    Some(Err(err)) => {
                        error!("Message channel failed: {}", err);
                        break;
                    }
                    None => {
                        info!("Message channel closed");
                        break;
                    }
                },
                Some(event) = self.link_events.recv() => {
                    self.handle_link_event(event);
                }
                Some(event) = self.discovery_events.recv() => {
                    self.tracker.handle(event);
                }
                Some(message) = self.out.recv() => {
                    if let Err(err) = sink.send(message.into_envelope()).await {
                        error!("Failed to write to message channel: {}", err);
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("Termination requested");
                    break;
                }
            }
        }

        self.wind_down().await;

        // Flush whatever the teardown produced; the channel may already be
        // gone, which is fine.
        while let Ok(message) = self.out.try_recv() {
            if sink.send(message.into_envelope()).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::GetInfo => {
                self.send(Outbound::GetInfoResponse {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                });
            }

            Inbound::StartDiscovery(data) => {
                if self.discovery.is_none() {
                    match DiscoveryService::start(
                        &self.config.discovery.service_type,
                        self.discovery_events_tx.clone(),
                    ) {
                        Ok(service) => self.discovery = Some(service),
                        Err(err) => error!("Cannot start discovery: {}", err),
                    }
                }
                self.tracker.start(data.should_watch_status);
            }

            Inbound::OpenReceiverSelector { data } => self.selector.open(data),
            Inbound::CloseReceiverSelector => self.selector.close(),

            Inbound::StopReceiverApp(data) => {
                let device = data.receiver_device;
                self.connector.stop_receiver_app(&device.host, device.port);
            }

            Inbound::StartMediaServer(data) => {
                self.start_media_server(&data.file_path, data.port).await;
            }
            Inbound::StopMediaServer => {
                self.stop_media_server().await;
            }

            Inbound::SessionInitialize { id, data } => {
                if let Err(err) = self.sessions.initialize(&id, data) {
                    warn!("Session initialize rejected: {}", err);
                }
            }
            Inbound::SessionClose { id } => {
                self.sessions.close(&id);
                self.media.handle_session_closed(&id);
            }
            Inbound::SessionLeave { id } => {
                self.sessions.leave(&id);
                self.media.handle_session_closed(&id);
            }
            Inbound::SessionSendMessage { id, data } => self.sessions.send_message(&id, data),
            Inbound::SessionSendPlatformMessage { id, data } => {
                self.sessions.send_platform_message(&id, data);
            }
            Inbound::SessionAddMessageListener { id, data } => {
                self.sessions.add_message_listener(&id, data);
            }

            Inbound::MediaInitialize { id, data } => {
                self.media.initialize(&id, data, &self.sessions);
            }
            Inbound::MediaSendMessage { id, data } => {
                self.media.send_media_message(&id, data, &self.sessions);
            }

            Inbound::Unrecognized { subject } => {
                warn!("Unrecognized subject: {}", subject);
            }
        }
    }

    fn handle_link_event(&mut self, event: SessionEvent) {
        match event.event {
            LinkEvent::MediaStatus(statuses) => {
                self.media.handle_media_status(&event.session_id, &statuses);
            }
            LinkEvent::MediaAck {
                message_id,
                was_error,
            } => {
                self.media
                    .handle_media_ack(&event.session_id, &message_id, was_error);
            }
            other => {
                let removed = self.sessions.handle_link_event(&event.session_id, other);
                if removed {
                    self.media.handle_session_closed(&event.session_id);
                }
            }
        }
    }

    async fn start_media_server(&mut self, file_path: &str, port: u16) {
        // At most one instance: the previous server releases its port first.
        if let Some(server) = self.media_server.take() {
            server.stop().await;
            self.send(Outbound::MediaServerStopped);
        }

        match MediaServer::start(Path::new(file_path), port).await {
            Ok(server) => {
                let info = server.info().clone();
                self.send(Outbound::MediaServerStarted {
                    media_path: info.media_path,
                    subtitle_paths: info.subtitle_paths,
                    local_address: info.local_address,
                });
                self.media_server = Some(server);
            }
            Err(err) => {
                warn!("Cannot start media server for {}: {}", file_path, err);
                self.send(Outbound::MediaServerError);
            }
        }
    }

    async fn stop_media_server(&mut self) {
        if let Some(server) = self.media_server.take() {
            server.stop().await;
            self.send(Outbound::MediaServerStopped);
        }
    }

    async fn wind_down(&mut self) {
        info!("Shutting down");
        self.selector.close();
        self.sessions.close_all();
        if let Some(server) = self.media_server.take() {
            server.stop().await;
        }
        self.tracker.stop_watchers();
        if let Some(discovery) = self.discovery.take() {
            discovery.shutdown();
        }
    }
}
