//! rust_cast backend for device links.
//!
//! Every link runs on its own blocking thread owning one `CastDevice`.
//! Commands arrive over the link's channel; the thread alternates between
//! draining them and blocking on `receive()`. Heartbeat pings keep the
//! receive side waking up, which bounds how long a queued command can wait.

use std::str::FromStr;
use std::thread;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rust_cast::channels::connection::ConnectionResponse;
use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::media::{self, Media, ResumeState, StreamType};
use rust_cast::channels::receiver::{self, CastDeviceApp};
use rust_cast::message_manager::CastMessagePayload;
use rust_cast::{CastDevice, ChannelMessage};

use castproto::{
    AppNamespace, MediaInformation, MediaStatus, ReceiverApplication, ReceiverStatus, Volume,
};

use crate::link::{DeviceConnector, LinkCommand, LinkEvent, LinkHandle, SessionEvent};
use crate::{BACKDROP_APP_ID, MEDIA_NAMESPACE, RECEIVER_DESTINATION};

/// Production connector backed by rust_cast.
#[derive(Default)]
pub struct RustCastConnector;

impl RustCastConnector {
    pub fn new() -> Self {
        RustCastConnector
    }
}

impl DeviceConnector for RustCastConnector {
    fn connect(
        &self,
        session_id: &str,
        host: &str,
        port: u16,
        app_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> LinkHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session_id = session_id.to_string();
        let host = host.to_string();
        let app_id = app_id.to_string();

        let spawned = thread::Builder::new()
            .name(format!("cast-link-{session_id}"))
            .spawn(move || run_link(&session_id, &host, port, &app_id, cmd_rx, events));

        if let Err(err) = spawned {
            warn!("Failed to spawn link thread: {}", err);
        }

        LinkHandle { commands: cmd_tx }
    }

    fn stop_receiver_app(&self, host: &str, port: u16) {
        let host = host.to_string();
        let spawned = thread::Builder::new()
            .name("cast-stop-app".to_string())
            .spawn(move || {
                if let Err(err) = stop_running_apps(&host, port) {
                    warn!("Failed to stop receiver app on {}:{}: {}", host, port, err);
                }
            });

        if let Err(err) = spawned {
            warn!("Failed to spawn stop-app thread: {}", err);
        }
    }
}

fn stop_running_apps(host: &str, port: u16) -> Result<(), rust_cast::errors::Error> {
    let device = CastDevice::connect_without_host_verification(host, port)?;
    device.connection.connect(RECEIVER_DESTINATION)?;

    let status = device.receiver.get_status()?;
    for app in &status.applications {
        debug!("Stopping receiver app {} ({})", app.display_name, app.app_id);
        device.receiver.stop_app(app.session_id.as_str())?;
    }

    Ok(())
}

enum Flow {
    Continue,
    Shutdown,
}

struct LinkState {
    /// Transport id of the launched application; destination for media
    /// channel messages.
    transport_id: String,
    /// Receiver-side session id of the launched application.
    app_session_id: String,
    /// Most recently observed media session id, the fallback when a message
    /// does not carry one.
    media_session_id: i32,
}

fn run_link(
    session_id: &str,
    host: &str,
    port: u16,
    app_id: &str,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let emit = |event: LinkEvent| {
        let _ = events.send(SessionEvent {
            session_id: session_id.to_string(),
            event,
        });
    };

    let closed = |reason: String| {
        debug!("Link for session {} closed: {}", session_id, reason);
        emit(LinkEvent::Closed);
    };

    let device = match CastDevice::connect_without_host_verification(host, port) {
        Ok(device) => device,
        Err(err) => return closed(format!("connect failed: {err}")),
    };

    if let Err(err) = device.connection.connect(RECEIVER_DESTINATION) {
        return closed(format!("virtual connection failed: {err}"));
    }

    let app = CastDeviceApp::from_str(app_id)
        .unwrap_or_else(|_| CastDeviceApp::Custom(app_id.to_string()));

    let application = match device.receiver.launch_app(&app) {
        Ok(application) => application,
        Err(err) => return closed(format!("launch of {app_id} failed: {err}")),
    };

    if let Err(err) = device.connection.connect(application.transport_id.as_str()) {
        return closed(format!("app connection failed: {err}"));
    }

    let mut state = LinkState {
        transport_id: application.transport_id.clone(),
        app_session_id: application.session_id.clone(),
        media_session_id: 0,
    };

    emit(LinkEvent::Connected {
        application: convert_application(&application),
    });

    // Initial receiver status so the UI side starts with volume state.
    if let Ok(status) = device.receiver.get_status() {
        emit(LinkEvent::ReceiverStatus(convert_receiver_status(&status)));
    }

    loop {
        // Commands first: anything queued while we were blocked reading.
        loop {
            match commands.try_recv() {
                Ok(command) => match handle_command(&device, &mut state, command, &emit) {
                    Flow::Continue => {}
                    Flow::Shutdown => return closed("shut down on command".to_string()),
                },
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    let _ = device.connection.disconnect(state.transport_id.as_str());
                    return closed("command channel dropped".to_string());
                }
            }
        }

        match device.receive() {
            Ok(ChannelMessage::Heartbeat(response)) => {
                if matches!(response, HeartbeatResponse::Ping) {
                    if let Err(err) = device.heartbeat.pong() {
                        return closed(format!("pong failed: {err}"));
                    }
                }
            }
            Ok(ChannelMessage::Receiver(receiver::ReceiverResponse::Status(status))) => {
                emit(LinkEvent::ReceiverStatus(convert_receiver_status(&status)));
            }
            Ok(ChannelMessage::Receiver(_)) => {}
            Ok(ChannelMessage::Media(media::MediaResponse::Status(status))) => {
                if let Some(entry) = status.entries.first() {
                    state.media_session_id = entry.media_session_id;
                }
                emit(LinkEvent::MediaStatus(convert_media_status(&status)));
            }
            Ok(ChannelMessage::Media(_)) => {}
            Ok(ChannelMessage::Connection(response)) => {
                if matches!(response, ConnectionResponse::Close) {
                    return closed("receiver closed the connection".to_string());
                }
            }
            Ok(ChannelMessage::Raw(message)) => {
                if let CastMessagePayload::String(payload) = &message.payload {
                    emit(LinkEvent::AppMessage {
                        namespace: message.namespace.clone(),
                        message: payload.clone(),
                    });
                }
            }
            Err(err) => return closed(format!("receive failed: {err}")),
        }
    }
}

fn handle_command(
    device: &CastDevice,
    state: &mut LinkState,
    command: LinkCommand,
    emit: &impl Fn(LinkEvent),
) -> Flow {
    match command {
        LinkCommand::AppMessage {
            namespace,
            message,
            message_id,
        } => {
            // The backend library only speaks its typed channels; the media
            // namespace is routed through the media channel, anything else
            // cannot be expressed and is answered as an error.
            let was_error = if namespace == MEDIA_NAMESPACE {
                send_media_payload(device, state, &message, emit).is_err()
            } else {
                warn!("Cannot relay message on unsupported namespace {}", namespace);
                true
            };
            emit(LinkEvent::SendMessageAck {
                message_id,
                was_error,
            });
            Flow::Continue
        }

        LinkCommand::PlatformMessage {
            message,
            message_id,
        } => {
            let (result, shutdown) = send_platform_payload(device, state, &message, emit);
            if let Err(ref err) = result {
                warn!("Platform message failed: {}", err);
            }
            emit(LinkEvent::PlatformAck {
                message_id,
                was_error: result.is_err(),
            });
            if shutdown { Flow::Shutdown } else { Flow::Continue }
        }

        LinkCommand::MediaMessage {
            message,
            message_id,
            media_session_id,
        } => {
            if media_session_id != 0 {
                state.media_session_id = media_session_id;
            }
            let result = send_media_payload(device, state, &message, emit);
            if let Err(ref err) = result {
                warn!("Media message failed: {}", err);
            }
            if let Some(message_id) = message_id {
                emit(LinkEvent::MediaAck {
                    message_id,
                    was_error: result.is_err(),
                });
            }
            Flow::Continue
        }

        LinkCommand::Leave => {
            let _ = device.connection.disconnect(state.transport_id.as_str());
            Flow::Shutdown
        }

        LinkCommand::Stop => {
            if let Err(err) = device.receiver.stop_app(state.app_session_id.as_str()) {
                warn!("Failed to stop receiver app: {}", err);
            }
            let _ = device.connection.disconnect(state.transport_id.as_str());
            Flow::Shutdown
        }
    }
}

/// Dispatches one media-namespace message through the typed media channel.
fn send_media_payload(
    device: &CastDevice,
    state: &mut LinkState,
    message: &Value,
    emit: &impl Fn(LinkEvent),
) -> Result<(), rust_cast::errors::Error> {
    let destination = state.transport_id.clone();
    let media_session_id = message
        .get("mediaSessionId")
        .and_then(Value::as_i64)
        .map(|id| id as i32)
        .unwrap_or(state.media_session_id);

    let kind = message.get("type").and_then(Value::as_str).unwrap_or("");

    // play/pause/stop/seek answer with a single status entry, load and
    // get_status with a full status; both collapse to the same event.
    let statuses = match kind {
        "PLAY" => Some(vec![convert_media_entry(
            &device.media.play(destination.as_str(), media_session_id)?,
        )]),
        "PAUSE" => Some(vec![convert_media_entry(
            &device.media.pause(destination.as_str(), media_session_id)?,
        )]),
        "STOP" => Some(vec![convert_media_entry(
            &device.media.stop(destination.as_str(), media_session_id)?,
        )]),
        "SEEK" => {
            let current_time = message
                .get("currentTime")
                .and_then(Value::as_f64)
                .map(|t| t as f32);
            let resume_state = match message.get("resumeState").and_then(Value::as_str) {
                Some("PLAYBACK_START") => Some(ResumeState::PlaybackStart),
                Some("PLAYBACK_PAUSE") => Some(ResumeState::PlaybackPause),
                _ => None,
            };
            Some(vec![convert_media_entry(&device.media.seek(
                destination.as_str(),
                media_session_id,
                current_time,
                resume_state,
            )?)])
        }
        "LOAD" => {
            let media = load_media_from_payload(message)?;
            Some(convert_media_status(&device.media.load(
                destination.as_str(),
                state.app_session_id.as_str(),
                &media,
            )?))
        }
        "SET_VOLUME" => {
            let volume = message.get("volume").cloned().unwrap_or(Value::Null);
            if let Some(level) = volume.get("level").and_then(Value::as_f64) {
                device.receiver.set_volume(level as f32)?;
            }
            if let Some(muted) = volume.get("muted").and_then(Value::as_bool) {
                device.receiver.set_volume(muted)?;
            }
            None
        }
        "GET_STATUS" | "MEDIA_GET_STATUS" => {
            let wanted = (media_session_id != 0).then_some(media_session_id);
            Some(convert_media_status(
                &device.media.get_status(destination.as_str(), wanted)?,
            ))
        }
        other => {
            warn!("Unsupported media message type {:?}", other);
            return Err(rust_cast::errors::Error::Internal(format!(
                "unsupported media message type {other:?}"
            )));
        }
    };

    if let Some(statuses) = statuses {
        if let Some(first) = statuses.first() {
            state.media_session_id = first.media_session_id;
        }
        emit(LinkEvent::MediaStatus(statuses));
    }

    Ok(())
}

fn load_media_from_payload(message: &Value) -> Result<Media, rust_cast::errors::Error> {
    let info = message.get("media").cloned().unwrap_or(Value::Null);

    let content_id = info
        .get("contentId")
        .and_then(Value::as_str)
        .ok_or_else(|| rust_cast::errors::Error::Internal("LOAD without contentId".to_string()))?
        .to_string();

    let content_type = info
        .get("contentType")
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream")
        .to_string();

    let stream_type = match info.get("streamType").and_then(Value::as_str) {
        Some("LIVE") => StreamType::Live,
        Some("NONE") => StreamType::None,
        _ => StreamType::Buffered,
    };

    Ok(Media {
        content_id,
        content_type,
        stream_type,
        duration: info.get("duration").and_then(Value::as_f64).map(|d| d as f32),
        metadata: None,
    })
}

/// Sender-platform messages: volume, stop, status. Returns whether the link
/// should shut down afterwards (STOP ends the session).
fn send_platform_payload(
    device: &CastDevice,
    state: &mut LinkState,
    message: &Value,
    emit: &impl Fn(LinkEvent),
) -> (Result<(), rust_cast::errors::Error>, bool) {
    let kind = message.get("type").and_then(Value::as_str).unwrap_or("");

    match kind {
        "SET_VOLUME" => {
            let volume = message.get("volume").cloned().unwrap_or(Value::Null);
            let result = (|| {
                if let Some(level) = volume.get("level").and_then(Value::as_f64) {
                    device.receiver.set_volume(level as f32)?;
                }
                if let Some(muted) = volume.get("muted").and_then(Value::as_bool) {
                    device.receiver.set_volume(muted)?;
                }
                Ok(())
            })();
            (result, false)
        }
        "STOP" => {
            let result = device
                .receiver
                .stop_app(state.app_session_id.as_str())
                .map(|_| ());
            (result, true)
        }
        "GET_STATUS" => match device.receiver.get_status() {
            Ok(status) => {
                emit(LinkEvent::ReceiverStatus(convert_receiver_status(&status)));
                (Ok(()), false)
            }
            Err(err) => (Err(err), false),
        },
        other => {
            warn!("Unsupported platform message type {:?}", other);
            (
                Err(rust_cast::errors::Error::Internal(format!(
                    "unsupported platform message type {other:?}"
                ))),
                false,
            )
        }
    }
}

pub(crate) fn convert_application(app: &receiver::Application) -> ReceiverApplication {
    ReceiverApplication {
        app_id: app.app_id.clone(),
        session_id: app.session_id.clone(),
        transport_id: app.transport_id.clone(),
        display_name: app.display_name.clone(),
        status_text: app.status_text.clone(),
        is_idle_screen: app.app_id == BACKDROP_APP_ID,
        namespaces: app
            .namespaces
            .iter()
            .map(|name| AppNamespace { name: name.clone() })
            .collect(),
    }
}

pub(crate) fn convert_receiver_status(status: &receiver::Status) -> ReceiverStatus {
    ReceiverStatus {
        applications: status.applications.iter().map(convert_application).collect(),
        volume: Volume {
            level: status.volume.level,
            muted: status.volume.muted,
        },
    }
}

pub(crate) fn convert_media_entry(entry: &media::StatusEntry) -> MediaStatus {
    MediaStatus {
        media_session_id: entry.media_session_id,
        player_state: player_state_name(&entry.player_state).to_string(),
        current_time: entry.current_time,
        playback_rate: entry.playback_rate,
        media: entry.media.as_ref().map(|m| MediaInformation {
            content_id: m.content_id.clone(),
            content_type: m.content_type.clone(),
            duration: m.duration,
        }),
        volume: Volume::default(),
    }
}

pub(crate) fn convert_media_status(status: &media::Status) -> Vec<MediaStatus> {
    status.entries.iter().map(convert_media_entry).collect()
}

fn player_state_name(state: &media::PlayerState) -> &'static str {
    match state {
        media::PlayerState::Idle => "IDLE",
        media::PlayerState::Playing => "PLAYING",
        media::PlayerState::Buffering => "BUFFERING",
        media::PlayerState::Paused => "PAUSED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(media_session_id: i32) -> media::StatusEntry {
        media::StatusEntry {
            media_session_id,
            media: Some(Media {
                content_id: "http://10.0.0.2:9910/clip.mp4".to_string(),
                stream_type: StreamType::Buffered,
                content_type: "video/mp4".to_string(),
                metadata: None,
                duration: Some(120.0),
            }),
            playback_rate: 1.0,
            player_state: media::PlayerState::Paused,
            current_item_id: None,
            loading_item_id: None,
            preloaded_item_id: None,
            idle_reason: None,
            extended_status: None,
            current_time: Some(42.5),
            supported_media_commands: 15,
        }
    }

    // Some media channel calls answer with a bare status entry, others with
    // a full status; both conversions must agree.
    #[test]
    fn single_entry_and_full_status_convert_identically() {
        let single = convert_media_entry(&entry(3));
        let full = convert_media_status(&media::Status {
            request_id: 0,
            entries: vec![entry(3)],
        });

        assert_eq!(full, vec![single.clone()]);
        assert_eq!(single.media_session_id, 3);
        assert_eq!(single.player_state, "PAUSED");
        assert_eq!(single.current_time, Some(42.5));
        assert_eq!(single.media.unwrap().content_type, "video/mp4");
    }
}
