//! The seam between the registries and the cast backend.
//!
//! A link is one live connection to one receiver device, driven by a
//! command channel and reporting back over an event channel. The production
//! connector ([`crate::RustCastConnector`]) runs each link on its own
//! blocking thread; tests substitute their own connector.

use serde_json::Value;
use tokio::sync::mpsc;

use castproto::{MediaStatus, ReceiverApplication, ReceiverStatus};

/// Commands a session or media object pushes down its device link.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkCommand {
    /// Opaque application message on an arbitrary namespace.
    AppMessage {
        namespace: String,
        message: Value,
        message_id: String,
    },
    /// Sender-platform message (SET_VOLUME, STOP, GET_STATUS).
    PlatformMessage {
        message: Value,
        message_id: String,
    },
    /// Typed media-channel message. `message_id` is None for internally
    /// triggered requests that need no acknowledgement.
    MediaMessage {
        message: Value,
        message_id: Option<String>,
        media_session_id: i32,
    },
    /// Disconnect without stopping the receiver application.
    Leave,
    /// Stop the receiver application, then disconnect.
    Stop,
}

/// Events a device link reports back, in the order it produced them.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    Connected { application: ReceiverApplication },
    ReceiverStatus(ReceiverStatus),
    MediaStatus(Vec<MediaStatus>),
    AppMessage { namespace: String, message: String },
    SendMessageAck { message_id: String, was_error: bool },
    PlatformAck { message_id: String, was_error: bool },
    MediaAck { message_id: String, was_error: bool },
    Closed,
}

/// A link event tagged with the session it belongs to, so every link can
/// share the router's single event channel.
#[derive(Clone, Debug)]
pub struct SessionEvent {
    pub session_id: String,
    pub event: LinkEvent,
}

/// Handle to a live link. Dropping it (or sending after the link died)
/// lets the backend wind the connection down.
#[derive(Clone, Debug)]
pub struct LinkHandle {
    pub commands: mpsc::UnboundedSender<LinkCommand>,
}

impl LinkHandle {
    /// True when the command was accepted; false means the link is gone.
    pub fn send(&self, command: LinkCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Opens device links. Implemented by the rust_cast backend and by test
/// doubles.
pub trait DeviceConnector: Send + Sync {
    /// Begins connecting to `host:port` and launching `app_id`. Returns
    /// immediately; `Connected` (or `Closed` on failure) follows on
    /// `events`.
    fn connect(
        &self,
        session_id: &str,
        host: &str,
        port: u16,
        app_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> LinkHandle;

    /// One-shot: stop whatever application is running on the receiver.
    /// Fire-and-forget; failures are logged by the implementation.
    fn stop_receiver_app(&self, host: &str, port: u16);
}
