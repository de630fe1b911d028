//! Session registry: one entry per UI-side cast session.
//!
//! The registry is a plain state machine. It never blocks; device I/O is
//! pushed through the [`LinkHandle`] and results come back as
//! [`LinkEvent`]s fed in by the router task, which is the only writer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use castproto::{
    Outbound, SessionAddListener, SessionInit, SessionSendMessage, SessionSendPlatformMessage,
};

use crate::errors::ControlError;
use crate::link::{DeviceConnector, LinkCommand, LinkEvent, LinkHandle, SessionEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Link thread is connecting and launching the receiver app. Outgoing
    /// messages queue until `Connected`.
    Connecting,
    Connected,
    /// Close or leave requested; waiting for the link to report `Closed`.
    Closing,
}

struct Session {
    address: String,
    port: u16,
    state: SessionState,
    link: LinkHandle,
    /// Receiver-side session id, known once connected.
    device_session_id: Option<String>,
    /// Commands received while still `Connecting`, flushed in order.
    queued: VecDeque<LinkCommand>,
    /// Namespaces the UI subscribed to; app messages on other namespaces
    /// are dropped.
    listeners: HashSet<String>,
    /// Cleared by `leave`, which detaches without reporting a stop.
    notify_stopped: bool,
}

pub struct SessionRegistry {
    connector: Arc<dyn DeviceConnector>,
    events: mpsc::UnboundedSender<SessionEvent>,
    out: mpsc::UnboundedSender<Outbound>,
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        events: mpsc::UnboundedSender<SessionEvent>,
        out: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        SessionRegistry {
            connector,
            events,
            out,
            sessions: HashMap::new(),
        }
    }

    fn emit(&self, message: Outbound) {
        let _ = self.out.send(message);
    }

    /// True when the session exists and has not begun closing.
    pub fn is_live(&self, id: &str) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|s| s.state != SessionState::Closing)
    }

    pub fn state(&self, id: &str) -> Option<SessionState> {
        self.sessions.get(id).map(|s| s.state)
    }

    /// Hands out the session's link so the media registry can drive the
    /// typed media channel of its parent session.
    pub fn link(&self, id: &str) -> Option<&LinkHandle> {
        self.sessions.get(id).map(|s| &s.link)
    }

    pub fn initialize(&mut self, id: &str, init: SessionInit) -> Result<(), ControlError> {
        if self.sessions.contains_key(id) {
            return Err(ControlError::SessionExists(id.to_string()));
        }

        info!(
            "Session {}: connecting to {}:{} (app {})",
            id, init.address, init.port, init.app_id
        );

        let link = self
            .connector
            .connect(id, &init.address, init.port, &init.app_id, self.events.clone());

        self.sessions.insert(
            id.to_string(),
            Session {
                address: init.address,
                port: init.port,
                state: SessionState::Connecting,
                link,
                device_session_id: None,
                queued: VecDeque::new(),
                listeners: HashSet::new(),
                notify_stopped: true,
            },
        );

        Ok(())
    }

    /// Stops the receiver application and tears the session down. The
    /// `stopped` message follows once the link reports `Closed`, or right
    /// away when the link is already gone.
    pub fn close(&mut self, id: &str) {
        let Some(session) = self.sessions.get_mut(id) else {
            // Unknown or already torn down; nothing to report.
            debug!("close for unknown session {}", id);
            return;
        };

        if session.state == SessionState::Closing {
            return;
        }

        debug!("Session {}: closing ({}:{})", id, session.address, session.port);
        session.state = SessionState::Closing;
        session.queued.clear();

        if !session.link.send(LinkCommand::Stop) {
            self.finish(id);
        }
    }

    /// Detaches from the session without stopping the receiver app.
    pub fn leave(&mut self, id: &str) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };

        if session.state == SessionState::Closing {
            return;
        }

        debug!("Session {}: leaving", id);
        session.state = SessionState::Closing;
        session.notify_stopped = false;
        session.queued.clear();

        if !session.link.send(LinkCommand::Leave) {
            self.finish(id);
        }
    }

    pub fn send_message(&mut self, id: &str, data: SessionSendMessage) {
        let command = LinkCommand::AppMessage {
            namespace: data.namespace,
            message: data.message,
            message_id: data.message_id.clone(),
        };

        if !self.dispatch(id, command) {
            self.emit(Outbound::SessionSendMessageAck {
                id: id.to_string(),
                message_id: data.message_id,
                was_error: true,
            });
        }
    }

    pub fn send_platform_message(&mut self, id: &str, data: SessionSendPlatformMessage) {
        let command = LinkCommand::PlatformMessage {
            message: data.message,
            message_id: data.message_id.clone(),
        };

        if !self.dispatch(id, command) {
            self.emit(Outbound::SessionSendPlatformMessageAck {
                id: id.to_string(),
                message_id: data.message_id,
                was_error: true,
            });
        }
    }

    pub fn add_message_listener(&mut self, id: &str, data: SessionAddListener) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.listeners.insert(data.namespace);
        } else {
            warn!("addMessageListener for unknown session {}", id);
        }
    }

    /// Queues or sends one command. False means the session cannot take it.
    fn dispatch(&mut self, id: &str, command: LinkCommand) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            warn!("Message for unknown session {}", id);
            return false;
        };

        match session.state {
            SessionState::Connecting => {
                session.queued.push_back(command);
                true
            }
            SessionState::Connected => session.link.send(command),
            SessionState::Closing => false,
        }
    }

    fn finish(&mut self, id: &str) {
        if let Some(session) = self.sessions.remove(id) {
            if session.notify_stopped {
                self.emit(Outbound::SessionStopped { id: id.to_string() });
            }
        }
    }

    /// Feeds one link event in. Returns true when the session was removed,
    /// so the caller can cascade to the session's media objects.
    pub fn handle_link_event(&mut self, id: &str, event: LinkEvent) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            // Late event from a link that outlived its registry entry.
            return false;
        };

        match event {
            LinkEvent::Connected { application } => {
                info!(
                    "Session {}: connected to {} ({})",
                    id, application.display_name, application.app_id
                );
                session.state = SessionState::Connected;
                session.device_session_id = Some(application.session_id.clone());
                let queued: Vec<LinkCommand> = session.queued.drain(..).collect();
                let link = session.link.clone();
                for command in queued {
                    if !link.send(command) {
                        break;
                    }
                }
                self.emit(Outbound::SessionConnected {
                    id: id.to_string(),
                    application,
                });
                false
            }

            LinkEvent::ReceiverStatus(status) => {
                self.emit(Outbound::SessionUpdateStatus {
                    id: id.to_string(),
                    status,
                });
                false
            }

            LinkEvent::AppMessage { namespace, message } => {
                if session.listeners.contains(&namespace) {
                    self.emit(Outbound::SessionMessage {
                        id: id.to_string(),
                        namespace,
                        message,
                    });
                } else {
                    debug!("Session {}: no listener for namespace {}", id, namespace);
                }
                false
            }

            LinkEvent::SendMessageAck {
                message_id,
                was_error,
            } => {
                self.emit(Outbound::SessionSendMessageAck {
                    id: id.to_string(),
                    message_id,
                    was_error,
                });
                false
            }

            LinkEvent::PlatformAck {
                message_id,
                was_error,
            } => {
                self.emit(Outbound::SessionSendPlatformMessageAck {
                    id: id.to_string(),
                    message_id,
                    was_error,
                });
                false
            }

            LinkEvent::Closed => {
                info!("Session {}: closed", id);
                self.finish(id);
                true
            }

            // Media-channel events belong to the media registry; the router
            // routes them there before we ever see them.
            LinkEvent::MediaStatus(_) | LinkEvent::MediaAck { .. } => false,
        }
    }

    /// Stops every live session. Used during shutdown.
    pub fn close_all(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.close(&id);
        }
    }
}
