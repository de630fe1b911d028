//! Media registry: one entry per UI-side media object, each owned by a
//! session in the [`SessionRegistry`].
//!
//! Media objects share their parent session's device link. Requests carry a
//! message id; the registry keeps them pending until the link acknowledges,
//! and resolves every outstanding one as an error when the parent session
//! goes away.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use castproto::{MediaInit, MediaSendMessage, MediaStatus, Outbound};

use crate::link::LinkCommand;
use crate::session::SessionRegistry;

struct MediaItem {
    /// UI-side id of the owning session.
    session_id: String,
    /// Zero until the first status adopts the real id.
    media_session_id: i32,
    last_status: Option<MediaStatus>,
    /// Message ids sent but not yet acknowledged.
    pending: HashSet<String>,
}

pub struct MediaRegistry {
    out: mpsc::UnboundedSender<Outbound>,
    items: HashMap<String, MediaItem>,
}

impl MediaRegistry {
    pub fn new(out: mpsc::UnboundedSender<Outbound>) -> Self {
        MediaRegistry {
            out,
            items: HashMap::new(),
        }
    }

    fn emit(&self, message: Outbound) {
        let _ = self.out.send(message);
    }

    /// Registers a media object and asks the device for its current status.
    /// Ignored when the parent session is not live.
    pub fn initialize(&mut self, id: &str, init: MediaInit, sessions: &SessionRegistry) {
        if !sessions.is_live(&init.internal_session_id) {
            warn!(
                "Media {}: parent session {} is not live, ignoring initialize",
                id, init.internal_session_id
            );
            return;
        }

        debug!(
            "Media {}: attached to session {} (device session {})",
            id, init.internal_session_id, init.session_id
        );

        if let Some(link) = sessions.link(&init.internal_session_id) {
            link.send(LinkCommand::MediaMessage {
                message: json!({ "type": "GET_STATUS" }),
                message_id: None,
                media_session_id: init.media_session_id,
            });
        }

        self.items.insert(
            id.to_string(),
            MediaItem {
                session_id: init.internal_session_id,
                media_session_id: init.media_session_id,
                last_status: None,
                pending: HashSet::new(),
            },
        );
    }

    /// Relays one media message, tracking its message id until the ack
    /// arrives. Unknown media objects and dead links answer as errors
    /// immediately.
    pub fn send_media_message(
        &mut self,
        id: &str,
        data: MediaSendMessage,
        sessions: &SessionRegistry,
    ) {
        let accepted = match self.items.get_mut(id) {
            Some(item) => match sessions.link(&item.session_id) {
                Some(link) => {
                    let sent = link.send(LinkCommand::MediaMessage {
                        message: data.message,
                        message_id: Some(data.message_id.clone()),
                        media_session_id: item.media_session_id,
                    });
                    if sent {
                        item.pending.insert(data.message_id.clone());
                    }
                    sent
                }
                None => false,
            },
            None => {
                warn!("Media message for unknown media object {}", id);
                false
            }
        };

        if !accepted {
            self.emit(Outbound::MediaSendMessageResponse {
                id: id.to_string(),
                message_id: data.message_id,
                error: true,
            });
        }
    }

    /// Resolves one pending request for a media object of `session_id`.
    pub fn handle_media_ack(&mut self, session_id: &str, message_id: &str, was_error: bool) {
        let owned = self
            .items
            .iter_mut()
            .find(|(_, item)| item.session_id == session_id && item.pending.contains(message_id));

        let Some((id, item)) = owned else {
            debug!(
                "Ack for unknown media request {} on session {}",
                message_id, session_id
            );
            return;
        };

        item.pending.remove(message_id);
        let id = id.clone();
        self.emit(Outbound::MediaSendMessageResponse {
            id,
            message_id: message_id.to_string(),
            error: was_error,
        });
    }

    /// Fans a device media status out to the media objects of `session_id`.
    /// An object that does not know its media session id yet adopts the
    /// first reported one.
    pub fn handle_media_status(&mut self, session_id: &str, statuses: &[MediaStatus]) {
        let mut updates = Vec::new();

        for (id, item) in &mut self.items {
            if item.session_id != session_id {
                continue;
            }

            if item.media_session_id == 0 {
                if let Some(first) = statuses.first() {
                    item.media_session_id = first.media_session_id;
                }
            }

            let matched = statuses
                .iter()
                .find(|status| status.media_session_id == item.media_session_id);

            if let Some(status) = matched {
                item.last_status = Some(status.clone());
                updates.push((id.clone(), status.clone()));
            }
        }

        for (id, status) in updates {
            self.emit(Outbound::MediaUpdateStatus { id, status });
        }
    }

    /// Drops every media object of a closed session, resolving all pending
    /// requests as errors.
    pub fn handle_session_closed(&mut self, session_id: &str) {
        let closed: Vec<String> = self
            .items
            .iter()
            .filter(|(_, item)| item.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();

        for id in closed {
            if let Some(item) = self.items.remove(&id) {
                for message_id in item.pending {
                    self.emit(Outbound::MediaSendMessageResponse {
                        id: id.clone(),
                        message_id,
                        error: true,
                    });
                }
            }
        }
    }

    /// Last status the device reported for this media object.
    pub fn last_status(&self, id: &str) -> Option<&MediaStatus> {
        self.items.get(id).and_then(|item| item.last_status.as_ref())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
