//! Typed message schema over the framed channel.
//!
//! Every frame is an [`Envelope`]; the `subject` string is classified exactly
//! once, here, into [`Inbound`] (UI → bridge) or produced from [`Outbound`]
//! (bridge → UI). Unknown subjects and undecodable payloads become
//! [`Inbound::Unrecognized`] instead of silently matching nothing.
//!
//! Subject form: `"namespace:topic"`. The legacy `"namespace:/topic"` form is
//! accepted inbound by normalization; replies always use the new form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::selection::{ReceiverDevice, SelectionCast, SelectionStop};
use crate::status::{MediaStatus, ReceiverApplication, ReceiverStatus, ReceiverStatusSummary};

/// Raw wire envelope, both directions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartDiscovery {
    #[serde(default)]
    pub should_watch_status: bool,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInit {
    pub address: String,
    pub port: u16,
    pub app_id: String,
    pub session_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSendMessage {
    pub namespace: String,
    pub message: Value,
    pub message_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSendPlatformMessage {
    pub message: Value,
    pub message_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionAddListener {
    pub namespace: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaInit {
    pub session_id: String,
    pub media_session_id: i32,
    #[serde(rename = "_internalSessionId")]
    pub internal_session_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaSendMessage {
    pub message: Value,
    pub message_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMediaServer {
    pub file_path: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StopReceiverApp {
    pub receiver_device: ReceiverDevice,
}

/// A decoded message from the UI side.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    GetInfo,
    StartDiscovery(StartDiscovery),
    OpenReceiverSelector { data: String },
    CloseReceiverSelector,
    StopReceiverApp(StopReceiverApp),
    StartMediaServer(StartMediaServer),
    StopMediaServer,

    SessionInitialize { id: String, data: SessionInit },
    SessionClose { id: String },
    SessionLeave { id: String },
    SessionSendMessage { id: String, data: SessionSendMessage },
    SessionSendPlatformMessage { id: String, data: SessionSendPlatformMessage },
    SessionAddMessageListener { id: String, data: SessionAddListener },

    MediaInitialize { id: String, data: MediaInit },
    MediaSendMessage { id: String, data: MediaSendMessage },

    Unrecognized { subject: String },
}

/// Strips the legacy colon-slash separator: `"bridge:/getInfo"` and
/// `"bridge:getInfo"` route identically.
pub fn normalize_subject(subject: &str) -> String {
    subject.replacen(":/", ":", 1)
}

fn payload<T: serde::de::DeserializeOwned>(subject: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Undecodable payload for subject {}: {}", subject, err);
            None
        }
    }
}

impl Inbound {
    /// Classifies one envelope. Never fails: protocol errors degrade to
    /// `Unrecognized`, which the router logs and drops.
    pub fn from_envelope(envelope: Envelope) -> Inbound {
        let subject = normalize_subject(&envelope.subject);
        let unrecognized = Inbound::Unrecognized {
            subject: subject.clone(),
        };

        // Entity-addressed subjects route by `_id`; one without an id cannot
        // be delivered anywhere.
        if subject.starts_with("bridge:session/") || subject.starts_with("bridge:media/") {
            let Some(id) = envelope.id else {
                warn!("Entity message without _id: {}", subject);
                return unrecognized;
            };

            let decoded = match subject.as_str() {
                "bridge:session/initialize" => {
                    payload(&subject, envelope.data).map(|data| Inbound::SessionInitialize {
                        id: id.clone(),
                        data,
                    })
                }
                "bridge:session/close" => Some(Inbound::SessionClose { id: id.clone() }),
                "bridge:session/impl_leave" => Some(Inbound::SessionLeave { id: id.clone() }),
                "bridge:session/impl_sendMessage" => {
                    payload(&subject, envelope.data).map(|data| Inbound::SessionSendMessage {
                        id: id.clone(),
                        data,
                    })
                }
                "bridge:session/impl_sendPlatformMessage" => payload(&subject, envelope.data)
                    .map(|data| Inbound::SessionSendPlatformMessage {
                        id: id.clone(),
                        data,
                    }),
                "bridge:session/impl_addMessageListener" => payload(&subject, envelope.data).map(
                    |data| Inbound::SessionAddMessageListener {
                        id: id.clone(),
                        data,
                    },
                ),
                "bridge:media/initialize" => {
                    payload(&subject, envelope.data).map(|data| Inbound::MediaInitialize {
                        id: id.clone(),
                        data,
                    })
                }
                "bridge:media/sendMediaMessage" => {
                    payload(&subject, envelope.data).map(|data| Inbound::MediaSendMessage {
                        id: id.clone(),
                        data,
                    })
                }
                _ => None,
            };

            return decoded.unwrap_or(unrecognized);
        }

        let decoded = match subject.as_str() {
            "bridge:getInfo" => Some(Inbound::GetInfo),
            "bridge:startDiscovery" => {
                payload(&subject, envelope.data).map(Inbound::StartDiscovery)
            }
            "bridge:openReceiverSelector" => {
                payload(&subject, envelope.data).map(|data| Inbound::OpenReceiverSelector { data })
            }
            "bridge:closeReceiverSelector" => Some(Inbound::CloseReceiverSelector),
            "bridge:stopReceiverApp" => {
                payload(&subject, envelope.data).map(Inbound::StopReceiverApp)
            }
            "bridge:startMediaServer" => {
                payload(&subject, envelope.data).map(Inbound::StartMediaServer)
            }
            "bridge:stopMediaServer" => Some(Inbound::StopMediaServer),
            _ => None,
        };

        decoded.unwrap_or(unrecognized)
    }
}

/// A message produced by the bridge for the UI side.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    GetInfoResponse { version: String },

    SessionConnected { id: String, application: ReceiverApplication },
    SessionUpdateStatus { id: String, status: ReceiverStatus },
    SessionStopped { id: String },
    SessionMessage { id: String, namespace: String, message: String },
    SessionSendMessageAck { id: String, message_id: String, was_error: bool },
    SessionSendPlatformMessageAck { id: String, message_id: String, was_error: bool },

    MediaUpdateStatus { id: String, status: MediaStatus },
    MediaSendMessageResponse { id: String, message_id: String, error: bool },

    ServiceUp(ReceiverDevice),
    ServiceDown { id: String },
    UpdateReceiverStatus { id: String, status: ReceiverStatusSummary },

    SelectorSelected(SelectionCast),
    SelectorStopped(SelectionStop),
    SelectorCancelled,
    SelectorError { message: String },

    MediaServerStarted { media_path: String, subtitle_paths: Vec<String>, local_address: String },
    MediaServerStopped,
    MediaServerError,
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Outbound {
    pub fn into_envelope(self) -> Envelope {
        let (subject, data, id) = match self {
            Outbound::GetInfoResponse { version } => {
                ("bridge:getInfoResponse", Value::String(version), None)
            }

            Outbound::SessionConnected { id, application } => (
                "shim:session/connected",
                serde_json::json!({ "application": to_value(&application) }),
                Some(id),
            ),
            Outbound::SessionUpdateStatus { id, status } => (
                "shim:session/updateStatus",
                serde_json::json!({ "status": to_value(&status) }),
                Some(id),
            ),
            Outbound::SessionStopped { id } => ("shim:session/stopped", Value::Null, Some(id)),
            Outbound::SessionMessage { id, namespace, message } => (
                "shim:session/impl_addMessageListener",
                serde_json::json!({ "namespace": namespace, "message": message }),
                Some(id),
            ),
            Outbound::SessionSendMessageAck { id, message_id, was_error } => (
                "shim:session/impl_sendMessage",
                serde_json::json!({ "messageId": message_id, "wasError": was_error }),
                Some(id),
            ),
            Outbound::SessionSendPlatformMessageAck { id, message_id, was_error } => (
                "shim:session/impl_sendPlatformMessage",
                serde_json::json!({ "messageId": message_id, "wasError": was_error }),
                Some(id),
            ),

            Outbound::MediaUpdateStatus { id, status } => (
                "shim:media/updateStatus",
                serde_json::json!({ "status": to_value(&status) }),
                Some(id),
            ),
            Outbound::MediaSendMessageResponse { id, message_id, error } => (
                "shim:media/sendMediaMessageResponse",
                serde_json::json!({ "messageId": message_id, "error": error }),
                Some(id),
            ),

            Outbound::ServiceUp(device) => ("main:serviceUp", to_value(&device), None),
            Outbound::ServiceDown { id } => {
                ("main:serviceDown", serde_json::json!({ "id": id }), None)
            }
            Outbound::UpdateReceiverStatus { id, status } => (
                "main:updateReceiverStatus",
                serde_json::json!({ "id": id, "status": to_value(&status) }),
                None,
            ),

            Outbound::SelectorSelected(cast) => {
                ("main:receiverSelector/selected", to_value(&cast), None)
            }
            Outbound::SelectorStopped(stop) => {
                ("main:receiverSelector/stopped", to_value(&stop), None)
            }
            Outbound::SelectorCancelled => ("main:receiverSelector/cancelled", Value::Null, None),
            Outbound::SelectorError { message } => {
                ("main:receiverSelector/error", Value::String(message), None)
            }

            Outbound::MediaServerStarted { media_path, subtitle_paths, local_address } => (
                "mediaCast:mediaServerStarted",
                serde_json::json!({
                    "mediaPath": media_path,
                    "subtitlePaths": subtitle_paths,
                    "localAddress": local_address,
                }),
                None,
            ),
            Outbound::MediaServerStopped => ("mediaCast:mediaServerStopped", Value::Null, None),
            Outbound::MediaServerError => ("mediaCast:mediaServerError", Value::Null, None),
        };

        Envelope {
            subject: subject.to_string(),
            data,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(subject: &str, data: Value, id: Option<&str>) -> Envelope {
        Envelope {
            subject: subject.to_string(),
            data,
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn legacy_subject_normalized() {
        assert_eq!(normalize_subject("bridge:/getInfo"), "bridge:getInfo");
        assert_eq!(normalize_subject("bridge:getInfo"), "bridge:getInfo");

        let decoded =
            Inbound::from_envelope(envelope("bridge:/getInfo", Value::String("0.1".into()), None));
        assert_eq!(decoded, Inbound::GetInfo);
    }

    #[test]
    fn session_initialize_decodes() {
        let decoded = Inbound::from_envelope(envelope(
            "bridge:session/initialize",
            serde_json::json!({
                "address": "10.0.0.5",
                "port": 8009,
                "appId": "ABC",
                "sessionId": "s1",
                "_id": "s1",
            }),
            Some("s1"),
        ));

        match decoded {
            Inbound::SessionInitialize { id, data } => {
                assert_eq!(id, "s1");
                assert_eq!(data.address, "10.0.0.5");
                assert_eq!(data.port, 8009);
                assert_eq!(data.app_id, "ABC");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn entity_message_without_id_is_unrecognized() {
        let decoded = Inbound::from_envelope(envelope(
            "bridge:session/close",
            Value::Null,
            None,
        ));
        assert!(matches!(decoded, Inbound::Unrecognized { .. }));
    }

    #[test]
    fn unknown_subject_is_unrecognized() {
        let decoded = Inbound::from_envelope(envelope("bridge:doesNotExist", Value::Null, None));
        assert_eq!(
            decoded,
            Inbound::Unrecognized {
                subject: "bridge:doesNotExist".into()
            }
        );
    }

    #[test]
    fn media_initialize_reads_internal_session_id() {
        let decoded = Inbound::from_envelope(envelope(
            "bridge:media/initialize",
            serde_json::json!({
                "sessionId": "device-session",
                "mediaSessionId": 1,
                "_internalSessionId": "s1",
            }),
            Some("m1"),
        ));

        match decoded {
            Inbound::MediaInitialize { id, data } => {
                assert_eq!(id, "m1");
                assert_eq!(data.internal_session_id, "s1");
                assert_eq!(data.media_session_id, 1);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn outbound_media_response_envelope() {
        let envelope = Outbound::MediaSendMessageResponse {
            id: "m1".into(),
            message_id: "r1".into(),
            error: false,
        }
        .into_envelope();

        assert_eq!(envelope.subject, "shim:media/sendMediaMessageResponse");
        assert_eq!(envelope.id.as_deref(), Some("m1"));
        assert_eq!(envelope.data["messageId"], "r1");
        assert_eq!(envelope.data["error"], false);
    }
}
