//! Receiver devices and the selector result model.

use serde::{Deserialize, Serialize};

use crate::status::ReceiverStatusSummary;

/// A receiver device found on the local network.
///
/// Sessions reference devices by host/port captured at connect time, never by
/// live pointer; a device disappearing does not tear an existing session down.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverDevice {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub friendly_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReceiverStatusSummary>,
}

/// Kind of content a selection casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    App,
    Tab,
    Screen,
    File,
}

impl MediaKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MediaKind::App => 1,
            MediaKind::Tab => 2,
            MediaKind::Screen => 4,
            MediaKind::File => 8,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MediaKind::App),
            2 => Some(MediaKind::Tab),
            4 => Some(MediaKind::Screen),
            8 => Some(MediaKind::File),
            _ => None,
        }
    }
}

impl Serialize for MediaKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for MediaKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        MediaKind::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid media kind: {value}")))
    }
}

/// One result per selector invocation, consumed exactly once.
///
/// Every failure mode of the external picker collapses into `Cancelled`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum SelectionResult {
    Cast(SelectionCast),
    Stop(SelectionStop),
    Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCast {
    pub receiver: ReceiverDevice,
    pub media_type: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionStop {
    pub receiver: ReceiverDevice,
}
