//! Receiver and media status payloads.
//!
//! These mirror the JSON shapes the UI-side counterpart expects; field names
//! are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Receiver volume. Both fields are optional because the device may report
/// either one independently.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub level: Option<f32>,
    pub muted: Option<bool>,
}

/// An application currently running on the receiver.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverApplication {
    pub app_id: String,
    pub session_id: String,
    pub transport_id: String,
    pub display_name: String,
    pub status_text: String,
    pub is_idle_screen: bool,
    #[serde(default)]
    pub namespaces: Vec<AppNamespace>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AppNamespace {
    pub name: String,
}

/// Full receiver status as relayed to a session.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    #[serde(default)]
    pub applications: Vec<ReceiverApplication>,
    pub volume: Volume,
}

/// Stable subset of the receiver status used by discovery status watching.
///
/// No running application is an absent `application`, never an error.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatusSummary {
    pub volume: Volume,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationSummary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub display_name: String,
    pub is_idle_screen: bool,
    pub status_text: String,
}

impl ReceiverStatus {
    /// Reshapes a full status into the discovery summary.
    pub fn summarize(&self) -> ReceiverStatusSummary {
        ReceiverStatusSummary {
            volume: self.volume.clone(),
            application: self.applications.first().map(|app| ApplicationSummary {
                display_name: app.display_name.clone(),
                is_idle_screen: app.is_idle_screen,
                status_text: app.status_text.clone(),
            }),
        }
    }
}

/// Playback status of one media session on the receiver.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatus {
    pub media_session_id: i32,
    pub player_state: String,
    pub current_time: Option<f32>,
    pub playback_rate: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInformation>,
    #[serde(default)]
    pub volume: Volume,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    pub content_id: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_without_application() {
        let status = ReceiverStatus {
            applications: vec![],
            volume: Volume {
                level: Some(0.5),
                muted: Some(false),
            },
        };

        let summary = status.summarize();
        assert!(summary.application.is_none());
        assert_eq!(summary.volume.level, Some(0.5));

        // "no application" must serialize as an absent field
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("application").is_none());
    }

    #[test]
    fn summarize_takes_first_application() {
        let status = ReceiverStatus {
            applications: vec![
                ReceiverApplication {
                    display_name: "Player".into(),
                    status_text: "Now playing".into(),
                    ..Default::default()
                },
                ReceiverApplication {
                    display_name: "Other".into(),
                    ..Default::default()
                },
            ],
            volume: Volume::default(),
        };

        let app = status.summarize().application.unwrap();
        assert_eq!(app.display_name, "Player");
        assert_eq!(app.status_text, "Now playing");
    }
}
