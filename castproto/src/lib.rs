//! Wire protocol shared between the bridge process and its UI-side
//! counterpart.
//!
//! Messages travel as length-prefixed JSON frames over a duplex byte stream
//! (see [`codec`]). Every frame is an [`message::Envelope`]; subjects are
//! decoded exactly once at the channel boundary into the typed
//! [`message::Inbound`] / [`message::Outbound`] enums.

pub mod codec;
pub mod message;
pub mod selection;
pub mod status;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("I/O error on the message channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub use codec::{DecodedFrame, FrameCodec};
pub use message::{
    Envelope, Inbound, MediaInit, MediaSendMessage, Outbound, SessionAddListener, SessionInit,
    SessionSendMessage, SessionSendPlatformMessage, StartDiscovery, StartMediaServer,
    StopReceiverApp,
};
pub use selection::{MediaKind, ReceiverDevice, SelectionCast, SelectionResult, SelectionStop};
pub use status::{
    AppNamespace, ApplicationSummary, MediaInformation, MediaStatus, ReceiverApplication,
    ReceiverStatus, ReceiverStatusSummary, Volume,
};
