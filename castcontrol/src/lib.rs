//! Receiver-device control: discovery, per-device status watchers, the cast
//! device link and the Session/Media registries.
//!
//! All contact with the cast wire protocol library lives in [`cast_link`] and
//! [`status_listener`]; everything else speaks the channel-based
//! [`link::DeviceConnector`] seam, which is what makes the registries
//! testable without a device on the network.

pub mod cast_link;
pub mod discovery;
pub mod errors;
pub mod link;
pub mod media;
pub mod session;
pub mod status_listener;

pub use cast_link::RustCastConnector;
pub use discovery::{
    DeviceTracker, DiscoveryEvent, DiscoveryService, StatusWatcher, WatcherFactory,
};
pub use errors::ControlError;
pub use link::{DeviceConnector, LinkCommand, LinkEvent, LinkHandle, SessionEvent};
pub use media::MediaRegistry;
pub use session::{SessionRegistry, SessionState};
pub use status_listener::CastWatcherFactory;

/// mDNS service type cast receivers announce themselves under.
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Default destination id for receiver-level messages.
pub const RECEIVER_DESTINATION: &str = "receiver-0";

/// Application id of the idle-screen receiver app.
pub const BACKDROP_APP_ID: &str = "E8C28D3C";

/// Namespace the typed media channel speaks.
pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";
