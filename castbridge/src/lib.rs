//! Bridge process between a browser extension UI and cast receivers on the
//! local network.
//!
//! The binary speaks the framed JSON channel on stdin/stdout; everything it
//! does is driven by the [`router::Router`], the single task that owns the
//! session and media registries, the device tracker, the media server and
//! the selector coordinator.

pub mod config;
pub mod router;
pub mod selector;

pub use config::Config;
pub use router::Router;
pub use selector::SelectorCoordinator;
