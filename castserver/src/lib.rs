//! On-demand local HTTP server for casting local media files.
//!
//! The server exists only while a local file is being cast: it serves the
//! file with range support, exposes subtitle sidecars as WebVTT, and knows
//! which local address a receiver on the network can reach it under.

pub mod media_server;
pub mod net;
pub mod subtitles;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("media file {0} does not exist or is not a regular file")]
    MissingMedia(PathBuf),
    #[error("failed to bind media server on port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("media server I/O error: {0}")]
    Io(#[from] io::Error),
}

pub use media_server::{MediaServer, MediaServerInfo};
pub use net::guess_local_ip;
