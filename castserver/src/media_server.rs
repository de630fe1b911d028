//! The media server itself: one axum server per cast of a local file.

use std::path::Path;

use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

use crate::ServeError;
use crate::net::guess_local_ip;
use crate::subtitles;

/// What the UI needs to build playable URLs.
#[derive(Clone, Debug)]
pub struct MediaServerInfo {
    /// File name of the served media; the file also answers on `/`.
    pub media_path: String,
    /// URL paths of the subtitle tracks, `/subtitles/{n}.vtt`.
    pub subtitle_paths: Vec<String>,
    /// Address receivers on the LAN can reach this host under.
    pub local_address: String,
    /// Actually bound port, which differs from the requested one when 0 was
    /// asked for.
    pub port: u16,
}

/// A running media server. There is at most one; starting a new one goes
/// through stopping the previous instance first.
pub struct MediaServer {
    info: MediaServerInfo,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    // Holds converted subtitles for the lifetime of the server.
    _scratch: TempDir,
}

impl MediaServer {
    /// Binds and starts serving `file_path` on `port`.
    pub async fn start(file_path: &Path, port: u16) -> Result<MediaServer, ServeError> {
        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|_| ServeError::MissingMedia(file_path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(ServeError::MissingMedia(file_path.to_path_buf()));
        }

        let scratch = tempfile::tempdir()?;
        let tracks = subtitles::collect(file_path, scratch.path())?;

        let mut router = Router::new();
        for track in &tracks {
            router = router.route_service(&track.route, ServeFile::new(&track.file));
        }
        // ServeFile answers range requests and derives the content type from
        // the extension. Any other path serves the media too, so the file
        // name works as a URL path.
        router = router.fallback_service(ServeFile::new(file_path));

        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServeError::Bind { port, source })?;
        let bound_port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                warn!("Media server ended with an error: {}", err);
            }
        });

        let media_path = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let info = MediaServerInfo {
            media_path,
            subtitle_paths: tracks.iter().map(|track| track.route.clone()).collect(),
            local_address: guess_local_ip(),
            port: bound_port,
        };

        info!(
            "Media server for {} listening on {}:{} ({} subtitle tracks)",
            file_path.display(),
            info.local_address,
            info.port,
            info.subtitle_paths.len()
        );

        Ok(MediaServer {
            info,
            shutdown: Some(shutdown_tx),
            task,
            _scratch: scratch,
        })
    }

    pub fn info(&self) -> &MediaServerInfo {
        &self.info
    }

    /// Shuts the server down and waits until the port is released.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!("Media server task failed: {}", err);
        }
        debug!("Media server on port {} stopped", self.info.port);
    }
}
