//! Media server behavior over real sockets on loopback.

use std::fs;
use std::path::PathBuf;

use castserver::{MediaServer, ServeError};

const SRT: &str = "1\n00:00:01,000 --> 00:00:04,200\nHello.\n";

fn media_file(dir: &tempfile::TempDir, bytes: usize) -> PathBuf {
    let path = dir.path().join("clip.mp4");
    fs::write(&path, vec![0xAB; bytes]).unwrap();
    path
}

#[tokio::test]
async fn serves_media_with_range_support() {
    let dir = tempfile::tempdir().unwrap();
    let media = media_file(&dir, 4096);

    let server = MediaServer::start(&media, 0).await.unwrap();
    let port = server.info().port;
    let client = reqwest::Client::new();

    let full = client
        .get(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(full.status().as_u16(), 200);
    assert_eq!(full.bytes().await.unwrap().len(), 4096);

    // The file name works as a path too.
    let by_name = client
        .get(format!("http://127.0.0.1:{port}/clip.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(by_name.status().as_u16(), 200);

    let partial = client
        .get(format!("http://127.0.0.1:{port}/"))
        .header("Range", "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status().as_u16(), 206);
    assert_eq!(partial.bytes().await.unwrap().len(), 100);

    server.stop().await;
}

#[tokio::test]
async fn serves_converted_subtitles() {
    let dir = tempfile::tempdir().unwrap();
    let media = media_file(&dir, 16);
    fs::write(dir.path().join("clip.srt"), SRT).unwrap();

    let server = MediaServer::start(&media, 0).await.unwrap();
    assert_eq!(server.info().subtitle_paths, vec!["/subtitles/0.vtt"]);

    let port = server.info().port;
    let body = reqwest::get(format!("http://127.0.0.1:{port}/subtitles/0.vtt"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.starts_with("WEBVTT"));
    assert!(body.contains("00:00:01.000 --> 00:00:04.200"));

    server.stop().await;
}

#[tokio::test]
async fn port_is_released_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let media = media_file(&dir, 16);

    let first = MediaServer::start(&media, 0).await.unwrap();
    let port = first.info().port;

    // The port is held while the first server runs.
    let conflict = MediaServer::start(&media, port).await;
    assert!(matches!(conflict, Err(ServeError::Bind { .. })));

    first.stop().await;

    // After stop, requests are refused and the port can be rebound.
    assert!(reqwest::get(format!("http://127.0.0.1:{port}/")).await.is_err());
    let second = MediaServer::start(&media, port).await.unwrap();
    second.stop().await;
}

#[tokio::test]
async fn missing_media_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.mp4");

    let result = MediaServer::start(&missing, 0).await;
    assert!(matches!(result, Err(ServeError::MissingMedia(_))));

    let result = MediaServer::start(dir.path(), 0).await;
    assert!(matches!(result, Err(ServeError::MissingMedia(_))));
}
