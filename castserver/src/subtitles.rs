//! Subtitle sidecar handling.
//!
//! Sidecars are files next to the media sharing its stem: `movie.mp4` picks
//! up `movie.vtt` and `movie.srt`. Receivers only accept WebVTT, so SRT
//! sidecars are converted into a scratch directory that lives as long as the
//! media server.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// One subtitle track ready to serve.
#[derive(Clone, Debug)]
pub struct SubtitleTrack {
    /// URL path the track is served under, `/subtitles/{n}.vtt`.
    pub route: String,
    /// File backing the route; for SRT sidecars this is the converted copy
    /// in the scratch directory.
    pub file: PathBuf,
}

/// Finds the sidecars of `media_path`. SRT files are converted into
/// `scratch`; unreadable sidecars are skipped with a warning.
pub fn collect(media_path: &Path, scratch: &Path) -> io::Result<Vec<SubtitleTrack>> {
    let Some(stem) = media_path.file_stem() else {
        return Ok(Vec::new());
    };
    let Some(parent) = media_path.parent() else {
        return Ok(Vec::new());
    };

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let path = entry.path();
        if path == media_path || path.file_stem() != Some(stem) {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("vtt") | Some("srt") => candidates.push(path),
            _ => {}
        }
    }
    // Directory order is not stable; keep track numbering deterministic.
    candidates.sort();

    let mut tracks = Vec::new();
    for path in candidates {
        let index = tracks.len();
        let is_srt = path.extension().and_then(|e| e.to_str()) == Some("srt");

        let file = if is_srt {
            let source = match fs::read_to_string(&path) {
                Ok(source) => source,
                Err(err) => {
                    warn!("Skipping unreadable subtitle {}: {}", path.display(), err);
                    continue;
                }
            };
            let converted = scratch.join(format!("{index}.vtt"));
            fs::write(&converted, srt_to_vtt(&source))?;
            converted
        } else {
            path.clone()
        };

        debug!("Subtitle track {}: {}", index, path.display());
        tracks.push(SubtitleTrack {
            route: format!("/subtitles/{index}.vtt"),
            file,
        });
    }

    Ok(tracks)
}

/// SRT and WebVTT share the cue format; the differences that matter here
/// are the `WEBVTT` header and `.` instead of `,` as the millisecond
/// separator in cue timings.
pub fn srt_to_vtt(srt: &str) -> String {
    let mut vtt = String::from("WEBVTT\n\n");
    for line in srt.lines() {
        let line = line.trim_start_matches('\u{feff}');
        if line.contains("-->") {
            vtt.push_str(&line.replace(',', "."));
        } else {
            vtt.push_str(line);
        }
        vtt.push('\n');
    }
    vtt
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:04,200\nHello there.\n\n2\n00:00:05,500 --> 00:00:07,000\nStill here, with a comma.\n";

    #[test]
    fn srt_conversion_fixes_timings_only() {
        let vtt = srt_to_vtt(SRT);

        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:04.200"));
        assert!(vtt.contains("00:00:05.500 --> 00:00:07.000"));
        // Commas in cue text stay untouched.
        assert!(vtt.contains("Still here, with a comma."));
    }

    #[test]
    fn collect_finds_sidecars_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let media = dir.path().join("movie.mp4");
        fs::write(&media, b"x").unwrap();
        fs::write(dir.path().join("movie.srt"), SRT).unwrap();
        fs::write(dir.path().join("movie.vtt"), "WEBVTT\n").unwrap();
        fs::write(dir.path().join("other.srt"), SRT).unwrap();

        let tracks = collect(&media, scratch.path()).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].route, "/subtitles/0.vtt");
        assert_eq!(tracks[1].route, "/subtitles/1.vtt");

        // The SRT sidecar sorts first and lands converted in the scratch dir.
        assert!(tracks[0].file.starts_with(scratch.path()));
        let converted = fs::read_to_string(&tracks[0].file).unwrap();
        assert!(converted.starts_with("WEBVTT"));
        // The VTT sidecar is served in place.
        assert_eq!(tracks[1].file, dir.path().join("movie.vtt"));
    }

    #[test]
    fn collect_without_sidecars_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let media = dir.path().join("movie.mp4");
        fs::write(&media, b"x").unwrap();

        let tracks = collect(&media, scratch.path()).unwrap();
        assert!(tracks.is_empty());
    }
}
