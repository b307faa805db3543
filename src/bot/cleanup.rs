//! Periodic sweeping of the download directory.
//!
//! Downloads are transient: each request works in its own `job-*`
//! subdirectory that is removed right after sending. The sweeper
//! catches what failed requests and crashes leave behind, loose audio
//! files plus job directories old enough that no request can still be
//! using them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

/// Extensions yt-dlp can leave in the download dir.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "webm", "wav", "opus", "part"];

pub fn is_audio_temp(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
}

fn is_job_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("job-"))
}

/// A future mtime reads as age zero, which keeps the entry.
fn older_than(path: &Path, age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|elapsed| elapsed >= age)
}

/// Delete leftover audio files plus job directories not touched for at
/// least `stale_after`. Returns how many entries were removed. Fresh
/// job directories belong to in-flight requests and are left alone.
pub fn sweep(dir: &Path, stale_after: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cleanup could not read {dir:?}: {e}");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && is_audio_temp(&path) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove {path:?}: {e}"),
            }
        } else if path.is_dir() && is_job_dir(&path) && older_than(&path, stale_after) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove {path:?}: {e}"),
            }
        }
    }

    if removed > 0 {
        info!("Cleaned up {removed} leftover entries");
    }
    removed
}

/// Spawn the background sweeper. The first tick fires immediately so a
/// restart starts from a clean download dir.
pub fn spawn_sweeper(dir: PathBuf, every: Duration, stale_after: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            sweep(&dir, stale_after);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_temp() {
        assert!(is_audio_temp(Path::new("song.mp3")));
        assert!(is_audio_temp(Path::new("song.M4A")));
        assert!(is_audio_temp(Path::new("partial.webm.part")));
        assert!(!is_audio_temp(Path::new("config.json")));
        assert!(!is_audio_temp(Path::new("noext")));
    }

    #[test]
    fn test_sweep_removes_only_audio() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("b.opus"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        assert_eq!(sweep(dir.path(), Duration::from_secs(3600)), 2);
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("a.mp3").exists());

        // Nothing left to remove.
        assert_eq!(sweep(dir.path(), Duration::from_secs(3600)), 0);
    }

    #[test]
    fn test_sweep_spares_in_flight_job_dirs() {
        // A sweep fired while another chat's download is mid-flight
        // must not touch that request's directory or the file in it.
        let dir = tempfile::tempdir().unwrap();
        let job = dir.path().join("job-42-0");
        std::fs::create_dir(&job).unwrap();
        std::fs::write(job.join("song.mp3"), b"x").unwrap();

        assert_eq!(sweep(dir.path(), Duration::from_secs(3600)), 0);
        assert!(job.join("song.mp3").exists());
    }

    #[test]
    fn test_sweep_removes_stale_job_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let job = dir.path().join("job-42-0");
        std::fs::create_dir(&job).unwrap();
        std::fs::write(job.join("song.mp3"), b"x").unwrap();
        let other = dir.path().join("not-a-job");
        std::fs::create_dir(&other).unwrap();

        assert_eq!(sweep(dir.path(), Duration::ZERO), 1);
        assert!(!job.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_sweep_missing_dir_is_harmless() {
        assert_eq!(sweep(Path::new("/nonexistent/tunegrab-test"), Duration::ZERO), 0);
    }
}
