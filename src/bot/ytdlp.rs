//! yt-dlp subprocess integration.
//!
//! All video-platform access goes through the yt-dlp binary: metadata
//! probes, flat search, playlist expansion and the actual audio download.
//! Every invocation runs under a timeout owned by this side.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::bot::ranker::Candidate;

#[derive(Debug)]
pub enum DownloadError {
    /// Could not start the yt-dlp binary.
    Spawn(std::io::Error),
    /// The invocation ran past its deadline.
    Timeout,
    /// yt-dlp exited non-zero; carries a stderr snippet.
    Failed(String),
    /// Output was not the JSON we expected.
    Parse(serde_json::Error),
    /// Could not create the per-download work directory.
    Io(std::io::Error),
    /// The command succeeded but produced nothing usable.
    NoOutput,
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to run yt-dlp: {e}"),
            Self::Timeout => write!(f, "yt-dlp timed out"),
            Self::Failed(stderr) => write!(f, "yt-dlp failed: {stderr}"),
            Self::Parse(e) => write!(f, "failed to parse yt-dlp output: {e}"),
            Self::Io(e) => write!(f, "download dir error: {e}"),
            Self::NoOutput => write!(f, "yt-dlp produced no usable output"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Title/artist pair from a metadata probe.
#[derive(Debug, Clone)]
pub struct TrackMeta {
    pub title: String,
    pub artist: String,
}

/// One line of `-j` output. Field availability varies wildly between
/// extractors, so everything is optional and defaulted.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl FlatEntry {
    fn best_artist(&self) -> String {
        [&self.artist, &self.uploader, &self.channel]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    /// "artist title" for playlist listings; artist is skipped when the
    /// title already names it.
    fn display_title(&self) -> String {
        let artist = self.best_artist();
        if !artist.is_empty()
            && !self.title.to_lowercase().contains(&artist.to_lowercase())
        {
            format!("{artist} {}", self.title)
        } else {
            self.title.clone()
        }
    }
}

pub struct YtDlp {
    bin: String,
    download_dir: PathBuf,
    probe_timeout: Duration,
    download_timeout: Duration,
    job_seq: AtomicU64,
}

impl YtDlp {
    pub fn new(
        bin: String,
        download_dir: PathBuf,
        probe_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            bin,
            download_dir,
            probe_timeout,
            download_timeout,
            job_seq: AtomicU64::new(0),
        }
    }

    /// Fetch title/artist metadata for a URL without downloading.
    pub async fn probe(&self, url: &str) -> Result<TrackMeta, DownloadError> {
        let output = self
            .run(&["-j", "--no-playlist", "--no-warnings", url], self.probe_timeout)
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().ok_or(DownloadError::NoOutput)?;
        let entry: FlatEntry = serde_json::from_str(line).map_err(DownloadError::Parse)?;
        if entry.title.is_empty() {
            return Err(DownloadError::NoOutput);
        }
        Ok(TrackMeta {
            artist: entry.best_artist(),
            title: entry.title,
        })
    }

    /// Flat search returning up to `max` candidates, platform order.
    pub async fn search(
        &self,
        term: &str,
        max: usize,
    ) -> Result<Vec<Candidate>, DownloadError> {
        let target = format!("ytsearch{max}:{term}");
        let output = self
            .run(
                &["-j", "--flat-playlist", "--no-warnings", target.as_str()],
                self.probe_timeout,
            )
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_candidates(&stdout))
    }

    /// Expand a playlist/album URL into per-track display titles, capped.
    pub async fn playlist_titles(
        &self,
        url: &str,
        cap: usize,
    ) -> Result<Vec<String>, DownloadError> {
        let output = self
            .run(
                &["-j", "--flat-playlist", "--no-warnings", url],
                self.probe_timeout,
            )
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let titles: Vec<String> = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
            .filter(|e| !e.title.is_empty())
            .map(|e| e.display_title())
            .take(cap)
            .collect();
        if titles.is_empty() {
            return Err(DownloadError::NoOutput);
        }
        Ok(titles)
    }

    /// Download a single track as mp3 and return the resulting file
    /// path. Each download gets its own subdirectory under the
    /// download dir, so concurrent requests never see each other's
    /// files; the caller removes the subdirectory after sending.
    pub async fn download_audio(&self, target: &str) -> Result<PathBuf, DownloadError> {
        info!("Downloading: {target}");
        let job_dir = self.next_job_dir();
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(DownloadError::Io)?;
        let template = job_dir
            .join("%(title).50s.%(ext)s")
            .to_string_lossy()
            .into_owned();
        let run = self
            .run(
                &[
                    "-x",
                    "--audio-format",
                    "mp3",
                    "--audio-quality",
                    "192K",
                    "--no-playlist",
                    "--no-warnings",
                    "-o",
                    template.as_str(),
                    target,
                ],
                self.download_timeout,
            )
            .await;

        let found = match run {
            Ok(_) => newest_mp3(&job_dir).ok_or(DownloadError::NoOutput),
            Err(e) => Err(e),
        };
        if found.is_err() {
            let _ = tokio::fs::remove_dir_all(&job_dir).await;
        }
        found
    }

    /// A fresh, unique work directory for one download.
    fn next_job_dir(&self) -> PathBuf {
        let seq = self.job_seq.fetch_add(1, Ordering::Relaxed);
        self.download_dir
            .join(format!("job-{}-{seq}", std::process::id()))
    }

    async fn run(
        &self,
        args: &[&str],
        limit: Duration,
    ) -> Result<std::process::Output, DownloadError> {
        debug!("yt-dlp {}", args.join(" "));
        let future = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match timeout(limit, future).await {
            Err(_) => return Err(DownloadError::Timeout),
            Ok(Err(e)) => return Err(DownloadError::Spawn(e)),
            Ok(Ok(out)) => out,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.chars().take(300).collect();
            return Err(DownloadError::Failed(snippet));
        }
        Ok(output)
    }
}

/// Parse newline-delimited `-j` search output into candidates.
fn parse_candidates(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .filter(|e| !e.title.is_empty())
        .map(|e| Candidate {
            uploader: e.best_artist(),
            url: e.url.clone().or(e.webpage_url.clone()),
            id: e.id,
            title: e.title,
        })
        .collect()
}

fn newest_mp3(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "mp3"))
        .max_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidates() {
        let stdout = concat!(
            r#"{"id":"a1","title":"Song One","uploader":"Artist","url":"https://youtu.be/a1"}"#,
            "\n",
            r#"{"id":"a2","title":"Song Two","channel":"Channel"}"#,
            "\n",
            "not json\n",
            r#"{"id":"a3","title":""}"#,
            "\n",
        );
        let candidates = parse_candidates(stdout);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Song One");
        assert_eq!(candidates[0].uploader, "Artist");
        assert_eq!(candidates[0].url.as_deref(), Some("https://youtu.be/a1"));
        assert_eq!(candidates[1].uploader, "Channel");
        assert_eq!(candidates[1].url, None);
    }

    #[test]
    fn test_candidate_download_target_falls_back_to_id() {
        let c = Candidate {
            title: "t".into(),
            uploader: "u".into(),
            id: "abc".into(),
            url: None,
        };
        assert_eq!(c.download_target(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_display_title_prefixes_artist() {
        let entry: FlatEntry =
            serde_json::from_str(r#"{"title":"Blinding Lights","uploader":"The Weeknd"}"#)
                .unwrap();
        assert_eq!(entry.display_title(), "The Weeknd Blinding Lights");
    }

    #[test]
    fn test_display_title_skips_redundant_artist() {
        let entry: FlatEntry = serde_json::from_str(
            r#"{"title":"The Weeknd - Blinding Lights","artist":"The Weeknd"}"#,
        )
        .unwrap();
        assert_eq!(entry.display_title(), "The Weeknd - Blinding Lights");
    }

    #[test]
    fn test_newest_mp3_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert!(newest_mp3(dir.path()).is_none());
        std::fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        let found = newest_mp3(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "song.mp3");
    }

    #[test]
    fn test_job_dirs_are_unique_and_under_download_dir() {
        let ytdlp = YtDlp::new(
            "yt-dlp".into(),
            PathBuf::from("/tmp/tunegrab"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let a = ytdlp.next_job_dir();
        let b = ytdlp.next_job_dir();
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/tunegrab"));
        assert!(b.starts_with("/tmp/tunegrab"));
    }

    #[test]
    fn test_newest_mp3_scoped_to_one_job_dir() {
        // A concurrent download in a sibling directory must never be
        // picked up, even when its file is more recent.
        let root = tempfile::tempdir().unwrap();
        let job_a = root.path().join("job-1-0");
        let job_b = root.path().join("job-1-1");
        std::fs::create_dir(&job_a).unwrap();
        std::fs::create_dir(&job_b).unwrap();
        std::fs::write(job_a.join("mine.mp3"), b"x").unwrap();
        std::fs::write(job_b.join("theirs.mp3"), b"x").unwrap();

        let found = newest_mp3(&job_a).unwrap();
        assert_eq!(found.file_name().unwrap(), "mine.mp3");
    }
}
