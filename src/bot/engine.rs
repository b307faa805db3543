//! Request processing: single tracks, playlists and free-text searches.
//!
//! The dispatcher spawns one of these flows per inbound request; each
//! flow messages its own progress and always ends the chat in a
//! consistent state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::bot::query::{self, QueryKind};
use crate::bot::ranker::{self, ScoringWeights};
use crate::bot::resolver::{ResolveError, Resolver};
use crate::bot::session::CancelToken;
use crate::bot::telegram::TelegramClient;
use crate::bot::youtube_api::YoutubeApi;
use crate::bot::ytdlp::YtDlp;

/// How many results to pull from a flat search before ranking.
const SEARCH_RESULTS: usize = 5;

pub struct Engine {
    telegram: Arc<TelegramClient>,
    ytdlp: Arc<YtDlp>,
    resolver: Resolver,
    youtube_api: Option<YoutubeApi>,
    weights: ScoringWeights,
    max_playlist_tracks: usize,
}

impl Engine {
    pub fn new(
        telegram: Arc<TelegramClient>,
        ytdlp: Arc<YtDlp>,
        resolver: Resolver,
        youtube_api: Option<YoutubeApi>,
        weights: ScoringWeights,
        max_playlist_tracks: usize,
    ) -> Self {
        Self {
            telegram,
            ytdlp,
            resolver,
            youtube_api,
            weights,
            max_playlist_tracks,
        }
    }

    /// Download a single track from a URL and send it.
    pub async fn run_single(&self, chat_id: i64, url: &str) {
        self.say(chat_id, "Downloading your track... 🚀").await;

        let term = match self.resolver.normalize(url).await {
            Ok(term) => term,
            Err(ResolveError::Unresolvable) => {
                warn!("Unresolvable URL from chat {chat_id}: {url}");
                self.say(
                    chat_id,
                    "Couldn't work out what that link points to. Try a different link or just send the song name.",
                )
                .await;
                return;
            }
        };

        // A cleaned YouTube URL downloads directly; anything else goes
        // through search first.
        let target = match query::classify(&term) {
            QueryKind::YoutubeLink => term,
            _ => self
                .locate(&term)
                .await
                .unwrap_or_else(|| format!("ytsearch1:{term}")),
        };

        match self.deliver(chat_id, &target).await {
            Ok(()) => self.say(chat_id, "Enjoy! 🎧🎵").await,
            Err(e) => {
                warn!("Single-track delivery failed: {e}");
                self.say(chat_id, "Couldn't download that track. Try a different link?")
                    .await;
            }
        }
    }

    /// Free-text search: resolve the best match, download, send.
    pub async fn run_search(&self, chat_id: i64, text: &str) {
        self.say(chat_id, &format!("Searching for '{text}'... 🔍")).await;

        let target = self
            .locate(text)
            .await
            .unwrap_or_else(|| format!("ytsearch1:{text}"));

        match self.deliver(chat_id, &target).await {
            Ok(()) => self.say(chat_id, "Enjoy the music! 🎧").await,
            Err(e) => {
                warn!("Search delivery failed: {e}");
                self.say(
                    chat_id,
                    "Couldn't find that song. Try being more specific.",
                )
                .await;
            }
        }
    }

    /// Expand a collection URL and send its tracks one by one.
    pub async fn run_playlist(&self, chat_id: i64, url: &str, cancel: CancelToken) {
        self.say(chat_id, "Playlist detected! Processing... 🎶").await;

        let tracks = match self.ytdlp.playlist_titles(url, self.max_playlist_tracks).await {
            Ok(tracks) => tracks,
            Err(e) => {
                info!("Playlist expansion failed ({e}), trying title fallback");
                match self.resolver.normalize(url).await {
                    Ok(term) => vec![term],
                    Err(_) => {
                        self.say(
                            chat_id,
                            "Couldn't extract playlist tracks. Try individual songs.",
                        )
                        .await;
                        return;
                    }
                }
            }
        };

        let total = tracks.len();
        self.say(
            chat_id,
            &format!("Found {total} tracks! Downloading and sending... 🎵"),
        )
        .await;

        let mut sent = 0;
        for (i, track) in tracks.iter().enumerate() {
            if cancel.is_cancelled() {
                self.say(chat_id, "Download stopped! ⏹️").await;
                return;
            }

            let n = i + 1;
            self.say(
                chat_id,
                &format!("[{n}/{total}] Searching: {}...", truncate(track, 40)),
            )
            .await;

            let target = self
                .locate(track)
                .await
                .unwrap_or_else(|| format!("ytsearch1:{track}"));

            match self.deliver(chat_id, &target).await {
                Ok(()) => {
                    sent += 1;
                    self.say(chat_id, &format!("✅ [{n}/{total}] Sent!")).await;
                }
                Err(e) => {
                    warn!("Playlist track {n}/{total} failed: {e}");
                    self.say(chat_id, &format!("❌ [{n}/{total}] Failed")).await;
                }
            }

            // Pace the Telegram API.
            sleep(Duration::from_secs(1)).await;
        }

        self.say(
            chat_id,
            &format!("🎉 Playlist complete! Sent {sent}/{total} tracks."),
        )
        .await;
    }

    /// Find the best download target for a search query: YouTube API
    /// first when configured, then ranked yt-dlp search over the term
    /// ladder. None means the caller should fall back to a blind search.
    async fn locate(&self, query_text: &str) -> Option<String> {
        if let Some(ref api) = self.youtube_api {
            match api.search_first(query_text).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => {}
                Err(e) => warn!("YouTube API search failed: {e}"),
            }
        }

        for term in query::search_terms(query_text) {
            let candidates = match self.ytdlp.search(&term, SEARCH_RESULTS).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Search '{term}' failed: {e}");
                    continue;
                }
            };

            match ranker::rank(query_text, &candidates, &self.weights) {
                Ok(best) => {
                    info!("Best match for '{query_text}': {}", best.title);
                    return Some(best.download_target());
                }
                Err(e) => info!("Search '{term}': {e}"),
            }
        }

        None
    }

    /// Download a target and send the resulting file. The download's
    /// work directory is removed afterwards, sent or not.
    async fn deliver(&self, chat_id: i64, target: &str) -> Result<(), String> {
        let path = self
            .ytdlp
            .download_audio(target)
            .await
            .map_err(|e| e.to_string())?;

        self.say(chat_id, "Found it! 🎉 Sending your music now... 🎵")
            .await;
        let result = self.telegram.send_audio_file(chat_id, &path).await;

        if let Some(job_dir) = path.parent() {
            if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
                warn!("Could not remove {job_dir:?}: {e}");
            }
        }
        result
    }

    async fn say(&self, chat_id: i64, text: &str) {
        // Progress messages are best-effort; failures are already logged
        // by the client.
        let _ = self.telegram.send_text(chat_id, text).await;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 40), "short");
        let long = "x".repeat(50);
        assert_eq!(truncate(&long, 40).chars().count(), 43);
    }
}
