//! Query normalization: map whatever the user sent to a search term.
//!
//! Links to foreign services go through a fall-through chain: yt-dlp
//! metadata probe, then URL-path slug parsing, then a page-title scrape.
//! Transient fetch failures just advance the chain; only when every
//! strategy is exhausted does the query count as unresolvable.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::bot::query::{self, QueryKind, Service};
use crate::bot::scrape::PageScraper;
use crate::bot::ytdlp::YtDlp;

/// Titles shorter than this are noise (ids, error pages), not songs.
const MIN_TITLE_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// Every resolution strategy failed; nothing to search for.
    Unresolvable,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolvable => write!(f, "could not resolve query to a search term"),
        }
    }
}

impl std::error::Error for ResolveError {}

pub struct Resolver {
    ytdlp: Arc<YtDlp>,
    scraper: PageScraper,
}

impl Resolver {
    pub fn new(ytdlp: Arc<YtDlp>, scraper: PageScraper) -> Self {
        Self { ytdlp, scraper }
    }

    /// Normalize any user input into a search term (or cleaned URL).
    pub async fn normalize(&self, input: &str) -> Result<String, ResolveError> {
        match query::classify(input) {
            QueryKind::YoutubeLink => Ok(query::clean_youtube_url(input)),
            QueryKind::FreeText => Ok(input.trim().to_string()),
            QueryKind::ServiceLink(service) => self.resolve_link(input.trim(), service).await,
        }
    }

    async fn resolve_link(
        &self,
        url: &str,
        service: Service,
    ) -> Result<String, ResolveError> {
        // Strategy 1: metadata probe.
        match self.ytdlp.probe(url).await {
            Ok(meta) => {
                if let Some(term) = combine_artist_title(&meta.artist, &meta.title) {
                    debug!("Resolved via metadata probe: {term}");
                    return Ok(term);
                }
            }
            Err(e) => debug!("Metadata probe failed ({e}), trying URL path"),
        }

        // Strategy 2: readable slug in the URL path.
        if let Some(term) = title_from_path(url) {
            debug!("Resolved via URL path: {term}");
            return Ok(term);
        }

        // Strategy 3: page title scrape.
        match self.scraper.page_title(url, service).await {
            Ok(Some(term)) => {
                debug!("Resolved via page title: {term}");
                return Ok(term);
            }
            Ok(None) => debug!("Page had no usable title"),
            Err(e) => debug!("Page scrape failed: {e}"),
        }

        Err(ResolveError::Unresolvable)
    }
}

/// Combine artist and title into one search term. Bracketed qualifiers
/// ("(Official Video)", "[HD]") are stripped from the title; the artist
/// is prefixed only when the title doesn't already name it.
pub fn combine_artist_title(artist: &str, title: &str) -> Option<String> {
    let bracket_re = Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("bracket regex");
    let cleaned = bracket_re.replace_all(title, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    let artist = artist.trim();
    if !artist.is_empty() && !cleaned.to_lowercase().contains(&artist.to_lowercase()) {
        Some(format!("{artist} {cleaned}"))
    } else {
        Some(cleaned)
    }
}

/// Derive a human-readable title from the URL path, the way Apple Music
/// slugs read ("/album/after-hours/1499378108"). Only slugs with word
/// separators qualify; opaque ids are rejected so they don't become
/// search terms.
pub fn title_from_path(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    // Prefer the segment right after an album/song/track marker.
    let mut slug = None;
    for (i, seg) in segments.iter().enumerate() {
        if matches!(*seg, "album" | "song" | "track") {
            slug = segments.get(i + 1).copied();
            break;
        }
    }
    let slug = slug.or_else(|| {
        segments
            .iter()
            .rev()
            .find(|s| s.contains('-') || s.contains('_'))
            .copied()
    })?;

    if !slug.contains('-') && !slug.contains('_') {
        return None;
    }

    let decoded = urlencoding::decode(slug).ok()?;
    let spaced = decoded.replace(['-', '_'], " ");
    let trailing_id_re = Regex::new(r"\s+\d+$").expect("trailing id regex");
    let title = trailing_id_re.replace(&spaced, "").trim().to_string();

    (title.len() >= MIN_TITLE_LEN).then_some(title)
}
