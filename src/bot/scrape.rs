//! Last-resort title resolution: fetch the page and read its `<title>`.

use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::bot::query::Service;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Branding suffixes a service appends to its own page titles. Only
/// the suffixes of the page's service are stripped, so a track that
/// happens to end in another service's name survives.
fn branding_suffixes(service: Service) -> &'static [&'static str] {
    match service {
        Service::Spotify => &[" | Spotify"],
        Service::AppleMusic => &[" - Apple Music", " on Apple Music"],
        Service::Other => &[" - YouTube", " | YouTube", " - YouTube Music"],
    }
}

pub struct PageScraper {
    client: reqwest::Client,
}

impl PageScraper {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Fetch a page and extract a cleaned title, or None when the page
    /// has no usable one.
    pub async fn page_title(
        &self,
        url: &str,
        service: Service,
    ) -> Result<Option<String>, String> {
        debug!("Scraping page title from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch page: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Page fetch returned {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read page body: {e}"))?;

        Ok(extract_title(&body)
            .map(|t| strip_branding(&t, service))
            .filter(|t| t.len() > 3))
    }
}

/// Pull a title out of raw HTML. Spotify's "song and lyrics by" pattern
/// is handled first because it carries the artist.
pub fn extract_title(html: &str) -> Option<String> {
    let spotify_re =
        Regex::new(r"<title>([^<]+?) - song and lyrics by ([^<|]+?) \| Spotify</title>")
            .expect("spotify title regex");
    if let Some(caps) = spotify_re.captures(html) {
        return Some(format!("{} {}", caps[2].trim(), caps[1].trim()));
    }

    let title_re = Regex::new(r"<title>([^<]+)</title>").expect("title regex");
    title_re
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
}

pub fn strip_branding(title: &str, service: Service) -> String {
    let mut out = title.trim();
    for suffix in branding_suffixes(service) {
        if let Some(stripped) = out.strip_suffix(suffix) {
            out = stripped.trim_end();
        }
    }
    out.to_string()
}
