//! YouTube Data API search, used ahead of yt-dlp search when a key is
//! configured.

use serde::Deserialize;
use tracing::{debug, info};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

pub struct YoutubeApi {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize, Debug)]
struct SearchItem {
    id: ItemId,
}

#[derive(Deserialize, Debug)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl YoutubeApi {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self { api_key, client }
    }

    /// Relevance-ordered search; returns the top hit as a watch URL.
    pub async fn search_first(&self, query: &str) -> Result<Option<String>, String> {
        debug!("YouTube API search: {query}");
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("order", "relevance"),
            ])
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("API error {status}: {body}"));
        }

        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {e}"))?;

        let url = parsed
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .next()
            .map(|id| format!("https://www.youtube.com/watch?v={id}"));

        if let Some(ref u) = url {
            info!("YouTube API hit: {u}");
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{"items":[{"id":{"kind":"youtube#video","videoId":"dQw4w9WgXcQ"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.items[0].id.video_id.as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_parse_empty_response() {
        let parsed: SearchResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parsed.items.is_empty());
    }
}
