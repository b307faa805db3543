//! Query classification and URL canonicalization.
//!
//! Turns the raw user input into something the rest of the pipeline can
//! act on: a cleaned YouTube link, a foreign service link that needs
//! title resolution, or free text to search verbatim.

use url::Url;

/// Music services we know URL shapes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Spotify,
    AppleMusic,
    /// Any other http(s) link - resolved via the generic fallback chain.
    Other,
}

/// What kind of request the user sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A YouTube link, usable directly after cleaning.
    YoutubeLink,
    /// A link to some other service; needs title resolution first.
    ServiceLink(Service),
    /// Not a link - treat as a search query.
    FreeText,
}

pub fn classify(input: &str) -> QueryKind {
    let trimmed = input.trim();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return QueryKind::FreeText;
    }

    match host_of(trimmed) {
        Some(host) if is_youtube_host(&host) => QueryKind::YoutubeLink,
        Some(host) if host_matches(&host, "spotify.com") => {
            QueryKind::ServiceLink(Service::Spotify)
        }
        Some(host) if host_matches(&host, "music.apple.com") => {
            QueryKind::ServiceLink(Service::AppleMusic)
        }
        _ => QueryKind::ServiceLink(Service::Other),
    }
}

fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(|h| h.to_lowercase())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn is_youtube_host(host: &str) -> bool {
    host_matches(host, "youtube.com") || host_matches(host, "youtu.be")
}

/// Canonicalize a YouTube URL down to its video id, dropping tracking and
/// playlist parameters. Idempotent; URLs we can't make sense of pass
/// through unchanged.
pub fn clean_youtube_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    let Some(host) = url.host_str().map(str::to_lowercase) else {
        return raw.to_string();
    };

    let video_id = if host_matches(&host, "youtu.be") {
        url.path_segments()
            .and_then(|mut segs| segs.next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    } else if url.path() == "/watch" {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else {
        None
    };

    match video_id {
        Some(id) => format!("https://www.youtube.com/watch?v={id}"),
        None => raw.to_string(),
    }
}

/// Whether a URL points at a playlist or album rather than a single track.
///
/// Apple Music album links carry an `i` parameter when they reference one
/// track inside the album; that overrides the album shape.
pub fn is_collection(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    let Some(host) = url.host_str().map(str::to_lowercase) else {
        return false;
    };
    let path = url.path();

    if is_youtube_host(&host) {
        path.contains("playlist") || url.query_pairs().any(|(k, _)| k == "list")
    } else if host_matches(&host, "spotify.com") {
        path.contains("/playlist/") || path.contains("/album/")
    } else if host_matches(&host, "music.apple.com") {
        let single_track = url.query_pairs().any(|(k, _)| k == "i");
        path.contains("/playlist/") || (path.contains("/album/") && !single_track)
    } else {
        false
    }
}

/// Search-term ladder for free-text queries: tried in order until one
/// yields usable candidates.
pub fn search_terms(text: &str) -> Vec<String> {
    vec![
        text.to_string(),
        format!("{text} official audio"),
        format!("{text} music"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_free_text() {
        assert_eq!(classify("Blinding Lights The Weeknd"), QueryKind::FreeText);
        assert_eq!(classify("  hello  "), QueryKind::FreeText);
    }

    #[test]
    fn test_classify_links() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc123"),
            QueryKind::YoutubeLink
        );
        assert_eq!(classify("https://youtu.be/abc123"), QueryKind::YoutubeLink);
        assert_eq!(
            classify("https://open.spotify.com/track/xyz"),
            QueryKind::ServiceLink(Service::Spotify)
        );
        assert_eq!(
            classify("https://music.apple.com/us/album/foo/123"),
            QueryKind::ServiceLink(Service::AppleMusic)
        );
        assert_eq!(
            classify("https://soundcloud.com/artist/track"),
            QueryKind::ServiceLink(Service::Other)
        );
    }

    #[test]
    fn test_clean_strips_extra_params() {
        let cleaned = clean_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL123&t=42s&si=tracker",
        );
        assert_eq!(cleaned, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_clean_short_url() {
        assert_eq!(
            clean_youtube_url("https://youtu.be/dQw4w9WgXcQ?si=abcdef"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_clean_is_idempotent() {
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&feature=share";
        let once = clean_youtube_url(url);
        assert_eq!(clean_youtube_url(&once), once);
    }

    #[test]
    fn test_clean_passes_through_unknown_shapes() {
        let url = "https://www.youtube.com/playlist?list=PL123";
        assert_eq!(clean_youtube_url(url), url);
    }

    #[test]
    fn test_collection_list_param() {
        assert!(is_collection(
            "https://www.youtube.com/watch?v=abc&list=PL123"
        ));
        assert!(!is_collection("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_collection_spotify() {
        assert!(is_collection("https://open.spotify.com/playlist/37i9dQ"));
        assert!(is_collection("https://open.spotify.com/album/4aawyAB"));
        assert!(!is_collection("https://open.spotify.com/track/11dFghV"));
    }

    #[test]
    fn test_collection_apple_track_param_overrides() {
        assert!(is_collection(
            "https://music.apple.com/us/album/after-hours/1499378108"
        ));
        assert!(!is_collection(
            "https://music.apple.com/us/album/after-hours/1499378108?i=1499378116"
        ));
    }

    #[test]
    fn test_search_terms_ladder() {
        let terms = search_terms("bohemian rhapsody");
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], "bohemian rhapsody");
        assert_eq!(terms[1], "bohemian rhapsody official audio");
        assert_eq!(terms[2], "bohemian rhapsody music");
    }
}
