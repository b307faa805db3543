//! Candidate scoring and selection.
//!
//! Given a search term and up to five results from the video-platform
//! search, pick the one most likely to be the track the user asked for.
//! Stateless: scoring is a pure function of the query, the candidate set
//! and the configured weights.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

/// How many search results the ranker looks at.
const MAX_CONSIDERED: usize = 5;

/// One search result from the video platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub uploader: String,
    /// Opaque handle usable to fetch/download (video id).
    pub id: String,
    pub url: Option<String>,
}

impl Candidate {
    /// Something yt-dlp can download: explicit URL if the search gave one,
    /// otherwise a watch URL built from the id.
    pub fn download_target(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("https://www.youtube.com/watch?v={}", self.id),
        }
    }
}

/// Scoring constants. These are heuristic, with no derivation behind them,
/// so they live in config rather than as hardcoded invariants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Added when a query word longer than 3 chars appears verbatim in the title.
    pub substring_bonus: f64,
    /// Added when the title contains "official", "audio" or "music".
    pub marker_bonus: f64,
    /// Subtracted when the title says "live" but the query didn't ask for it.
    pub live_penalty: f64,
    /// Subtracted when the title says "remix" but the query didn't ask for it.
    pub remix_penalty: f64,
    /// Best score must exceed this or we fall back to the first result.
    pub accept_threshold: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            substring_bonus: 0.3,
            marker_bonus: 0.1,
            live_penalty: 0.2,
            remix_penalty: 0.1,
            accept_threshold: 0.3,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RankError {
    /// The search returned nothing; the caller should fall back to a
    /// blind single-result search instead of ranking.
    NoCandidates,
}

impl fmt::Display for RankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no candidates to rank"),
        }
    }
}

impl std::error::Error for RankError {}

/// Score one candidate against the query. Unbounded heuristic range.
pub fn score(query: &str, candidate: &Candidate, weights: &ScoringWeights) -> f64 {
    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let title = candidate.title.to_lowercase();
    let uploader = candidate.uploader.to_lowercase();

    let mut all_words: HashSet<&str> = title.split_whitespace().collect();
    all_words.extend(uploader.split_whitespace());

    let overlap = query_words.intersection(&all_words).count();
    let mut score = overlap as f64 / query_words.len() as f64;

    if query_words
        .iter()
        .any(|w| w.len() > 3 && title.contains(w))
    {
        score += weights.substring_bonus;
    }

    if ["official", "audio", "music"].iter().any(|m| title.contains(m)) {
        score += weights.marker_bonus;
    }

    if title.contains("live") && !query_lower.contains("live") {
        score -= weights.live_penalty;
    }
    if title.contains("remix") && !query_lower.contains("remix") {
        score -= weights.remix_penalty;
    }

    score
}

/// Pick the best of the first five candidates.
///
/// Ties keep the earliest-seen maximum. If even the best score fails to
/// clear the acceptance threshold the heuristic isn't trusted and the
/// first candidate in original order is returned instead.
pub fn rank<'a>(
    query: &str,
    candidates: &'a [Candidate],
    weights: &ScoringWeights,
) -> Result<&'a Candidate, RankError> {
    let first = candidates.first().ok_or(RankError::NoCandidates)?;

    let mut best = first;
    let mut best_score = f64::NEG_INFINITY;

    for candidate in candidates.iter().take(MAX_CONSIDERED) {
        let s = score(query, candidate, weights);
        if s > best_score {
            best_score = s;
            best = candidate;
        }
    }

    if best_score > weights.accept_threshold {
        Ok(best)
    } else {
        Ok(first)
    }
}
