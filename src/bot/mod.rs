//! Bot module - turns song requests into audio files.

pub mod cleanup;
pub mod engine;
pub mod query;
pub mod ranker;
pub mod resolver;
pub mod scrape;
pub mod session;
pub mod telegram;
pub mod youtube_api;
pub mod ytdlp;

pub use engine::Engine;
pub use query::{QueryKind, Service};
pub use ranker::{Candidate, ScoringWeights};
pub use resolver::Resolver;
pub use scrape::PageScraper;
pub use session::{SessionMode, Sessions};
pub use telegram::TelegramClient;
pub use youtube_api::YoutubeApi;
pub use ytdlp::YtDlp;
