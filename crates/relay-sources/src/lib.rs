//! HTTP content sources (NewsAPI, X timelines).
//!
//! Each source implements `relay_core::source::ContentSource` and maps every
//! provider failure onto `FetchError` before it leaves the adapter.

mod http;
pub mod newsapi;
pub mod twitter;

pub use newsapi::{NewsApiSource, NewsQuery};
pub use twitter::TwitterTimelineSource;
