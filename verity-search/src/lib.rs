//! Query-to-canonicalized-result search, with loosen/fallback/retry and
//! allow/deny domain filtering.

pub mod adapter;
pub mod provider;
pub mod types;

pub use adapter::SearchAdapter;
pub use provider::{HttpSearchConfig, HttpSearchProvider, SearchProvider};
pub use types::{SearchOptions, SearchResult, TimeRange};
