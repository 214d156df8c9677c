//! Page fetcher implementations.
//!
//! - `HttpPageFetcher` - Direct HTTP retrieval with DOM section extraction
//! - `RateLimitedFetcher` - Wrapper that adds rate limiting

pub mod http;
pub mod rate_limited;

pub use http::HttpPageFetcher;
pub use rate_limited::{FetcherExt, RateLimitedFetcher, RateLimitedFetcherBuilder};
