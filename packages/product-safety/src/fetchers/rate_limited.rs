//! Rate-limited fetcher wrapper.
//!
//! Wraps any PageFetcher implementation with rate limiting using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::ServiceResult;
use crate::traits::fetcher::PageFetcher;
use crate::types::product::ScrapedContent;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a request rate across all callers.
///
/// Zero rates are raised to one request per second.
pub struct RateLimitedFetcher<F: PageFetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        Self::with_quota(fetcher, Quota::per_second(non_zero(requests_per_second)))
    }

    /// Create with a custom quota.
    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Sustained `requests_per_second` with up to `burst` immediate requests.
    pub fn with_burst(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let quota =
            Quota::per_second(non_zero(requests_per_second)).allow_burst(non_zero(burst));
        Self::with_quota(fetcher, quota)
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(nonzero!(1u32))
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str, include_reviews: bool) -> ServiceResult<ScrapedContent> {
        self.limiter.until_ready().await;
        self.inner.fetch(url, include_reviews).await
    }
}

/// Builder for RateLimitedFetcher.
pub struct RateLimitedFetcherBuilder<F: PageFetcher> {
    fetcher: F,
    requests_per_second: u32,
    burst: Option<u32>,
}

impl<F: PageFetcher> RateLimitedFetcherBuilder<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            requests_per_second: 1,
            burst: None,
        }
    }

    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn build(self) -> RateLimitedFetcher<F> {
        match self.burst {
            Some(burst) => {
                RateLimitedFetcher::with_burst(self.fetcher, self.requests_per_second, burst)
            }
            None => RateLimitedFetcher::new(self.fetcher, self.requests_per_second),
        }
    }
}

/// Extension trait for easy rate limiting.
pub trait FetcherExt: PageFetcher + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }

    fn rate_limited_with_burst(
        self,
        requests_per_second: u32,
        burst: u32,
    ) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::with_burst(self, requests_per_second, burst)
    }
}

impl<F: PageFetcher + Sized> FetcherExt for F {}
