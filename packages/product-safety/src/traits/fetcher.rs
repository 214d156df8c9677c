//! Page fetcher trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceResult;
use crate::types::product::ScrapedContent;

/// Retrieves a product page and splits it into product and review text.
///
/// Ordinary retrieval failures should come back as a
/// [`ScrapedContent::failed`] with confidence 0 rather than an `Err`;
/// the pipeline treats both the same way.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, include_reviews: bool) -> ServiceResult<ScrapedContent>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    async fn fetch(&self, url: &str, include_reviews: bool) -> ServiceResult<ScrapedContent> {
        (**self).fetch(url, include_reviews).await
    }
}
