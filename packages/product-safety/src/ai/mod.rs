//! Model-backed extractor and enricher implementations.
//!
//! Users can use these directly or implement
//! [`Extractor`](crate::traits::ai::Extractor) and
//! [`Enricher`](crate::traits::ai::Enricher) themselves.

mod credentials;
mod openai;

pub use credentials::ApiKey;
pub use openai::{page_text, OpenAiAnalyst, MAX_PAGE_CHARS};
