//! HTTP page fetcher.
//!
//! Fetches a product page with browser-like headers and pulls out the
//! product and review sections by CSS selector. No JavaScript rendering.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::traits::fetcher::PageFetcher;
use crate::types::{product::ScrapedContent, product_url::retailer_for};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Method tag for successful scrapes.
pub const METHOD: &str = "http_sections";

/// Product sections, in output order.
const PRODUCT_SECTIONS: &[(&str, &str)] = &[
    ("title", "#productTitle"),
    ("brand", "#bylineInfo"),
    (
        "price",
        ".a-price .a-offscreen, #priceblock_ourprice, #priceblock_dealprice",
    ),
    ("availability", "#availability"),
    (
        "product_attributes",
        ".a-section.a-spacing-small.a-spacing-top-small",
    ),
    ("feature_bullets", "#feature-bullets-btf"),
    ("about_item", "#featurebullets_feature_div"),
    ("product_description", "#productDescription"),
    ("aplus_content", "#aplus, #aplus_feature_div"),
    ("detail_bullets", "#detailBullets_feature_div"),
    (
        "product_info",
        "#productDetails_techSpec_section_1, #productDetails_detailBullets_sections1",
    ),
];

/// Review and Q&A sections, in output order.
const REVIEW_SECTIONS: &[(&str, &str)] = &[
    ("reviews_summary", "#reviewsMedley"),
    ("customer_reviews", "#customer-reviews"),
    ("critical_reviews", ".cr-widget-FocalReviews"),
    ("reviews_list", "[data-hook='review']"),
    ("questions_answers", "#ask-btf, #customer-questions"),
];

/// Recommendations, sponsored products and navigation.
const EXCLUDED: &[&str] = &[
    "#similarities_feature_div",
    "#purchase-sims-feature",
    ".similarities-widget",
    "[data-component-type='sp-sponsored-products']",
    "#nav-subnav",
    "#navbar",
    "#rhf",
];

/// Elements whose text never belongs in a section.
const SKIPPED_TAGS: &[&str] = &["form", "script", "style", "noscript"];

/// Review text shorter than this does not count as having reviews.
const MIN_REVIEW_BYTES: usize = 100;

/// Coarse confidence from the size of the extracted product text.
pub fn confidence_for_size(bytes: usize) -> f32 {
    let kb = bytes as f32 / 1024.0;
    if kb > 2.0 {
        0.9
    } else if kb > 1.0 {
        0.7
    } else if kb > 0.5 {
        0.5
    } else {
        0.2
    }
}

/// Fetches product pages over plain HTTP.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Create a fetcher with a 30 second timeout.
    pub fn new() -> ServiceResult<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> ServiceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ServiceError::Http(Box::new(e)))?;

        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("Request timeout: {}", e)
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, include_reviews: bool) -> ServiceResult<ScrapedContent> {
        let retailer = retailer_for(url);
        info!(url = %url, reviews = include_reviews, "Fetching product page");

        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(reason) => {
                warn!(url = %url, error = %reason, "Scraping failed");
                return Ok(ScrapedContent::failed(url, retailer, reason));
            }
        };

        let (product_text, review_text) = extract_sections(&html, include_reviews);
        debug!(
            url = %url,
            product_bytes = product_text.len(),
            review_bytes = review_text.len(),
            "Extracted page sections"
        );

        let has_reviews = include_reviews && review_text.len() > MIN_REVIEW_BYTES;
        let mut content = ScrapedContent::new(url, retailer)
            .with_confidence(confidence_for_size(product_text.len()))
            .with_method(METHOD)
            .with_product_text(product_text)
            .with_review_text(review_text);
        content.has_reviews = has_reviews;

        Ok(content)
    }
}

/// Split a page into `(product_text, review_text)`.
///
/// Each non-empty section becomes `=== name ===\n<text>\n`.
pub fn extract_sections(html: &str, include_reviews: bool) -> (String, String) {
    let document = Html::parse_document(html);
    let excluded = excluded_elements(&document);

    let product = render_sections(&document, PRODUCT_SECTIONS, &excluded);
    let reviews = if include_reviews {
        render_sections(&document, REVIEW_SECTIONS, &excluded)
    } else {
        String::new()
    };

    (product, reviews)
}

fn excluded_elements(document: &Html) -> Vec<ElementRef<'_>> {
    EXCLUDED
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .flat_map(|selector| document.select(&selector).collect::<Vec<_>>())
        .collect()
}

fn render_sections(
    document: &Html,
    sections: &[(&str, &str)],
    excluded: &[ElementRef],
) -> String {
    let mut out = String::new();

    for (name, selector) in sections {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        let elements: Vec<ElementRef> = document
            .select(&selector)
            .filter(|el| !is_excluded(el, excluded))
            .collect();
        if elements.is_empty() {
            continue;
        }

        let text = match *name {
            // Price widgets repeat; the first one is the displayed price
            "price" => collapse(&element_text(&elements[0], excluded)),
            "product_attributes" => attribute_lines(&elements, excluded),
            _ => collapse(
                &elements
                    .iter()
                    .map(|el| element_text(el, excluded))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        };

        let text = text.trim();
        if !text.is_empty() {
            out.push_str(&format!("=== {} ===\n{}\n\n", name, text));
        }
    }

    out
}

fn is_excluded(element: &ElementRef, excluded: &[ElementRef]) -> bool {
    excluded.contains(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| excluded.contains(&a))
}

/// Text of an element, skipping excluded subtrees, forms and scripts.
fn element_text(element: &ElementRef, excluded: &[ElementRef]) -> String {
    let mut parts = Vec::new();

    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| excluded.contains(&a) || SKIPPED_TAGS.contains(&a.value().name()));
        if skipped {
            continue;
        }

        let text = text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
    }

    parts.join(" ")
}

/// `label: value` lines from attribute tables.
fn attribute_lines(elements: &[ElementRef], excluded: &[ElementRef]) -> String {
    let (Ok(row), Ok(label), Ok(value)) = (
        Selector::parse("tr"),
        Selector::parse(".a-span3, .a-span4"),
        Selector::parse(".a-span9, .a-span8"),
    ) else {
        return String::new();
    };

    let mut lines = Vec::new();
    for element in elements {
        for tr in element.select(&row) {
            let (Some(l), Some(v)) = (tr.select(&label).next(), tr.select(&value).next()) else {
                continue;
            };
            let l = collapse(&element_text(&l, excluded));
            let v = collapse(&element_text(&v, excluded).replace("See more", ""));
            if !l.is_empty() && !v.is_empty() {
                lines.push(format!("{}: {}", l, v));
            }
        }
    }

    lines.join("\n")
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
