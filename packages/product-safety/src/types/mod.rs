//! Data types for the product safety pipeline.

pub mod analysis;
pub mod config;
pub mod detection;
pub mod product;
pub mod product_url;
pub mod reference;
pub mod reviews;
