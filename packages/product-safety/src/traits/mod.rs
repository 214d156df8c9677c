//! Collaborator interfaces consumed by the analysis pipeline.
//!
//! The pipeline never talks to the network or a database directly; it
//! goes through these traits so its control flow and fallback policy can
//! be driven by deterministic stand-ins in tests.

pub mod ai;
pub mod fetcher;
pub mod store;
