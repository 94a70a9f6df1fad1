//! Seed expansion: fetch each document's linked pages and merge them in.
//!
//! This crate provides:
//! - [`Fetcher`] — the "given a document, return its children" seam
//! - [`HttpFetcher`] — a reqwest/scraper implementation of it
//! - [`engine`] — bounded concurrent expansion with dedup and [`CrawlStats`]

pub mod engine;
pub mod fetcher;

pub use engine::{
    CrawlProgress, CrawlStats, ExpandOptions, SeedFailure, SilentProgress, dedup_documents,
    expand,
};
pub use fetcher::{Fetcher, HttpFetcher, document_id_for_url, extract_links, normalize_url};
