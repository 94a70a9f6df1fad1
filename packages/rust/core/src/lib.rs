//! Pipeline steps for seedcrawl.
//!
//! This crate ties the page store and the crawl expander together into the
//! end-to-end crawl step (`crawl_step`).

pub mod pipeline;
