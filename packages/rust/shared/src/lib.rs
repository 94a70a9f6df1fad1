//! Shared types, error model, and configuration for seedcrawl.
//!
//! This crate is the foundation depended on by all other seedcrawl crates.
//! It provides:
//! - [`SeedcrawlError`] — the unified error type
//! - Domain types ([`Document`], [`Page`], [`PageMetadata`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, DefaultsConfig, FetchConfig, FetchErrorPolicy, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, SeedcrawlError};
pub use types::{Document, Page, PageMetadata, Properties};
