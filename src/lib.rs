#![forbid(unsafe_code)]

//! Tooling for a small static video site: a structured record store, the
//! page scraper used to import legacy pages, tag-based recommendations and
//! the regeneration pipeline that produces every listing and detail page.

pub mod config;
pub mod embed_cache;
pub mod error;
pub mod matcher;
pub mod package;
pub mod record;
pub mod regen;
pub mod render;
pub mod scrape;
pub mod site;
pub mod slug;
pub mod source;
pub mod store;

/// Installs the global `tracing` subscriber shared by every binary.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
