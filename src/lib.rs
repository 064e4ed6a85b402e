//! # Standfast
//!
//! An incremental scraper for dog-show data: archived show results, judge
//! directories and published critiques.
//!
//! ## Architecture
//!
//! Every target runs the same pipeline:
//!
//! ```text
//! Fetch → Extract → Diff → Write → Sync
//! ```
//!
//! - [`fetcher`]: plain HTTP or headless Chrome, behind one retry policy
//! - [`extractor`]: declarative selector rules turned into records
//! - [`detector`]: fingerprint comparison against the last run
//! - [`writer`]: deterministic JSON/CSV artifacts
//! - [`remote`]: checksum-aware mirror with stale reference recovery
//!
//! ## Quick Start
//!
//! ```bash
//! # Run every target once
//! standfast run
//!
//! # Run one target
//! standfast run judges
//!
//! # Serve GET /scrape
//! standfast serve --bind 0.0.0.0:8000
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together fetcher,
/// writer, remote sync and the configured targets.
pub mod app;

/// Command-line interface using clap.
///
/// - `run [TARGET...]` - Run targets once
/// - `serve [--bind ADDR]` - Serve the HTTP trigger API
/// - `targets` - List configured targets
/// - `status` - Show fingerprint counts and output locations
pub mod cli;

/// Configuration loaded from `~/.config/standfast/config.toml`.
pub mod config;

/// Change detection against stored fingerprints.
pub mod detector;

/// Core domain models.
///
/// - [`Record`](domain::Record): one extracted entity with its fingerprint
/// - [`TargetSpec`](domain::TargetSpec): declarative scrape target
/// - [`IdentityRule`](domain::IdentityRule): how identities come out of URLs
pub mod domain;

/// Selector-driven extraction of listings and records.
pub mod extractor;

/// Page fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for page fetching
/// - [`PageFetcher`](fetcher::PageFetcher): reqwest or chromiumoxide, per fetch mode
/// - [`RetryingFetcher`](fetcher::RetryingFetcher): exponential backoff around any fetcher
pub mod fetcher;

/// Per-target run orchestration.
pub mod pipeline;

/// Remote mirror of local artifacts (Google Drive, a directory, or memory).
pub mod remote;

/// HTTP trigger API built with axum.
pub mod server;

/// Fingerprint persistence.
pub mod store;

/// Built-in scrape targets.
pub mod targets;

/// Local artifact writer.
pub mod writer;
