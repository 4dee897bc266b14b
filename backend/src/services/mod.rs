//! Service Layer
//!
//! Business logic that the pipeline binaries drive, kept independent of any
//! particular entrypoint so it's exercised the same way under tests and
//! under a live worker.
//!
//! ## Architecture
//!
//! - **names**: name normalization and fuzzy comparison for identity resolution
//! - **identity**: player identity resolution, merge, split
//! - **ingestion**: draw/schedule/results ingestion from scraped data
//! - **elo**: incremental and full-rebuild Elo rating engine
//! - **maintenance**: duplicate detection, mixed-gender split, merge recovery
//! - **scraping**: the `Scraper` trait boundary and its value types
//! - **score_parser**: tennis score string grammar
//! - **worker**: worker pool loop over the scrape queue
//! - **pipeline**: named-stage orchestrator
//! - **worker_events**: in-process worker status pub/sub
//! - **validation**: input validation for free-text fields

pub mod elo;
pub mod identity;
pub mod ingestion;
pub mod maintenance;
pub mod names;
pub mod pipeline;
pub mod score_parser;
pub mod scraping;
pub mod validation;
pub mod worker;
pub mod worker_events;
