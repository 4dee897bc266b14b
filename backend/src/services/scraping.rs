//! The scraper-facing boundary: the value types a scraper implementation
//! hands to the ingestion services, and the trait pipeline workers call
//! through. No concrete scraper (ATP/WTA/ITF site client) ships here — that
//! belongs to a separate, source-specific crate — but the shapes and the
//! null test double do.

use crate::error::Result;
use crate::models::tournament::Tour;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone)]
pub struct ScrapedMatch {
    pub tournament_name: String,
    pub tour: Tour,
    pub year: i32,
    pub round_label: String,
    pub player_a_name: String,
    pub player_a_external_id: Option<String>,
    pub player_b_name: String,
    pub player_b_external_id: Option<String>,
    pub seed_a: Option<i32>,
    pub seed_b: Option<i32>,
    pub score_raw: Option<String>,
    pub match_date: Option<NaiveDate>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScrapedFixture {
    pub tournament_name: String,
    pub tour: Tour,
    pub year: i32,
    pub round_label: String,
    pub player_a_name: String,
    pub player_a_external_id: Option<String>,
    pub player_b_name: String,
    pub player_b_external_id: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_datetime: Option<DateTime<Utc>>,
    pub court: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DrawEntry {
    pub tournament_name: String,
    pub tour: Tour,
    pub year: i32,
    pub round_label: String,
    pub player_a_name: String,
    pub player_a_external_id: Option<String>,
    pub player_b_name: Option<String>,
    pub player_b_external_id: Option<String>,
    pub seed_a: Option<i32>,
    pub seed_b: Option<i32>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredEdition {
    pub tournament_name: String,
    pub tour: Tour,
    pub year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub draw_size: Option<i32>,
    pub surface: Option<String>,
    pub level: String,
    pub external_id: Option<String>,
}

/// One scraping backend per tour family. Workers drive this trait; the
/// orchestrator never talks to an HTTP client or a headless browser directly.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn discover(&self, tour: Tour, year: i32) -> Result<Vec<DiscoveredEdition>>;
    async fn scrape_tournament_results(&self, edition: &DiscoveredEdition) -> Result<Vec<ScrapedMatch>>;
    async fn scrape_fixtures(&self, edition: &DiscoveredEdition) -> Result<Vec<ScrapedFixture>>;
    async fn scrape_draw(&self, edition: &DiscoveredEdition) -> Result<Vec<DrawEntry>>;
}

/// A scraper that returns nothing for every call. Useful as a worker-pool and
/// orchestrator test double so those layers can be exercised without a real
/// network-facing backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScraper;

#[async_trait]
impl Scraper for NullScraper {
    async fn discover(&self, _tour: Tour, _year: i32) -> Result<Vec<DiscoveredEdition>> {
        Ok(vec![])
    }

    async fn scrape_tournament_results(&self, _edition: &DiscoveredEdition) -> Result<Vec<ScrapedMatch>> {
        Ok(vec![])
    }

    async fn scrape_fixtures(&self, _edition: &DiscoveredEdition) -> Result<Vec<ScrapedFixture>> {
        Ok(vec![])
    }

    async fn scrape_draw(&self, _edition: &DiscoveredEdition) -> Result<Vec<DrawEntry>> {
        Ok(vec![])
    }
}
