//! Turns scraped match results into `matches` rows: resolves both players,
//! parses the score, estimates a match date when the source didn't give one,
//! and either inserts a new row or reconciles an existing one.

use crate::db::DbPool;
use crate::error::Result;
use crate::models::match_row::{temporal_order, Match, RoundRank};
use crate::models::tournament::TournamentEdition;
use crate::services::identity::PlayerIdentityService;
use crate::services::score_parser::parse_score;
use crate::services::scraping::ScrapedMatch;
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResultsIngestionStats {
    pub total_matches: usize,
    pub matches_created: usize,
    pub matches_updated: usize,
    pub matches_skipped_duplicate: usize,
    pub skipped_no_player_match: usize,
    pub errors: Vec<String>,
}

impl ResultsIngestionStats {
    pub fn summary(&self) -> String {
        format!(
            "{} total: {} created, {} updated, {} duplicate, {} unresolved player, {} errors",
            self.total_matches,
            self.matches_created,
            self.matches_updated,
            self.matches_skipped_duplicate,
            self.skipped_no_player_match,
            self.errors.len(),
        )
    }
}

/// Ingests a batch of scraped results for one tournament edition. Never
/// aborts the batch on a single bad match: failures are recorded in
/// `errors` and processing continues.
#[instrument(skip(pool, identity, scraped_matches), fields(batch_size = scraped_matches.len()))]
pub async fn ingest_results(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    scraped_matches: &[ScrapedMatch],
    edition: &TournamentEdition,
    edition_ordinal: i64,
    update_existing: bool,
) -> Result<ResultsIngestionStats> {
    let mut stats = ResultsIngestionStats::default();
    let mut seen_external_ids: HashSet<String> = HashSet::new();

    for scraped in scraped_matches {
        stats.total_matches += 1;

        if let Some(external_id) = &scraped.external_id {
            if !seen_external_ids.insert(external_id.clone()) {
                stats.matches_skipped_duplicate += 1;
                continue;
            }
        }

        match process_single_result(pool, identity, scraped, edition, edition_ordinal, update_existing).await {
            Ok(Outcome::Created) => stats.matches_created += 1,
            Ok(Outcome::Updated) => stats.matches_updated += 1,
            Ok(Outcome::SkippedNoPlayer) => stats.skipped_no_player_match += 1,
            Err(e) => stats.errors.push(format!("{}: {e}", scraped.external_id.as_deref().unwrap_or("?"))),
        }
    }

    tracing::info!(summary = %stats.summary(), "results ingestion batch complete");
    Ok(stats)
}

pub async fn ingest_single_result(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    scraped: &ScrapedMatch,
    edition: &TournamentEdition,
    edition_ordinal: i64,
) -> Result<ResultsIngestionStats> {
    ingest_results(pool, identity, std::slice::from_ref(scraped), edition, edition_ordinal, true).await
}

enum Outcome {
    Created,
    Updated,
    SkippedNoPlayer,
}

async fn process_single_result(
    pool: &DbPool,
    identity: &PlayerIdentityService,
    scraped: &ScrapedMatch,
    edition: &TournamentEdition,
    edition_ordinal: i64,
    update_existing: bool,
) -> Result<Outcome> {
    let source = scraped.tour.as_str();

    let player_a = identity
        .find_or_queue_player(&scraped.player_a_name, source, scraped.player_a_external_id.as_deref(), None)
        .await?;
    let player_b = identity
        .find_or_queue_player(&scraped.player_b_name, source, scraped.player_b_external_id.as_deref(), None)
        .await?;

    let (Some(player_a), Some(player_b)) = (player_a, player_b) else {
        return Ok(Outcome::SkippedNoPlayer);
    };

    let round_rank = RoundRank::from_label(&scraped.round_label)?;

    let (score_structured, status, retirement_set) = match &scraped.score_raw {
        Some(raw) => match parse_score(raw) {
            Ok(parsed) => (
                Some(parsed.to_structured()),
                format!("{:?}", parsed.status).to_lowercase(),
                parsed.retirement_set.map(|i| i as i16),
            ),
            Err(_) => (None, "completed".to_string(), None),
        },
        None => (None, "completed".to_string(), None),
    };

    let (match_date, match_date_estimated) = match scraped.match_date {
        Some(date) => (Some(date), false),
        None => (estimate_match_date_from_round(edition, round_rank), true),
    };

    // Positional convention from the source data: player A is listed as the
    // winner unless the score parser says otherwise.
    let winner_id = match &scraped.score_raw {
        Some(raw) => match parse_score(raw) {
            Ok(p) if p.winner == Some(crate::services::score_parser::Side::B) => player_b.player_id,
            _ => player_a.player_id,
        },
        None => player_a.player_id,
    };

    let order = match_date
        .map(|d| temporal_order(d, edition_ordinal, round_rank))
        .unwrap_or(0);

    let existing = match &scraped.external_id {
        Some(external_id) => Match::find_by_external_id(pool, edition.id, external_id).await?,
        None => None,
    };

    if let Some(existing) = existing {
        if update_existing {
            update_match(pool, existing.id, &player_a, &player_b, winner_id, scraped, &score_structured, &status, retirement_set, match_date, match_date_estimated, order, existing.match_date, existing.match_date_estimated).await?;
            Ok(Outcome::Updated)
        } else {
            Ok(Outcome::SkippedNoPlayer)
        }
    } else {
        create_match(pool, edition.id, &scraped.tour.as_str(), round_rank, &scraped.round_label, &player_a, &player_b, winner_id, scraped, &score_structured, &status, retirement_set, match_date, match_date_estimated, order).await?;
        Ok(Outcome::Created)
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_match(
    pool: &DbPool,
    edition_id: Uuid,
    tour: &str,
    round_rank: RoundRank,
    round_label: &str,
    player_a: &crate::services::identity::PlayerMatch,
    player_b: &crate::services::identity::PlayerMatch,
    winner_id: Uuid,
    scraped: &ScrapedMatch,
    score_structured: &Option<serde_json::Value>,
    status: &str,
    retirement_set: Option<i16>,
    match_date: Option<NaiveDate>,
    match_date_estimated: bool,
    temporal_order: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO matches
            (edition_id, tour, round_rank, round_label, player_a_id, player_b_id, winner_id,
             seed_a, seed_b, score_raw, score_structured, status, retirement_set,
             match_date, match_date_estimated, external_id, temporal_order)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(edition_id)
    .bind(tour)
    .bind(round_rank.as_i16())
    .bind(round_label)
    .bind(player_a.player_id)
    .bind(player_b.player_id)
    .bind(winner_id)
    .bind(scraped.seed_a)
    .bind(scraped.seed_b)
    .bind(&scraped.score_raw)
    .bind(score_structured)
    .bind(status)
    .bind(retirement_set)
    .bind(match_date)
    .bind(match_date_estimated)
    .bind(&scraped.external_id)
    .bind(temporal_order)
    .execute(pool)
    .await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn update_match(
    pool: &DbPool,
    match_id: Uuid,
    player_a: &crate::services::identity::PlayerMatch,
    player_b: &crate::services::identity::PlayerMatch,
    winner_id: Uuid,
    scraped: &ScrapedMatch,
    score_structured: &Option<serde_json::Value>,
    status: &str,
    retirement_set: Option<i16>,
    new_match_date: Option<NaiveDate>,
    new_match_date_estimated: bool,
    temporal_order: i64,
    existing_match_date: Option<NaiveDate>,
    existing_match_date_estimated: bool,
) -> Result<()> {
    // Never let a freshly-estimated date overwrite a real one already on
    // record; a real date replacing a previous estimate is always fine.
    let should_update_date = match new_match_date {
        None => false,
        Some(_) => !new_match_date_estimated || existing_match_date.is_none() || existing_match_date_estimated,
    };

    let (match_date, match_date_estimated, temporal_order) = if should_update_date {
        (new_match_date, new_match_date_estimated, temporal_order)
    } else {
        (existing_match_date, existing_match_date_estimated, temporal_order)
    };

    sqlx::query(
        "UPDATE matches SET
            player_a_id = $2, player_b_id = $3, winner_id = $4,
            seed_a = $5, seed_b = $6, score_raw = $7, score_structured = $8,
            status = $9, retirement_set = $10,
            match_date = $11, match_date_estimated = $12, temporal_order = $13,
            updated_at = now()
         WHERE id = $1",
    )
    .bind(match_id)
    .bind(player_a.player_id)
    .bind(player_b.player_id)
    .bind(winner_id)
    .bind(scraped.seed_a)
    .bind(scraped.seed_b)
    .bind(&scraped.score_raw)
    .bind(score_structured)
    .bind(status)
    .bind(retirement_set)
    .bind(match_date)
    .bind(match_date_estimated)
    .bind(temporal_order)
    .execute(pool)
    .await?;

    Ok(())
}

/// Linearly interpolates a match date between an edition's start and end
/// date based on how deep into the draw `round_rank` is. Qualifying rounds
/// are treated as depth zero, same as the first main-draw round, since
/// qualifying typically runs in the days immediately before the main draw
/// starts.
fn estimate_match_date_from_round(edition: &TournamentEdition, round_rank: RoundRank) -> Option<NaiveDate> {
    let start = edition.start_date?;
    let end = edition.end_date?;
    let span_days = (end - start).num_days().max(0);
    let depth = round_rank.as_i16().max(0) as i64;
    let offset = span_days * depth / RoundRank::Final.as_i16() as i64;
    Some(start + Duration::days(offset))
}
