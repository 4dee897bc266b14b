use crate::db::DbPool;
use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

/// Draw position, encoded so that later rounds sort after earlier ones and
/// qualifying rounds sort before the main draw. Round-robin matches share
/// R16's rank: a round robin group is roughly equivalent in draw depth to
/// the round of 16 and the original data doesn't distinguish them further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundRank {
    Q1,
    Q2,
    Q3,
    R128,
    R64,
    R32,
    R16,
    RoundRobin,
    QuarterFinal,
    SemiFinal,
    Final,
}

impl RoundRank {
    pub fn as_i16(&self) -> i16 {
        match self {
            RoundRank::Q1 => -3,
            RoundRank::Q2 => -2,
            RoundRank::Q3 => -1,
            RoundRank::R128 => 0,
            RoundRank::R64 => 1,
            RoundRank::R32 => 2,
            RoundRank::R16 | RoundRank::RoundRobin => 3,
            RoundRank::QuarterFinal => 4,
            RoundRank::SemiFinal => 5,
            RoundRank::Final => 6,
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        match label.to_uppercase().replace(['-', ' '], "").as_str() {
            "Q1" => Ok(RoundRank::Q1),
            "Q2" => Ok(RoundRank::Q2),
            "Q3" => Ok(RoundRank::Q3),
            "R128" | "ROUNDOF128" => Ok(RoundRank::R128),
            "R64" | "ROUNDOF64" => Ok(RoundRank::R64),
            "R32" | "ROUNDOF32" => Ok(RoundRank::R32),
            "R16" | "ROUNDOF16" => Ok(RoundRank::R16),
            "RR" | "ROUNDROBIN" => Ok(RoundRank::RoundRobin),
            "QF" | "QUARTERFINAL" | "QUARTERFINALS" => Ok(RoundRank::QuarterFinal),
            "SF" | "SEMIFINAL" | "SEMIFINALS" => Ok(RoundRank::SemiFinal),
            "F" | "FINAL" => Ok(RoundRank::Final),
            other => Err(AppError::ParseError(format!("unrecognized round label {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Upcoming,
    Scheduled,
    Completed,
    Retired,
    Walkover,
    Default,
    InProgress,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Completed => "completed",
            MatchStatus::Retired => "retired",
            MatchStatus::Walkover => "walkover",
            MatchStatus::Default => "default",
            MatchStatus::InProgress => "in_progress",
        }
    }

    /// Statuses that indicate a result has not been played yet, and so carry
    /// no winner: the Elo engine skips these and the pre-snapshot refresher
    /// targets exactly these rows.
    pub fn is_unplayed(&self) -> bool {
        matches!(self, MatchStatus::Upcoming | MatchStatus::Scheduled)
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "scheduled" => Ok(MatchStatus::Scheduled),
            "completed" => Ok(MatchStatus::Completed),
            "retired" => Ok(MatchStatus::Retired),
            "walkover" => Ok(MatchStatus::Walkover),
            "default" => Ok(MatchStatus::Default),
            "in_progress" => Ok(MatchStatus::InProgress),
            other => Err(AppError::ParseError(format!("unknown match status {other:?}"))),
        }
    }
}

/// `date_part * 10^7 + edition_ordinal_part * 10^2 + round_rank` — see
/// `temporal_order` on [`Match`]. `edition_ordinal` must be a stable, small
/// integer derived from the edition (its insertion sequence within the
/// tournament works; the exact source doesn't matter as long as it is
/// consistent, since this field only orders matches within a single day of a
/// single tournament edition against each other).
pub fn temporal_order(date: NaiveDate, edition_ordinal: i64, round_rank: RoundRank) -> i64 {
    let date_part = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp() / 86_400;
    date_part * 10_000_000 + (edition_ordinal % 100) * 100 + round_rank.as_i16() as i64
}

#[derive(Debug, Clone, FromRow)]
pub struct Match {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub tour: String,
    pub round_rank: i16,
    pub round_label: String,
    pub match_number: Option<i32>,
    pub player_a_id: Option<Uuid>,
    pub player_b_id: Option<Uuid>,
    pub winner_id: Option<Uuid>,
    pub seed_a: Option<i32>,
    pub seed_b: Option<i32>,
    pub score_raw: Option<String>,
    pub score_structured: Option<serde_json::Value>,
    pub status: String,
    pub retirement_set: Option<i16>,
    pub duration_minutes: Option<i32>,
    pub match_date: Option<NaiveDate>,
    pub match_date_estimated: bool,
    pub scheduled_datetime: Option<DateTime<Utc>>,
    pub court: Option<String>,
    pub external_id: Option<String>,
    pub temporal_order: i64,

    pub elo_pre_a: Option<f64>,
    pub elo_pre_b: Option<f64>,
    pub elo_post_a: Option<f64>,
    pub elo_post_b: Option<f64>,
    pub elo_params_version: Option<String>,
    pub elo_processed_at: Option<DateTime<Utc>>,
    pub elo_needs_recompute: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MATCH_COLUMNS: &str = "id, edition_id, tour, round_rank, round_label, match_number,
    player_a_id, player_b_id, winner_id, seed_a, seed_b, score_raw, score_structured, status,
    retirement_set, duration_minutes, match_date, match_date_estimated, scheduled_datetime,
    court, external_id, temporal_order,
    elo_pre_a, elo_pre_b, elo_post_a, elo_post_b, elo_params_version, elo_processed_at,
    elo_needs_recompute, created_at, updated_at";

impl Match {
    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_external_id(
        pool: &DbPool,
        edition_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE edition_id = $1 AND external_id = $2"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(edition_id)
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Fallback lookup for ingestion when a fixture/result carries no
    /// `external_id` or the id doesn't resolve an existing row: the same
    /// edition, round, and pair of players (order-independent) is assumed to
    /// be the same match.
    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_edition_round_players(
        pool: &DbPool,
        edition_id: Uuid,
        round_rank: RoundRank,
        player_a_id: Uuid,
        player_b_id: Uuid,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE edition_id = $1 AND round_rank = $2
               AND LEAST(player_a_id, player_b_id) = LEAST($3, $4)
               AND GREATEST(player_a_id, player_b_id) = GREATEST($3, $4)"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(edition_id)
            .bind(round_rank.as_i16())
            .bind(player_a_id)
            .bind(player_b_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Fetches, in `temporal_order`, every played match on `womens`'s pool the
    /// incremental Elo engine hasn't processed yet, or has been flagged to
    /// recompute (e.g. after a score correction or a player merge).
    #[instrument(level = "debug", skip(pool))]
    pub async fn unprocessed_for_elo(pool: &DbPool, womens: bool, limit: i64) -> Result<Vec<Self>> {
        let tours: &[&str] = if womens {
            &["wta", "wta125", "itf_women"]
        } else {
            &["atp", "challenger", "itf_men"]
        };
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE (elo_processed_at IS NULL OR elo_needs_recompute)
               AND tour = ANY($1)
               AND status NOT IN ('upcoming', 'scheduled', 'in_progress')
               AND winner_id IS NOT NULL
               AND player_a_id IS NOT NULL AND player_b_id IS NOT NULL
             ORDER BY temporal_order ASC
             LIMIT $2"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(tours)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn pending_elo_count(pool: &DbPool, womens: bool) -> Result<i64> {
        let tours: &[&str] = if womens {
            &["wta", "wta125", "itf_women"]
        } else {
            &["atp", "challenger", "itf_men"]
        };
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM matches
             WHERE (elo_processed_at IS NULL OR elo_needs_recompute)
               AND tour = ANY($1)
               AND status NOT IN ('upcoming', 'scheduled', 'in_progress')
               AND winner_id IS NOT NULL
               AND player_a_id IS NOT NULL AND player_b_id IS NOT NULL",
        )
        .bind(tours)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Matches not yet played (`upcoming`/`scheduled`) whose pre-match Elo
    /// snapshot is missing or stale relative to the players' current rating.
    /// The pipeline refreshes these so consumers can read a best-effort
    /// "Elo going into this match" even before it's been played.
    #[instrument(level = "debug", skip(pool))]
    pub async fn pending_pre_snapshot(pool: &DbPool, womens: bool, limit: i64) -> Result<Vec<Self>> {
        let tours: &[&str] = if womens {
            &["wta", "wta125", "itf_women"]
        } else {
            &["atp", "challenger", "itf_men"]
        };
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE status IN ('upcoming', 'scheduled')
               AND tour = ANY($1)
               AND player_a_id IS NOT NULL AND player_b_id IS NOT NULL
             ORDER BY temporal_order ASC
             LIMIT $2"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(tours)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn set_pending_pre_snapshot(
        pool: &DbPool,
        id: Uuid,
        elo_pre_a: f64,
        elo_pre_b: f64,
        params_version: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE matches SET elo_pre_a = $2, elo_pre_b = $3, elo_params_version = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(elo_pre_a)
        .bind(elo_pre_b)
        .bind(params_version)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// A player's full rating state as of their most recent *valid* (processed,
    /// not flagged for recompute) match, rebuilt straight from `matches` rather
    /// than trusted from `player_elo_state`. Once a chain is reopened by
    /// [`Self::reopen_for_elo`], `player_elo_state` keeps whatever it last held
    /// from the now-invalidated replay; this is the only state a resumed
    /// incremental pass may seed `working` from.
    #[instrument(level = "debug", skip(pool), fields(batch_size = player_ids.len()))]
    pub async fn anchor_state(pool: &DbPool, player_ids: &[Uuid]) -> Result<Vec<PlayerAnchor>> {
        sqlx::query_as::<_, PlayerAnchor>(
            "WITH valid_matches AS (
                SELECT player_a_id AS player_id, temporal_order, elo_post_a AS rating, match_date FROM matches
                    WHERE elo_processed_at IS NOT NULL AND NOT elo_needs_recompute AND player_a_id = ANY($1)
                UNION ALL
                SELECT player_b_id AS player_id, temporal_order, elo_post_b AS rating, match_date FROM matches
                    WHERE elo_processed_at IS NOT NULL AND NOT elo_needs_recompute AND player_b_id = ANY($1)
             )
             SELECT
                player_id,
                (array_agg(temporal_order ORDER BY temporal_order DESC))[1] AS temporal_order,
                (array_agg(rating ORDER BY temporal_order DESC))[1] AS rating,
                count(*)::int AS matches_played,
                (array_agg(match_date ORDER BY temporal_order DESC))[1] AS last_match_date,
                (array_agg(rating ORDER BY rating DESC))[1] AS career_peak_rating,
                (array_agg(match_date ORDER BY rating DESC))[1] AS career_peak_date
             FROM valid_matches
             GROUP BY player_id",
        )
        .bind(player_ids)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Bulk-marks a batch of matches processed in one round trip, writing
    /// each match's pre/post Elo snapshot and the parameter set version used.
    #[instrument(level = "debug", skip(pool, rows), fields(batch_size = rows.len()))]
    pub async fn bulk_mark_elo_processed(
        pool: &DbPool,
        rows: &[EloWriteback],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.match_id).collect();
        let pre_a: Vec<f64> = rows.iter().map(|r| r.elo_pre_a).collect();
        let pre_b: Vec<f64> = rows.iter().map(|r| r.elo_pre_b).collect();
        let post_a: Vec<f64> = rows.iter().map(|r| r.elo_post_a).collect();
        let post_b: Vec<f64> = rows.iter().map(|r| r.elo_post_b).collect();
        let versions: Vec<String> = rows.iter().map(|r| r.params_version.clone()).collect();

        sqlx::query(
            "UPDATE matches AS m SET
                elo_pre_a = u.pre_a, elo_pre_b = u.pre_b,
                elo_post_a = u.post_a, elo_post_b = u.post_b,
                elo_params_version = u.version,
                elo_processed_at = now(),
                elo_needs_recompute = false,
                updated_at = now()
             FROM UNNEST($1::uuid[], $2::double precision[], $3::double precision[],
                         $4::double precision[], $5::double precision[], $6::text[])
                AS u(id, pre_a, pre_b, post_a, post_b, version)
             WHERE m.id = u.id",
        )
        .bind(&ids)
        .bind(&pre_a)
        .bind(&pre_b)
        .bind(&post_a)
        .bind(&post_b)
        .bind(&versions)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Clears the processed flag for every match at or after `from_temporal_order`
    /// touching any of `player_ids`, so the incremental engine will revisit them
    /// on its next pass. Used by backfill recovery.
    #[instrument(level = "debug", skip(pool), fields(batch_size = player_ids.len()))]
    pub async fn reopen_for_elo(
        pool: &DbPool,
        player_ids: &[Uuid],
        from_temporal_order: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE matches SET elo_needs_recompute = true
             WHERE temporal_order >= $2
               AND (player_a_id = ANY($1) OR player_b_id = ANY($1))",
        )
        .bind(player_ids)
        .bind(from_temporal_order)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn resolve_tournament_level(pool: &DbPool, edition_id: Uuid) -> Result<String> {
        let (level,): (String,) = sqlx::query_as(
            "SELECT t.level FROM tournament_editions e
             JOIN tournaments t ON t.id = e.tournament_id
             WHERE e.id = $1",
        )
        .bind(edition_id)
        .fetch_one(pool)
        .await?;
        Ok(level)
    }
}

/// A player's reconstructed rating state as of their latest valid processed
/// match, returned by [`Match::anchor_state`].
#[derive(Debug, Clone, Copy, FromRow)]
pub struct PlayerAnchor {
    pub player_id: Uuid,
    pub temporal_order: i64,
    pub rating: f64,
    pub matches_played: i32,
    pub last_match_date: Option<NaiveDate>,
    pub career_peak_rating: f64,
    pub career_peak_date: Option<NaiveDate>,
}

/// One row's worth of Elo engine output, batched up by the caller and
/// flushed via [`Match::bulk_mark_elo_processed`].
#[derive(Debug, Clone)]
pub struct EloWriteback {
    pub match_id: Uuid,
    pub elo_pre_a: f64,
    pub elo_pre_b: f64,
    pub elo_post_a: f64,
    pub elo_post_b: f64,
    pub params_version: String,
}
