use crate::db::DbPool;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

/// The circuits this pipeline ingests. Stored as lowercase text, never as a
/// native Postgres enum, so a new tour can be added without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tour {
    Atp,
    Wta,
    Challenger,
    Wta125,
    ItfMen,
    ItfWomen,
}

impl Tour {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tour::Atp => "atp",
            Tour::Wta => "wta",
            Tour::Challenger => "challenger",
            Tour::Wta125 => "wta125",
            Tour::ItfMen => "itf_men",
            Tour::ItfWomen => "itf_women",
        }
    }

    /// The Elo pool a tour's matches feed into. Challenger results affect the
    /// ATP-tour rating; ITF/WTA125 feed the corresponding tour-level rating.
    pub fn is_womens(&self) -> bool {
        matches!(self, Tour::Wta | Tour::Wta125 | Tour::ItfWomen)
    }

    pub fn gender(&self) -> &'static str {
        if self.is_womens() { "women" } else { "men" }
    }
}

impl std::str::FromStr for Tour {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "atp" => Ok(Tour::Atp),
            "wta" => Ok(Tour::Wta),
            "challenger" => Ok(Tour::Challenger),
            "wta125" => Ok(Tour::Wta125),
            "itf_men" => Ok(Tour::ItfMen),
            "itf_women" => Ok(Tour::ItfWomen),
            other => Err(AppError::ParseError(format!("unknown tour {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub tournament_code: String,
    pub tour: String,
    pub gender: String,
    pub level: String,
    pub default_surface: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const TOURNAMENT_COLUMNS: &str = "id, name, tournament_code, tour, gender, level,
    default_surface, city, country, created_at";

impl Tournament {
    pub fn tour(&self) -> Result<Tour> {
        self.tour.parse()
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>> {
        let sql = format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_code(pool: &DbPool, tournament_code: &str, tour: Tour, gender: &str) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
             WHERE tournament_code = $1 AND tour = $2 AND gender = $3"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(tournament_code)
            .bind(tour.as_str())
            .bind(gender)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Finds the tournament by `(tournament_code, tour, gender)`, creating it
    /// if absent. Idempotent under concurrent callers via
    /// `ON CONFLICT DO UPDATE`, which also lets a later, more specific
    /// classification of `level`/`default_surface` win.
    #[instrument(level = "debug", skip(pool))]
    #[allow(clippy::too_many_arguments)]
    pub async fn find_or_create(
        pool: &DbPool,
        name: &str,
        tournament_code: &str,
        tour: Tour,
        level: &str,
        default_surface: Option<&str>,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Result<Self> {
        let sql = format!(
            "INSERT INTO tournaments (name, tournament_code, tour, gender, level, default_surface, city, country)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (tournament_code, tour, gender) DO UPDATE SET
                name = EXCLUDED.name,
                level = EXCLUDED.level,
                default_surface = COALESCE(EXCLUDED.default_surface, tournaments.default_surface),
                city = COALESCE(EXCLUDED.city, tournaments.city),
                country = COALESCE(EXCLUDED.country, tournaments.country)
             RETURNING {TOURNAMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(name)
            .bind(tournament_code)
            .bind(tour.as_str())
            .bind(tour.gender())
            .bind(level)
            .bind(default_surface)
            .bind(city)
            .bind(country)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TournamentEdition {
    pub id: Uuid,
    pub tournament_id: Uuid,
    pub year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub draw_size: Option<i32>,
    pub surface: Option<String>,
    pub external_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TournamentEdition {
    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, tournament_id, year, start_date, end_date, draw_size, surface, external_id, created_at
             FROM tournament_editions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    pub async fn find_by_tournament_and_year(
        pool: &DbPool,
        tournament_id: Uuid,
        year: i32,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, tournament_id, year, start_date, end_date, draw_size, surface, external_id, created_at
             FROM tournament_editions WHERE tournament_id = $1 AND year = $2",
        )
        .bind(tournament_id)
        .bind(year)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    #[instrument(level = "debug", skip(pool))]
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        pool: &DbPool,
        tournament_id: Uuid,
        year: i32,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        draw_size: Option<i32>,
        surface: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO tournament_editions
                (tournament_id, year, start_date, end_date, draw_size, surface, external_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (tournament_id, year) DO UPDATE SET
                start_date = COALESCE(EXCLUDED.start_date, tournament_editions.start_date),
                end_date = COALESCE(EXCLUDED.end_date, tournament_editions.end_date),
                draw_size = COALESCE(EXCLUDED.draw_size, tournament_editions.draw_size),
                surface = COALESCE(EXCLUDED.surface, tournament_editions.surface),
                external_id = COALESCE(EXCLUDED.external_id, tournament_editions.external_id)
             RETURNING id, tournament_id, year, start_date, end_date, draw_size, surface, external_id, created_at",
        )
        .bind(tournament_id)
        .bind(year)
        .bind(start_date)
        .bind(end_date)
        .bind(draw_size)
        .bind(surface)
        .bind(external_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
