mod common;

use chrono::NaiveDate;
use common::{fixtures, setup};
use teelo_backend::models::match_row::Match;
use teelo_backend::models::tournament::{Tour, TournamentEdition};
use teelo_backend::services::identity::PlayerIdentityService;
use teelo_backend::services::ingestion::draw::ingest_draw;
use teelo_backend::services::ingestion::results::ingest_results;
use teelo_backend::services::ingestion::schedule::ingest_schedule;
use teelo_backend::services::scraping::{DrawEntry, ScrapedFixture, ScrapedMatch};

#[tokio::test]
async fn draw_then_schedule_then_results_converge_on_one_match_row() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let edition_id = fixtures::create_edition(&ctx.pool, "wimbledon", Tour::Atp, 2026).await.unwrap();
    let edition = TournamentEdition::find_by_id(&ctx.pool, edition_id).await.unwrap().unwrap();

    let draw_entry = DrawEntry {
        tournament_name: "Wimbledon".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: Some("Carlos Alcaraz".to_string()),
        player_b_external_id: None,
        seed_a: Some(1),
        seed_b: Some(2),
        external_id: Some("wimb-2026-final".to_string()),
    };

    let draw_stats = ingest_draw(&ctx.pool, &identity, &[draw_entry], &edition, 1).await.unwrap();
    assert_eq!(draw_stats.entries_created, 1);
    assert_eq!(draw_stats.entries_skipped_no_player, 0);

    let (status,): (String,) = sqlx::query_as(
        "SELECT status FROM matches WHERE edition_id = $1 AND external_id = 'wimb-2026-final'",
    )
    .bind(edition.id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(status, "upcoming");

    let fixture = ScrapedFixture {
        tournament_name: "Wimbledon".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: "Carlos Alcaraz".to_string(),
        player_b_external_id: None,
        scheduled_date: NaiveDate::from_ymd_opt(2026, 7, 12),
        scheduled_datetime: None,
        court: Some("Centre Court".to_string()),
        external_id: Some("wimb-2026-final".to_string()),
    };

    let schedule_stats = ingest_schedule(&ctx.pool, &identity, &[fixture], &edition, 1).await.unwrap();
    assert_eq!(schedule_stats.fixtures_updated, 1);
    assert_eq!(schedule_stats.fixtures_created, 0);

    let scraped_match = ScrapedMatch {
        tournament_name: "Wimbledon".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: "Carlos Alcaraz".to_string(),
        player_b_external_id: None,
        seed_a: Some(1),
        seed_b: Some(2),
        score_raw: Some("6-4 6-4 6-4".to_string()),
        match_date: NaiveDate::from_ymd_opt(2026, 7, 13),
        external_id: Some("wimb-2026-final".to_string()),
    };

    let results_stats = ingest_results(&ctx.pool, &identity, &[scraped_match], &edition, 1, true).await.unwrap();
    assert_eq!(results_stats.matches_updated, 1);
    assert_eq!(results_stats.matches_created, 0);

    let (final_count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM matches WHERE edition_id = $1 AND external_id = 'wimb-2026-final'",
    )
    .bind(edition.id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(final_count, 1, "the draw/fixture/result all converge on a single match row");

    let row = Match::find_by_external_id(&ctx.pool, edition.id, "wimb-2026-final").await.unwrap().unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.match_date, NaiveDate::from_ymd_opt(2026, 7, 13));
}

#[tokio::test]
async fn results_ingestion_deduplicates_repeated_external_ids_in_one_batch() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let edition_id = fixtures::create_edition(&ctx.pool, "us_open_dup", Tour::Atp, 2026).await.unwrap();
    let edition = TournamentEdition::find_by_id(&ctx.pool, edition_id).await.unwrap().unwrap();

    let make_match = || ScrapedMatch {
        tournament_name: "US Open".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Novak Djokovic".to_string(),
        player_a_external_id: None,
        player_b_name: "Alexander Zverev".to_string(),
        player_b_external_id: None,
        seed_a: None,
        seed_b: None,
        score_raw: Some("7-6 6-3".to_string()),
        match_date: NaiveDate::from_ymd_opt(2026, 9, 7),
        external_id: Some("uso-2026-final".to_string()),
    };

    let batch = vec![make_match(), make_match()];
    let stats = ingest_results(&ctx.pool, &identity, &batch, &edition, 1, true).await.unwrap();

    assert_eq!(stats.total_matches, 2);
    assert_eq!(stats.matches_created, 1);
    assert_eq!(stats.matches_skipped_duplicate, 1);
}

#[tokio::test]
async fn schedule_ingestion_falls_back_to_edition_round_players_without_an_external_id() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let edition_id = fixtures::create_edition(&ctx.pool, "miami_open", Tour::Atp, 2026).await.unwrap();
    let edition = TournamentEdition::find_by_id(&ctx.pool, edition_id).await.unwrap().unwrap();

    let draw_entry = DrawEntry {
        tournament_name: "Miami Open".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "SF".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: Some("Carlos Alcaraz".to_string()),
        player_b_external_id: None,
        seed_a: Some(1),
        seed_b: Some(2),
        // no external_id: the draw source doesn't carry one for this round
        external_id: None,
    };
    ingest_draw(&ctx.pool, &identity, &[draw_entry], &edition, 1).await.unwrap();

    let fixture = ScrapedFixture {
        tournament_name: "Miami Open".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "SF".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: "Carlos Alcaraz".to_string(),
        player_b_external_id: None,
        scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 28),
        scheduled_datetime: Some("2026-03-28T19:00:00Z".parse().unwrap()),
        court: Some("Stadium Court".to_string()),
        external_id: None,
    };

    let stats = ingest_schedule(&ctx.pool, &identity, &[fixture], &edition, 1).await.unwrap();
    assert_eq!(stats.fixtures_updated, 1, "matched the existing draw row by edition/round/players, not external_id");
    assert_eq!(stats.fixtures_created, 0);

    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM matches WHERE edition_id = $1")
        .bind(edition.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 1, "the fallback lookup must not create a duplicate row");

    let (status, court): (String, Option<String>) =
        sqlx::query_as("SELECT status, court FROM matches WHERE edition_id = $1")
            .bind(edition.id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(status, "scheduled");
    assert_eq!(court.as_deref(), Some("Stadium Court"));
}

#[tokio::test]
async fn results_ingestion_records_a_one_indexed_retirement_set() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let edition_id = fixtures::create_edition(&ctx.pool, "australian_open_ret", Tour::Atp, 2026).await.unwrap();
    let edition = TournamentEdition::find_by_id(&ctx.pool, edition_id).await.unwrap().unwrap();

    let scraped_match = ScrapedMatch {
        tournament_name: "Australian Open".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Jannik Sinner".to_string(),
        player_a_external_id: None,
        player_b_name: "Carlos Alcaraz".to_string(),
        player_b_external_id: None,
        seed_a: Some(1),
        seed_b: Some(2),
        score_raw: Some("6-4 2-1 RET".to_string()),
        match_date: NaiveDate::from_ymd_opt(2026, 1, 25),
        external_id: Some("ao-2026-final-ret".to_string()),
    };

    let stats = ingest_results(&ctx.pool, &identity, &[scraped_match], &edition, 1, true).await.unwrap();
    assert_eq!(stats.matches_created, 1);

    let row = Match::find_by_external_id(&ctx.pool, edition.id, "ao-2026-final-ret").await.unwrap().unwrap();
    assert_eq!(row.status, "retired");
    assert_eq!(row.retirement_set, Some(2), "the retirement happened in the second set, not array index 1");
}

#[tokio::test]
async fn results_ingestion_skips_unresolvable_players_without_failing_the_batch() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let edition_id = fixtures::create_edition(&ctx.pool, "atp_finals_unresolved", Tour::Atp, 2026).await.unwrap();
    let edition = TournamentEdition::find_by_id(&ctx.pool, edition_id).await.unwrap().unwrap();

    let scraped_match = ScrapedMatch {
        tournament_name: "ATP Finals".to_string(),
        tour: Tour::Atp,
        year: 2026,
        round_label: "F".to_string(),
        player_a_name: "Totally Unknown Player".to_string(),
        player_a_external_id: None,
        player_b_name: "Another Unknown Player".to_string(),
        player_b_external_id: None,
        seed_a: None,
        seed_b: None,
        score_raw: Some("6-2 6-2".to_string()),
        match_date: NaiveDate::from_ymd_opt(2026, 11, 16),
        external_id: Some("atpf-2026-final".to_string()),
    };

    let stats = ingest_results(&ctx.pool, &identity, &[scraped_match], &edition, 1, true).await.unwrap();
    assert_eq!(stats.total_matches, 1);
    assert_eq!(stats.skipped_no_player_match, 1);
    assert_eq!(stats.matches_created, 0);

    // both unresolved names land in the review queue rather than silently vanishing
    let (pending,): (i64,) = sqlx::query_as("SELECT count(*) FROM player_review_queue WHERE status = 'pending'")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(pending, 2);
}
