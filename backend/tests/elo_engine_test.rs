mod common;

use common::{fixtures, setup};
use teelo_backend::models::elo_state::PlayerEloState;
use teelo_backend::models::match_row::RoundRank;
use teelo_backend::models::tournament::Tour;
use teelo_backend::services::elo::EloEngine;

#[tokio::test]
async fn run_incremental_moves_winner_above_loser() {
    let ctx = setup::setup_test_db().await;
    let params_set = fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();

    let winner = fixtures::create_player(&ctx.pool, "Iga Swiatek").await.unwrap();
    let loser = fixtures::create_player(&ctx.pool, "Aryna Sabalenka").await.unwrap();
    let edition_id = fixtures::create_edition(&ctx.pool, "roland_garros", Tour::Wta, 2026).await.unwrap();

    fixtures::insert_completed_match(
        &ctx.pool,
        edition_id,
        Tour::Wta,
        1,
        RoundRank::Final,
        winner.id,
        loser.id,
        winner.id,
        chrono::NaiveDate::from_ymd_opt(2026, 6, 7).unwrap(),
    )
    .await
    .unwrap();

    let params = params_set.as_params().unwrap();
    let engine = EloEngine::new(ctx.pool.clone(), params, params_set.name.clone());
    let stats = engine.run_incremental(100, true, 10).await.unwrap();

    assert_eq!(stats.matches_processed, 1);
    assert_eq!(stats.backfills_detected, 0);

    let winner_state = PlayerEloState::get(&ctx.pool, winner.id, true).await.unwrap().unwrap();
    let loser_state = PlayerEloState::get(&ctx.pool, loser.id, true).await.unwrap().unwrap();

    assert!(winner_state.rating > params.start_elo_women);
    assert!(loser_state.rating < params.start_elo_women);
    assert_eq!(winner_state.matches_played, 1);

    // men's pool state is untouched
    assert!(PlayerEloState::get(&ctx.pool, winner.id, false).await.unwrap().is_none());
}

#[tokio::test]
async fn late_arriving_match_flags_later_matches_for_recompute() {
    let ctx = setup::setup_test_db().await;
    let params_set = fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();
    let params = params_set.as_params().unwrap();

    let a = fixtures::create_player(&ctx.pool, "Player A").await.unwrap();
    let b = fixtures::create_player(&ctx.pool, "Player B").await.unwrap();
    let c = fixtures::create_player(&ctx.pool, "Player C").await.unwrap();
    let edition_id = fixtures::create_edition(&ctx.pool, "indian_wells", Tour::Atp, 2026).await.unwrap();

    // process a later match first
    let later_match = fixtures::insert_completed_match(
        &ctx.pool, edition_id, Tour::Atp, 1, RoundRank::Final,
        a.id, b.id, a.id, chrono::NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
    ).await.unwrap();

    let engine = EloEngine::new(ctx.pool.clone(), params, params_set.name.clone());
    engine.run_incremental(100, false, 10).await.unwrap();

    // now a scraper backfills an earlier match for player A against a new opponent
    fixtures::insert_completed_match(
        &ctx.pool, edition_id, Tour::Atp, 1, RoundRank::SemiFinal,
        a.id, c.id, a.id, chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
    ).await.unwrap();

    let stats = engine.run_incremental(100, false, 10).await.unwrap();
    assert_eq!(stats.backfills_detected, 1, "the later match should be reopened for recompute");

    // a second pass picks the reopened match back up
    let stats_second_pass = engine.run_incremental(100, false, 10).await.unwrap();
    assert_eq!(stats_second_pass.matches_processed, 1);

    let row = teelo_backend::models::match_row::Match::find_by_id(&ctx.pool, later_match).await.unwrap().unwrap();
    assert!(row.elo_processed_at.is_some());
    assert!(!row.elo_needs_recompute);

    // the idempotence law: a subsequent incremental run's final ratings must
    // equal a full rebuild replay of the same data, within float epsilon.
    // This is exactly the case a stale `working` seed (taken from
    // `player_elo_state` instead of the reopened chain's anchor) would get
    // wrong, since b's and c's persisted rows still reflected the first,
    // now-invalidated pass.
    let a_incremental = PlayerEloState::get(&ctx.pool, a.id, false).await.unwrap().unwrap().rating;
    let b_incremental = PlayerEloState::get(&ctx.pool, b.id, false).await.unwrap().unwrap().rating;
    let c_incremental = PlayerEloState::get(&ctx.pool, c.id, false).await.unwrap().unwrap().rating;

    let rebuild_stats = engine.rebuild_full(false, 100).await.unwrap();
    assert_eq!(rebuild_stats.matches_processed, 2);

    let a_rebuilt = PlayerEloState::get(&ctx.pool, a.id, false).await.unwrap().unwrap().rating;
    let b_rebuilt = PlayerEloState::get(&ctx.pool, b.id, false).await.unwrap().unwrap().rating;
    let c_rebuilt = PlayerEloState::get(&ctx.pool, c.id, false).await.unwrap().unwrap().rating;

    assert!((a_incremental - a_rebuilt).abs() < 1e-6, "player a: incremental {a_incremental} vs rebuild {a_rebuilt}");
    assert!((b_incremental - b_rebuilt).abs() < 1e-6, "player b: incremental {b_incremental} vs rebuild {b_rebuilt}");
    assert!((c_incremental - c_rebuilt).abs() < 1e-6, "player c: incremental {c_incremental} vs rebuild {c_rebuilt}");
}

#[tokio::test]
async fn rebuild_full_wipes_and_replays_from_scratch() {
    let ctx = setup::setup_test_db().await;
    let params_set = fixtures::activate_default_elo_params(&ctx.pool).await.unwrap();
    let params = params_set.as_params().unwrap();

    let winner = fixtures::create_player(&ctx.pool, "Carlos Alcaraz").await.unwrap();
    let loser = fixtures::create_player(&ctx.pool, "Daniil Medvedev").await.unwrap();
    let edition_id = fixtures::create_edition(&ctx.pool, "us_open", Tour::Atp, 2026).await.unwrap();
    fixtures::insert_completed_match(
        &ctx.pool, edition_id, Tour::Atp, 1, RoundRank::Final,
        winner.id, loser.id, winner.id, chrono::NaiveDate::from_ymd_opt(2026, 9, 7).unwrap(),
    ).await.unwrap();

    let engine = EloEngine::new(ctx.pool.clone(), params, params_set.name.clone());
    engine.run_incremental(100, false, 10).await.unwrap();
    let first_rating = PlayerEloState::get(&ctx.pool, winner.id, false).await.unwrap().unwrap().rating;

    let rebuild_stats = engine.rebuild_full(false, 100).await.unwrap();
    assert_eq!(rebuild_stats.matches_processed, 1);

    let rebuilt_rating = PlayerEloState::get(&ctx.pool, winner.id, false).await.unwrap().unwrap().rating;
    assert_eq!(first_rating, rebuilt_rating, "a rebuild from identical data reproduces the same rating");
}
