mod common;

use common::{fixtures, setup};
use teelo_backend::models::match_row::RoundRank;
use teelo_backend::models::player::Player;
use teelo_backend::models::tournament::Tour;
use teelo_backend::services::identity::PlayerIdentityService;
use teelo_backend::services::maintenance::{
    auto_merge_duplicates, find_duplicate_candidates, find_mixed_gender_players,
    recover_missing_merge_aliases,
};

#[tokio::test]
async fn find_duplicate_candidates_matches_accent_variants_sharing_a_last_name() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let accented = identity
        .create_player("Félix Auger-Aliassime", "atp", None, None)
        .await
        .unwrap();
    let plain = identity
        .create_player("Felix Auger-Aliassime", "wta", None, None)
        .await
        .unwrap();
    // an unrelated player with a different last name should never be paired
    identity.create_player("Rafael Nadal", "atp", None, None).await.unwrap();

    let candidates = find_duplicate_candidates(&ctx.pool).await.unwrap();
    assert_eq!(candidates.len(), 1);
    let pair = &candidates[0];
    assert_eq!(pair.confidence, 1.0);
    let ids = [pair.player_a_id, pair.player_b_id];
    assert!(ids.contains(&accented.id));
    assert!(ids.contains(&plain.id));
}

#[tokio::test]
async fn auto_merge_duplicates_keeps_the_player_with_more_matches() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let keep = identity.create_player("Félix Auger-Aliassime", "atp", None, None).await.unwrap();
    let drop = identity.create_player("Felix Auger-Aliassime", "wta", None, None).await.unwrap();
    let opponent = identity.create_player("Alex De Minaur", "atp", None, None).await.unwrap();

    let edition_id = fixtures::create_edition(&ctx.pool, "miami", Tour::Atp, 2026).await.unwrap();
    fixtures::insert_completed_match(
        &ctx.pool, edition_id, Tour::Atp, 1, RoundRank::Final,
        keep.id, opponent.id, keep.id, chrono::NaiveDate::from_ymd_opt(2026, 3, 30).unwrap(),
    ).await.unwrap();

    let merged = auto_merge_duplicates(&ctx.pool, &identity, 0.95).await.unwrap();
    assert_eq!(merged, 1);

    assert!(Player::find_by_id(&ctx.pool, keep.id).await.unwrap().is_some());
    assert!(Player::find_by_id(&ctx.pool, drop.id).await.unwrap().is_none());
}

#[tokio::test]
async fn recover_missing_merge_aliases_reattaches_a_pruned_alias() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let keep = identity.create_player("Casper Ruud", "atp", None, None).await.unwrap();
    let merge = identity.create_player("C. Ruud", "wta", None, None).await.unwrap();

    identity.merge_players(keep.id, merge.id).await.unwrap();

    // simulate the alias having been pruned by hand some time after the merge
    sqlx::query("DELETE FROM player_aliases WHERE player_id = $1 AND alias = 'c ruud'")
        .bind(keep.id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let recovered = recover_missing_merge_aliases(&ctx.pool, 0.85).await.unwrap();
    assert_eq!(recovered, 1);

    let (count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM player_aliases WHERE player_id = $1 AND alias = 'c ruud'",
    )
    .bind(keep.id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(count, 1);

    // a second run is a no-op since the alias is already present
    let recovered_again = recover_missing_merge_aliases(&ctx.pool, 0.85).await.unwrap();
    assert_eq!(recovered_again, 0);
}

#[tokio::test]
async fn find_mixed_gender_players_flags_a_player_with_matches_on_both_tours() {
    let ctx = setup::setup_test_db().await;

    let mixed = fixtures::create_player(&ctx.pool, "Ana Markovic").await.unwrap();
    let mens_opponent = fixtures::create_player(&ctx.pool, "Ivan Petrov").await.unwrap();
    let womens_opponent = fixtures::create_player(&ctx.pool, "Jana Kovac").await.unwrap();

    let mens_edition = fixtures::create_edition(&ctx.pool, "challenger_event", Tour::Atp, 2026).await.unwrap();
    let womens_edition = fixtures::create_edition(&ctx.pool, "itf_event", Tour::Wta, 2026).await.unwrap();

    // three matches on the women's tour, one mistakenly recorded on the men's tour
    let womens_rounds = [RoundRank::R32, RoundRank::R16, RoundRank::QuarterFinal];
    for (day, round) in womens_rounds.into_iter().enumerate() {
        fixtures::insert_completed_match(
            &ctx.pool, womens_edition, Tour::Wta, 1, round,
            mixed.id, womens_opponent.id, mixed.id,
            chrono::NaiveDate::from_ymd_opt(2026, 4, day as u32 + 1).unwrap(),
        ).await.unwrap();
    }
    fixtures::insert_completed_match(
        &ctx.pool, mens_edition, Tour::Atp, 1, RoundRank::R32,
        mixed.id, mens_opponent.id, mixed.id,
        chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
    ).await.unwrap();

    let flagged = find_mixed_gender_players(&ctx.pool).await.unwrap();
    let entry = flagged.iter().find(|p| p.player_id == mixed.id).expect("player should be flagged");
    assert_eq!(entry.minority_match_ids.len(), 1, "the single men's-tour match is the minority side");
}
