mod common;

use common::setup;
use teelo_backend::models::player::{Player, ReviewStatus};
use teelo_backend::services::identity::{MatchKind, PlayerIdentityService};

#[tokio::test]
async fn exact_external_id_resolves_without_review() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let created = identity
        .create_player("Rafael Nadal", "atp", Some("N409"), Some("ESP"))
        .await
        .expect("create player");

    let matched = identity
        .find_or_queue_player("Rafael Nadal", "wta", Some("N409"), None)
        .await
        .expect("resolve")
        .expect("should resolve via external id");

    assert_eq!(matched.player_id, created.id);
    assert_eq!(matched.match_kind, MatchKind::ExactId);
}

#[tokio::test]
async fn fuzzy_match_above_threshold_auto_resolves() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.9, 0.7);

    let created = identity
        .create_player("Novak Djokovic", "atp", None, None)
        .await
        .expect("create player");

    let matched = identity
        .find_or_queue_player("Novak Djokovic", "wta", None, None)
        .await
        .expect("resolve")
        .expect("exact normalized alias should match");

    assert_eq!(matched.player_id, created.id);
}

#[tokio::test]
async fn ambiguous_name_without_external_id_goes_to_review_queue() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let result = identity
        .find_or_queue_player("Someone Unknown", "atp", None, None)
        .await
        .expect("resolve");

    assert!(result.is_none(), "brand new unverified name should not auto-create a player");

    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM player_review_queue WHERE status = 'pending'")
        .fetch_one(&ctx.pool)
        .await
        .expect("count review queue");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn unique_abbreviated_name_resolves_via_last_name_and_initial() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let created = identity.create_player("Emma Raducanu", "wta", None, None).await.unwrap();

    let matched = identity
        .find_or_queue_player("E. Raducanu", "itf", None, None)
        .await
        .expect("resolve")
        .expect("the only Raducanu on file should resolve via the abbreviated-name fallback");

    assert_eq!(matched.player_id, created.id);
    assert_eq!(matched.match_kind, MatchKind::Abbreviated);
}

#[tokio::test]
async fn ambiguous_abbreviation_goes_to_review_queue_with_suggested_candidates() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let rafael = identity.create_player("Rafael Nadal", "atp", None, None).await.unwrap();
    let roberto = identity.create_player("Roberto Nadal", "atp", None, None).await.unwrap();

    let result = identity
        .find_or_queue_player("R. Nadal", "itf", None, None)
        .await
        .expect("resolve");

    assert!(result.is_none(), "an ambiguous abbreviation must not auto-resolve to either candidate");

    let (scraped_name, suggestion_1, suggestion_2): (String, Option<uuid::Uuid>, Option<uuid::Uuid>) = sqlx::query_as(
        "SELECT scraped_name, suggested_player_1_id, suggested_player_2_id
         FROM player_review_queue WHERE scraped_name = 'R. Nadal'",
    )
    .fetch_one(&ctx.pool)
    .await
    .unwrap();

    assert_eq!(scraped_name, "R. Nadal");
    let suggested: std::collections::HashSet<uuid::Uuid> = [suggestion_1, suggestion_2].into_iter().flatten().collect();
    assert_eq!(
        suggested,
        std::collections::HashSet::from([rafael.id, roberto.id]),
        "both same-initial namesakes should be suggested"
    );
}

#[tokio::test]
async fn merge_players_repoints_matches_and_flags_recompute() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    let keep = common::fixtures::create_player(&ctx.pool, "Carlos Alcaraz").await.unwrap();
    let merge = common::fixtures::create_player(&ctx.pool, "C. Alcaraz").await.unwrap();
    let opponent = common::fixtures::create_player(&ctx.pool, "Jannik Sinner").await.unwrap();

    let edition_id = common::fixtures::create_edition(&ctx.pool, "ausopen", teelo_backend::models::tournament::Tour::Atp, 2026)
        .await
        .unwrap();
    let match_id = common::fixtures::insert_completed_match(
        &ctx.pool,
        edition_id,
        teelo_backend::models::tournament::Tour::Atp,
        1,
        teelo_backend::models::match_row::RoundRank::Final,
        merge.id,
        opponent.id,
        merge.id,
        chrono::NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
    )
    .await
    .unwrap();

    identity.merge_players(keep.id, merge.id).await.expect("merge");

    let row = teelo_backend::models::match_row::Match::find_by_id(&ctx.pool, match_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.player_a_id, Some(keep.id));
    assert_eq!(row.winner_id, Some(keep.id));
    assert!(row.elo_needs_recompute);

    assert!(Player::find_by_id(&ctx.pool, merge.id).await.unwrap().is_none());

    let (log_count,): (i64,) = sqlx::query_as("SELECT count(*) FROM player_merge_log WHERE keep_player_id = $1")
        .bind(keep.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(log_count, 1);
}

#[tokio::test]
async fn resolve_review_item_as_new_player_creates_it() {
    let ctx = setup::setup_test_db().await;
    let identity = PlayerIdentityService::new(ctx.pool.clone(), 0.98, 0.85);

    identity
        .find_or_queue_player("Totally New Name", "atp", None, None)
        .await
        .unwrap();

    let (review_id,): (uuid::Uuid,) =
        sqlx::query_as("SELECT id FROM player_review_queue WHERE scraped_name = 'Totally New Name'")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();

    identity
        .resolve_review_item(review_id, teelo_backend::services::identity::ReviewAction::Create, "operator")
        .await
        .expect("resolve as new player");

    let (status, resolved_player_id): (String, Option<uuid::Uuid>) =
        sqlx::query_as("SELECT status, resolved_player_id FROM player_review_queue WHERE id = $1")
            .bind(review_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(status, ReviewStatus::NewPlayer.as_str());
    assert!(resolved_player_id.is_some());
}
