//! Owner-scoped popularity ranking.

use uuid::Uuid;
use vault_db::test_fixtures::{unique_tag, TestDatabase};
use vault_db::{Error, RecordRepository, TagFilter, TagRepository};

#[tokio::test]
#[ignore = "requires DATABASE_URL with migrated database"]
async fn test_popular_requires_owner() {
    dotenvy::dotenv().ok();
    let t = TestDatabase::new().await;

    let err = t.db.tags.popular(TagFilter::default(), 10).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = t
        .db
        .tags
        .popular(TagFilter::for_owner(Uuid::nil()), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL with migrated database"]
async fn test_popular_rejects_non_positive_limit() {
    dotenvy::dotenv().ok();
    let t = TestDatabase::new().await;
    let err = t
        .db
        .tags
        .popular(TagFilter::for_owner(t.owner_id), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL with migrated database"]
async fn test_popular_orders_by_owner_usage_then_name() {
    dotenvy::dotenv().ok();
    let t = TestDatabase::new().await;
    // Shared prefix keeps the tie-break deterministic: "a" sorts before "b".
    let prefix = unique_tag("pop");
    let heavy = format!("{prefix}-c");
    let tied_a = format!("{prefix}-a");
    let tied_b = format!("{prefix}-b");

    t.db.bookmarks
        .create(t.bookmark("https://example.com/1", &[&heavy, &tied_b]))
        .await
        .expect("bookmark 1");
    t.db.notes
        .create(t.note("n1", &[&heavy, &tied_a]))
        .await
        .expect("note 1");
    t.db.notes
        .create(t.note("n2", &[&heavy]))
        .await
        .expect("note 2");

    // Another owner's heavy usage must not change this owner's ranking.
    let stranger = TestDatabase::new().await;
    for i in 0..5 {
        stranger
            .db
            .notes
            .create(stranger.note(&format!("s{i}"), &[&tied_b]))
            .await
            .expect("stranger note");
    }

    let top = t
        .db
        .tags
        .popular(TagFilter::for_owner(t.owner_id), 2)
        .await
        .expect("popular");
    let names: Vec<_> = top.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec![heavy.as_str(), tied_a.as_str()]);

    // Counts stay global.
    assert_eq!(top[0].count, 3);

    let top3 = t
        .db
        .tags
        .popular(TagFilter::for_owner(t.owner_id), 3)
        .await
        .expect("popular 3");
    assert_eq!(top3[2].name, tied_b);
    assert_eq!(top3[2].count, 6);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL with migrated database"]
async fn test_popular_never_lists_other_owners_tags() {
    dotenvy::dotenv().ok();
    let t = TestDatabase::new().await;
    let prefix = unique_tag("scoped");
    let mine = format!("{prefix}-mine");
    let retired = format!("{prefix}-retired");
    let theirs = format!("{prefix}-theirs");

    t.db.notes
        .create(t.note("kept", &[&mine]))
        .await
        .expect("kept note");
    let gone = t
        .db
        .notes
        .create(t.note("gone", &[&retired]))
        .await
        .expect("retired note");
    t.db.notes.delete(gone.id).await.expect("delete");

    let stranger = TestDatabase::new().await;
    stranger
        .db
        .bookmarks
        .create(stranger.bookmark("https://example.com/theirs", &[&theirs]))
        .await
        .expect("stranger bookmark");

    let ranked = t
        .db
        .tags
        .popular(TagFilter::for_owner(t.owner_id), 50)
        .await
        .expect("popular");
    let names: Vec<_> = ranked.iter().map(|tag| tag.name.as_str()).collect();

    // A tag this owner no longer uses stays at the bottom.
    assert_eq!(names, vec![mine.as_str(), retired.as_str()]);
    assert_eq!(ranked[1].count, 0);

    let theirs_ranked = stranger
        .db
        .tags
        .popular(TagFilter::for_owner(stranger.owner_id), 50)
        .await
        .expect("stranger popular");
    let names: Vec<_> = theirs_ranked.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec![theirs.as_str()]);
}
