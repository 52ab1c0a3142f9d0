use std::sync::Arc;

use viewstore::{CacheError, Collection, InMemoryBackend, RangeQuery, UNICODE_MAX};

use crate::support::{composite, config, entry, settle, tagged, Entry, FaultyBackend};

async fn populated(database: &str) -> Collection<Entry> {
    let collection = Collection::new(InMemoryBackend::new(), config(database));
    for record in [
        entry("user-1", "user", 1000),
        entry("user-2", "user", 2000),
        entry("post-1", "post", 3000),
        entry("post-2", "post", 4000),
    ] {
        collection.set(&record.id.clone(), record).await.unwrap();
    }
    collection
}

fn ids(records: &[Entry]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn closed_range_on_compound_index() {
    let collection = populated("range-closed").await;
    let query = RangeQuery::new("byTypeAndCreatedAt")
        .lower(composite("user", 0))
        .upper(composite("user", 1500));

    let found = collection.range(query).get().await.unwrap();
    assert_eq!(ids(&found), vec!["user-1"]);
}

#[tokio::test]
async fn closed_bounds_include_endpoints_and_open_bounds_exclude_them() {
    let collection = populated("range-bounds").await;
    let base = RangeQuery::new("byTypeAndCreatedAt")
        .lower(composite("user", 1000))
        .upper(composite("user", 2000));

    let closed = collection.range(base.clone()).get().await.unwrap();
    assert_eq!(ids(&closed), vec!["user-1", "user-2"]);

    let lower_open = collection.range(base.clone().lower_open()).get().await.unwrap();
    assert_eq!(ids(&lower_open), vec!["user-2"]);

    let upper_open = collection.range(base.clone().upper_open()).get().await.unwrap();
    assert_eq!(ids(&upper_open), vec!["user-1"]);

    let both_open = collection
        .range(base.lower_open().upper_open())
        .get()
        .await
        .unwrap();
    assert!(both_open.is_empty());
}

#[tokio::test]
async fn reverse_is_the_exact_reversal() {
    let collection = populated("range-reverse").await;
    let query = RangeQuery::new("byType");

    let forward = collection.range(query.clone()).get().await.unwrap();
    let mut backward = collection.range(query.reversed()).get().await.unwrap();
    assert_eq!(ids(&forward), vec!["post-1", "post-2", "user-1", "user-2"]);
    backward.reverse();
    assert_eq!(forward, backward);
}

#[tokio::test]
async fn one_sided_bounds() {
    let collection = populated("range-one-sided").await;

    let from_post_2 = collection
        .range(RangeQuery::new("byTypeAndCreatedAt").lower(composite("post", 4000)))
        .get()
        .await
        .unwrap();
    assert_eq!(ids(&from_post_2), vec!["post-2", "user-1", "user-2"]);

    let below_users = collection
        .range(RangeQuery::new("byType").upper("user").upper_open())
        .get()
        .await
        .unwrap();
    assert_eq!(ids(&below_users), vec!["post-1", "post-2"]);
}

#[tokio::test]
async fn prefix_scan_with_unicode_max() {
    let collection = populated("range-prefix").await;
    let query = RangeQuery::new("byType")
        .lower("us")
        .upper(format!("us{}", UNICODE_MAX));

    let users = collection.range(query).get().await.unwrap();
    assert_eq!(ids(&users), vec!["user-1", "user-2"]);
}

#[tokio::test]
async fn multi_entry_index_matches_each_tag() {
    let collection = Collection::new(InMemoryBackend::new(), config("range-tags"));
    collection.set("a", tagged("a", &["red", "blue"])).await.unwrap();
    collection.set("b", tagged("b", &["blue", "blue"])).await.unwrap();
    collection.set("c", tagged("c", &[])).await.unwrap();

    let blue = collection
        .range(RangeQuery::only("byTag", "blue"))
        .get()
        .await
        .unwrap();
    assert_eq!(ids(&blue), vec!["a", "b"]);

    let all = collection.range(RangeQuery::new("byTag")).get().await.unwrap();
    // "blue" entries for a and b, then "red" for a
    assert_eq!(ids(&all), vec!["a", "b", "a"]);
}

#[tokio::test]
async fn range_views_are_memoized_structurally() {
    let collection = Collection::new(InMemoryBackend::new(), config("range-memo"));
    let query = || RangeQuery::new("byTypeAndCreatedAt").lower(composite("user", 0));

    let first = collection.range(query());
    assert!(Arc::ptr_eq(&first, &collection.range(query())));
    assert!(!Arc::ptr_eq(&first, &collection.range(query().reversed())));
    assert!(!Arc::ptr_eq(&first, &collection.range(query().lower_open())));
    assert!(!Arc::ptr_eq(
        &first,
        &collection.range(RangeQuery::new("byTypeAndCreatedAt").lower(composite("user", 1)))
    ));
    assert_eq!(first.query(), &query());
}

#[tokio::test]
async fn range_reads_are_live() {
    let collection = populated("range-live").await;
    let view = collection.range(RangeQuery::only("byType", "post"));
    assert_eq!(view.get().await.unwrap().len(), 2);

    collection.set("post-3", entry("post-3", "post", 5000)).await.unwrap();
    collection.delete("post-1").await.unwrap();
    assert_eq!(ids(&view.get().await.unwrap()), vec!["post-2", "post-3"]);
}

#[tokio::test]
async fn concurrent_range_reads_share_one_query() {
    let backend = FaultyBackend::new();
    let collection = backend.collection(config("range-shared"));
    collection.set("u1", entry("u1", "user", 1)).await.unwrap();

    backend.faults.ranges.close();
    let view = collection.range(RangeQuery::new("byType"));
    let first = tokio::spawn({
        let view = Arc::clone(&view);
        async move { view.get().await }
    });
    let second = tokio::spawn({
        let view = Arc::clone(&view);
        async move { view.get().await }
    });

    settle(|| backend.range_queries() == 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(backend.range_queries(), 1);

    backend.faults.ranges.open();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, second);

    // Once settled, the next read queries again
    view.get().await.unwrap();
    assert_eq!(backend.range_queries(), 2);
}

#[tokio::test]
async fn missing_index_is_a_range_error() {
    let collection = populated("range-missing").await;
    let err = collection
        .range(RangeQuery::new("byColor"))
        .get()
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::RangeQuery { ref index, .. } if index == "byColor"));

    // Other reads are unaffected
    assert_eq!(collection.keys().await.unwrap().len(), 4);
}

#[tokio::test]
async fn malformed_bounds_are_a_range_error() {
    let collection = populated("range-malformed").await;

    let inverted = collection
        .range(RangeQuery::new("byType").lower("z").upper("a"))
        .get()
        .await
        .unwrap_err();
    assert!(matches!(inverted, CacheError::RangeQuery { .. }));

    let empty_open = collection
        .range(RangeQuery::new("byType").lower("a").upper("a").lower_open())
        .get()
        .await
        .unwrap_err();
    assert!(matches!(empty_open, CacheError::RangeQuery { .. }));
}
