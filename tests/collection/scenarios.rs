//! End-to-end walks through the common lifecycles of a collection.

use viewstore::{Action, Collection, InMemoryBackend, RangeQuery};

use crate::support::{config, entry, folder, folders, init_tracing, seeded};

#[tokio::test]
async fn seeded_store_becomes_ready_with_its_seed() {
    init_tracing();
    let collection = Collection::new(
        InMemoryBackend::new(),
        folders("scenario-seed", vec![folder("f1", "Personal")]),
    );

    assert!(!collection.is_ready());
    collection.ready().await.unwrap();
    assert!(collection.is_ready());
    assert_eq!(collection.keys().await.unwrap(), vec!["f1"]);
    let f1 = collection.item("f1").get().await.unwrap().unwrap();
    assert_eq!(f1.name, "Personal");
}

#[tokio::test]
async fn dispatched_puts_show_in_listing_and_range() {
    let collection = Collection::new(InMemoryBackend::new(), config("scenario-puts"));

    collection
        .dispatch(Action::put(entry("u1", "user", 1000)))
        .await
        .unwrap();
    collection
        .dispatch(Action::put(entry("p1", "post", 2000)))
        .await
        .unwrap();

    let mut keys = collection.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["p1", "u1"]);

    let posts = collection
        .range(RangeQuery::only("byType", "post"))
        .get()
        .await
        .unwrap();
    assert_eq!(posts, vec![entry("p1", "post", 2000)]);
}

#[tokio::test]
async fn deleting_the_last_record_empties_the_views() {
    let collection = Collection::new(
        InMemoryBackend::new(),
        seeded("scenario-delete", vec![entry("u1", "user", 1000)]),
    );
    assert_eq!(collection.keys().await.unwrap(), vec!["u1"]);

    collection.dispatch(Action::delete("u1")).await.unwrap();

    assert!(collection.item("u1").get().await.unwrap().is_none());
    assert!(collection.keys().await.unwrap().is_empty());
    assert!(collection.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn reopening_keeps_a_modified_seed_record() {
    let backend = InMemoryBackend::new();
    let seed = vec![folder("f1", "Personal")];

    let first = Collection::new(backend.clone(), folders("scenario-reopen", seed.clone()));
    first.item("f1").set(folder("f1", "Work")).await.unwrap();

    let second = Collection::new(backend, folders("scenario-reopen", seed));
    let f1 = second.item("f1").get().await.unwrap().unwrap();
    assert_eq!(f1.name, "Work");
    assert_eq!(second.keys().await.unwrap(), vec!["f1"]);
}
