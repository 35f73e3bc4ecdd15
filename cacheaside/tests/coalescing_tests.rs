use std::sync::Arc;
use std::time::Duration;

use cacheaside::{CacheAside, CacheAsideError, Fetcher, JsonCodec};
use cacheaside_test_utils::{init_test_tracing, user_key, FaultyStore, User, UserSource};
use futures::future::join_all;

const DELAY: Duration = Duration::from_millis(50);

fn setup(source: UserSource) -> (Arc<FaultyStore>, Arc<UserSource>, Fetcher<User>) {
    init_test_tracing();
    let store = Arc::new(FaultyStore::new());
    let source = Arc::new(source.with_delay(DELAY));
    let aside = CacheAside::new(JsonCodec, store.clone(), "user").unwrap();
    let fetcher = aside.fetch(source.clone(), user_key);
    (store, source, fetcher)
}

#[tokio::test(start_paused = true)]
async fn identical_misses_share_one_source_call() {
    let (store, source, fetcher) = setup(UserSource::new([User::sample("1"), User::sample("2")]));

    let results = join_all((0..10).map(|_| fetcher.mget(&["1", "2", "3"], &()))).await;

    assert_eq!(source.calls(), 1);
    for result in results {
        assert_eq!(
            result.unwrap(),
            vec![Some(User::sample("1")), Some(User::sample("2")), None]
        );
    }
    // every waiter writes its own results back
    assert_eq!(store.writes().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn request_order_does_not_split_a_flight() {
    let (_store, source, fetcher) = setup(UserSource::new([User::sample("1"), User::sample("2")]));

    let (a, b) = tokio::join!(
        fetcher.mget(&["1", "2"], &()),
        fetcher.mget(&["2", "2", "1"], &())
    );

    assert_eq!(source.calls(), 1);
    assert_eq!(a.unwrap(), vec![Some(User::sample("1")), Some(User::sample("2"))]);
    assert_eq!(
        b.unwrap(),
        vec![Some(User::sample("2")), Some(User::sample("2")), Some(User::sample("1"))]
    );
}

#[tokio::test(start_paused = true)]
async fn distinct_miss_sets_fetch_separately() {
    let (_store, source, fetcher) = setup(UserSource::new([User::sample("1"), User::sample("2")]));

    let (a, b) = tokio::join!(fetcher.get("1", &()), fetcher.get("2", &()));

    assert_eq!(source.calls(), 2);
    assert_eq!(a.unwrap(), Some(User::sample("1")));
    assert_eq!(b.unwrap(), Some(User::sample("2")));
}

#[tokio::test(start_paused = true)]
async fn clones_share_the_coalescer() {
    let (_store, source, fetcher) = setup(UserSource::new([User::sample("1")]));
    let other = fetcher.clone();

    let (a, b) = tokio::join!(fetcher.get("1", &()), other.get("1", &()));

    assert_eq!(source.calls(), 1);
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test(start_paused = true)]
async fn separate_bindings_do_not_coalesce() {
    let store = Arc::new(FaultyStore::new());
    let source = Arc::new(UserSource::new([User::sample("1")]).with_delay(DELAY));
    let aside = CacheAside::new(JsonCodec, store, "user").unwrap();
    let first: Fetcher<User> = aside.fetch(source.clone(), user_key);
    let second: Fetcher<User> = aside.fetch(source.clone(), user_key);

    let (a, b) = tokio::join!(first.get("1", &()), second.get("1", &()));

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn source_failure_is_shared_by_every_waiter() {
    let (store, source, fetcher) = setup(UserSource::new([User::sample("1")]));
    source.fail_with("db unavailable");

    let results = join_all((0..5).map(|_| fetcher.get("1", &()))).await;

    assert_eq!(source.calls(), 1);
    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, CacheAsideError::SourceFetch(_)));
        assert!(err.to_string().contains("db unavailable"));
    }
    assert!(store.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn completed_flights_are_not_reused() {
    let (_store, source, fetcher) = setup(UserSource::new([User::sample("1")]));
    source.fail_with("transient");

    assert!(fetcher.get("1", &()).await.is_err());

    source.recover();
    assert_eq!(fetcher.get("1", &()).await.unwrap(), Some(User::sample("1")));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_leader_hands_over_to_a_waiter() {
    let (_store, source, fetcher) = setup(UserSource::new([User::sample("1")]));

    let leader = tokio::time::timeout(DELAY / 2, fetcher.get("1", &()));
    let (abandoned, waited) = tokio::join!(leader, fetcher.get("1", &()));

    assert!(abandoned.is_err());
    assert_eq!(waited.unwrap(), Some(User::sample("1")));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_tasks_share_one_source_call() {
    init_test_tracing();
    let store = Arc::new(FaultyStore::new());
    let source = Arc::new(
        UserSource::new([User::sample("1"), User::sample("2")])
            .with_delay(Duration::from_millis(200)),
    );
    let fetcher: Fetcher<User> =
        CacheAside::new(JsonCodec, store, "user").unwrap().fetch(source.clone(), user_key);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.mget(&["1", "2"], &()).await })
        })
        .collect();

    for task in join_all(tasks).await {
        assert_eq!(
            task.unwrap().unwrap(),
            vec![Some(User::sample("1")), Some(User::sample("2"))]
        );
    }
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn keys_containing_commas_do_not_share_a_flight() {
    let (store, source, fetcher) = setup(UserSource::new([
        User::sample("a"),
        User::sample("b"),
        User::sample("a,b"),
    ]));

    let (joined, split) = tokio::join!(
        fetcher.mget(&["a,b"], &()),
        fetcher.mget(&["a", "b"], &())
    );

    assert_eq!(source.calls(), 2);
    assert_eq!(joined.unwrap(), vec![Some(User::sample("a,b"))]);
    assert_eq!(split.unwrap(), vec![Some(User::sample("a")), Some(User::sample("b"))]);
    assert_ne!(store.inner().peek("user$a"), Some(Vec::new()));
    assert!(store.inner().peek("user$a,b").is_some_and(|v| !v.is_empty()));
}
