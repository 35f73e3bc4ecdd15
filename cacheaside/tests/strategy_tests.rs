use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cacheaside::{
    CacheAside, CacheAsideConfig, CacheAsideError, CacheStore, ErrorEvent, Fetcher, JsonCodec,
    Stage, Strategy, WriteErrorAction,
};
use cacheaside_core::Entry;
use cacheaside_test_utils::{init_test_tracing, user_key, FaultyStore, User, UserSource};

fn fixture(strategy: Strategy) -> (Arc<FaultyStore>, Arc<UserSource>, CacheAside<JsonCodec>) {
    init_test_tracing();
    let store = Arc::new(FaultyStore::new());
    let source = Arc::new(UserSource::new([User::sample("1"), User::sample("2")]));
    let aside = CacheAside::builder(JsonCodec)
        .namespace("user")
        .store(store.clone())
        .strategy(strategy)
        .build()
        .unwrap();
    (store, source, aside)
}

#[tokio::test]
async fn only_use_cache_never_consults_the_source() {
    let (store, source, aside) = fixture(Strategy::OnlyUseCache);
    let payload = serde_json::to_vec(&User::sample("1")).unwrap();
    store
        .inner()
        .mset(None, &[Entry::new("user$1", &payload)])
        .await
        .unwrap();
    let fetcher: Fetcher<User> = aside.fetch(source.clone(), user_key);

    let got = fetcher.mget(&["1", "2"], &()).await.unwrap();

    assert_eq!(got, vec![Some(User::sample("1")), None]);
    assert_eq!(source.calls(), 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn read_failure_is_fatal_unless_failing_back() {
    for strategy in [Strategy::FirstUseCache, Strategy::OnlyUseCache] {
        let (store, source, aside) = fixture(strategy);
        store.set_fail_reads(true);
        let fetcher: Fetcher<User> = aside.fetch(source.clone(), user_key);

        let err = fetcher.get("1", &()).await.unwrap_err();

        assert_eq!(err.stage(), Stage::CacheRead, "strategy {strategy}");
        assert!(err.is_cache_error());
        assert_eq!(source.calls(), 0);
    }
}

#[tokio::test]
async fn fail_back_treats_read_failure_as_full_miss() {
    let (store, source, aside) = fixture(Strategy::FailBackToSource);
    store.set_fail_reads(true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    let fetcher: Fetcher<User, u32> = aside.fetch_with(source.clone(), user_key, |options| {
        options.with_read_error_observer(move |event: &ErrorEvent<'_, u32>| {
            assert_eq!(event.error.stage(), Stage::CacheRead);
            assert_eq!(event.hash_key, None);
            observed
                .lock()
                .unwrap()
                .push((event.keys.to_vec(), *event.args));
        })
    });

    let got = fetcher.mget(&["2", "1"], &42).await.unwrap();

    assert_eq!(got, vec![Some(User::sample("2")), Some(User::sample("1"))]);
    assert_eq!(source.requests(), vec![vec!["1".to_string(), "2".to_string()]]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(vec!["2".to_string(), "1".to_string()], 42)]
    );
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn fail_back_swallows_write_failure() {
    let (store, source, aside) = fixture(Strategy::FailBackToSource);
    store.set_fail_writes(true);
    let fetcher: Fetcher<User> = aside.fetch(source.clone(), user_key);

    let got = fetcher.get("1", &()).await.unwrap();

    assert_eq!(got, Some(User::sample("1")));
    assert_eq!(store.writes().len(), 1);
    assert!(store.inner().peek("user$1").is_none());
}

#[tokio::test]
async fn first_use_cache_propagates_write_failure() {
    let (store, source, aside) = fixture(Strategy::FirstUseCache);
    store.set_fail_writes(true);
    let fetcher: Fetcher<User> = aside.fetch(source.clone(), user_key);

    let err = fetcher.get("1", &()).await.unwrap_err();

    assert!(matches!(err, CacheAsideError::CacheWrite(_)));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn write_observer_overrides_the_strategy() {
    let (store, source, aside) = fixture(Strategy::FirstUseCache);
    store.set_fail_writes(true);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let lenient: Fetcher<User> = aside.fetch_with(source.clone(), user_key, |options| {
        options.with_write_error_observer(move |event: &ErrorEvent<'_, ()>| {
            assert_eq!(event.error.stage(), Stage::CacheWrite);
            counter.fetch_add(1, Ordering::SeqCst);
            WriteErrorAction::Swallow
        })
    });
    assert_eq!(lenient.get("1", &()).await.unwrap(), Some(User::sample("1")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let strict: Fetcher<User> = aside.fetch_with(source.clone(), user_key, |options| {
        options
            .with_strategy(Strategy::FailBackToSource)
            .with_write_error_observer(|_: &ErrorEvent<'_, ()>| WriteErrorAction::Propagate)
    });
    let err = strict.get("2", &()).await.unwrap_err();
    assert!(matches!(err, CacheAsideError::CacheWrite(_)));
}

#[tokio::test]
async fn read_observer_is_silent_when_the_read_is_fatal() {
    let (store, source, aside) = fixture(Strategy::FirstUseCache);
    store.set_fail_reads(true);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetcher: Fetcher<User> = aside.fetch_with(source, user_key, |options| {
        options.with_read_error_observer(move |_: &ErrorEvent<'_, ()>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });

    assert!(fetcher.get("1", &()).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn source_errors_are_never_downgraded() {
    let (_store, source, aside) = fixture(Strategy::FailBackToSource);
    source.fail_with("timeout");
    let fetcher: Fetcher<User> = aside.fetch(source.clone(), user_key);

    let err = fetcher.get("1", &()).await.unwrap_err();

    assert_eq!(err.stage(), Stage::SourceFetch);
    assert!(!err.is_cache_error());
}

#[tokio::test]
async fn config_seeds_strategy_and_ttl() {
    let store = Arc::new(FaultyStore::new());
    let config = CacheAsideConfig::new("acct")
        .with_ttl_secs(90)
        .with_strategy(Strategy::FailBackToSource);
    let aside = CacheAside::from_config(JsonCodec, &config)
        .store(store.clone())
        .build()
        .unwrap();
    let source = Arc::new(UserSource::new([User::sample("1")]));
    let fetcher: Fetcher<User> = aside.fetch(source, user_key);

    store.set_fail_reads(true);
    assert_eq!(fetcher.get("1", &()).await.unwrap(), Some(User::sample("1")));

    let writes = store.writes();
    assert_eq!(writes[0].ttl, Some(std::time::Duration::from_secs(90)));
    assert!(writes[0].get("acct$1").is_some());
}

#[tokio::test]
async fn zero_ttl_config_leaves_expiry_to_the_store() {
    let store = Arc::new(FaultyStore::new());
    let config = CacheAsideConfig::new("acct").with_ttl_secs(0);
    let aside = CacheAside::from_config(JsonCodec, &config)
        .store(store.clone())
        .build()
        .unwrap();
    let source = Arc::new(UserSource::new([User::sample("1")]));
    let fetcher: Fetcher<User> = aside.fetch(source, user_key);

    fetcher.get("1", &()).await.unwrap();

    assert_eq!(store.writes()[0].ttl, None);
}
