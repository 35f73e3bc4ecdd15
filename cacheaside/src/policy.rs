//! Degraded-cache policy for cache read and write failures.

use cacheaside_core::{CacheAsideError, CacheAsideResult, StoreError};

use crate::options::{ErrorEvent, FetchOptions, WriteErrorAction};

/// Where a failed store call came from, for observers and logs.
pub(crate) struct CallSite<'a, A> {
    pub namespace: &'a str,
    pub hash_key: Option<&'a str>,
    pub keys: &'a [String],
    pub args: &'a A,
}

impl<'a, A> CallSite<'a, A> {
    fn event(&self, error: &'a CacheAsideError) -> ErrorEvent<'a, A> {
        ErrorEvent {
            error,
            hash_key: self.hash_key,
            keys: self.keys,
            args: self.args,
        }
    }
}

/// A failed cache read either aborts the call or, under fail-back, is
/// reported and treated as a full miss.
pub(crate) fn on_read_error<A>(
    options: &FetchOptions<A>,
    site: &CallSite<'_, A>,
    err: StoreError,
) -> CacheAsideResult<()> {
    let error = CacheAsideError::CacheRead(err);
    if !options.strategy.tolerates_cache_errors() {
        return Err(error);
    }

    tracing::warn!(
        namespace = site.namespace,
        hash_key = site.hash_key,
        keys = site.keys.len(),
        error = %error,
        "cache read failed, falling back to source"
    );
    if let Some(observer) = &options.on_read_error {
        observer(&site.event(&error));
    }
    Ok(())
}

/// A failed cache write is decided by the write observer when one is set,
/// otherwise by the strategy.
pub(crate) fn on_write_error<A>(
    options: &FetchOptions<A>,
    site: &CallSite<'_, A>,
    err: StoreError,
) -> CacheAsideResult<()> {
    let error = CacheAsideError::CacheWrite(err);
    let action = match &options.on_write_error {
        Some(observer) => observer(&site.event(&error)),
        None if options.strategy.tolerates_cache_errors() => WriteErrorAction::Swallow,
        None => WriteErrorAction::Propagate,
    };

    match action {
        WriteErrorAction::Swallow => {
            tracing::warn!(
                namespace = site.namespace,
                hash_key = site.hash_key,
                keys = site.keys.len(),
                error = %error,
                "cache write failed, serving fetched values"
            );
            Ok(())
        }
        WriteErrorAction::Propagate => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacheaside_core::Strategy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn site<'a>(keys: &'a [String], args: &'a u32) -> CallSite<'a, u32> {
        CallSite {
            namespace: "user",
            hash_key: None,
            keys,
            args,
        }
    }

    fn store_err() -> StoreError {
        StoreError::command("MGET", "connection reset")
    }

    #[test]
    fn test_read_error_fatal_by_default() {
        let options = FetchOptions::<u32>::default();
        let err = on_read_error(&options, &site(&[], &0), store_err()).unwrap_err();
        assert!(matches!(err, CacheAsideError::CacheRead(_)));
    }

    #[test]
    fn test_read_error_fatal_under_only_use_cache() {
        let options = FetchOptions::<u32>::default().with_strategy(Strategy::OnlyUseCache);
        assert!(on_read_error(&options, &site(&[], &0), store_err()).is_err());
    }

    #[test]
    fn test_read_error_swallowed_and_observed_under_fail_back() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let options = FetchOptions::<u32>::default()
            .with_strategy(Strategy::FailBackToSource)
            .with_read_error_observer(move |event| {
                assert_eq!(event.keys.len(), 2);
                assert_eq!(*event.args, 42);
                assert!(matches!(event.error, CacheAsideError::CacheRead(_)));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let keys = vec!["1".to_string(), "2".to_string()];

        on_read_error(&options, &site(&keys, &42), store_err()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_observer_not_called_when_error_is_fatal() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let options = FetchOptions::<u32>::default().with_read_error_observer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(on_read_error(&options, &site(&[], &0), store_err()).is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_write_error_without_observer_follows_strategy() {
        let fatal = FetchOptions::<u32>::default();
        let err = on_write_error(&fatal, &site(&[], &0), store_err()).unwrap_err();
        assert!(matches!(err, CacheAsideError::CacheWrite(_)));

        let tolerant = FetchOptions::<u32>::default().with_strategy(Strategy::FailBackToSource);
        assert!(on_write_error(&tolerant, &site(&[], &0), store_err()).is_ok());
    }

    #[test]
    fn test_write_observer_decides() {
        let swallow = FetchOptions::<u32>::default()
            .with_write_error_observer(|_| WriteErrorAction::Swallow);
        assert!(on_write_error(&swallow, &site(&[], &0), store_err()).is_ok());

        let propagate = FetchOptions::<u32>::default()
            .with_strategy(Strategy::FailBackToSource)
            .with_write_error_observer(|_| WriteErrorAction::Propagate);
        assert!(on_write_error(&propagate, &site(&[], &0), store_err()).is_err());
    }
}
