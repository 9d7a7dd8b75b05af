//! Panic containment for closures supplied by plugin code.
//!
//! Predicates, patch hooks, event handlers and mount bodies all run against a
//! host whose shape is not guaranteed. A panic in any of them must degrade the
//! one feature it belongs to, so every call site funnels through these helpers
//! instead of repeating `catch_unwind` boilerplate.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::error::MountError;

/// Extract a human-readable message from a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run a synchronous closure, converting a panic into [`MountError::Panicked`].
pub fn guard<T>(op: &str, f: impl FnOnce() -> T) -> Result<T, MountError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let msg = panic_message(payload);
        tracing::error!(op = %op, "panic contained: {msg}");
        MountError::Panicked(format!("{op}: {msg}"))
    })
}

/// Run a synchronous closure, returning `default` if it panics.
pub fn guard_with_default<T>(op: &str, default: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(val) => val,
        Err(payload) => {
            let msg = panic_message(payload);
            tracing::warn!(op = %op, "panic contained, using default: {msg}");
            default
        }
    }
}

/// Await a fallible future, folding a panic into [`MountError::Panicked`].
pub async fn guard_async<T, F>(op: &str, fut: F) -> Result<T, MountError>
where
    F: Future<Output = Result<T, MountError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload);
            tracing::error!(op = %op, "panic contained: {msg}");
            Err(MountError::Panicked(format!("{op}: {msg}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_str_and_string() {
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload), "static");

        let payload = std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(payload), "owned");
    }

    #[test]
    fn test_guard_passes_value_through() {
        assert_eq!(guard("ok", || 7).unwrap(), 7);
    }

    #[test]
    fn test_guard_converts_panic() {
        let err = guard("explode", || -> u8 { panic!("kaboom") }).unwrap_err();
        assert!(matches!(err, MountError::Panicked(ref m) if m.contains("kaboom")));
    }

    #[test]
    fn test_guard_with_default() {
        let v = guard_with_default("fallback", false, || -> bool { panic!("nope") });
        assert!(!v);
    }

    #[tokio::test]
    async fn test_guard_async_converts_panic() {
        let err = guard_async("async", async {
            if true {
                panic!("async boom");
            }
            Ok::<_, MountError>(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("async boom"));
    }

    #[tokio::test]
    async fn test_guard_async_keeps_error() {
        let err = guard_async("async", async {
            Err::<(), _>(MountError::LocatorMiss("x".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MountError::LocatorMiss(_)));
    }
}
