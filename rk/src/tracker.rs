//! In-flight request coalescing
//!
//! Concurrent requests carrying the same logical key share a single
//! underlying execution: the first caller starts it, later callers await
//! the same shared future, and every caller observes the identical outcome
//! (success or failure). The entry leaves the in-flight map before any
//! caller resolves, so a follow-up request under the same key starts
//! fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

type SharedOutcome = Result<serde_json::Value, Arc<str>>;
type InFlight = Shared<BoxFuture<'static, SharedOutcome>>;

/// Errors surfaced to callers of [`RequestTracker::track_request`]
#[derive(Debug, Error)]
pub enum TrackError {
    /// The shared underlying request failed; all coalesced callers see
    /// the same message
    #[error("{0}")]
    Upstream(String),

    /// The shared result could not be converted to the requested type
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Deduplicates concurrent requests by logical key
pub struct RequestTracker {
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of requests currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().expect("tracker lock poisoned").len()
    }

    /// Run `f` under `key`, or join the execution already in flight
    ///
    /// For N concurrent callers with an identical key, `f` runs exactly
    /// once and all N receive the same resolved value or the same error.
    pub async fn track_request<T, E, F, Fut>(&self, key: &str, f: F) -> Result<T, TrackError>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut map = self.in_flight.lock().expect("tracker lock poisoned");
            if let Some(existing) = map.get(key) {
                debug!(%key, "RequestTracker: joining in-flight request");
                existing.clone()
            } else {
                let map_handle = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();
                let inner = f();
                let fut: InFlight = async move {
                    let outcome = match inner.await {
                        Ok(value) => {
                            serde_json::to_value(&value).map_err(|e| Arc::<str>::from(e.to_string().as_str()))
                        }
                        Err(e) => Err(Arc::<str>::from(e.to_string().as_str())),
                    };
                    // Settle the map entry before any caller resolves
                    map_handle.lock().expect("tracker lock poisoned").remove(&owned_key);
                    outcome
                }
                .boxed()
                .shared();
                map.insert(key.to_string(), fut.clone());
                fut
            }
        };

        match shared.await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(message) => Err(TrackError::Upstream(message.to_string())),
        }
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let tracker = Arc::new(RequestTracker::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = tracker.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .track_request("fetch:plan-1", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, String>("plan-1".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result.unwrap(), "plan-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_shared_by_all_callers() {
        let tracker = Arc::new(RequestTracker::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = tracker.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .track_request("fetch:bad", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<String, _>("backend unavailable".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.to_string(), "backend unavailable");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let tracker = RequestTracker::new();
        let calls = Arc::new(AtomicU32::new(0));

        let c1 = calls.clone();
        let a: Result<u32, _> = tracker
            .track_request("key-a", move || async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            })
            .await;

        let c2 = calls.clone();
        let b: Result<u32, _> = tracker
            .track_request("key-b", move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(2)
            })
            .await;

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_reusable_after_settle() {
        let tracker = RequestTracker::new();
        let calls = Arc::new(AtomicU32::new(0));

        for expected in 1..=2u32 {
            let calls = calls.clone();
            let got: u32 = tracker
                .track_request("refetch", move || async move {
                    Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .await
                .unwrap();
            assert_eq!(got, expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
