//! Leading-edge throttle with a trailing coalesced call

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

struct ThrottleInner<T> {
    window_started: Option<Instant>,
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
}

/// Rate-limits calls to `f`
///
/// The first call in a window fires synchronously. Calls arriving inside
/// an active window are coalesced into one trailing call carrying the
/// last argument, fired when the window elapses. [`Throttle::cancel`]
/// drops a pending trailing call.
pub struct Throttle<T: Send + 'static> {
    window: Duration,
    f: Arc<dyn Fn(T) + Send + Sync>,
    inner: Arc<Mutex<ThrottleInner<T>>>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new(window: Duration, f: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            window,
            f: Arc::new(f),
            inner: Arc::new(Mutex::new(ThrottleInner {
                window_started: None,
                pending: None,
                timer: None,
            })),
        }
    }

    /// Invoke now (leading edge) or coalesce into the trailing call
    ///
    /// Must be called from within a tokio runtime.
    pub fn call(&self, args: T) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("throttle lock poisoned");

        let window_open = inner
            .window_started
            .is_some_and(|started| now.duration_since(started) < self.window);

        if !window_open {
            inner.window_started = Some(now);
            drop(inner);
            (self.f)(args);
            return;
        }

        // Inside an active window: keep only the newest arguments
        inner.pending = Some(args);
        if inner.timer.is_none() {
            let elapsed = now.duration_since(inner.window_started.unwrap_or(now));
            let remaining = self.window.saturating_sub(elapsed);
            let handle_inner = Arc::clone(&self.inner);
            let f = Arc::clone(&self.f);
            debug!(remaining_ms = remaining.as_millis() as u64, "Throttle: scheduling trailing call");
            inner.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                let args = {
                    let mut inner = handle_inner.lock().expect("throttle lock poisoned");
                    inner.timer = None;
                    let args = inner.pending.take();
                    if args.is_some() {
                        inner.window_started = Some(Instant::now());
                    }
                    args
                };
                if let Some(args) = args {
                    f(args);
                }
            }));
        }
    }

    /// Drop any pending trailing call
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().expect("throttle lock poisoned");
        inner.pending = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: u32| sink.lock().unwrap().push(v))
    }

    #[tokio::test]
    async fn test_leading_call_fires_synchronously() {
        let (seen, record) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), record);

        throttle.call(1);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_window_calls_coalesce_into_trailing() {
        let (seen, record) = recorder();
        let throttle = Throttle::new(Duration::from_millis(60), record);

        throttle.call(1);
        throttle.call(2);
        throttle.call(3);

        // Only the leading call has fired so far
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Trailing call carries the last argument set
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_new_window_after_elapse() {
        let (seen, record) = recorder();
        let throttle = Throttle::new(Duration::from_millis(40), record);

        throttle.call(1);
        tokio::time::sleep(Duration::from_millis(70)).await;
        throttle.call(2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_drops_trailing() {
        let (seen, record) = recorder();
        let throttle = Throttle::new(Duration::from_millis(50), record);

        throttle.call(1);
        throttle.call(2);
        throttle.cancel();

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}
