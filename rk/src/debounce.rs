//! Trailing-edge debounce with cancel and flush

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

struct DebounceInner<T> {
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Delays calls to `f` until the caller goes quiet
///
/// Each call resets the timer; `f` fires once, `delay` after the last
/// call, with that call's arguments. [`Debounce::flush`] fires
/// immediately with the pending arguments; [`Debounce::cancel`] drops
/// them.
pub struct Debounce<T: Send + 'static> {
    delay: Duration,
    f: Arc<dyn Fn(T) + Send + Sync>,
    inner: Arc<Mutex<DebounceInner<T>>>,
}

impl<T: Send + 'static> Debounce<T> {
    pub fn new(delay: Duration, f: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            f: Arc::new(f),
            inner: Arc::new(Mutex::new(DebounceInner {
                pending: None,
                timer: None,
                generation: 0,
            })),
        }
    }

    /// Record `args` and (re)start the quiet-period timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn call(&self, args: T) {
        let mut inner = self.inner.lock().expect("debounce lock poisoned");
        inner.pending = Some(args);
        inner.generation += 1;
        let generation = inner.generation;

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }

        let handle_inner = Arc::clone(&self.inner);
        let f = Arc::clone(&self.f);
        let delay = self.delay;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let args = {
                let mut inner = handle_inner.lock().expect("debounce lock poisoned");
                // A newer call superseded this timer while it slept
                if inner.generation != generation {
                    return;
                }
                inner.timer = None;
                inner.pending.take()
            };
            if let Some(args) = args {
                f(args);
            }
        }));
    }

    /// Fire immediately with the pending arguments, if any
    pub fn flush(&self) {
        let args = {
            let mut inner = self.inner.lock().expect("debounce lock poisoned");
            inner.generation += 1;
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.pending.take()
        };
        if let Some(args) = args {
            (self.f)(args);
        }
    }

    /// Drop the pending invocation
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().expect("debounce lock poisoned");
        inner.generation += 1;
        inner.pending = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}
