use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One-shot task that runs a callback after a delay.
///
/// Dropping or disarming the timer aborts the task if it has not fired yet.
#[derive(Debug)]
pub(crate) struct DeadlineTimer {
    handle: Option<JoinHandle<()>>,
}

impl DeadlineTimer {
    pub(crate) fn arm<F>(runtime: &Handle, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the pending callback.
    pub(crate) fn disarm(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting; used from inside the callback itself.
    pub(crate) fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&fired);
        (fired, move || inner.store(true, Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (fired, cb) = flag();
        let _timer = DeadlineTimer::arm(&Handle::current(), Duration::from_secs(30), cb);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_and_drop_cancel() {
        let (disarmed, cb) = flag();
        DeadlineTimer::arm(&Handle::current(), Duration::from_secs(5), cb).disarm();

        let (dropped, cb) = flag();
        drop(DeadlineTimer::arm(&Handle::current(), Duration::from_secs(5), cb));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!disarmed.load(Ordering::SeqCst));
        assert!(!dropped.load(Ordering::SeqCst));
    }
}
