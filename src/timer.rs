use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Single-shot countdown. Starting always cancels the previous run, stopping
/// is idempotent, and the callback runs at most once per start.
#[derive(Debug)]
pub struct CountdownTimer {
    label: String,
    slot: Arc<Mutex<TimerSlot>>,
}

fn lock(slot: &Mutex<TimerSlot>) -> MutexGuard<'_, TimerSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CountdownTimer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    pub fn start<F, Fut>(&self, after: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let label = self.label.clone();

        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            {
                // Claim the firing: a later start or stop bumped the
                // generation, or detaching the handle here means a stop issued
                // from inside the callback cannot abort it.
                let mut slot = lock(&shared);
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            debug!(timer = %label, "fired");
            on_fire().await;
        }));
    }

    /// Returns whether a pending run was cancelled.
    pub fn stop(&self) -> bool {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.slot).handle.is_some()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(hits: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let hits = Arc::clone(hits);
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let timer = CountdownTimer::new("turn");
        let hits = counter();
        timer.start(Duration::from_secs(30), bump(&hits));
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_previous_run() {
        let timer = CountdownTimer::new("turn");
        let first = counter();
        let second = counter();
        timer.start(Duration::from_secs(10), bump(&first));
        timer.start(Duration::from_secs(20), bump(&second));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let timer = CountdownTimer::new("grace");
        let hits = counter();
        timer.start(Duration::from_secs(5), bump(&hits));
        assert!(timer.stop());
        assert!(!timer.stop());
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_may_stop_its_own_timer() {
        let timer = Arc::new(CountdownTimer::new("game"));
        let hits = counter();
        let inner_timer = Arc::clone(&timer);
        let inner_hits = Arc::clone(&hits);
        timer.start(Duration::from_secs(1), move || async move {
            inner_timer.stop();
            tokio::task::yield_now().await;
            inner_hits.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let hits = counter();
        {
            let timer = CountdownTimer::new("grace");
            timer.start(Duration::from_secs(1), bump(&hits));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
