//! Debounced dispatch.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

/// Runs an action once a burst of triggers has gone quiet.
///
/// Every trigger restarts the quiet window. Runs never overlap: triggers that
/// arrive while the action is running are folded into a single follow-up
/// run. Dropping the debouncer stops the dispatcher after any in-flight run.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Spawn the dispatcher on the current runtime.
    pub fn spawn<F, Fut>(window: Duration, action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(rx, window, action));
        Self { tx }
    }

    /// Record an event.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

async fn dispatch<F, Fut>(mut rx: mpsc::UnboundedReceiver<()>, window: Duration, mut action: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while rx.recv().await.is_some() {
        loop {
            match timeout(window, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        action().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counting(window: Duration, run_time: Duration) -> (Debouncer, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let debouncer = Debouncer::spawn(window, {
            let runs = runs.clone();
            let max_active = max_active.clone();
            move || {
                let runs = runs.clone();
                let active = active.clone();
                let max_active = max_active.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    sleep(run_time).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        (debouncer, runs, max_active)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_triggers_run_once() {
        let (debouncer, runs, _) = counting(Duration::from_millis(100), Duration::ZERO);

        debouncer.trigger();
        sleep(Duration::from_millis(30)).await;
        debouncer.trigger();
        sleep(Duration::from_millis(30)).await;
        debouncer.trigger();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_triggers_run_separately() {
        let (debouncer, runs, _) = counting(Duration::from_millis(100), Duration::ZERO);

        debouncer.trigger();
        sleep(Duration::from_millis(300)).await;
        debouncer.trigger();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_a_run_queue_one_follow_up() {
        let (debouncer, runs, max_active) =
            counting(Duration::from_millis(100), Duration::from_millis(500));

        debouncer.trigger();
        // The run starts at 100ms and lasts until 600ms.
        sleep(Duration::from_millis(200)).await;
        debouncer.trigger();
        debouncer.trigger();
        debouncer.trigger();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_without_triggers() {
        let (_debouncer, runs, _) = counting(Duration::from_millis(100), Duration::ZERO);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
