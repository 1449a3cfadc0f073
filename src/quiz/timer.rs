use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// How long the user gets for each question unless overridden.
pub const QUESTION_TIME_SECS: u32 = 60;

/// Timer callbacks are boxed futures so they can send Telegram requests.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A one-question countdown. `on_tick` runs immediately with the full
/// duration and then once per second down to zero; `on_expire` runs exactly
/// once when zero is reached, and never after `cancel()`. Dropping the
/// timer cancels it, so replacing one countdown with another implicitly
/// cancels the old one.
pub struct QuestionTimer {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl QuestionTimer {
    pub fn start<Tick, Expire>(duration_secs: u32, on_tick: Tick, on_expire: Expire) -> Self
    where
        Tick: Fn(u32) -> TimerFuture + Send + 'static,
        Expire: FnOnce() -> TimerFuture + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = tokio::spawn(async move {
            // The full duration is reported right away so the countdown is
            // visible before the first second has passed.
            on_tick(duration_secs).await;

            let mut remaining = duration_secs;
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first interval tick completes immediately.
            interval.tick().await;
            while remaining > 0 {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                remaining -= 1;
                on_tick(remaining).await;
            }
            if !flag.load(Ordering::SeqCst) {
                on_expire().await;
            }
        });
        Self { cancelled, task }
    }

    /// Stops the countdown. Idempotent; calling it on a timer that already
    /// expired is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn tick_recorder(into: Arc<Mutex<Vec<u32>>>) -> impl Fn(u32) -> TimerFuture + Send + 'static {
        move |remaining: u32| -> TimerFuture {
            let into = into.clone();
            Box::pin(async move {
                into.lock().unwrap().push(remaining);
            })
        }
    }

    fn expiry_counter(count: Arc<AtomicUsize>) -> impl FnOnce() -> TimerFuture + Send + 'static {
        move || -> TimerFuture {
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_expires_exactly_once() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let expirations = Arc::new(AtomicUsize::new(0));
        let _timer = QuestionTimer::start(
            3,
            tick_recorder(ticks.clone()),
            expiry_counter(expirations.clone()),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*ticks.lock().unwrap(), vec![3, 2, 1, 0]);
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_the_expiry_callback() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let expirations = Arc::new(AtomicUsize::new(0));
        let timer = QuestionTimer::start(
            5,
            tick_recorder(ticks.clone()),
            expiry_counter(expirations.clone()),
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.cancel();
        timer.cancel(); // cancelling twice is fine

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*ticks.lock().unwrap(), vec![5, 4]);
        assert_eq!(expirations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_timer_cancels_it() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let expirations = Arc::new(AtomicUsize::new(0));
        let timer = QuestionTimer::start(
            2,
            tick_recorder(ticks.clone()),
            expiry_counter(expirations.clone()),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(timer);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(*ticks.lock().unwrap(), vec![2]);
        assert_eq!(expirations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_zero_length_countdown_expires_immediately() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let expirations = Arc::new(AtomicUsize::new(0));
        let _timer = QuestionTimer::start(
            0,
            tick_recorder(ticks.clone()),
            expiry_counter(expirations.clone()),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*ticks.lock().unwrap(), vec![0]);
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }
}
