//! Periodic job runner shared by the caches, the controller, and the
//! scheduling loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type BoxedJob = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Runs registered jobs on fixed periods.
///
/// Each job is driven by its own interval: an invocation is awaited to
/// completion before the next tick is observed, and ticks that elapse while
/// an invocation is still running are silently dropped. Jobs must be
/// registered before `start`.
pub struct CronRunner {
    jobs: Vec<(Duration, BoxedJob)>,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl Default for CronRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CronRunner {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            token: CancellationToken::new(),
            handles: Vec::new(),
            started: false,
        }
    }

    pub fn register<F, Fut>(&mut self, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: BoxedJob = Arc::new(move || {
            let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(job());
            fut
        });
        self.jobs.push((period, job));
    }

    /// Spawn one driver task per registered job. Calling `start` again is a
    /// no-op.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        for (period, job) in &self.jobs {
            let period = *period;
            let job = job.clone();
            let token = self.token.clone();
            self.handles.push(tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut interval = tokio::time::interval_at(start, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => job().await,
                    }
                }
            }));
        }
    }

    /// Stop ticking and wait for every in-flight invocation to return.
    pub async fn stop(&mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}
