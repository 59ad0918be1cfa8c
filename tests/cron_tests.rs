use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tes_scheduler::cron::CronRunner;

#[tokio::test]
async fn test_jobs_tick_on_their_period() {
    let count = Arc::new(AtomicUsize::new(0));
    let job_count = count.clone();

    let mut cron = CronRunner::new();
    cron.register(Duration::from_millis(50), move || {
        let count = job_count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });
    cron.start();

    tokio::time::sleep(Duration::from_millis(180)).await;
    cron.stop().await;

    let ticks = count.load(Ordering::SeqCst);
    assert!((2..=4).contains(&ticks), "expected 2..=4 ticks, got {ticks}");
}

#[tokio::test]
async fn test_overlapping_ticks_are_dropped() {
    let count = Arc::new(AtomicUsize::new(0));
    let job_count = count.clone();

    let mut cron = CronRunner::new();
    // Each invocation outlasts two periods; the missed ticks must be
    // silently dropped, not queued up.
    cron.register(Duration::from_millis(40), move || {
        let count = job_count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });
    cron.start();

    tokio::time::sleep(Duration::from_millis(400)).await;
    cron.stop().await;

    let ticks = count.load(Ordering::SeqCst);
    assert!(ticks <= 4, "expected at most 4 invocations, got {ticks}");
    assert!(ticks >= 2, "expected at least 2 invocations, got {ticks}");
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_job() {
    let finished = Arc::new(AtomicBool::new(false));
    let job_finished = finished.clone();

    let mut cron = CronRunner::new();
    cron.register(Duration::from_millis(20), move || {
        let finished = job_finished.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            finished.store(true, Ordering::SeqCst);
        }
    });
    cron.start();

    // Let the first invocation begin, then stop mid-flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cron.stop().await;

    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let count = Arc::new(AtomicUsize::new(0));
    let job_count = count.clone();

    let mut cron = CronRunner::new();
    cron.register(Duration::from_millis(40), move || {
        let count = job_count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });
    cron.start();
    cron.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    cron.stop().await;

    // A duplicated start must not double-drive the job.
    let ticks = count.load(Ordering::SeqCst);
    assert!((1..=3).contains(&ticks), "expected 1..=3 ticks, got {ticks}");
}
