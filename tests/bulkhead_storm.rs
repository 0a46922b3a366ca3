//! Load tests: many concurrent callers against small bulkheads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use call_governor::config::GovernorConfig;
use call_governor::governor::DependencyRegistry;
use call_governor::lifecycle::Shutdown;
use call_governor::{CallOptions, GovernorError, GovernorResult};

mod common;

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_capacity() {
    let registry = DependencyRegistry::new();
    let dep = registry.register("model", common::small_dependency(3));

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..20 {
        let dep = dep.clone();
        let active = active.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            dep.call(CallOptions::new(), move |_| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, GovernorError>(i)
                }
            })
            .await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
        completed += 1;
    }

    assert_eq!(completed, 20);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(dep.bulkhead().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_storm_beyond_queue_wait_is_rejected_not_failed() {
    let registry = DependencyRegistry::new();
    let mut config = common::small_dependency(2);
    config.queue_timeout_ms = 50;
    let dep = registry.register("page_fetch", config);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let dep = dep.clone();
        handles.push(tokio::spawn(async move {
            dep.call(CallOptions::new(), |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, GovernorError>(())
            })
            .await
        }));
    }

    let mut ok = 0;
    let mut queue_timeouts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(GovernorError::QueueTimeout { .. }) => queue_timeouts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, 2);
    assert_eq!(queue_timeouts, 8);
    // Queue rejections say nothing about the dependency's health
    assert_eq!(dep.breaker().failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_running_and_rejects_queued() {
    let mut config = GovernorConfig::default();
    config.dependencies.clear();
    config.dependencies.insert("model".into(), common::small_dependency(1));
    let registry = Arc::new(DependencyRegistry::from_config(&config));
    let shutdown = Shutdown::with_registry(registry.clone());
    let dep = registry.get("model").unwrap();

    let spawn_call = || {
        let dep = dep.clone();
        let signal = shutdown.subscribe();
        tokio::spawn(async move {
            let result: GovernorResult<()> = dep
                .call(CallOptions::new().signal(&signal), |_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .await;
            result
        })
    };

    let running = spawn_call();
    tokio::task::yield_now().await;
    let queued = spawn_call();
    tokio::task::yield_now().await;
    assert_eq!(dep.bulkhead().in_flight(), 1);

    shutdown.trigger();

    assert_eq!(running.await.unwrap(), Err(GovernorError::Aborted));
    let queued = queued.await.unwrap();
    assert!(matches!(
        queued,
        Err(GovernorError::BulkheadClosed { .. }) | Err(GovernorError::Aborted)
    ));
    assert_eq!(dep.breaker().failure_count(), 0);
}
