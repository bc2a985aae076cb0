use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use rendervisor::{
    ConfigError, Event, EventKind, MAX_TIMEOUT, PoolConfig, PoolError, PoolStats, RenderError,
    RenderPool, RenderPoolBuilder, Renderer, WorkerStatus,
};

fn renderer() -> Arc<dyn Renderer> {
    Arc::new(|template: &str, input: &Value| -> Result<Bytes, String> {
        match template {
            "echo" => Ok(Bytes::from(input.to_string())),
            "sleep" => {
                let ms = input["ms"].as_u64().unwrap_or(0);
                std::thread::sleep(Duration::from_millis(ms));
                Ok(Bytes::from_static(b"slept"))
            }
            "fail" => Err("bad input".to_string()),
            "panic" => panic!("renderer exploded"),
            other => Err(format!("unknown template {other}")),
        }
    })
}

fn cfg(workers: usize, queue: usize, timeout_ms: u64) -> PoolConfig {
    PoolConfig {
        worker_count: workers,
        max_queue_size: queue,
        task_timeout: Duration::from_millis(timeout_ms),
        startup_timeout: Duration::from_secs(2),
        ..PoolConfig::default()
    }
}

async fn started(cfg: PoolConfig) -> Arc<RenderPool> {
    let pool = RenderPoolBuilder::new(cfg, renderer())
        .without_log_writer()
        .build();
    pool.initialize().await.unwrap();
    pool
}

/// Polls the published stats until `cond` holds.
async fn wait_stats(pool: &RenderPool, cond: impl Fn(&PoolStats) -> bool) -> PoolStats {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let s = pool.stats();
        if cond(&s) {
            return s;
        }
        assert!(Instant::now() < deadline, "stats never matched: {s:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Reads events until one matches.
async fn wait_event(rx: &mut broadcast::Receiver<Event>, cond: impl Fn(&Event) -> bool) -> Event {
    let fut = async {
        loop {
            match rx.recv().await {
                Ok(ev) if cond(&ev) => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3), fut)
        .await
        .expect("event never arrived")
}

#[tokio::test(flavor = "multi_thread")]
async fn two_units_one_slot_scenario() {
    let pool = started(cfg(2, 1, 50)).await;
    let mut events = pool.events();
    let slow = || json!({"ms": 200});

    let submitted = Instant::now();
    let h1 = pool.submit("sleep", slow()).await.unwrap();
    let h2 = pool.submit("sleep", slow()).await.unwrap();
    let h3 = pool.submit("sleep", slow()).await.unwrap();
    let t3 = h3.id().to_string();

    let rejected = pool.submit("sleep", slow()).await.unwrap_err();
    assert_eq!(rejected, RenderError::QueueFull { capacity: 1 });

    let timeout = Duration::from_millis(50);
    assert_eq!(h1.await, Err(RenderError::Timeout { timeout }));
    assert_eq!(h2.await, Err(RenderError::Timeout { timeout }));
    assert!(submitted.elapsed() < Duration::from_millis(190));

    // Task 3 only ran once a replacement unit came up.
    let assigned = wait_event(&mut events, |e| {
        e.kind == EventKind::TaskAssigned && e.task.as_deref() == Some(t3.as_str())
    })
    .await;
    assert!(assigned.worker.unwrap() > 2);
    assert_eq!(h3.await, Err(RenderError::Timeout { timeout }));

    let stats = wait_stats(&pool, |s| s.idle_workers == 2).await;
    assert_eq!(stats.failed_tasks, 3);
    assert_eq!(stats.queued_tasks, 0);

    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_never_exceeds_capacity_and_stays_fifo() {
    let pool = started(cfg(1, 2, 5_000)).await;
    let mut events = pool.events();

    let h1 = pool.submit("sleep", json!({"ms": 100})).await.unwrap();
    let h2 = pool.submit("echo", json!({"n": 2})).await.unwrap();
    let h3 = pool.submit("echo", json!({"n": 3})).await.unwrap();
    for _ in 0..3 {
        assert!(matches!(
            pool.submit("echo", json!({})).await,
            Err(RenderError::QueueFull { capacity: 2 })
        ));
    }
    let stats = wait_stats(&pool, |s| s.queued_tasks == 2).await;
    assert_eq!(stats.busy_workers, 1);
    assert_eq!(stats.active_tasks, 1);

    let (id2, id3) = (h2.id().to_string(), h3.id().to_string());
    assert_eq!(h1.await.unwrap(), Bytes::from_static(b"slept"));
    assert_eq!(h2.await.unwrap(), Bytes::from_static(br#"{"n":2}"#));
    assert_eq!(h3.await.unwrap(), Bytes::from_static(br#"{"n":3}"#));

    let first = wait_event(&mut events, |e| {
        e.kind == EventKind::TaskAssigned
            && (e.task.as_deref() == Some(id2.as_str()) || e.task.as_deref() == Some(id3.as_str()))
    })
    .await;
    assert_eq!(first.task.as_deref(), Some(id2.as_str()));

    let stats = wait_stats(&pool, |s| s.completed_tasks == 3).await;
    assert!(stats.average_task_duration_ms > 0.0);
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_frees_the_unit_and_restarts_it() {
    let pool = started(cfg(1, 4, 50)).await;

    let started_at = Instant::now();
    let res = pool.render("sleep", json!({"ms": 500})).await;
    assert_eq!(
        res,
        Err(RenderError::Timeout {
            timeout: Duration::from_millis(50)
        })
    );
    assert!(started_at.elapsed() < Duration::from_millis(400));

    let stats = wait_stats(&pool, |s| s.idle_workers == 1).await;
    assert_eq!(stats.busy_workers, 0);
    assert_eq!(stats.active_tasks, 0);
    assert_eq!(stats.failed_tasks, 1);

    let workers = pool.workers().await.unwrap();
    let live: Vec<_> = workers
        .iter()
        .filter(|w| w.status == WorkerStatus::Idle)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, 2);
    assert!(workers.iter().any(|w| w.id == 1 && w.status != WorkerStatus::Idle));

    assert!(pool.render("echo", json!(1)).await.is_ok());
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn late_reply_after_timeout_is_discarded() {
    let pool = started(cfg(1, 4, 50)).await;
    let mut events = pool.events();

    let handle = pool.submit("sleep", json!({"ms": 150})).await.unwrap();
    let task = handle.id().to_string();
    assert!(matches!(handle.await, Err(RenderError::Timeout { .. })));

    let late = wait_event(&mut events, |e| e.kind == EventKind::LateReplyDiscarded).await;
    assert_eq!(late.task.as_deref(), Some(task.as_str()));
    assert_eq!(late.worker, Some(1));

    let stats = wait_stats(&pool, |s| s.idle_workers == 1).await;
    assert_eq!(stats.completed_tasks, 0);
    assert_eq!(stats.failed_tasks, 1);
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn error_threshold_replaces_the_unit() {
    let mut c = cfg(1, 4, 5_000);
    c.max_worker_errors = 2;
    let pool = started(c).await;
    let mut events = pool.events();

    for _ in 0..2 {
        assert_eq!(
            pool.render("fail", json!({})).await,
            Err(RenderError::Template {
                message: "bad input".into()
            })
        );
    }

    let errored = wait_event(&mut events, |e| e.kind == EventKind::WorkerErrored).await;
    assert_eq!(errored.worker, Some(1));

    let handle = pool.submit("echo", json!("after")).await.unwrap();
    let id = handle.id().to_string();
    assert!(handle.await.is_ok());
    let assigned = wait_event(&mut events, |e| {
        e.kind == EventKind::TaskAssigned && e.task.as_deref() == Some(id.as_str())
    })
    .await;
    assert_eq!(assigned.worker, Some(2));

    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_below_threshold_keep_the_unit() {
    let mut c = cfg(1, 4, 5_000);
    c.max_worker_errors = 3;
    let pool = started(c).await;

    for _ in 0..2 {
        assert!(pool.render("fail", json!({})).await.is_err());
    }
    let workers = pool.workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].id, 1);
    assert_eq!(workers[0].errors_count, 2);
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_render_is_a_worker_crash() {
    let pool = started(cfg(1, 4, 5_000)).await;

    match pool.render("panic", json!({})).await {
        Err(RenderError::WorkerCrash { reason }) => {
            assert!(reason.contains("renderer exploded"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(pool.render("echo", json!(2)).await.is_ok());
    let workers = pool.workers().await.unwrap();
    assert!(
        workers
            .iter()
            .any(|w| w.id == 1 && w.status == WorkerStatus::Terminated)
    );
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_queued_and_active_tasks() {
    let pool = started(cfg(1, 5, 10_000)).await;

    let active = pool.submit("sleep", json!({"ms": 300})).await.unwrap();
    let queued_a = pool.submit("echo", json!(1)).await.unwrap();
    let queued_b = pool.submit("echo", json!(2)).await.unwrap();

    pool.shutdown().await.unwrap();

    assert_eq!(active.await, Err(RenderError::ShuttingDown));
    assert_eq!(queued_a.await, Err(RenderError::ShuttingDown));
    assert_eq!(queued_b.await, Err(RenderError::ShuttingDown));

    assert!(!pool.is_running());
    let stats = pool.stats();
    assert_eq!(stats.total_workers, 0);
    assert_eq!(stats.starting_workers, 0);
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.active_tasks, 0);

    assert!(matches!(
        pool.submit("echo", json!(3)).await,
        Err(RenderError::NotRunning)
    ));
    assert_eq!(pool.workers().await.unwrap_err(), PoolError::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_are_stable_without_activity() {
    let pool = started(cfg(3, 4, 1_000)).await;

    let a = wait_stats(&pool, |s| s.total_workers == 3).await;
    let b = pool.stats();
    assert_eq!(a, b);
    assert_eq!(b.idle_workers + b.busy_workers, b.total_workers);
    assert_eq!(b.idle_workers, 3);
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_is_idempotent_and_restartable() {
    let pool = started(cfg(2, 4, 1_000)).await;
    pool.initialize().await.unwrap();
    assert_eq!(wait_stats(&pool, |s| s.total_workers == 2).await.total_workers, 2);

    pool.shutdown().await.unwrap();
    pool.shutdown().await.unwrap();
    assert!(!pool.is_running());

    pool.initialize().await.unwrap();
    assert!(pool.is_running());
    assert_eq!(
        pool.render("echo", json!("again")).await.unwrap(),
        Bytes::from_static(br#""again""#)
    );
    pool.shutdown_with_grace(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_before_initialize_is_rejected() {
    let pool = RenderPoolBuilder::new(cfg(1, 1, 1_000), renderer())
        .without_log_writer()
        .build();
    assert!(matches!(
        pool.submit("echo", json!(1)).await,
        Err(RenderError::NotRunning)
    ));
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected_at_initialize() {
    let pool = RenderPoolBuilder::new(cfg(0, 1, 1_000), renderer())
        .without_log_writer()
        .build();
    assert!(matches!(
        pool.initialize().await,
        Err(PoolError::Config(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn timeouts_beyond_the_timer_range_are_rejected_at_initialize() {
    let mut c = cfg(1, 1, 1_000);
    c.task_timeout = Duration::from_secs(3 * 365 * 24 * 60 * 60);
    let pool = RenderPoolBuilder::new(c, renderer())
        .without_log_writer()
        .build();
    assert_eq!(
        pool.initialize().await,
        Err(PoolError::Config(ConfigError::Invalid {
            field: "task_timeout",
            reason: "must not exceed one year",
        }))
    );
    assert!(!pool.is_running());

    let mut c = cfg(1, 1, 1_000);
    c.task_timeout = MAX_TIMEOUT;
    c.startup_timeout = MAX_TIMEOUT;
    let pool = started(c).await;
    assert_eq!(
        pool.render("echo", json!(7)).await.unwrap(),
        Bytes::from_static(b"7")
    );
    assert!(pool.is_running());
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stuck_units_are_counted_but_history_is_capped() {
    let pool = started(cfg(1, 4, 20)).await;
    let mut events = pool.events();

    for _ in 0..4 {
        assert!(matches!(
            pool.render("sleep", json!({"ms": 3_000})).await,
            Err(RenderError::Timeout { .. })
        ));
    }

    let stuck = wait_event(&mut events, |e| e.kind == EventKind::WorkersStuck).await;
    assert_eq!(stuck.queue_len, Some(2));

    let stats = wait_stats(&pool, |s| s.stuck_workers == 4 && s.idle_workers == 1).await;
    assert_eq!(stats.failed_tasks, 4);

    let workers = pool.workers().await.unwrap();
    let errored: Vec<_> = workers
        .iter()
        .filter(|w| w.status == WorkerStatus::Errored)
        .collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].id, 4);
    assert_eq!(errored[0].current_task, None);
    assert!(workers.len() <= 3);

    pool.shutdown().await.unwrap();
}

/// Warm-up that blocks or fails after the first `healthy` units.
struct Flaky {
    healthy: usize,
    started: AtomicUsize,
    stall: Option<Duration>,
}

impl Renderer for Flaky {
    fn render(&self, template: &str, _: &Value) -> Result<Bytes, String> {
        match template {
            "fail" => Err("nope".into()),
            "slow-fail" => {
                std::thread::sleep(Duration::from_millis(100));
                Err("nope".into())
            }
            _ => Ok(Bytes::from_static(b"ok")),
        }
    }

    fn warm_up(&self) -> Result<(), String> {
        if self.started.fetch_add(1, Ordering::SeqCst) < self.healthy {
            return Ok(());
        }
        match self.stall {
            Some(d) => {
                std::thread::sleep(d);
                Ok(())
            }
            None => Err("assets unavailable".into()),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_startup_fails_initialize() {
    let mut c = cfg(2, 1, 1_000);
    c.startup_timeout = Duration::from_millis(50);
    let renderer = Arc::new(Flaky {
        healthy: 0,
        started: AtomicUsize::new(0),
        stall: Some(Duration::from_millis(400)),
    });
    let pool = RenderPoolBuilder::new(c, renderer)
        .without_log_writer()
        .build();

    match pool.initialize().await {
        Err(PoolError::StartupFailure {
            started,
            requested,
            timeout,
        }) => {
            assert_eq!(started, 0);
            assert_eq!(requested, 2);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!pool.is_running());
    assert_eq!(pool.stats().total_workers, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_replacement_leaves_pool_degraded() {
    let mut c = cfg(2, 4, 1_000);
    c.max_worker_errors = 1;
    let renderer = Arc::new(Flaky {
        healthy: 2,
        started: AtomicUsize::new(0),
        stall: None,
    });
    let pool = RenderPoolBuilder::new(c, renderer)
        .without_log_writer()
        .build();
    pool.initialize().await.unwrap();
    let mut events = pool.events();

    assert!(matches!(
        pool.render("fail", json!({})).await,
        Err(RenderError::Template { .. })
    ));
    let failed = wait_event(&mut events, |e| e.kind == EventKind::WorkerStartupFailed).await;
    assert_eq!(failed.worker, Some(3));

    let stats = wait_stats(&pool, |s| s.starting_workers == 0).await;
    assert_eq!(stats.total_workers, 1);
    assert_eq!(pool.render("ok", json!({})).await.unwrap(), Bytes::from_static(b"ok"));
    pool.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn losing_the_last_unit_fails_queued_and_new_tasks() {
    let mut c = cfg(1, 4, 1_000);
    c.max_worker_errors = 1;
    let renderer = Arc::new(Flaky {
        healthy: 1,
        started: AtomicUsize::new(0),
        stall: None,
    });
    let pool = RenderPoolBuilder::new(c, renderer)
        .without_log_writer()
        .build();
    pool.initialize().await.unwrap();

    let failing = pool.submit("slow-fail", json!({})).await.unwrap();
    let queued = pool.submit("ok", json!({})).await.unwrap();
    wait_stats(&pool, |s| s.queued_tasks == 1).await;

    assert!(matches!(failing.await, Err(RenderError::Template { .. })));
    assert_eq!(
        queued.await,
        Err(RenderError::WorkerCrash {
            reason: "no execution units available".into()
        })
    );

    let stats = wait_stats(&pool, |s| s.total_workers == 0 && s.starting_workers == 0).await;
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.failed_tasks, 2);

    assert!(matches!(
        pool.submit("ok", json!({})).await,
        Err(RenderError::WorkerCrash { reason }) if reason == "no execution units available"
    ));
    pool.shutdown().await.unwrap();
}
