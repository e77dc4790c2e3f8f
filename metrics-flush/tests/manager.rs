use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use metrics_flush::{
    Binding, Driver, DriverFactories, FactoryError, InitError, Manager, ManagerBuilder,
    ManagerError, SendError, SendFuture, SendPolicy, Tags,
};
use metrics_registry::{metric_group, Registry};

const LONG_INTERVAL: Duration = Duration::from_secs(3600);

/// Records the identifiers of every batch it is given.
#[derive(Clone, Default)]
struct RecordingDriver {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
    // Sends never complete.
    hang: bool,
    fail: bool,
}

impl RecordingDriver {
    fn hanging() -> Self {
        Self { hang: true, ..Self::default() }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    fn sends(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    async fn wait_for_sends(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.sends() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("driver was not sent to in time");
    }
}

impl Driver for RecordingDriver {
    fn send(&self, batch: Vec<Binding>) -> SendFuture {
        self.batches.lock().unwrap().push(batch.iter().map(Binding::id).collect());

        let (hang, fail) = (self.hang, self.fail);
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            if fail {
                return Err(SendError::Unreachable { attempts: 1, reason: "refused".to_string() });
            }
            Ok(())
        })
    }
}

/// Blocks the calling thread before handing out its future.
struct BlockingDriver {
    called: Arc<AtomicBool>,
}

impl Driver for BlockingDriver {
    fn send(&self, _batch: Vec<Binding>) -> SendFuture {
        self.called.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_secs(1));
        Box::pin(async { Ok(()) })
    }
}

fn manager_with(driver: &RecordingDriver, policy: SendPolicy) -> Manager {
    ManagerBuilder::new()
        .with_flush_interval(LONG_INTERVAL)
        .unwrap()
        .with_send_policy(policy)
        .with_driver("recording", Arc::new(driver.clone()))
        .build()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_flushes_coalesce() {
    let driver = RecordingDriver::default();
    let manager = manager_with(&driver, SendPolicy::Overlap);
    manager.register("test", Registry::new(), Tags::new());

    // No loop is running yet: the first request stays pending and absorbs the others.
    for _ in 0..10 {
        manager.flush();
    }

    let run = manager.spawn();
    driver.wait_for_sends(1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.sends(), 1);

    manager.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_does_not_wait_for_slow_driver() {
    let driver = RecordingDriver::hanging();
    let manager = manager_with(&driver, SendPolicy::Overlap);
    manager.register("test", Registry::new(), Tags::new());
    let run = manager.spawn();

    manager.flush();
    driver.wait_for_sends(1).await;

    // The first send never completes, and the loop keeps serving requests anyway.
    manager.flush();
    driver.wait_for_sends(2).await;
    assert_eq!(manager.in_flight_sends(), 2);

    manager.stop();
    tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skip_if_in_flight() {
    let driver = RecordingDriver::hanging();
    let manager = manager_with(&driver, SendPolicy::SkipIfInFlight);
    manager.register("test", Registry::new(), Tags::new());
    let run = manager.spawn();

    manager.flush();
    driver.wait_for_sends(1).await;

    manager.flush();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.sends(), 1);
    assert_eq!(manager.in_flight_sends(), 1);

    manager.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_snapshot_is_not_sent() {
    let driver = RecordingDriver::default();
    let manager = manager_with(&driver, SendPolicy::Overlap);
    let run = manager.spawn();

    manager.flush();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(driver.sends(), 0);

    manager.register("later", Registry::new(), tags(&[("zone", "a")]));
    manager.flush();
    driver.wait_for_sends(1).await;
    assert_eq!(driver.batches(), vec![vec!["later[zone=a]".to_string()]]);

    manager.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticks_send_every_binding() {
    let driver = RecordingDriver::default();
    let manager = ManagerBuilder::new()
        .with_flush_interval(Duration::from_millis(20))
        .unwrap()
        .with_driver("recording", Arc::new(driver.clone()))
        .build();
    manager.register("b", Registry::new(), Tags::new());
    manager.register("a", Registry::new(), tags(&[("k", "v")]));

    let run = manager.spawn();
    driver.wait_for_sends(2).await;
    manager.stop();
    run.await.unwrap().unwrap();

    let expected = vec!["a[k=v]".to_string(), "b[]".to_string()];
    assert!(driver.batches().iter().all(|batch| *batch == expected));
}

#[tokio::test]
async fn failed_sends_do_not_stop_the_loop() {
    init_tracing();
    let driver = RecordingDriver::failing();
    let manager = manager_with(&driver, SendPolicy::Overlap);
    manager.register("test", Registry::new(), Tags::new());
    let run = manager.spawn();

    manager.flush();
    driver.wait_for_sends(1).await;
    manager.flush();
    driver.wait_for_sends(2).await;

    manager.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn run_twice_fails() {
    let driver = RecordingDriver::default();
    let manager = manager_with(&driver, SendPolicy::Overlap);

    // Stopped first so that the first run returns right away.
    manager.stop();
    assert_eq!(manager.run().await, Ok(()));
    assert_eq!(manager.clone().run().await, Err(ManagerError::AlreadyRunning));
}

#[tokio::test]
async fn stop_before_run_returns_immediately() {
    let driver = RecordingDriver::default();
    let manager = manager_with(&driver, SendPolicy::Overlap);
    manager.stop();

    tokio::time::timeout(Duration::from_secs(5), manager.run()).await.unwrap().unwrap();
}

#[tokio::test]
async fn init_skips_disabled_drivers() {
    let driver = RecordingDriver::default();
    let recording = driver.clone();
    let factories = DriverFactories::new()
        .with_factory("disabled", |_| Ok(None))
        .with_factory("recording", move |_| {
            Ok(Some(Arc::new(recording.clone()) as Arc<dyn Driver>))
        });

    let manager = Manager::new();
    manager.init("app", &factories).unwrap();
    assert_eq!(manager.drivers(), vec!["recording".to_string()]);

    assert!(matches!(manager.init("app", &factories), Err(InitError::AlreadyInitialized)));
}

#[test]
fn init_fails_on_factory_error() {
    let factories = DriverFactories::new().with_factory("warp10", |_| {
        Err(FactoryError::InvalidConfiguration { reason: "token is empty".to_string() })
    });

    let manager = Manager::new();
    let err = manager.init("app", &factories).unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to init metrics driver warp10: invalid configuration: token is empty"
    );
    assert!(manager.drivers().is_empty());
}

metric_group! {
    struct HandlerMetrics {
        requests: Counter,
        latency: Timer,
    }
}

#[test]
fn register_group_binds_the_built_registry() {
    let manager = Manager::new();
    let (group, registry) =
        manager.register_group::<HandlerMetrics>("handler", tags(&[("route", "/")])).unwrap();
    group.requests.inc(1);
    group.latency.update(Duration::from_millis(1));

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id(), "handler[route=/]");
    assert!(snapshot[0].registry().ptr_eq(&registry));
    assert_eq!(registry.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_does_not_wait_for_a_blocking_driver() {
    let called = Arc::new(AtomicBool::new(false));
    let manager = ManagerBuilder::new()
        .with_flush_interval(LONG_INTERVAL)
        .unwrap()
        .with_driver("blocking", Arc::new(BlockingDriver { called: called.clone() }))
        .build();
    let run = manager.spawn();

    manager.register("api", Registry::new(), Tags::new());
    manager.flush();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !called.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("driver was not called in time");

    let stopping = Instant::now();
    manager.stop();
    run.await.unwrap().unwrap();
    assert!(stopping.elapsed() < Duration::from_millis(500), "{:?}", stopping.elapsed());
}
