//! The global manager is process-wide, so its whole lifecycle lives in a single test.
use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use metrics_flush::{
    Binding, Driver, DriverFactories, ManagerError, SendFuture, Tags, UnregisterError,
};
use metrics_registry::RegistryBuilder;

#[derive(Clone, Default)]
struct RecordingDriver {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingDriver {
    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    fn wait_for_sends(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.batches().len() < count {
            assert!(Instant::now() < deadline, "driver was not sent to in time");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Driver for RecordingDriver {
    fn send(&self, batch: Vec<Binding>) -> SendFuture {
        let batches = self.batches.clone();
        Box::pin(async move {
            batches.lock().unwrap().push(batch.iter().map(Binding::id).collect());
            Ok(())
        })
    }
}

#[test]
fn global_lifecycle_without_a_runtime() {
    let driver = RecordingDriver::default();
    let recording = driver.clone();
    let factories = DriverFactories::new().with_factory("recording", move |_| {
        Ok(Some(Arc::new(recording.clone()) as Arc<dyn Driver>))
    });

    assert_eq!(
        metrics_flush::set_flush_interval(Duration::ZERO),
        Err(ManagerError::ZeroFlushInterval)
    );
    metrics_flush::set_flush_interval(Duration::from_secs(3600)).unwrap();
    metrics_flush::init("app", &factories).unwrap();
    assert_eq!(metrics_flush::global().drivers(), vec!["recording".to_string()]);

    let mut builder = RegistryBuilder::new();
    builder.add_counter("requests").inc(2);
    let tags = Tags::from([("zone".to_string(), "a".to_string())]);
    metrics_flush::register("api", builder.build().unwrap(), tags.clone());

    metrics_flush::flush();
    driver.wait_for_sends(1);
    assert_eq!(driver.batches(), vec![vec!["api[zone=a]".to_string()]]);

    metrics_flush::unregister("api", &tags).unwrap();
    assert_eq!(
        metrics_flush::unregister("api", &tags),
        Err(UnregisterError::NotRegistered { id: "api[zone=a]".to_string() })
    );

    // Nothing is registered anymore, so nothing is sent.
    metrics_flush::flush();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(driver.batches().len(), 1);

    metrics_flush::register("api", RegistryBuilder::new().build().unwrap(), Tags::new());
    metrics_flush::stop();
    thread::sleep(Duration::from_millis(100));
    metrics_flush::flush();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(driver.batches().len(), 1);
}
