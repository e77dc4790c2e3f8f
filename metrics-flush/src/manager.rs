use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    time::Duration,
};

use metrics_registry::{BuildError, MetricGroup, Registry};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error};

use crate::{binding_id, Binding, Driver, DriverFactories, InitError, Tags};

/// Default interval between two scheduled sends.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that could occur while configuring or running a manager.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// `run` was already called on this manager.
    #[error("manager is already running")]
    AlreadyRunning,

    /// Flush intervals must be strictly positive.
    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,
}

/// Errors that could occur while unregistering a binding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnregisterError {
    #[error("not registered: {id}")]
    NotRegistered { id: String },
}

/// What a flush loop does when it is time to send while a previous send to the same driver has
/// not completed yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendPolicy {
    /// Start the new send anyway. A slow driver may then have several sends in flight.
    #[default]
    Overlap,

    /// Skip the new send. The next tick sends fresh values.
    SkipIfInFlight,
}

struct DriverSlot {
    name: String,
    driver: Arc<dyn Driver>,
    // Capacity 1: a pending request absorbs any further one.
    flush_tx: mpsc::Sender<()>,
    flush_rx: Mutex<Option<mpsc::Receiver<()>>>,
    in_flight: AtomicUsize,
}

impl DriverSlot {
    fn new(name: String, driver: Arc<dyn Driver>) -> Self {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        Self {
            name,
            driver,
            flush_tx,
            flush_rx: Mutex::new(Some(flush_rx)),
            in_flight: AtomicUsize::new(0),
        }
    }
}

fn into_slots(drivers: Vec<(String, Arc<dyn Driver>)>) -> Vec<Arc<DriverSlot>> {
    drivers.into_iter().map(|(name, driver)| Arc::new(DriverSlot::new(name, driver))).collect()
}

struct Inner {
    bindings: RwLock<BTreeMap<String, Binding>>,
    drivers: OnceCell<Vec<Arc<DriverSlot>>>,
    flush_interval: RwLock<Duration>,
    policy: SendPolicy,
    cancel: watch::Sender<bool>,
    running: AtomicBool,
}

impl Inner {
    fn snapshot(&self) -> Vec<Binding> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        bindings.values().cloned().collect()
    }

    fn dispatch(&self, slot: &Arc<DriverSlot>) {
        let batch = self.snapshot();
        if batch.is_empty() {
            debug!(driver = %slot.name, "no registry to send");
            return;
        }

        let busy = slot.in_flight.load(Ordering::Acquire) > 0;
        if busy && self.policy == SendPolicy::SkipIfInFlight {
            debug!(driver = %slot.name, "previous send still in flight, skipping");
            return;
        }

        slot.in_flight.fetch_add(1, Ordering::AcqRel);
        let slot = Arc::clone(slot);
        // The driver is called from the spawned task: even its synchronous part must not hold
        // the loop.
        tokio::spawn(async move {
            let result = slot.driver.send(batch).await;
            slot.in_flight.fetch_sub(1, Ordering::AcqRel);
            if let Err(e) = result {
                error!(driver = %slot.name, error = %e, "failed to send metrics");
            }
        });
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *cancel.borrow_and_update();
        if stopped || cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn flush_loop(
    inner: Arc<Inner>,
    slot: Arc<DriverSlot>,
    mut flush_rx: mpsc::Receiver<()>,
    period: Duration,
) {
    let mut cancel = inner.cancel.subscribe();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = cancelled(&mut cancel) => break,
            _ = ticker.tick() => inner.dispatch(&slot),
            Some(()) = flush_rx.recv() => inner.dispatch(&slot),
        }
    }

    debug!(driver = %slot.name, "flush loop stopped");
}

/// Owns registered bindings and pushes them to drivers.
///
/// A manager runs one flush loop per driver. Each loop sends a snapshot of every binding to its
/// driver at a fixed interval, and whenever [`flush`](Manager::flush) is called. Sends run as
/// their own tasks: a slow driver never delays the loop, nor registration.
///
/// `Manager` is a cheap handle; clones drive the same manager.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    /// Creates a manager without drivers, using the default configuration.
    pub fn new() -> Self {
        ManagerBuilder::new().build()
    }

    /// Binds `registry` to `name` and `tags`.
    ///
    /// A binding with the same name and tags is replaced.
    pub fn register(&self, name: impl Into<String>, registry: Registry, tags: Tags) {
        let binding = Binding::new(name, registry, tags);
        let id = binding.id();
        let mut bindings = self.inner.bindings.write().unwrap_or_else(PoisonError::into_inner);
        bindings.insert(id, binding);
    }

    /// Builds the registry of a metric group and binds it to `name` and `tags`.
    ///
    /// # Errors
    ///
    /// If the group cannot be built, nothing is registered.
    pub fn register_group<G>(
        &self,
        name: impl Into<String>,
        tags: Tags,
    ) -> Result<(G, Registry), BuildError>
    where
        G: MetricGroup,
    {
        let (group, registry) = G::build()?;
        self.register(name, registry.clone(), tags);
        Ok((group, registry))
    }

    /// Removes the binding of `name` and `tags`.
    ///
    /// # Errors
    ///
    /// If no such binding exists, an error is returned and nothing changes.
    pub fn unregister(&self, name: &str, tags: &Tags) -> Result<(), UnregisterError> {
        let id = binding_id(name, tags);
        let mut bindings = self.inner.bindings.write().unwrap_or_else(PoisonError::into_inner);
        match bindings.remove(&id) {
            Some(_) => Ok(()),
            None => Err(UnregisterError::NotRegistered { id }),
        }
    }

    /// Gets a copy of every current binding, ordered by identifier.
    pub fn snapshot(&self) -> Vec<Binding> {
        self.inner.snapshot()
    }

    /// Sets the interval between two scheduled sends.
    ///
    /// Only flush loops started afterwards use the new interval.
    ///
    /// # Errors
    ///
    /// The interval must not be zero.
    pub fn set_flush_interval(&self, interval: Duration) -> Result<(), ManagerError> {
        if interval.is_zero() {
            return Err(ManagerError::ZeroFlushInterval);
        }
        *self.inner.flush_interval.write().unwrap_or_else(PoisonError::into_inner) = interval;
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        *self.inner.flush_interval.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the drivers to send to.
    ///
    /// # Errors
    ///
    /// Drivers can only be installed once.
    pub fn install_drivers(
        &self,
        drivers: Vec<(String, Arc<dyn Driver>)>,
    ) -> Result<(), InitError> {
        self.inner.drivers.set(into_slots(drivers)).map_err(|_| InitError::AlreadyInitialized)
    }

    /// Resolves the given factories for `application` and installs the enabled drivers.
    ///
    /// # Errors
    ///
    /// Any factory error aborts initialization, and no driver is installed.
    pub fn init(&self, application: &str, factories: &DriverFactories) -> Result<(), InitError> {
        let drivers = factories.resolve(application)?;
        self.install_drivers(drivers)
    }

    /// Names of the installed drivers.
    pub fn drivers(&self) -> Vec<String> {
        self.slots().iter().map(|slot| slot.name.clone()).collect()
    }

    /// Requests an immediate send from every driver.
    ///
    /// Never blocks. While a request is pending for a driver, further requests are absorbed by it.
    pub fn flush(&self) {
        for slot in self.slots() {
            // Full means a request is already pending.
            let _ = slot.flush_tx.try_send(());
        }
    }

    /// Stops every flush loop.
    ///
    /// Returns immediately: in-flight sends are not awaited and no final send is made. A stopped
    /// manager cannot be restarted.
    pub fn stop(&self) {
        self.inner.cancel.send_replace(true);
    }

    /// Runs one flush loop per installed driver until [`stop`](Manager::stop) is called.
    ///
    /// Returns immediately when no driver is installed.
    ///
    /// # Errors
    ///
    /// A manager can only be run once.
    pub async fn run(&self) -> Result<(), ManagerError> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(ManagerError::AlreadyRunning);
        }

        let period = self.flush_interval();
        let mut loops = JoinSet::new();
        for slot in self.slots() {
            let flush_rx = slot.flush_rx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(flush_rx) = flush_rx {
                let inner = Arc::clone(&self.inner);
                loops.spawn(flush_loop(inner, Arc::clone(slot), flush_rx, period));
            }
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "flush loop failed");
            }
        }

        debug!("stopped");
        Ok(())
    }

    /// Spawns [`run`](Manager::run) on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from outside of a Tokio runtime.
    pub fn spawn(&self) -> JoinHandle<Result<(), ManagerError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.run().await })
    }

    /// Number of sends currently in flight, across drivers.
    pub fn in_flight_sends(&self) -> usize {
        self.slots().iter().map(|slot| slot.in_flight.load(Ordering::Acquire)).sum()
    }

    fn slots(&self) -> &[Arc<DriverSlot>] {
        self.inner.drivers.get().map(Vec::as_slice).unwrap_or_default()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("drivers", &self.drivers())
            .field("bindings", &self.snapshot().len())
            .field("flush_interval", &self.flush_interval())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Manager`].
pub struct ManagerBuilder {
    flush_interval: Duration,
    policy: SendPolicy,
    drivers: Vec<(String, Arc<dyn Driver>)>,
}

impl ManagerBuilder {
    /// Creates a new `ManagerBuilder`.
    pub fn new() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            policy: SendPolicy::default(),
            drivers: Vec::new(),
        }
    }

    /// Sets the interval between two scheduled sends.
    ///
    /// Defaults to 60 seconds.
    ///
    /// # Errors
    ///
    /// The interval must not be zero.
    pub fn with_flush_interval(mut self, interval: Duration) -> Result<Self, ManagerError> {
        if interval.is_zero() {
            return Err(ManagerError::ZeroFlushInterval);
        }
        self.flush_interval = interval;
        Ok(self)
    }

    /// Sets what happens when a send is due while the previous one is still running.
    ///
    /// Defaults to [`SendPolicy::Overlap`].
    #[must_use]
    pub fn with_send_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds a driver.
    ///
    /// When no driver is added, drivers can be installed later with
    /// [`Manager::install_drivers`] or [`Manager::init`].
    #[must_use]
    pub fn with_driver(mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        self.drivers.push((name.into(), driver));
        self
    }

    pub fn build(self) -> Manager {
        let (cancel, _) = watch::channel(false);
        let inner = Inner {
            bindings: RwLock::new(BTreeMap::new()),
            drivers: OnceCell::new(),
            flush_interval: RwLock::new(self.flush_interval),
            policy: self.policy,
            cancel,
            running: AtomicBool::new(false),
        };

        if !self.drivers.is_empty() {
            // Freshly created, so never set yet.
            let _ = inner.drivers.set(into_slots(self.drivers));
        }

        Manager { inner: Arc::new(inner) }
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
