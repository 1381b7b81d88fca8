//! The lifecycle orchestrator.
//!
//! Each phase has its own ordering: a stable ascending sort of the loaded
//! modules by that phase's priority. Phases run strictly sequentially, one
//! module at a time; the first failure aborts the rest of the phase.
//!
//! A phase that is already in progress is not started again: the duplicate
//! call returns [`PhaseRun::AlreadyRunning`] at once. The stop phase runs
//! as a spawned sweep raced against the stop timeout, so a hung module
//! cannot hold shutdown hostage; the sweep keeps its in-progress flag until
//! it actually finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_core::{BoxedModule, Phase, Priority};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::LoadedModule;

// =============================================================================
// Ordering
// =============================================================================

/// Per-phase call orders of module names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleOrder {
    pub init: Vec<String>,
    pub start: Vec<String>,
    pub stop: Vec<String>,
}

impl ModuleOrder {
    /// Sorts `modules` by each phase's priority, keeping the given order
    /// among equal priorities.
    pub fn compute<'a>(modules: impl IntoIterator<Item = (&'a str, Priority)>) -> Self {
        let entries: Vec<(&str, Priority)> = modules.into_iter().collect();
        let order_for = |phase: Phase| -> Vec<String> {
            let mut sorted = entries.clone();
            sorted.sort_by_key(|(_, priority)| priority.get(phase));
            sorted
                .into_iter()
                .map(|(name, _)| name.to_string())
                .collect()
        };

        Self {
            init: order_for(Phase::Init),
            start: order_for(Phase::Start),
            stop: order_for(Phase::Stop),
        }
    }

    pub fn get(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Init => &self.init,
            Phase::Start => &self.start,
            Phase::Stop => &self.stop,
        }
    }
}

// =============================================================================
// Dates & states
// =============================================================================

/// When each phase last completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleDates {
    pub initialized_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Which phases are in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStates {
    pub is_initializing: bool,
    pub is_starting: bool,
    pub is_stopping: bool,
}

/// Result of a phase call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRun {
    /// The phase ran to completion.
    Completed,
    /// The phase was already running; nothing was done.
    AlreadyRunning,
}

#[derive(Default)]
struct Shared {
    initializing: AtomicBool,
    starting: AtomicBool,
    stopping: AtomicBool,
    dates: Mutex<LifecycleDates>,
}

impl Shared {
    fn flag(&self, phase: Phase) -> &AtomicBool {
        match phase {
            Phase::Init => &self.initializing,
            Phase::Start => &self.starting,
            Phase::Stop => &self.stopping,
        }
    }

    fn mark_completed(&self, phase: Phase) {
        let now = Utc::now();
        let mut dates = self.dates.lock();
        match phase {
            Phase::Init => dates.initialized_at = Some(now),
            Phase::Start => dates.started_at = Some(now),
            Phase::Stop => dates.stopped_at = Some(now),
        }
    }
}

/// Holds a phase's in-progress flag; releases it on drop.
struct PhaseGuard {
    shared: Arc<Shared>,
    phase: Phase,
}

impl PhaseGuard {
    fn acquire(shared: &Arc<Shared>, phase: Phase) -> Option<Self> {
        shared
            .flag(phase)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                shared: Arc::clone(shared),
                phase,
            })
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.shared.flag(self.phase).store(false, Ordering::Release);
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Drives loaded modules through init, start and stop.
pub struct Lifecycle {
    modules: Vec<LoadedModule>,
    order: ModuleOrder,
    stop_timeout: Duration,
    shared: Arc<Shared>,
}

impl Lifecycle {
    pub fn new(modules: Vec<LoadedModule>, stop_timeout: Duration) -> Self {
        let order = ModuleOrder::compute(modules.iter().map(|m| (m.name.as_str(), m.priority)));
        debug!(?order, "module order computed");
        Self {
            modules,
            order,
            stop_timeout,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn order(&self) -> &ModuleOrder {
        &self.order
    }

    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn dates(&self) -> LifecycleDates {
        *self.shared.dates.lock()
    }

    pub fn states(&self) -> LifecycleStates {
        LifecycleStates {
            is_initializing: self.shared.initializing.load(Ordering::Acquire),
            is_starting: self.shared.starting.load(Ordering::Acquire),
            is_stopping: self.shared.stopping.load(Ordering::Acquire),
        }
    }

    pub async fn init(&self) -> RuntimeResult<PhaseRun> {
        self.run_phase(Phase::Init).await
    }

    pub async fn start(&self) -> RuntimeResult<PhaseRun> {
        self.run_phase(Phase::Start).await
    }

    /// Runs the stop sweep, failing with [`RuntimeError::StopTimeout`] if
    /// the whole sweep outlasts the stop timeout.
    pub async fn stop(&self) -> RuntimeResult<PhaseRun> {
        let Some(guard) = PhaseGuard::acquire(&self.shared, Phase::Stop) else {
            debug!("stop already in progress");
            return Ok(PhaseRun::AlreadyRunning);
        };

        let modules = self.ordered(Phase::Stop);
        let sweep = tokio::spawn(async move {
            let result = run_sequence(Phase::Stop, modules).await;
            if result.is_ok() {
                guard.shared.mark_completed(Phase::Stop);
            }
            drop(guard);
            result
        });

        match tokio::time::timeout(self.stop_timeout, sweep).await {
            Ok(joined) => joined?.map(|()| PhaseRun::Completed),
            Err(_) => {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "stop sweep did not finish in time"
                );
                Err(RuntimeError::StopTimeout {
                    timeout: self.stop_timeout,
                })
            }
        }
    }

    async fn run_phase(&self, phase: Phase) -> RuntimeResult<PhaseRun> {
        let Some(_guard) = PhaseGuard::acquire(&self.shared, phase) else {
            debug!(%phase, "phase already in progress");
            return Ok(PhaseRun::AlreadyRunning);
        };

        run_sequence(phase, self.ordered(phase)).await?;
        self.shared.mark_completed(phase);
        Ok(PhaseRun::Completed)
    }

    fn ordered(&self, phase: Phase) -> Vec<(String, BoxedModule)> {
        self.order
            .get(phase)
            .iter()
            .filter_map(|name| self.module(name))
            .map(|m| (m.name.clone(), Arc::clone(&m.instance)))
            .collect()
    }
}

async fn run_sequence(phase: Phase, modules: Vec<(String, BoxedModule)>) -> RuntimeResult<()> {
    info!(%phase, modules = modules.len(), "phase begins");

    for (name, module) in modules {
        debug!(module = %name, %phase, "module entering phase");
        let result = match phase {
            Phase::Init => module.init().await,
            Phase::Start => module.start().await,
            Phase::Stop => module.stop().await,
        };
        result.map_err(|source| RuntimeError::Lifecycle {
            phase,
            module: name.clone(),
            source,
        })?;
        info!(module = %name, %phase, "module completed phase");
    }

    info!(%phase, "phase complete");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{BoxError, Module, async_trait};
    use keel_framework::ModuleKind;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records every phase call; optionally slow or failing.
    struct Probe {
        name: &'static str,
        journal: Journal,
        stop_delay: Duration,
        stops: Arc<AtomicUsize>,
        fail_on: Option<Phase>,
    }

    impl Probe {
        fn record(&self, phase: Phase) -> Result<(), BoxError> {
            self.journal.lock().push(format!("{}:{}", phase, self.name));
            if self.fail_on == Some(phase) {
                return Err(format!("{} refused to {}", self.name, phase).into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Module for Probe {
        async fn init(&self) -> Result<(), BoxError> {
            tokio::task::yield_now().await;
            self.record(Phase::Init)
        }

        async fn start(&self) -> Result<(), BoxError> {
            self.record(Phase::Start)
        }

        async fn stop(&self) -> Result<(), BoxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.stop_delay).await;
            self.record(Phase::Stop)
        }
    }

    struct Fixture {
        journal: Journal,
        stops: Arc<AtomicUsize>,
        modules: Vec<LoadedModule>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                journal: Journal::default(),
                stops: Arc::default(),
                modules: Vec::new(),
            }
        }

        fn probe(mut self, name: &'static str, priority: Priority) -> Self {
            self.push(name, priority, Duration::ZERO, None);
            self
        }

        fn push(
            &mut self,
            name: &'static str,
            priority: Priority,
            stop_delay: Duration,
            fail_on: Option<Phase>,
        ) {
            let instance: BoxedModule = Arc::new(Probe {
                name,
                journal: Arc::clone(&self.journal),
                stop_delay,
                stops: Arc::clone(&self.stops),
                fail_on,
            });
            self.modules.push(LoadedModule {
                name: name.to_string(),
                kind: ModuleKind::Module,
                priority,
                instance,
                server: None,
            });
        }

        fn lifecycle(self, stop_timeout: Duration) -> (Lifecycle, Journal, Arc<AtomicUsize>) {
            (
                Lifecycle::new(self.modules, stop_timeout),
                self.journal,
                self.stops,
            )
        }
    }

    fn names(order: &[String]) -> Vec<&str> {
        order.iter().map(String::as_str).collect()
    }

    #[test]
    fn orders_are_stable_per_phase() {
        let order = ModuleOrder::compute([
            ("a", Priority::new(0, 5, 0)),
            ("b", Priority::new(-1, 5, 0)),
            ("c", Priority::new(0, -5, 1)),
            ("d", Priority::new(-1, 0, -1)),
        ]);

        assert_eq!(names(&order.init), ["b", "d", "a", "c"]);
        assert_eq!(names(&order.start), ["c", "d", "a", "b"]);
        assert_eq!(names(&order.stop), ["d", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn init_follows_priority_and_reverses_with_it() {
        let (lifecycle, journal, _) = Fixture::new()
            .probe("db", Priority::new(-10, 0, 0))
            .probe("api", Priority::default())
            .lifecycle(Duration::from_secs(1));
        assert_eq!(assert_ok!(lifecycle.init().await), PhaseRun::Completed);
        assert_eq!(*journal.lock(), ["init:db", "init:api"]);

        let (lifecycle, journal, _) = Fixture::new()
            .probe("db", Priority::default())
            .probe("api", Priority::new(-10, 0, 0))
            .lifecycle(Duration::from_secs(1));
        assert_ok!(lifecycle.init().await);
        assert_eq!(*journal.lock(), ["init:api", "init:db"]);
    }

    #[tokio::test]
    async fn failure_aborts_rest_of_phase() {
        let mut fixture = Fixture::new();
        fixture.push("first", Priority::new(-1, 0, 0), Duration::ZERO, Some(Phase::Init));
        fixture.push("second", Priority::default(), Duration::ZERO, None);
        let (lifecycle, journal, _) = fixture.lifecycle(Duration::from_secs(1));

        let err = assert_err!(lifecycle.init().await);
        assert!(matches!(
            err,
            RuntimeError::Lifecycle { phase: Phase::Init, ref module, .. } if module == "first"
        ));
        assert_eq!(*journal.lock(), ["init:first"]);
        assert!(lifecycle.dates().initialized_at.is_none());
        assert!(!lifecycle.states().is_initializing);
    }

    #[tokio::test]
    async fn concurrent_init_runs_once() {
        let (lifecycle, journal, _) = Fixture::new()
            .probe("only", Priority::default())
            .lifecycle(Duration::from_secs(1));

        let (first, second) = tokio::join!(lifecycle.init(), lifecycle.init());
        assert_eq!(first.unwrap(), PhaseRun::Completed);
        assert_eq!(second.unwrap(), PhaseRun::AlreadyRunning);
        assert_eq!(*journal.lock(), ["init:only"]);
        assert!(lifecycle.dates().initialized_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stop_sweeps_once() {
        let mut fixture = Fixture::new();
        fixture.push("slow", Priority::default(), Duration::from_millis(50), None);
        let (lifecycle, _, stops) = fixture.lifecycle(Duration::from_secs(1));

        let (first, second) = tokio::join!(lifecycle.stop(), lifecycle.stop());
        assert_eq!(first.unwrap(), PhaseRun::Completed);
        assert_eq!(second.unwrap(), PhaseRun::AlreadyRunning);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(lifecycle.dates().stopped_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sweep_times_out_as_a_whole() {
        // Each stop fits the budget on its own; together they do not.
        let mut fixture = Fixture::new();
        fixture.push("a", Priority::new(0, 0, 1), Duration::from_millis(60), None);
        fixture.push("b", Priority::new(0, 0, 2), Duration::from_millis(60), None);
        let (lifecycle, journal, _) = fixture.lifecycle(Duration::from_millis(100));

        let err = assert_err!(lifecycle.stop().await);
        assert_eq!(err.code(), "TIMEOUT_ERROR");
        assert!(lifecycle.dates().stopped_at.is_none());
        assert!(lifecycle.states().is_stopping);

        // The sweep is left to finish in the background.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*journal.lock(), ["stop:a", "stop:b"]);
        assert!(lifecycle.dates().stopped_at.is_some());
        assert!(!lifecycle.states().is_stopping);
    }
}
