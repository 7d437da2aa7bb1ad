use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use quarry_base::{GroupDefinition, ResourceError, ResourceFactory, ResourceResult};

use crate::manager::{
    dispatch_notifications, GroupEventListener, ManagerCore, ManagerState, ResourceManager,
};
use crate::relay::CompletionRelay;

/// Core plus the wait condition the worker parks on while idle. One mutex
/// guards the whole core; the relay deliberately has its own synchronization
/// so a worker posting a completion never contends with scheduling calls.
struct SharedState {
    core: Mutex<ManagerCore>,
    work_available: Condvar,
}

/// Owns the dedicated thread driving batch steps; stopped and joined when the
/// manager shuts down or is dropped.
struct WorkerThread {
    join_handle: JoinHandle<()>,
}

impl WorkerThread {
    fn spawn(
        shared: Arc<SharedState>,
        relay: Arc<CompletionRelay>,
    ) -> ResourceResult<Self> {
        let join_handle = std::thread::Builder::new()
            .name("Resource Worker".into())
            .spawn(move || worker_main(shared, relay))
            .map_err(|e| {
                log::error!("failed to spawn resource worker thread: {}", e);
                ResourceError::NoMemory
            })?;

        Ok(WorkerThread {
            join_handle,
        })
    }
}

fn worker_main(
    shared: Arc<SharedState>,
    relay: Arc<CompletionRelay>,
) {
    profiling::register_thread!("Resource Worker");
    log::debug!("resource worker running");
    while thread_update(&shared, &relay) {}
    log::debug!("resource worker stopped");
}

/// One pass of the worker loop. Blocks on the wait condition while there is
/// nothing actionable; that wait is the thread's only suspension point and it
/// releases the core mutex for as long as it lasts. Returns false once the
/// stop signal is observed.
#[profiling::function]
fn thread_update(
    shared: &SharedState,
    relay: &CompletionRelay,
) -> bool {
    let mut core = shared.core.lock().unwrap();
    loop {
        if core.stop_worker {
            return false;
        }
        if core.has_actionable_work() {
            break;
        }
        core = shared.work_available.wait(core).unwrap();
    }

    // One batch step with the mutex held. The completion goes through the
    // relay; listeners never hear from this thread directly.
    core.process_next_group(relay);
    true
}

/// Two-thread variant: `load_group`/`unload_group`/`update` run on the owning
/// thread, batch steps on the dedicated worker. Completions cross back over
/// the relay and are dispatched from `update`.
pub struct BackgroundResourceManager {
    shared: Arc<SharedState>,
    relay: Arc<CompletionRelay>,
    listeners: Vec<Box<dyn GroupEventListener>>,
    worker: Option<WorkerThread>,
}

impl BackgroundResourceManager {
    pub fn new(factory: Box<dyn ResourceFactory>) -> ResourceResult<Self> {
        let shared = Arc::new(SharedState {
            core: Mutex::new(ManagerCore::new(factory)),
            work_available: Condvar::new(),
        });
        let relay = Arc::new(CompletionRelay::new());
        let worker = WorkerThread::spawn(shared.clone(), relay.clone())?;

        Ok(BackgroundResourceManager {
            shared,
            relay,
            listeners: Vec::default(),
            worker: Some(worker),
        })
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            {
                let mut core = self.shared.core.lock().unwrap();
                core.stop_worker = true;
            }
            self.shared.work_available.notify_all();
            if worker.join_handle.join().is_err() {
                log::error!("resource worker thread panicked");
            }
        }
    }

    fn drain_relay(&mut self) {
        let events = self.relay.drain();
        if events.is_empty() {
            return;
        }

        let mut notifications = Vec::default();
        {
            let mut core = self.shared.core.lock().unwrap();
            for event in events {
                core.handle_event(event, &mut notifications);
            }
        }
        // Listener callbacks run with the core unlocked so they can schedule
        // follow-up work
        dispatch_notifications(&mut self.listeners, notifications);
    }
}

impl ResourceManager for BackgroundResourceManager {
    fn create_group(
        &mut self,
        def: &GroupDefinition,
    ) -> ResourceResult<()> {
        self.shared.core.lock().unwrap().create_group(def)
    }

    fn destroy_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        self.shared.core.lock().unwrap().destroy_group(name)
    }

    fn load_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        let result = self
            .shared
            .core
            .lock()
            .unwrap()
            .schedule(name, true, &self.relay);
        if result.is_ok() {
            self.shared.work_available.notify_one();
        }
        result
    }

    fn unload_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        let result = self
            .shared
            .core
            .lock()
            .unwrap()
            .schedule(name, false, &self.relay);
        if result.is_ok() {
            self.shared.work_available.notify_one();
        }
        result
    }

    #[profiling::function]
    fn update(
        &mut self,
        _delta_time: Duration,
    ) {
        {
            let mut core = self.shared.core.lock().unwrap();
            match core.state() {
                ManagerState::Running => {
                    if core.has_pending() {
                        drop(core);
                        self.shared.work_available.notify_one();
                    }
                }
                ManagerState::ShuttingDown => {
                    // The worker is already stopped; remaining steps run here
                    core.tick_shutdown(&self.relay);
                }
                ManagerState::Closed => {}
            }
        }

        self.drain_relay();
    }

    fn shutdown(&mut self) {
        {
            let mut core = self.shared.core.lock().unwrap();
            core.begin_shutdown();
        }
        // Wake the worker out of its wait and let it exit rather than start
        // new batch work; what is left drains through update ticks
        self.stop_worker();
    }

    fn state(&self) -> ManagerState {
        self.shared.core.lock().unwrap().state()
    }

    fn progress(&self) -> (u32, u32) {
        self.shared.core.lock().unwrap().progress()
    }

    fn is_group_loaded(
        &self,
        name: &str,
    ) -> bool {
        self.shared.core.lock().unwrap().is_group_loaded(name)
    }

    fn group_resource_count(
        &self,
        name: &str,
    ) -> u32 {
        self.shared.core.lock().unwrap().group_resource_count(name)
    }

    fn add_listener(
        &mut self,
        listener: Box<dyn GroupEventListener>,
    ) {
        self.listeners.push(listener);
    }
}

impl Drop for BackgroundResourceManager {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{
        group_def, EventSink, ListenerEvent, LoadLog, RecordingListener, StubFactory,
    };

    const TICK: Duration = Duration::from_millis(2);

    fn manager_with_ui_and_fonts() -> (BackgroundResourceManager, EventSink, LoadLog) {
        let log = LoadLog::default();
        let sink = EventSink::default();
        let mut manager =
            BackgroundResourceManager::new(Box::new(StubFactory::new(&log))).unwrap();
        manager.add_listener(Box::new(RecordingListener::new(&sink)));
        manager
            .create_group(&group_def("fonts", "", &[], &["sans", "serif"]))
            .unwrap();
        manager
            .create_group(&group_def("ui", "", &["fonts"], &["atlas"]))
            .unwrap();
        (manager, sink, log)
    }

    /// The worker runs on its own schedule; pump updates with a little sleep
    /// until the condition holds or the test gives up.
    fn pump_until<F: Fn() -> bool>(
        manager: &mut BackgroundResourceManager,
        done: F,
    ) {
        for _ in 0..500 {
            if done() {
                return;
            }
            manager.update(TICK);
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("worker did not finish within the deadline");
    }

    #[test]
    fn background_load_completes_through_the_relay() {
        let (mut manager, sink, log) = manager_with_ui_and_fonts();

        manager.load_group("ui").unwrap();
        let sink_for_wait = sink.clone();
        pump_until(&mut manager, move || {
            sink_for_wait.count(&ListenerEvent::LoadComplete("ui".to_string())) > 0
        });

        assert!(manager.is_group_loaded("fonts"));
        assert!(manager.is_group_loaded("ui"));
        assert_eq!(
            sink.count(&ListenerEvent::LoadComplete("ui".to_string())),
            1
        );

        // Resource order still respects the dependency closure
        assert_eq!(
            log.entries(),
            vec![
                "load:sans".to_string(),
                "load:serif".to_string(),
                "load:atlas".to_string()
            ]
        );
        assert_eq!(manager.progress(), (0, 0));
    }

    #[test]
    fn duplicate_load_is_rejected_while_in_flight() {
        let (mut manager, _sink, _log) = manager_with_ui_and_fonts();

        manager.load_group("ui").unwrap();
        // Whatever the worker has managed to do by now, a second load request
        // for the same group must not create a second batch
        assert_eq!(
            manager.load_group("ui"),
            Err(ResourceError::AlreadyExists)
        );
    }

    #[test]
    fn load_error_is_delivered_on_the_owning_thread() {
        let log = LoadLog::default();
        let sink = EventSink::default();
        let mut manager =
            BackgroundResourceManager::new(Box::new(StubFactory::new(&log))).unwrap();
        manager.add_listener(Box::new(RecordingListener::new(&sink)));

        let mut def = group_def("hud", "", &[], &[]);
        def.resources
            .push(crate::test_support::resource_entry("broken", "meter"));
        manager.create_group(&def).unwrap();

        manager.load_group("hud").unwrap();
        let sink_for_wait = sink.clone();
        pump_until(&mut manager, move || {
            sink_for_wait.count(&ListenerEvent::LoadError("hud".to_string())) > 0
        });

        assert!(!manager.is_group_loaded("hud"));
        assert_eq!(manager.progress(), (0, 0));
    }

    #[test]
    fn shutdown_reaches_closed_without_deadlocking() {
        let (mut manager, sink, _log) = manager_with_ui_and_fonts();

        manager.load_group("ui").unwrap();
        let sink_for_wait = sink.clone();
        pump_until(&mut manager, move || {
            sink_for_wait.count(&ListenerEvent::LoadComplete("ui".to_string())) > 0
        });

        manager.shutdown();
        assert_eq!(manager.state(), ManagerState::ShuttingDown);

        let mut closed = false;
        for _ in 0..500 {
            manager.update(TICK);
            if manager.state() == ManagerState::Closed {
                closed = true;
                break;
            }
        }
        assert!(closed, "shutdown never reached the closed state");
        assert_eq!(manager.group_resource_count("ui"), 0);
        assert_eq!(manager.group_resource_count("fonts"), 0);
    }

    #[test]
    fn idle_manager_drops_cleanly() {
        let (manager, _sink, _log) = manager_with_ui_and_fonts();
        // The worker is parked on the wait condition; drop must wake and join
        // it rather than hang
        drop(manager);
    }
}
