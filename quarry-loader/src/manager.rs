use std::collections::VecDeque;
use std::time::Duration;

use quarry_base::hashing::HashMap;
use quarry_base::{GroupDefinition, ResourceError, ResourceFactory, ResourceResult};

use crate::batch::ProcessingBatch;
use crate::group::ResourceGroup;
use crate::relay::{CompletionRelay, EmissionRequest, RelayEvent};
use crate::resolver::resolve_closure;

/// Lifecycle of a manager instance. `Running` accepts work; `ShuttingDown`
/// unloads and destroys groups across update ticks; `Closed` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ManagerState {
    Running,
    ShuttingDown,
    Closed,
}

/// Callbacks delivered from `update` on the owning thread, never from the
/// worker. Implement the ones you care about.
pub trait GroupEventListener {
    fn on_group_load_complete(
        &mut self,
        _group: &str,
    ) {
    }

    fn on_group_load_error(
        &mut self,
        _group: &str,
    ) {
    }

    fn on_group_unload_complete(
        &mut self,
        _group: &str,
    ) {
    }

    fn on_processing_status_updated(
        &mut self,
        _processed: u32,
        _total: u32,
    ) {
    }
}

/// The scheduling interface shared by the cooperative and background
/// variants. Both run the same state machine and batch format; they differ
/// only in where batch steps execute.
pub trait ResourceManager {
    /// Registers a group from a parsed definition. Redefining an existing
    /// group routes through its override path.
    fn create_group(
        &mut self,
        def: &GroupDefinition,
    ) -> ResourceResult<()>;

    /// Removes a group from the table. Refused while the group is loaded or
    /// referenced by a pending batch.
    fn destroy_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()>;

    /// Queues a load of `name` and everything it depends on. A pending unload
    /// of the same group that has not started yet is cancelled instead, and
    /// the call succeeds without queueing anything.
    fn load_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()>;

    /// Queues an unload of `name`; dependents in the closure unload first.
    fn unload_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()>;

    /// Must be called once per engine tick by the owning subsystem. Makes
    /// progress on pending work and delivers listener notifications.
    fn update(
        &mut self,
        delta_time: Duration,
    );

    /// Begins cooperative shutdown; `update` keeps ticking until `state`
    /// reaches `Closed`.
    fn shutdown(&mut self);

    fn state(&self) -> ManagerState;

    /// (processed, total) resource counts of the work queued since the
    /// pending list was last empty.
    fn progress(&self) -> (u32, u32);

    fn is_group_loaded(
        &self,
        name: &str,
    ) -> bool;

    fn group_resource_count(
        &self,
        name: &str,
    ) -> u32;

    fn add_listener(
        &mut self,
        listener: Box<dyn GroupEventListener>,
    );
}

/// Listener calls queued up while the manager's exclusive section is held,
/// fired only after it is released.
#[derive(Debug)]
pub(crate) enum Notification {
    LoadComplete(String),
    LoadError(String),
    UnloadComplete(String),
    Status(u32, u32),
}

pub(crate) fn dispatch_notifications(
    listeners: &mut [Box<dyn GroupEventListener>],
    notifications: Vec<Notification>,
) {
    for notification in notifications {
        for listener in listeners.iter_mut() {
            match &notification {
                Notification::LoadComplete(group) => listener.on_group_load_complete(group),
                Notification::LoadError(group) => listener.on_group_load_error(group),
                Notification::UnloadComplete(group) => listener.on_group_unload_complete(group),
                Notification::Status(processed, total) => {
                    listener.on_processing_status_updated(*processed, *total)
                }
            }
        }
    }
}

fn emission(
    load: bool,
    group: String,
    result: ResourceResult<()>,
) -> EmissionRequest {
    if load {
        EmissionRequest::GroupLoaded {
            group,
            result,
        }
    } else {
        EmissionRequest::GroupUnloaded {
            group,
            result,
        }
    }
}

/// Group table, pending-batch list, progress counters and lifecycle state.
/// The cooperative manager owns one directly; the background manager keeps one
/// behind its mutex, and every method here assumes the caller already has
/// exclusive access.
pub(crate) struct ManagerCore {
    factory: Box<dyn ResourceFactory>,
    groups: HashMap<String, ResourceGroup>,
    pending: VecDeque<ProcessingBatch>,
    total_resources_to_process: u32,
    processed_resources_count: u32,
    state: ManagerState,
    // Read by the background worker's wait predicate, under the same lock as
    // everything else in the core. Unused by the cooperative variant.
    pub(crate) stop_worker: bool,
}

impl ManagerCore {
    pub(crate) fn new(factory: Box<dyn ResourceFactory>) -> Self {
        ManagerCore {
            factory,
            groups: HashMap::default(),
            pending: VecDeque::default(),
            total_resources_to_process: 0,
            processed_resources_count: 0,
            state: ManagerState::Running,
            stop_worker: false,
        }
    }

    pub(crate) fn state(&self) -> ManagerState {
        self.state
    }

    pub(crate) fn progress(&self) -> (u32, u32) {
        (
            self.processed_resources_count,
            self.total_resources_to_process,
        )
    }

    pub(crate) fn is_group_loaded(
        &self,
        name: &str,
    ) -> bool {
        self.groups.get(name).map(|g| g.is_loaded()).unwrap_or(false)
    }

    pub(crate) fn group_resource_count(
        &self,
        name: &str,
    ) -> u32 {
        self.groups
            .get(name)
            .map(|g| g.resource_count())
            .unwrap_or(0)
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True while the front batch still has groups the worker can take. A
    /// fully-taken batch waits for the owning thread to drain its completions
    /// before the next batch becomes actionable.
    pub(crate) fn has_actionable_work(&self) -> bool {
        self.pending.front().map(|b| b.has_work()).unwrap_or(false)
    }

    pub(crate) fn create_group(
        &mut self,
        def: &GroupDefinition,
    ) -> ResourceResult<()> {
        if self.state != ManagerState::Running {
            log::warn!("cannot create group {} while {:?}", def.name, self.state);
            return Err(ResourceError::NotSupported);
        }

        let group = ResourceGroup::from_definition(def, self.factory.as_ref())?;
        match self.groups.get_mut(&def.name) {
            Some(existing) => {
                log::debug!("group {} redefined, taking the override path", def.name);
                existing.override_by(group)
            }
            None => {
                log::info!(
                    "registered group {} ({} resources)",
                    def.name,
                    group.resource_count()
                );
                self.groups.insert(def.name.clone(), group);
                Ok(())
            }
        }
    }

    pub(crate) fn destroy_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        let group = self.groups.get(name).ok_or(ResourceError::NotFound)?;
        if group.is_loaded() {
            log::warn!("group {} must unload before it can be destroyed", name);
            return Err(ResourceError::NotSupported);
        }
        if self.pending.iter().any(|b| b.references(name)) {
            log::warn!(
                "group {} is referenced by a pending batch and cannot be destroyed",
                name
            );
            return Err(ResourceError::NotSupported);
        }

        self.groups.remove(name);
        log::info!("destroyed group {}", name);
        Ok(())
    }

    /// Single critical section covering the pending-list scan, mutation and
    /// counter update, so concurrent callers can never race two batches for
    /// the same group into existence.
    pub(crate) fn schedule(
        &mut self,
        name: &str,
        load: bool,
        relay: &CompletionRelay,
    ) -> ResourceResult<()> {
        if self.state != ManagerState::Running {
            log::warn!("cannot schedule group {} while {:?}", name, self.state);
            return Err(ResourceError::NotSupported);
        }

        let direction = if load { "load" } else { "unload" };

        if let Some(index) = self.pending.iter().position(|b| b.root() == name) {
            if self.pending[index].is_load() == load {
                log::warn!("group {} already has a pending {} batch", name, direction);
                return Err(ResourceError::AlreadyExists);
            }
            if self.pending[index].has_started() {
                // Too late to cancel, the worker is already in this batch
                log::warn!(
                    "group {} has a started batch in the opposite direction, {} rejected",
                    name,
                    direction
                );
                return Err(ResourceError::AlreadyExists);
            }

            // Opposite direction, not yet started: the two requests cancel out
            let cancelled = self.pending.remove(index).unwrap();
            self.total_resources_to_process -= cancelled.resource_count();
            self.reset_counters_if_idle();
            log::info!(
                "{} of group {} cancelled its pending opposite batch instead of queueing",
                direction,
                name
            );
            return Ok(());
        }

        let closure = match resolve_closure(&self.groups, name) {
            Ok(closure) => closure,
            Err(e) => {
                // Also reported through the notification path so callers that
                // only watch listener events see the failure (the batch that
                // would have carried it never exists)
                relay.post(RelayEvent {
                    emission: emission(load, name.to_string(), Err(e)),
                    batch_step: false,
                });
                return Err(e);
            }
        };

        let resource_count = closure
            .iter()
            .map(|g| self.group_resource_count(g))
            .sum::<u32>();

        log::debug!(
            "queued {} batch for group {}: {} groups, {} resources",
            direction,
            name,
            closure.len(),
            resource_count
        );
        self.pending
            .push_back(ProcessingBatch::new(name.to_string(), closure, load, resource_count));
        self.total_resources_to_process += resource_count;
        Ok(())
    }

    /// One batch step: take the next group of the front batch and drive its
    /// load or unload. Returns false when there is nothing actionable. In the
    /// background variant this runs on the worker with the core lock held.
    pub(crate) fn process_next_group(
        &mut self,
        relay: &CompletionRelay,
    ) -> bool {
        let (load, group_name) = {
            let batch = match self.pending.front_mut() {
                Some(batch) if batch.has_work() => batch,
                _ => return false,
            };
            let load = batch.is_load();
            (load, batch.take_next_group().unwrap())
        };

        log::trace!(
            "processing {} of group {}",
            if load { "load" } else { "unload" },
            group_name
        );

        let result = match self.groups.get_mut(&group_name) {
            None => {
                log::warn!("group {} vanished before its batch ran", group_name);
                Err(ResourceError::NotFound)
            }
            Some(group) => {
                if load {
                    group.load()
                } else {
                    group.unload()
                }
            }
        };

        let result = match result {
            // Already in the desired state is completion, not failure
            Err(ResourceError::AlreadyExists) => {
                log::debug!("group {} was already in the desired state", group_name);
                Ok(())
            }
            other => other,
        };

        if result.is_err() {
            // Stop taking groups from this batch; it is retired when the
            // error completion is handled on the owning thread
            self.pending.front_mut().unwrap().abandon();
        }

        relay.post(RelayEvent {
            emission: emission(load, group_name, result),
            batch_step: true,
        });
        true
    }

    /// Owning-thread half of the completion protocol: progress counters,
    /// batch retirement and the listener calls to fire once the exclusive
    /// section is released.
    pub(crate) fn handle_event(
        &mut self,
        event: RelayEvent,
        notifications: &mut Vec<Notification>,
    ) {
        let group = event.emission.group().to_string();
        let result = event.emission.result();
        let is_load = event.emission.is_load();

        if !event.batch_step {
            // A request that failed before any batch was created
            notifications.push(Notification::LoadError(group));
            return;
        }

        let batch = match self.pending.front_mut() {
            Some(batch) => batch,
            None => {
                log::error!("completion for group {} with no batch in flight", group);
                return;
            }
        };

        match result {
            Ok(()) => {
                let resources = self
                    .groups
                    .get(&group)
                    .map(|g| g.resource_count())
                    .unwrap_or(0);
                batch.note_group_completed(resources);
                self.processed_resources_count += resources;

                let finished = batch.is_complete();
                if finished {
                    if let Some(start_time) = batch.start_time() {
                        log::debug!(
                            "batch for group {} finished in {:?}",
                            batch.root(),
                            start_time.elapsed()
                        );
                    }
                }

                notifications.push(if is_load {
                    Notification::LoadComplete(group)
                } else {
                    Notification::UnloadComplete(group)
                });
                notifications.push(Notification::Status(
                    self.processed_resources_count,
                    self.total_resources_to_process,
                ));

                if finished {
                    self.pending.pop_front();
                    self.reset_counters_if_idle();
                }
            }
            Err(e) => {
                log::warn!("batch for group {} abandoned: {:?}", batch.root(), e);
                self.total_resources_to_process -= batch.remaining_resources();

                notifications.push(Notification::LoadError(group));
                notifications.push(Notification::Status(
                    self.processed_resources_count,
                    self.total_resources_to_process,
                ));

                self.pending.pop_front();
                self.reset_counters_if_idle();
            }
        }
    }

    pub(crate) fn begin_shutdown(&mut self) {
        if self.state == ManagerState::Running {
            log::info!(
                "resource manager shutting down, {} groups in the table",
                self.groups.len()
            );
            self.state = ManagerState::ShuttingDown;
        }
    }

    /// One shutdown tick: queue unloads for whatever is still loaded, drive
    /// every actionable step inline, and close once the table is empty. The
    /// owning thread calls this from `update` until the state reaches
    /// `Closed`.
    pub(crate) fn tick_shutdown(
        &mut self,
        relay: &CompletionRelay,
    ) {
        if self.state != ManagerState::ShuttingDown {
            return;
        }

        if self.pending.is_empty() {
            let loaded: Vec<String> = self
                .groups
                .values()
                .filter(|g| g.is_loaded())
                .map(|g| g.name().to_string())
                .collect();

            if loaded.is_empty() {
                let destroyed = self.groups.len();
                self.groups.clear();
                self.state = ManagerState::Closed;
                log::info!("resource manager closed, destroyed {} groups", destroyed);
                return;
            }

            for name in loaded {
                // A dangling dependency must not wedge the shutdown; fall
                // back to unloading the group by itself
                let closure = resolve_closure(&self.groups, &name).unwrap_or_else(|e| {
                    log::warn!("shutdown unload of {} without its closure: {:?}", name, e);
                    vec![name.clone()]
                });
                let resource_count = closure
                    .iter()
                    .map(|g| self.group_resource_count(g))
                    .sum::<u32>();
                self.pending.push_back(ProcessingBatch::new(
                    name.clone(),
                    closure,
                    false,
                    resource_count,
                ));
                self.total_resources_to_process += resource_count;
            }
        }

        while self.process_next_group(relay) {}
    }

    fn reset_counters_if_idle(&mut self) {
        if self.pending.is_empty()
            && (self.total_resources_to_process != 0 || self.processed_resources_count != 0)
        {
            log::debug!(
                "pending list drained, {} resources processed",
                self.processed_resources_count
            );
            self.total_resources_to_process = 0;
            self.processed_resources_count = 0;
        }
    }
}
