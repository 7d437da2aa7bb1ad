use std::time::Duration;

use quarry_base::{GroupDefinition, ResourceFactory, ResourceResult};

use crate::manager::{
    dispatch_notifications, GroupEventListener, ManagerCore, ManagerState, ResourceManager,
};
use crate::relay::CompletionRelay;

/// Single-thread variant: every batch step runs inline on the caller's
/// `update` tick, one group per tick, so no locks and no suspension anywhere.
/// The completion relay is still the path to the listeners, which keeps the
/// two variants on one state machine and one batch format.
pub struct CooperativeResourceManager {
    core: ManagerCore,
    relay: CompletionRelay,
    listeners: Vec<Box<dyn GroupEventListener>>,
}

impl CooperativeResourceManager {
    pub fn new(factory: Box<dyn ResourceFactory>) -> Self {
        CooperativeResourceManager {
            core: ManagerCore::new(factory),
            relay: CompletionRelay::new(),
            listeners: Vec::default(),
        }
    }

    fn drain_relay(&mut self) {
        let events = self.relay.drain();
        if events.is_empty() {
            return;
        }

        let mut notifications = Vec::default();
        for event in events {
            self.core.handle_event(event, &mut notifications);
        }
        dispatch_notifications(&mut self.listeners, notifications);
    }
}

impl ResourceManager for CooperativeResourceManager {
    fn create_group(
        &mut self,
        def: &GroupDefinition,
    ) -> ResourceResult<()> {
        self.core.create_group(def)
    }

    fn destroy_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        self.core.destroy_group(name)
    }

    fn load_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        self.core.schedule(name, true, &self.relay)
    }

    fn unload_group(
        &mut self,
        name: &str,
    ) -> ResourceResult<()> {
        self.core.schedule(name, false, &self.relay)
    }

    #[profiling::function]
    fn update(
        &mut self,
        _delta_time: Duration,
    ) {
        match self.core.state() {
            ManagerState::Running => {
                self.core.process_next_group(&self.relay);
            }
            ManagerState::ShuttingDown => {
                self.core.tick_shutdown(&self.relay);
            }
            ManagerState::Closed => {}
        }

        self.drain_relay();
    }

    fn shutdown(&mut self) {
        self.core.begin_shutdown();
    }

    fn state(&self) -> ManagerState {
        self.core.state()
    }

    fn progress(&self) -> (u32, u32) {
        self.core.progress()
    }

    fn is_group_loaded(
        &self,
        name: &str,
    ) -> bool {
        self.core.is_group_loaded(name)
    }

    fn group_resource_count(
        &self,
        name: &str,
    ) -> u32 {
        self.core.group_resource_count(name)
    }

    fn add_listener(
        &mut self,
        listener: Box<dyn GroupEventListener>,
    ) {
        self.listeners.push(listener);
    }
}
