use std::any::Any;
use std::sync::{Arc, Mutex};

use quarry_base::{
    AttributeMap, GroupDefinition, ResourceData, ResourceDefinition, ResourceError,
    ResourceFactory, ResourceLookup, ResourceResult,
};

use crate::manager::GroupEventListener;

/// Shared journal the stub resources write into, so tests can assert on the
/// exact order load/unload calls happened in.
#[derive(Default, Clone)]
pub(crate) struct LoadLog(Arc<Mutex<Vec<String>>>);

impl LoadLog {
    pub fn push(
        &self,
        entry: String,
    ) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

enum StubMode {
    Normal,
    FailLoad,
    NeedsSibling,
}

struct StubResource {
    label: String,
    mode: StubMode,
    log: LoadLog,
}

impl ResourceData for StubResource {
    fn load(
        &mut self,
        siblings: &dyn ResourceLookup,
    ) -> ResourceResult<()> {
        match self.mode {
            StubMode::FailLoad => {
                self.log.push(format!("load_failed:{}", self.label));
                Err(ResourceError::NotFound)
            }
            StubMode::NeedsSibling => {
                if siblings.find("stub", "dep").is_some() {
                    self.log.push(format!("sibling_visible:{}", self.label));
                }
                self.log.push(format!("load:{}", self.label));
                Ok(())
            }
            StubMode::Normal => {
                self.log.push(format!("load:{}", self.label));
                Ok(())
            }
        }
    }

    fn unload(&mut self) {
        self.log.push(format!("unload:{}", self.label));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory producing journaling stub resources. Type name "broken" makes a
/// resource whose load always fails, "needs_sibling" one that records whether
/// the stub resource named "dep" was visible while it loaded.
pub(crate) struct StubFactory {
    log: LoadLog,
}

impl StubFactory {
    pub fn new(log: &LoadLog) -> Self {
        StubFactory {
            log: log.clone(),
        }
    }
}

impl ResourceFactory for StubFactory {
    fn create_resource(
        &self,
        type_name: &str,
        attributes: &AttributeMap,
    ) -> ResourceResult<Box<dyn ResourceData>> {
        let label = attributes
            .get("name")
            .cloned()
            .ok_or(ResourceError::BadParam)?;
        let mode = match type_name {
            "broken" => StubMode::FailLoad,
            "needs_sibling" => StubMode::NeedsSibling,
            _ => StubMode::Normal,
        };
        Ok(Box::new(StubResource {
            label,
            mode,
            log: self.log.clone(),
        }))
    }
}

pub(crate) fn resource_entry(
    type_name: &str,
    name: &str,
) -> ResourceDefinition {
    let mut attributes = AttributeMap::default();
    attributes.insert("name".to_string(), name.to_string());
    ResourceDefinition {
        type_name: type_name.to_string(),
        attributes,
    }
}

pub(crate) fn group_def(
    name: &str,
    path: &str,
    dependencies: &[&str],
    resource_names: &[&str],
) -> GroupDefinition {
    GroupDefinition {
        name: name.to_string(),
        path: path.to_string(),
        overridable: false,
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        resources: resource_names
            .iter()
            .map(|n| resource_entry("stub", n))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListenerEvent {
    LoadComplete(String),
    LoadError(String),
    UnloadComplete(String),
    Status(u32, u32),
}

/// Shared event journal for listener callbacks.
#[derive(Default, Clone)]
pub(crate) struct EventSink(Arc<Mutex<Vec<ListenerEvent>>>);

impl EventSink {
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(
        &self,
        event: &ListenerEvent,
    ) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

pub(crate) struct RecordingListener {
    sink: EventSink,
}

impl RecordingListener {
    pub fn new(sink: &EventSink) -> Self {
        RecordingListener {
            sink: sink.clone(),
        }
    }
}

impl GroupEventListener for RecordingListener {
    fn on_group_load_complete(
        &mut self,
        group: &str,
    ) {
        self.sink
            .0
            .lock()
            .unwrap()
            .push(ListenerEvent::LoadComplete(group.to_string()));
    }

    fn on_group_load_error(
        &mut self,
        group: &str,
    ) {
        self.sink
            .0
            .lock()
            .unwrap()
            .push(ListenerEvent::LoadError(group.to_string()));
    }

    fn on_group_unload_complete(
        &mut self,
        group: &str,
    ) {
        self.sink
            .0
            .lock()
            .unwrap()
            .push(ListenerEvent::UnloadComplete(group.to_string()));
    }

    fn on_processing_status_updated(
        &mut self,
        processed: u32,
        total: u32,
    ) {
        self.sink
            .0
            .lock()
            .unwrap()
            .push(ListenerEvent::Status(processed, total));
    }
}
