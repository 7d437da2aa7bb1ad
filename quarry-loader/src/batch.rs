use std::collections::VecDeque;
use std::time::Instant;

/// One scheduled load or unload request plus its resolved dependency closure.
/// Batches live in the manager's FIFO pending list; the worker consumes one
/// group per step and the owning thread retires the batch once every group's
/// completion has been handled.
pub struct ProcessingBatch {
    root: String,
    // Dependency order (dependencies first). Load consumes from the front,
    // unload from the back so dependents unload before their dependencies.
    groups: VecDeque<String>,
    load: bool,
    start_time: Option<Instant>,
    group_total: u32,
    groups_completed: u32,
    resource_count: u32,
    processed_count: u32,
}

impl ProcessingBatch {
    pub fn new(
        root: String,
        closure: Vec<String>,
        load: bool,
        resource_count: u32,
    ) -> Self {
        let groups: VecDeque<String> = closure.into();
        let group_total = groups.len() as u32;
        ProcessingBatch {
            root,
            groups,
            load,
            start_time: None,
            group_total,
            groups_completed: 0,
            resource_count,
            processed_count: 0,
        }
    }

    /// The group name this batch was requested for.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_load(&self) -> bool {
        self.load
    }

    /// A batch that has started can no longer be cancelled.
    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn resource_count(&self) -> u32 {
        self.resource_count
    }

    /// True while the worker still has groups to take from this batch.
    pub fn has_work(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn references(
        &self,
        group: &str,
    ) -> bool {
        self.root == group || self.groups.iter().any(|g| g == group)
    }

    /// Takes the next group to process, stamping the start time on first use.
    pub(crate) fn take_next_group(&mut self) -> Option<String> {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        if self.load {
            self.groups.pop_front()
        } else {
            self.groups.pop_back()
        }
    }

    /// Drops the remaining groups after a failure so no further work is taken,
    /// leaving the batch in place until its error completion is handled.
    pub(crate) fn abandon(&mut self) {
        self.groups.clear();
    }

    /// Called on the owning thread as each group completion is handled.
    pub(crate) fn note_group_completed(
        &mut self,
        resources: u32,
    ) {
        self.groups_completed += 1;
        self.processed_count += resources;
    }

    /// All completions accounted for; safe to retire.
    pub(crate) fn is_complete(&self) -> bool {
        self.groups_completed == self.group_total
    }

    /// Resources this batch would still have processed, used to keep the
    /// global totals honest when it is abandoned or cancelled.
    pub(crate) fn remaining_resources(&self) -> u32 {
        self.resource_count - self.processed_count
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn closure() -> Vec<String> {
        vec!["base".to_string(), "mid".to_string(), "top".to_string()]
    }

    #[test]
    fn load_consumes_dependencies_first() {
        let mut batch = ProcessingBatch::new("top".to_string(), closure(), true, 3);
        assert!(!batch.has_started());
        assert_eq!(batch.take_next_group().as_deref(), Some("base"));
        assert!(batch.has_started());
        assert_eq!(batch.take_next_group().as_deref(), Some("mid"));
        assert_eq!(batch.take_next_group().as_deref(), Some("top"));
        assert_eq!(batch.take_next_group(), None);
    }

    #[test]
    fn unload_consumes_dependents_first() {
        let mut batch = ProcessingBatch::new("top".to_string(), closure(), false, 3);
        assert_eq!(batch.take_next_group().as_deref(), Some("top"));
        assert_eq!(batch.take_next_group().as_deref(), Some("mid"));
        assert_eq!(batch.take_next_group().as_deref(), Some("base"));
    }

    #[test]
    fn completion_accounting() {
        let mut batch = ProcessingBatch::new("top".to_string(), closure(), true, 6);
        batch.take_next_group();
        batch.note_group_completed(2);
        assert!(!batch.is_complete());
        assert_eq!(batch.remaining_resources(), 4);

        batch.take_next_group();
        batch.abandon();
        assert!(!batch.has_work());
        // The abandoned groups were never completed
        assert!(!batch.is_complete());
        assert_eq!(batch.remaining_resources(), 4);
    }

    #[test]
    fn references_sees_root_and_pending_groups() {
        let mut batch = ProcessingBatch::new("top".to_string(), closure(), true, 3);
        assert!(batch.references("base"));
        batch.take_next_group();
        assert!(!batch.references("base"));
        assert!(batch.references("top"));
    }
}
