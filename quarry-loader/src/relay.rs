use crossbeam_channel::{Receiver, Sender};
use quarry_base::ResourceResult;

/// Outcome of one group inside a batch, produced by the worker executor and
/// consumed exactly once by the thread that owns the manager.
#[derive(Debug)]
pub enum EmissionRequest {
    GroupLoaded {
        group: String,
        result: ResourceResult<()>,
    },
    GroupUnloaded {
        group: String,
        result: ResourceResult<()>,
    },
}

impl EmissionRequest {
    pub fn group(&self) -> &str {
        match self {
            EmissionRequest::GroupLoaded { group, .. } => group,
            EmissionRequest::GroupUnloaded { group, .. } => group,
        }
    }

    pub fn result(&self) -> ResourceResult<()> {
        match self {
            EmissionRequest::GroupLoaded { result, .. } => *result,
            EmissionRequest::GroupUnloaded { result, .. } => *result,
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self, EmissionRequest::GroupLoaded { .. })
    }
}

/// What the relay actually carries: the emission plus whether it came out of
/// batch execution. Scheduling failures post emissions too, but those have no
/// batch behind them to retire.
#[derive(Debug)]
pub(crate) struct RelayEvent {
    pub emission: EmissionRequest,
    pub batch_step: bool,
}

/// Hand-off queue between the worker executor and the owning thread. Posting
/// never blocks the producer; draining moves everything queued so far onto the
/// caller's stack so listener dispatch happens single-threaded, in FIFO order.
///
/// Deliberately separate from the manager's own lock so a worker mid-emission
/// never stalls the owning thread's scheduling calls.
pub struct CompletionRelay {
    tx: Sender<RelayEvent>,
    rx: Receiver<RelayEvent>,
}

impl CompletionRelay {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        CompletionRelay {
            tx,
            rx,
        }
    }

    pub(crate) fn post(
        &self,
        event: RelayEvent,
    ) {
        log::trace!("relay {:?}", event);
        // The relay owns both ends, the channel cannot be disconnected
        self.tx.send(event).unwrap();
    }

    pub(crate) fn drain(&self) -> Vec<RelayEvent> {
        let mut events = Vec::default();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn loaded(group: &str) -> RelayEvent {
        RelayEvent {
            emission: EmissionRequest::GroupLoaded {
                group: group.to_string(),
                result: Ok(()),
            },
            batch_step: true,
        }
    }

    #[test]
    fn drain_is_fifo_and_empties_the_queue() {
        let relay = CompletionRelay::new();
        relay.post(loaded("a"));
        relay.post(loaded("b"));
        relay.post(loaded("c"));

        let drained = relay.drain();
        let names: Vec<&str> = drained.iter().map(|e| e.emission.group()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert!(relay.drain().is_empty());
    }

    #[test]
    fn posts_from_another_thread_arrive() {
        let relay = std::sync::Arc::new(CompletionRelay::new());
        let producer = relay.clone();
        std::thread::spawn(move || {
            producer.post(loaded("background"));
        })
        .join()
        .unwrap();

        let drained = relay.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].emission.group(), "background");
    }
}
