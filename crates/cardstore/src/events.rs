use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::card::Card;

/// Notifications produced by mutating operations for downstream collaborators.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// Cards were instantiated from a template.
    Created { cards: Vec<Card> },
    /// The project key prefix changed.
    Renamed { project_path: PathBuf },
}

impl StoreEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::Created { .. } => "created",
            StoreEvent::Renamed { .. } => "renamed",
        }
    }
}

/// Caller-supplied consumer for store events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: StoreEvent);
}

/// Discards every event.
#[derive(Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: StoreEvent) {}
}

/// Logs each event through `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: StoreEvent) {
        match &event {
            StoreEvent::Created { cards } => {
                tracing::info!(kind = event.kind(), cards = cards.len(), "store event");
            }
            StoreEvent::Renamed { project_path } => {
                tracing::info!(kind = event.kind(), project = %project_path.display(), "store event");
            }
        }
    }
}

/// Work queue drained by the caller.
#[derive(Default)]
pub struct EventQueue {
    pending: Mutex<VecDeque<StoreEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<StoreEvent> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl EventSink for EventQueue {
    fn publish(&self, event: StoreEvent) {
        self.pending.lock().push_back(event);
    }
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn publish(&self, event: StoreEvent) {
        (**self).publish(event)
    }
}
