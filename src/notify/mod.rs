//! Structural change notifications.
//!
//! Listeners are called synchronously, in subscription order, on the thread that performs
//! the change. `before_change` always precedes the mutation and `after_change` always
//! follows it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use parking_lot::RwLock;

use crate::vfs::FileRef;
use crate::view::Directory;

/// What changed.
#[derive(Debug, Clone)]
pub enum ChangePayload {
    /// The meaning of file types changed: table reload, substitution or mode change.
    FileTypes,
    /// Children of a cached directory changed.
    ChildrenChanged { parent: Arc<Directory> },
    /// The view of a file without a cached parent was dropped.
    UnloadedView { file: FileRef },
    /// A file's content was reloaded from the backing store.
    ContentReloaded { file: FileRef },
    /// A deleted or moved subtree was evicted.
    SubtreeRemoved { root: FileRef },
}

impl ChangePayload {
    pub fn name(&self) -> &'static str {
        match self {
            ChangePayload::FileTypes => "file_types",
            ChangePayload::ChildrenChanged { .. } => "children_changed",
            ChangePayload::UnloadedView { .. } => "unloaded_view",
            ChangePayload::ContentReloaded { .. } => "content_reloaded",
            ChangePayload::SubtreeRemoved { .. } => "subtree_removed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangePhase {
    Before,
    After,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub phase: ChangePhase,
    pub payload: ChangePayload,
    pub at: DateTime<Utc>,
}

#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait StructureListener: Send + Sync {
    fn before_change(&self, event: &ChangeEvent);
    fn after_change(&self, event: &ChangeEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered listener list.
#[derive(Default)]
pub struct NotificationHub {
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn StructureListener>)>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StructureListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn fire_before(&self, payload: ChangePayload) -> ChangeEvent {
        let event = ChangeEvent { phase: ChangePhase::Before, payload, at: Utc::now() };
        for listener in self.snapshot() {
            listener.before_change(&event);
        }
        event
    }

    pub fn fire_after(&self, payload: ChangePayload) -> ChangeEvent {
        let event = ChangeEvent { phase: ChangePhase::After, payload, at: Utc::now() };
        for listener in self.snapshot() {
            listener.after_change(&event);
        }
        event
    }

    // Listeners may subscribe or unsubscribe while being notified.
    fn snapshot(&self) -> Vec<Arc<dyn StructureListener>> {
        self.listeners.read().iter().map(|(_, listener)| listener.clone()).collect()
    }
}

/// Listener that records every event, in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: parking_lot::Mutex<Vec<(ChangePhase, &'static str)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(phase, payload name)` pairs seen so far.
    pub fn events(&self) -> Vec<(ChangePhase, &'static str)> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl StructureListener for RecordingListener {
    fn before_change(&self, event: &ChangeEvent) {
        self.events.lock().push((event.phase, event.payload.name()));
    }

    fn after_change(&self, event: &ChangeEvent) {
        self.events.lock().push((event.phase, event.payload.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_before_and_after_order() {
        let hub = NotificationHub::new();
        let mut listener = MockStructureListener::new();
        let mut seq = Sequence::new();
        listener
            .expect_before_change()
            .withf(|event| event.phase == ChangePhase::Before)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        listener
            .expect_after_change()
            .withf(|event| event.phase == ChangePhase::After)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        hub.subscribe(Arc::new(listener));

        hub.fire_before(ChangePayload::FileTypes);
        hub.fire_after(ChangePayload::FileTypes);
    }

    #[test]
    fn test_listeners_called_in_subscription_order() {
        let hub = NotificationHub::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for index in 0..3 {
            let mut listener = MockStructureListener::new();
            let log = log.clone();
            listener.expect_before_change().returning(move |_| log.lock().push(index));
            listener.expect_after_change().return_const(());
            hub.subscribe(Arc::new(listener));
        }

        hub.fire_before(ChangePayload::FileTypes);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = NotificationHub::new();
        let recorder = Arc::new(RecordingListener::new());
        let id = hub.subscribe(recorder.clone());

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.fire_before(ChangePayload::FileTypes);

        assert!(recorder.events().is_empty());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_recording_listener() {
        let hub = NotificationHub::new();
        let recorder = Arc::new(RecordingListener::new());
        hub.subscribe(recorder.clone());

        hub.fire_before(ChangePayload::FileTypes);
        hub.fire_after(ChangePayload::FileTypes);

        assert_eq!(
            recorder.events(),
            vec![(ChangePhase::Before, "file_types"), (ChangePhase::After, "file_types")]
        );
    }
}
