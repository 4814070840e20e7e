//! Batched file change notifications.
//!
//! Jobs enqueue a [`ChangeEvent`] for every entry they add, remove or move.
//! Observers drain the queue with [`ChangeQueue::flush`], which groups runs
//! of the same kind into a single notifier call while preserving the order
//! in which the events were produced.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
    Moved,
}

/// A single change to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub from: Location,
    /// Destination for moves.
    pub to: Option<Location>,
}

impl ChangeEvent {
    pub fn added(location: Location) -> Self {
        Self {
            kind: ChangeKind::Added,
            from: location,
            to: None,
        }
    }

    pub fn changed(location: Location) -> Self {
        Self {
            kind: ChangeKind::Changed,
            from: location,
            to: None,
        }
    }

    pub fn removed(location: Location) -> Self {
        Self {
            kind: ChangeKind::Removed,
            from: location,
            to: None,
        }
    }

    pub fn moved(from: Location, to: Location) -> Self {
        Self {
            kind: ChangeKind::Moved,
            from,
            to: Some(to),
        }
    }
}

/// Receives flushed change batches.
pub trait ChangeNotifier: Send + Sync {
    fn files_added(&self, files: &[Location]);
    fn files_changed(&self, files: &[Location]);
    fn files_removed(&self, files: &[Location]);
    fn files_moved(&self, moves: &[(Location, Location)]);
}

/// The batch currently being accumulated. Only one kind is open at a time.
enum Pending {
    None,
    Added(Vec<Location>),
    Changed(Vec<Location>),
    Removed(Vec<Location>),
    Moved(Vec<(Location, Location)>),
}

impl Pending {
    fn kind(&self) -> Option<ChangeKind> {
        match self {
            Self::None => None,
            Self::Added(_) => Some(ChangeKind::Added),
            Self::Changed(_) => Some(ChangeKind::Changed),
            Self::Removed(_) => Some(ChangeKind::Removed),
            Self::Moved(_) => Some(ChangeKind::Moved),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Added(v) | Self::Changed(v) | Self::Removed(v) => v.len(),
            Self::Moved(v) => v.len(),
        }
    }

    fn push(&mut self, event: ChangeEvent) {
        match (self, event.kind) {
            (Self::Added(v), ChangeKind::Added)
            | (Self::Changed(v), ChangeKind::Changed)
            | (Self::Removed(v), ChangeKind::Removed) => v.push(event.from),
            (Self::Moved(v), ChangeKind::Moved) => {
                let to = event.to.unwrap_or_else(|| event.from.clone());
                v.push((event.from, to));
            }
            (pending, kind) => {
                *pending = match kind {
                    ChangeKind::Added => Self::Added(vec![event.from]),
                    ChangeKind::Changed => Self::Changed(vec![event.from]),
                    ChangeKind::Removed => Self::Removed(vec![event.from]),
                    ChangeKind::Moved => {
                        let to = event.to.unwrap_or_else(|| event.from.clone());
                        Self::Moved(vec![(event.from, to)])
                    }
                };
            }
        }
    }

    fn deliver(&mut self, notifier: &dyn ChangeNotifier) {
        match std::mem::replace(self, Self::None) {
            Self::None => {}
            Self::Added(files) => notifier.files_added(&files),
            Self::Changed(files) => notifier.files_changed(&files),
            Self::Removed(files) => notifier.files_removed(&files),
            Self::Moved(moves) => notifier.files_moved(&moves),
        }
    }
}

/// Thread-safe FIFO of change events.
#[derive(Debug)]
pub struct ChangeQueue {
    events: Mutex<VecDeque<ChangeEvent>>,
    batch_size: usize,
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ChangeQueue {
    /// Create a queue delivering at most `batch_size` events per batch when
    /// not consuming everything.
    pub fn new(batch_size: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Append an event.
    pub fn enqueue(&self, event: ChangeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop_oldest(&self) -> Option<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Drain the queue into `notifier`.
    ///
    /// Consecutive events of one kind are delivered as one batch. A batch is
    /// cut when the kind changes, when the queue runs dry, or (unless
    /// `consume_all`) when it reaches the batch size.
    pub fn flush(&self, consume_all: bool, notifier: &dyn ChangeNotifier) {
        let mut pending = Pending::None;
        loop {
            let event = self.pop_oldest();

            let flush_needed = match &event {
                None => true,
                Some(event) => {
                    pending.kind().is_some_and(|kind| kind != event.kind)
                        || (!consume_all && pending.len() >= self.batch_size)
                }
            };
            if flush_needed {
                pending.deliver(notifier);
            }

            match event {
                Some(event) => pending.push(event),
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<(ChangeKind, usize)>>,
    }

    impl ChangeNotifier for Recorder {
        fn files_added(&self, files: &[Location]) {
            self.batches.lock().unwrap().push((ChangeKind::Added, files.len()));
        }
        fn files_changed(&self, files: &[Location]) {
            self.batches.lock().unwrap().push((ChangeKind::Changed, files.len()));
        }
        fn files_removed(&self, files: &[Location]) {
            self.batches.lock().unwrap().push((ChangeKind::Removed, files.len()));
        }
        fn files_moved(&self, moves: &[(Location, Location)]) {
            self.batches.lock().unwrap().push((ChangeKind::Moved, moves.len()));
        }
    }

    fn loc(name: &str) -> Location {
        Location::local(format!("/tmp/{name}"))
    }

    #[test]
    fn test_runs_are_grouped_by_kind() {
        let queue = ChangeQueue::default();
        queue.enqueue(ChangeEvent::added(loc("a")));
        queue.enqueue(ChangeEvent::added(loc("b")));
        queue.enqueue(ChangeEvent::removed(loc("c")));
        queue.enqueue(ChangeEvent::added(loc("d")));
        queue.enqueue(ChangeEvent::moved(loc("e"), loc("f")));

        let recorder = Recorder::default();
        queue.flush(true, &recorder);

        assert_eq!(
            *recorder.batches.lock().unwrap(),
            vec![
                (ChangeKind::Added, 2),
                (ChangeKind::Removed, 1),
                (ChangeKind::Added, 1),
                (ChangeKind::Moved, 1),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batches_are_chunked_unless_consuming_all() {
        let queue = ChangeQueue::new(20);
        for i in 0..45 {
            queue.enqueue(ChangeEvent::added(loc(&i.to_string())));
        }
        let recorder = Recorder::default();
        queue.flush(false, &recorder);
        assert_eq!(
            *recorder.batches.lock().unwrap(),
            vec![
                (ChangeKind::Added, 20),
                (ChangeKind::Added, 20),
                (ChangeKind::Added, 5),
            ]
        );

        for i in 0..45 {
            queue.enqueue(ChangeEvent::added(loc(&i.to_string())));
        }
        let recorder = Recorder::default();
        queue.flush(true, &recorder);
        assert_eq!(*recorder.batches.lock().unwrap(), vec![(ChangeKind::Added, 45)]);
    }

    #[test]
    fn test_batch_preserves_insertion_order() {
        struct Order(Mutex<Vec<Location>>);
        impl ChangeNotifier for Order {
            fn files_added(&self, files: &[Location]) {
                self.0.lock().unwrap().extend_from_slice(files);
            }
            fn files_changed(&self, _: &[Location]) {}
            fn files_removed(&self, _: &[Location]) {}
            fn files_moved(&self, _: &[(Location, Location)]) {}
        }

        let queue = ChangeQueue::default();
        for name in ["1", "2", "3"] {
            queue.enqueue(ChangeEvent::added(loc(name)));
        }
        let order = Order(Mutex::new(Vec::new()));
        queue.flush(true, &order);
        assert_eq!(*order.0.lock().unwrap(), vec![loc("1"), loc("2"), loc("3")]);
    }
}
