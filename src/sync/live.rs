use std::sync::Arc;

use tokio::sync::watch;

use super::Ticket;

/// Local reactive state mirrored from the backend.
///
/// Snapshots overwrite it wholesale; optimistic patches only last until the
/// next snapshot arrives.
#[derive(Debug)]
pub struct LiveState<S> {
    tx: Arc<watch::Sender<S>>,
}

impl<S> Clone for LiveState<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<S: Clone + Default> Default for LiveState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Default> LiveState<S> {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::channel(S::default()).0),
        }
    }

    pub fn get(&self) -> S {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    /// Replaces the state with an authoritative snapshot. Returns false and
    /// leaves the state alone if the ticket has gone stale.
    pub fn apply_snapshot(&self, ticket: &Ticket, value: S) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            if ticket.is_current() {
                *state = value;
                applied = true;
            }
            applied
        });
        applied
    }

    pub fn patch(&self, f: impl FnOnce(&mut S)) {
        self.tx.send_modify(f);
    }

    pub fn set(&self, value: S) {
        self.tx.send_replace(value);
    }

    pub fn reset(&self) {
        self.tx.send_replace(S::default());
    }
}

impl<T: Clone> LiveState<Vec<T>> {
    pub fn filtered(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.tx.borrow().iter().filter(|item| pred(item)).cloned().collect()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.tx.borrow().iter().find(|item| pred(item)).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}
