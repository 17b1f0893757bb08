use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

/// Permission for one pump to write into a live state.
///
/// It goes stale as soon as its subscription is restarted or closed.
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Owns zero or one running listener task for a single logical query.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    current: Arc<AtomicU64>,
    task: Mutex<Option<AbortHandle>>,
}

impl Subscription {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Cancels whatever is running and issues the ticket for its replacement.
    pub fn begin(&self) -> Ticket {
        self.close();
        Ticket {
            generation: self.current.load(Ordering::SeqCst),
            current: self.current.clone(),
        }
    }

    /// Adopts the task started for `ticket`, or aborts it if the ticket went
    /// stale while the listener was being set up.
    pub fn attach(&self, ticket: &Ticket, task: JoinHandle<()>) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if ticket.is_current() {
            if let Some(previous) = slot.replace(task.abort_handle()) {
                previous.abort();
            }
            debug!(subscription = self.name, "listening");
        } else {
            task.abort();
        }
    }

    /// Stops the listener. Safe to call any number of times.
    pub fn close(&self) {
        let previous = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.current.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = previous {
            task.abort();
            debug!(subscription = self.name, "closed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
