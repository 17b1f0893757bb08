use std::{future::Future, sync::Arc};

use tokio::sync::watch;
use tracing::warn;

use crate::{AppError, AppResult};

#[derive(Debug)]
struct Inner {
    store: &'static str,
    loading: watch::Sender<bool>,
    error: watch::Sender<Option<String>>,
}

/// Busy flag and last-error slot shared by a store and its listener tasks.
#[derive(Debug, Clone)]
pub struct StoreStatus(Arc<Inner>);

/// Clears the busy flag however the operation ends, cancellation included.
struct Busy<'a>(&'a watch::Sender<bool>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl StoreStatus {
    pub fn new(store: &'static str) -> Self {
        Self(Arc::new(Inner {
            store,
            loading: watch::channel(false).0,
            error: watch::channel(None).0,
        }))
    }

    pub fn is_loading(&self) -> bool {
        *self.0.loading.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.0.error.borrow().clone()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.0.loading.subscribe()
    }

    pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.0.error.subscribe()
    }

    pub fn clear_error(&self) {
        self.0.error.send_replace(None);
    }

    pub fn record(&self, op: &str, err: &AppError) {
        warn!(store = self.0.store, op, "{err}");
        self.0.error.send_replace(Some(err.to_string()));
    }

    /// Runs one store operation: resets the error slot, marks the store busy,
    /// and records any failure before handing it back to the caller.
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.0.error.send_replace(None);
        self.0.loading.send_replace(true);
        let _busy = Busy(&self.0.loading);

        let result = fut.await;
        if let Err(err) = &result {
            self.record(op, err);
        }
        result
    }
}
