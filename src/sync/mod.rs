//! The one pattern every store shares: mirror a backend live query into
//! local reactive state, with at most one listener per logical query.

mod live;
mod status;
mod subscription;

use tracing::{debug, warn};

pub use live::LiveState;
pub use status::StoreStatus;
pub use subscription::{Subscription, Ticket};

use crate::{
    AppError, AppResult,
    backend::{DocPath, Document, DocumentStore, Listener, Query, Record},
};

/// Drives `listener` into `state` until the ticket goes stale or the backend
/// reports an error. Errors are recorded, never retried, and the state keeps
/// its last snapshot.
fn spawn_pump<T, S, F>(
    mut listener: Listener<T>,
    ticket: Ticket,
    state: LiveState<S>,
    status: StoreStatus,
    label: &'static str,
    decode: F,
) -> tokio::task::JoinHandle<()>
where
    T: Send + 'static,
    S: Clone + Default + Send + Sync + 'static,
    F: Fn(T) -> Option<S> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = listener.next().await {
            match event {
                Ok(snapshot) => {
                    let Some(value) = decode(snapshot) else {
                        continue;
                    };
                    if !state.apply_snapshot(&ticket, value) {
                        debug!(label, "dropping snapshot from a closed subscription");
                        break;
                    }
                }
                Err(err) => {
                    if ticket.is_current() {
                        status.record(label, &AppError::from(err));
                    }
                    break;
                }
            }
        }
    })
}

/// Decodes a snapshot, skipping documents that do not fit `R`.
pub(crate) fn decode_all<R: Record>(docs: Vec<Document>) -> Vec<R> {
    docs.iter()
        .filter_map(|doc| match doc.decode_record() {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("skipping {err}");
                None
            }
        })
        .collect()
}

/// (Re)starts `subscription` as a live query feeding `state`.
pub(crate) async fn subscribe_query<R: Record>(
    db: &dyn DocumentStore,
    subscription: &Subscription,
    query: Query,
    state: &LiveState<Vec<R>>,
    status: &StoreStatus,
    label: &'static str,
) -> AppResult<()> {
    let ticket = subscription.begin();
    let listener = match db.listen_query(&query).await {
        Ok(listener) => listener,
        Err(err) => {
            let err = AppError::from(err);
            status.record(label, &err);
            return Err(err);
        }
    };
    let task = spawn_pump(
        listener,
        ticket.clone(),
        state.clone(),
        status.clone(),
        label,
        |docs| Some(decode_all(docs)),
    );
    subscription.attach(&ticket, task);
    Ok(())
}

/// (Re)starts `subscription` on a single document. Snapshots of a missing
/// document leave the state untouched.
pub(crate) async fn subscribe_doc<R>(
    db: &dyn DocumentStore,
    subscription: &Subscription,
    path: &DocPath,
    state: &LiveState<Option<R>>,
    status: &StoreStatus,
    label: &'static str,
) -> AppResult<()>
where
    R: serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
{
    let ticket = subscription.begin();
    let listener = match db.listen_doc(path).await {
        Ok(listener) => listener,
        Err(err) => {
            let err = AppError::from(err);
            status.record(label, &err);
            return Err(err);
        }
    };
    let task = spawn_pump(
        listener,
        ticket.clone(),
        state.clone(),
        status.clone(),
        label,
        |doc: Option<Document>| match doc?.decode::<R>() {
            Ok(value) => Some(Some(value)),
            Err(err) => {
                warn!("skipping {err}");
                None
            }
        },
    );
    subscription.attach(&ticket, task);
    Ok(())
}
