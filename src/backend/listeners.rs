use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{BackendResult, CollectionPath, DocPath, Document, Listener, Query};

type Tx<T> = mpsc::UnboundedSender<BackendResult<T>>;

#[derive(Debug, Clone)]
pub(crate) enum Watch {
    Doc(DocPath, Tx<Option<Document>>),
    Query(Query, Tx<Vec<Document>>),
}

impl Watch {
    fn is_closed(&self) -> bool {
        match self {
            Watch::Doc(_, tx) => tx.is_closed(),
            Watch::Query(_, tx) => tx.is_closed(),
        }
    }

    fn touched_by(&self, collection: &CollectionPath, ids: &[String]) -> bool {
        match self {
            Watch::Doc(path, _) => path.collection == *collection && ids.contains(&path.id),
            Watch::Query(query, _) => query.collection() == collection,
        }
    }
}

/// Registry of open live queries.
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    watches: Mutex<Vec<Watch>>,
}

impl Listeners {
    pub(crate) fn doc(&self, path: DocPath) -> (Tx<Option<Document>>, Listener<Option<Document>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Watch::Doc(path, tx.clone()));
        (tx, Listener::new(rx))
    }

    pub(crate) fn query(&self, query: Query) -> (Tx<Vec<Document>>, Listener<Vec<Document>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Watch::Query(query, tx.clone()));
        (tx, Listener::new(rx))
    }

    fn push(&self, watch: Watch) {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watch);
    }

    /// Live queries that must be re-evaluated after a write to `ids` in
    /// `collection`. Cancelled listeners are pruned on the way.
    pub(crate) fn affected(&self, collection: &CollectionPath, ids: &[String]) -> Vec<Watch> {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        watches.retain(|watch| !watch.is_closed());
        watches
            .iter()
            .filter(|watch| watch.touched_by(collection, ids))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        watches.retain(|watch| !watch.is_closed());
        watches.len()
    }
}
