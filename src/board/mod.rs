//! What is drawn and placed on a campaign's maps.

use crate::backend::{BackendResult, CollectionPath, DocPath, DocumentStore, Query};

mod drawings;
pub mod map_type;
mod tokens;

pub use drawings::DrawingLayer;
pub use map_type::{GLOBAL_MAP, MapTagged};
pub use tokens::{NewToken, TokenImage, TokenLayer};

/// Every document in `collection`, read once.
async fn all_paths(db: &dyn DocumentStore, collection: CollectionPath) -> BackendResult<Vec<DocPath>> {
    Ok(db
        .query(&Query::new(collection))
        .await?
        .into_iter()
        .map(|doc| doc.path)
        .collect())
}

/// Documents in `collection` that belong to `map_type`, untagged ones
/// counting as global.
async fn paths_on_map(
    db: &dyn DocumentStore,
    collection: CollectionPath,
    map_type: &str,
) -> BackendResult<Vec<DocPath>> {
    Ok(db
        .query(&Query::new(collection))
        .await?
        .into_iter()
        .filter(|doc| doc.on_map(map_type))
        .map(|doc| doc.path)
        .collect())
}
