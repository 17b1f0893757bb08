use std::sync::Arc;

use tracing::info;

use super::{MapTagged, all_paths, paths_on_map};
use crate::{
    AppResult,
    auth::Teardown,
    backend::{CollectionPath, DocWrite, DocumentStore, Fields, Query},
    db::{Drawing, TextNote, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

fn drawings_of(campaign_id: &str) -> CollectionPath {
    CollectionPath::campaign(campaign_id, "drawings")
}

fn texts_of(campaign_id: &str) -> CollectionPath {
    CollectionPath::campaign(campaign_id, "texts")
}

fn authored(payload: Fields, author: &UserId) -> DocWrite {
    DocWrite::new()
        .merge(payload)
        .set("userId", author)
        .server_timestamp("createdAt")
}

/// Freehand lines, shapes and text labels drawn over the maps.
pub struct DrawingLayer {
    db: Arc<dyn DocumentStore>,
    drawings: LiveState<Vec<Drawing>>,
    texts: LiveState<Vec<TextNote>>,
    campaign_id: LiveState<Option<String>>,
    drawings_sub: Subscription,
    texts_sub: Subscription,
    status: StoreStatus,
}

impl DrawingLayer {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            drawings: LiveState::new(),
            texts: LiveState::new(),
            campaign_id: LiveState::new(),
            drawings_sub: Subscription::new("drawings"),
            texts_sub: Subscription::new("texts"),
            status: StoreStatus::new("drawings"),
        }
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn drawings(&self) -> Vec<Drawing> {
        self.drawings.get()
    }

    pub fn texts(&self) -> Vec<TextNote> {
        self.texts.get()
    }

    pub fn live_drawings(&self) -> &LiveState<Vec<Drawing>> {
        &self.drawings
    }

    pub fn live_texts(&self) -> &LiveState<Vec<TextNote>> {
        &self.texts
    }

    pub fn drawings_by_map_type(&self, map_type: &str) -> Vec<Drawing> {
        self.drawings.filtered(|d| d.on_map(map_type))
    }

    pub fn texts_by_map_type(&self, map_type: &str) -> Vec<TextNote> {
        self.texts.filtered(|t| t.on_map(map_type))
    }

    pub async fn subscribe_to_drawings(&self, campaign_id: &str) -> AppResult<()> {
        self.campaign_id.set(Some(campaign_id.to_owned()));
        futures_util::try_join!(
            sync::subscribe_query(
                &*self.db,
                &self.drawings_sub,
                Query::new(drawings_of(campaign_id)),
                &self.drawings,
                &self.status,
                "drawings",
            ),
            sync::subscribe_query(
                &*self.db,
                &self.texts_sub,
                Query::new(texts_of(campaign_id)),
                &self.texts,
                &self.status,
                "texts",
            ),
        )?;
        Ok(())
    }

    pub async fn save_drawing(&self, author: &UserId, campaign_id: &str, shape: Fields) -> AppResult<Drawing> {
        self.status
            .run("save_drawing", async {
                let doc = self.db.add(&drawings_of(campaign_id), authored(shape, author)).await?;
                Ok(doc.decode_record()?)
            })
            .await
    }

    pub async fn save_text(&self, author: &UserId, campaign_id: &str, payload: Fields) -> AppResult<TextNote> {
        self.status
            .run("save_text", async {
                let doc = self.db.add(&texts_of(campaign_id), authored(payload, author)).await?;
                Ok(doc.decode_record()?)
            })
            .await
    }

    pub async fn delete_drawing(&self, campaign_id: &str, drawing_id: &str) -> AppResult<()> {
        self.status
            .run("delete_drawing", async {
                self.db.delete(&drawings_of(campaign_id).doc(drawing_id)).await?;
                Ok(())
            })
            .await
    }

    pub async fn delete_text(&self, campaign_id: &str, text_id: &str) -> AppResult<()> {
        self.status
            .run("delete_text", async {
                self.db.delete(&texts_of(campaign_id).doc(text_id)).await?;
                Ok(())
            })
            .await
    }

    /// Wipes drawings and texts on every map in one batch.
    pub async fn clear_all_drawings(&self, campaign_id: &str) -> AppResult<()> {
        self.status
            .run("clear_all_drawings", async {
                let mut paths = all_paths(&*self.db, drawings_of(campaign_id)).await?;
                paths.extend(all_paths(&*self.db, texts_of(campaign_id)).await?);
                let count = paths.len();
                self.db.delete_batch(paths).await?;

                if self.is_viewing(campaign_id) {
                    self.drawings.reset();
                    self.texts.reset();
                }
                info!(campaign_id, count, "cleared drawings");
                Ok(())
            })
            .await
    }

    /// Wipes the drawings and texts of one map in one batch.
    pub async fn clear_drawings_by_map_type(&self, campaign_id: &str, map_type: &str) -> AppResult<()> {
        self.status
            .run("clear_drawings_by_map_type", async {
                let mut paths = paths_on_map(&*self.db, drawings_of(campaign_id), map_type).await?;
                paths.extend(paths_on_map(&*self.db, texts_of(campaign_id), map_type).await?);
                let count = paths.len();
                self.db.delete_batch(paths).await?;

                if self.is_viewing(campaign_id) {
                    self.drawings.patch(|drawings| drawings.retain(|d| !d.on_map(map_type)));
                    self.texts.patch(|texts| texts.retain(|t| !t.on_map(map_type)));
                }
                info!(campaign_id, map_type, count, "cleared drawings");
                Ok(())
            })
            .await
    }

    pub fn unsubscribe_from_drawings(&self) {
        self.drawings_sub.close();
        self.texts_sub.close();
        self.drawings.reset();
        self.texts.reset();
        self.campaign_id.reset();
    }

    fn is_viewing(&self, campaign_id: &str) -> bool {
        self.campaign_id.get().as_deref() == Some(campaign_id)
    }
}

impl Teardown for DrawingLayer {
    fn teardown(&self) {
        self.unsubscribe_from_drawings();
        self.status.clear_error();
    }
}
