use std::sync::Arc;

use tracing::info;

use super::{MapTagged, all_paths, map_type, paths_on_map};
use crate::{
    AppResult,
    auth::Teardown,
    backend::{CollectionPath, DocWrite, DocumentStore, Fields, Query},
    db::{Token, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

pub const DEFAULT_BORDER_COLOR: &str = "#4a5568";
pub const DEFAULT_POSITION: (f64, f64) = (100.0, 100.0);
pub const TOKEN_SIZE: u32 = 50;

fn tokens_of(campaign_id: &str) -> CollectionPath {
    CollectionPath::campaign(campaign_id, "tokens")
}

/// A token picture, tagged with how to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenImage {
    Emoji(String),
    Url(String),
}

impl TokenImage {
    /// The stored `image` and `imageType` values.
    fn parts(&self) -> (&str, &'static str) {
        match self {
            TokenImage::Emoji(emoji) => (emoji.as_str(), "emoji"),
            TokenImage::Url(url) => (url.as_str(), "url"),
        }
    }
}

/// A token to place; unset fields take the board defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewToken {
    pub name: String,
    pub image: TokenImage,
    pub border_color: Option<String>,
    pub position: Option<(f64, f64)>,
    pub map_type: Option<String>,
}

impl NewToken {
    pub fn new(name: impl Into<String>, image: TokenImage) -> Self {
        Self {
            name: name.into(),
            image,
            border_color: None,
            position: None,
            map_type: None,
        }
    }

    fn into_write(self, author: &UserId) -> DocWrite {
        let (image, image_type) = self.image.parts();
        let (x, y) = self.position.unwrap_or(DEFAULT_POSITION);
        DocWrite::new()
            .set("name", self.name.as_str())
            .set("image", image)
            .set("imageType", image_type)
            .set(
                "borderColor",
                self.border_color.as_deref().unwrap_or(DEFAULT_BORDER_COLOR),
            )
            .set("x", x)
            .set("y", y)
            .set("mapType", map_type::effective(self.map_type.as_deref()))
            .set("size", TOKEN_SIZE)
            .set("createdBy", author)
            .server_timestamp("createdAt")
    }
}

pub struct TokenLayer {
    db: Arc<dyn DocumentStore>,
    tokens: LiveState<Vec<Token>>,
    campaign_id: LiveState<Option<String>>,
    subscription: Subscription,
    status: StoreStatus,
}

impl TokenLayer {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            tokens: LiveState::new(),
            campaign_id: LiveState::new(),
            subscription: Subscription::new("tokens"),
            status: StoreStatus::new("tokens"),
        }
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.get()
    }

    pub fn live(&self) -> &LiveState<Vec<Token>> {
        &self.tokens
    }

    pub fn tokens_by_map_type(&self, map_type: &str) -> Vec<Token> {
        self.tokens.filtered(|t| t.on_map(map_type))
    }

    pub async fn subscribe_to_tokens(&self, campaign_id: &str) -> AppResult<()> {
        self.campaign_id.set(Some(campaign_id.to_owned()));
        sync::subscribe_query(
            &*self.db,
            &self.subscription,
            Query::new(tokens_of(campaign_id)),
            &self.tokens,
            &self.status,
            "tokens",
        )
        .await
    }

    pub async fn create_token(&self, author: &UserId, campaign_id: &str, token: NewToken) -> AppResult<Token> {
        self.status
            .run("create_token", async {
                let doc = self.db.add(&tokens_of(campaign_id), token.into_write(author)).await?;
                Ok(doc.decode_record()?)
            })
            .await
    }

    pub async fn update_token_position(&self, campaign_id: &str, token_id: &str, x: f64, y: f64) -> AppResult<()> {
        self.status
            .run("update_token_position", async {
                self.db
                    .update(&tokens_of(campaign_id).doc(token_id), DocWrite::new().set("x", x).set("y", y))
                    .await?;
                Ok(())
            })
            .await
    }

    pub async fn update_token(&self, campaign_id: &str, token_id: &str, changes: Fields) -> AppResult<()> {
        self.status
            .run("update_token", async {
                self.db
                    .update(&tokens_of(campaign_id).doc(token_id), DocWrite::new().merge(changes))
                    .await?;
                Ok(())
            })
            .await
    }

    pub async fn delete_token(&self, campaign_id: &str, token_id: &str) -> AppResult<()> {
        self.status
            .run("delete_token", async {
                self.db.delete(&tokens_of(campaign_id).doc(token_id)).await?;
                Ok(())
            })
            .await
    }

    pub async fn clear_all_tokens(&self, campaign_id: &str) -> AppResult<()> {
        self.status
            .run("clear_all_tokens", async {
                let paths = all_paths(&*self.db, tokens_of(campaign_id)).await?;
                let count = paths.len();
                self.db.delete_batch(paths).await?;

                if self.is_viewing(campaign_id) {
                    self.tokens.reset();
                }
                info!(campaign_id, count, "cleared tokens");
                Ok(())
            })
            .await
    }

    pub async fn clear_tokens_by_map_type(&self, campaign_id: &str, map_type: &str) -> AppResult<()> {
        self.status
            .run("clear_tokens_by_map_type", async {
                let paths = paths_on_map(&*self.db, tokens_of(campaign_id), map_type).await?;
                let count = paths.len();
                self.db.delete_batch(paths).await?;

                if self.is_viewing(campaign_id) {
                    self.tokens.patch(|tokens| tokens.retain(|t| !t.on_map(map_type)));
                }
                info!(campaign_id, map_type, count, "cleared tokens");
                Ok(())
            })
            .await
    }

    pub fn unsubscribe_from_tokens(&self) {
        self.subscription.close();
        self.tokens.reset();
        self.campaign_id.reset();
    }

    fn is_viewing(&self, campaign_id: &str) -> bool {
        self.campaign_id.get().as_deref() == Some(campaign_id)
    }
}

impl Teardown for TokenLayer {
    fn teardown(&self) {
        self.unsubscribe_from_tokens();
        self.status.clear_error();
    }
}
