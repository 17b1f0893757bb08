//! The campaign chat: messages, dice rolls and system notices.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::{
    Actor, AppResult,
    auth::Teardown,
    backend::{CollectionPath, Direction, DocWrite, DocumentStore, Query},
    db::{ChatMessage, MessageKind, Role, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

pub mod dice;

pub use dice::DiceRoll;

/// How many of the most recent messages the live view holds.
pub const CHAT_WINDOW: usize = 100;

pub const CLEARED_NOTICE: &str = "Chat was cleared";

fn chat_of(campaign_id: &str) -> CollectionPath {
    CollectionPath::campaign(campaign_id, "chat")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    text: &'a str,
    #[serde(rename = "type")]
    kind: MessageKind,
    user_id: &'a UserId,
    user_name: &'a str,
    user_role: Option<Role>,
}

fn envelope(actor: &Actor, text: &str, kind: MessageKind) -> AppResult<DocWrite> {
    let write = DocWrite::from_serialize(&Envelope {
        text,
        kind,
        user_id: &actor.user_id,
        user_name: &actor.display_name,
        user_role: actor.role,
    })?;
    Ok(write.server_timestamp("createdAt"))
}

pub struct ChatLog {
    db: Arc<dyn DocumentStore>,
    messages: LiveState<Vec<ChatMessage>>,
    campaign_id: LiveState<Option<String>>,
    subscription: Subscription,
    status: StoreStatus,
}

impl ChatLog {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            messages: LiveState::new(),
            campaign_id: LiveState::new(),
            subscription: Subscription::new("chat"),
            status: StoreStatus::new("chat"),
        }
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    /// Oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.get()
    }

    pub fn live(&self) -> &LiveState<Vec<ChatMessage>> {
        &self.messages
    }

    pub fn current_campaign_id(&self) -> Option<String> {
        self.campaign_id.get()
    }

    pub async fn subscribe_to_chat(&self, campaign_id: &str) -> AppResult<()> {
        self.campaign_id.set(Some(campaign_id.to_owned()));
        let query = Query::new(chat_of(campaign_id))
            .order_by("createdAt", Direction::Ascending)
            .limit_to_last(CHAT_WINDOW);
        sync::subscribe_query(
            &*self.db,
            &self.subscription,
            query,
            &self.messages,
            &self.status,
            "chat",
        )
        .await
    }

    pub async fn send_message(&self, actor: &Actor, campaign_id: &str, text: &str, kind: MessageKind) -> AppResult<()> {
        self.status
            .run("send_message", async {
                self.post(campaign_id, envelope(actor, text, kind)?).await
            })
            .await
    }

    pub async fn send_dice_roll(&self, actor: &Actor, campaign_id: &str, roll: &DiceRoll) -> AppResult<()> {
        self.status
            .run("send_dice_roll", async {
                let text = format!("🎲 {} = {}", roll.notation, roll.result);
                let write = envelope(actor, &text, MessageKind::Roll)?
                    .set("diceNotation", roll.notation.as_str())
                    .set("result", roll.result)
                    .set("details", roll.details.clone());
                self.post(campaign_id, write).await
            })
            .await
    }

    /// Deletes the whole log in one batch, then posts a notice saying so.
    pub async fn clear_chat(&self, actor: &Actor, campaign_id: &str) -> AppResult<()> {
        self.status
            .run("clear_chat", async {
                let docs = self.db.query(&Query::new(chat_of(campaign_id))).await?;
                let count = docs.len();
                self.db
                    .delete_batch(docs.into_iter().map(|doc| doc.path).collect())
                    .await?;
                if self.is_viewing(campaign_id) {
                    self.messages.reset();
                }
                info!(campaign_id, count, "chat cleared");

                self.post(campaign_id, envelope(actor, CLEARED_NOTICE, MessageKind::System)?)
                    .await
            })
            .await
    }

    pub fn unsubscribe_from_chat(&self) {
        self.subscription.close();
        self.messages.reset();
        self.campaign_id.reset();
    }

    fn is_viewing(&self, campaign_id: &str) -> bool {
        self.campaign_id.get().as_deref() == Some(campaign_id)
    }

    async fn post(&self, campaign_id: &str, write: DocWrite) -> AppResult<()> {
        self.db.add(&chat_of(campaign_id), write).await?;
        Ok(())
    }
}

impl Teardown for ChatLog {
    fn teardown(&self) {
        self.unsubscribe_from_chat();
        self.status.clear_error();
    }
}
