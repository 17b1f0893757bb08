//! Character sheets of one campaign. Only a sheet's owner may change it.

use std::sync::Arc;

use tracing::info;

use crate::{
    AppError, AppResult,
    auth::Teardown,
    backend::{CollectionPath, DocPath, DocWrite, DocumentStore, Fields, Query},
    db::{Character, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

pub mod reference;

fn characters_of(campaign_id: &str) -> CollectionPath {
    CollectionPath::campaign(campaign_id, "characters")
}

fn character_path(campaign_id: &str, character_id: &str) -> DocPath {
    characters_of(campaign_id).doc(character_id)
}

pub struct CharacterRoster {
    db: Arc<dyn DocumentStore>,
    characters: LiveState<Vec<Character>>,
    subscription: Subscription,
    status: StoreStatus,
}

impl CharacterRoster {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            characters: LiveState::new(),
            subscription: Subscription::new("characters"),
            status: StoreStatus::new("characters"),
        }
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn characters(&self) -> Vec<Character> {
        self.characters.get()
    }

    pub fn live(&self) -> &LiveState<Vec<Character>> {
        &self.characters
    }

    pub fn get_my_characters(&self, user_id: &UserId) -> Vec<Character> {
        self.characters.filtered(|c| c.owner_id == *user_id)
    }

    pub fn races(&self) -> &'static std::collections::BTreeMap<String, reference::Race> {
        reference::races()
    }

    pub fn stat_abilities(&self) -> &'static reference::StatAbilities {
        reference::stat_abilities()
    }

    pub async fn create_character(&self, campaign_id: &str, owner: &UserId, sheet: Fields) -> AppResult<Character> {
        self.status
            .run("create_character", async {
                let write = DocWrite::new()
                    .merge(sheet)
                    .set("ownerId", owner)
                    .server_timestamp("createdAt")
                    .remove("updatedAt");
                let doc = self.db.add(&characters_of(campaign_id), write).await?;
                info!(campaign_id, id = doc.id(), "character created");
                Ok(doc.decode_record()?)
            })
            .await
    }

    /// Merges `updates` into the sheet. Ownership and creation time cannot be changed.
    pub async fn update_character(
        &self,
        campaign_id: &str,
        character_id: &str,
        updates: Fields,
        user_id: &UserId,
    ) -> AppResult<()> {
        self.status
            .run("update_character", async {
                self.check_owner(character_id, user_id)?;
                let write = DocWrite::new()
                    .merge(updates)
                    .remove("ownerId")
                    .remove("createdAt")
                    .server_timestamp("updatedAt");
                self.db.update(&character_path(campaign_id, character_id), write).await?;
                Ok(())
            })
            .await
    }

    pub async fn delete_character(&self, campaign_id: &str, character_id: &str, user_id: &UserId) -> AppResult<()> {
        self.status
            .run("delete_character", async {
                self.check_owner(character_id, user_id)?;
                self.db.delete(&character_path(campaign_id, character_id)).await?;
                Ok(())
            })
            .await
    }

    pub async fn subscribe_to_characters(&self, campaign_id: &str) -> AppResult<()> {
        sync::subscribe_query(
            &*self.db,
            &self.subscription,
            Query::new(characters_of(campaign_id)),
            &self.characters,
            &self.status,
            "characters",
        )
        .await
    }

    pub fn unsubscribe_from_characters(&self) {
        self.subscription.close();
        self.characters.reset();
    }

    /// Checks against the local cache only; a character that is not cached
    /// counts as not owned.
    fn check_owner(&self, character_id: &str, user_id: &UserId) -> AppResult<()> {
        self.characters
            .find(|c| c.id == character_id && c.owner_id == *user_id)
            .map(|_| ())
            .ok_or(AppError::NotOwner)
    }
}

impl Teardown for CharacterRoster {
    fn teardown(&self) {
        self.unsubscribe_from_characters();
        self.status.clear_error();
    }
}
