//! Campaigns the user runs as game master or plays in.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    Actor, AppError, AppResult,
    auth::Teardown,
    backend::{CollectionPath, Direction, DocWrite, DocumentStore, Query},
    db::{Campaign, CampaignStatus, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

pub mod join_code;

/// Draws before giving up on finding a code no active campaign uses.
const JOIN_CODE_ATTEMPTS: usize = 8;

fn active_with_code(code: &str) -> Query {
    Query::new(CollectionPath::campaigns())
        .where_eq("joinCode", code)
        .where_eq("status", "active")
        .limit(1)
}

pub struct CampaignDirectory {
    db: Arc<dyn DocumentStore>,
    campaigns: LiveState<Vec<Campaign>>,
    player_campaigns: LiveState<Vec<Campaign>>,
    current: LiveState<Option<Campaign>>,
    master_sub: Subscription,
    player_sub: Subscription,
    status: StoreStatus,
}

impl CampaignDirectory {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            campaigns: LiveState::new(),
            player_campaigns: LiveState::new(),
            current: LiveState::new(),
            master_sub: Subscription::new("master-campaigns"),
            player_sub: Subscription::new("player-campaigns"),
            status: StoreStatus::new("campaigns"),
        }
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    /// Campaigns the user runs, newest first.
    pub fn my_campaigns(&self) -> Vec<Campaign> {
        self.campaigns.get()
    }

    /// Campaigns the user plays in, newest first.
    pub fn joined_campaigns(&self) -> Vec<Campaign> {
        self.player_campaigns.get()
    }

    pub fn all_my_campaigns(&self) -> Vec<Campaign> {
        let mut all = self.campaigns.get();
        all.extend(self.player_campaigns.get());
        all
    }

    pub fn current_campaign(&self) -> Option<Campaign> {
        self.current.get()
    }

    pub fn live_master(&self) -> &LiveState<Vec<Campaign>> {
        &self.campaigns
    }

    pub fn live_player(&self) -> &LiveState<Vec<Campaign>> {
        &self.player_campaigns
    }

    pub async fn create_campaign(&self, actor: &Actor, name: &str) -> AppResult<Campaign> {
        self.status
            .run("create_campaign", async {
                if !actor.is_gm() {
                    return Err(AppError::NotGameMaster);
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(AppError::EmptyName);
                }

                let mut rng = StdRng::from_rng(&mut rand::rng());
                let join_code = self.free_join_code(&mut rng).await?;

                let write = DocWrite::new()
                    .set("name", name)
                    .server_timestamp("createdAt")
                    .set("masterId", &actor.user_id)
                    .set("masterEmail", actor.email.clone().map_or(Value::Null, Value::String))
                    .set("players", Value::Array(Vec::new()))
                    .set("joinCode", join_code)
                    .set("mapId", Value::Null)
                    .set("status", "active");
                let doc = self.db.add(&CollectionPath::campaigns(), write).await?;

                let campaign: Campaign = doc.decode_record()?;
                info!(id = %campaign.id, code = %campaign.join_code, "campaign created");
                Ok(campaign)
            })
            .await
    }

    /// Adds the actor to the players of the active campaign using `code`.
    pub async fn join_campaign(&self, actor: &Actor, code: &str) -> AppResult<Campaign> {
        self.status
            .run("join_campaign", async {
                let code = join_code::normalize(code);
                if code.is_empty() {
                    return Err(AppError::EmptyJoinCode);
                }

                let doc = self
                    .db
                    .query(&active_with_code(&code))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(AppError::CampaignNotFound)?;
                let mut campaign: Campaign = doc.decode_record()?;

                if campaign.master_id == actor.user_id {
                    return Err(AppError::AlreadyMaster);
                }
                if campaign.players.contains(&actor.user_id) {
                    return Err(AppError::AlreadyJoined);
                }

                self.db
                    .update(
                        &doc.path,
                        DocWrite::new().array_union("players", vec![Value::from(&actor.user_id)]),
                    )
                    .await?;

                info!(id = %campaign.id, uid = %actor.user_id, "joined campaign");
                campaign.players.push(actor.user_id.clone());
                Ok(campaign)
            })
            .await
    }

    pub async fn subscribe_to_master_campaigns(&self, user_id: &UserId) -> AppResult<()> {
        let query = Query::new(CollectionPath::campaigns())
            .where_eq("masterId", user_id)
            .order_by("createdAt", Direction::Descending);
        sync::subscribe_query(
            &*self.db,
            &self.master_sub,
            query,
            &self.campaigns,
            &self.status,
            "master-campaigns",
        )
        .await
    }

    pub async fn subscribe_to_player_campaigns(&self, user_id: &UserId) -> AppResult<()> {
        let query = Query::new(CollectionPath::campaigns())
            .array_contains("players", user_id)
            .order_by("createdAt", Direction::Descending);
        sync::subscribe_query(
            &*self.db,
            &self.player_sub,
            query,
            &self.player_campaigns,
            &self.status,
            "player-campaigns",
        )
        .await
    }

    pub async fn subscribe_to_all_campaigns(&self, user_id: &UserId) -> AppResult<()> {
        futures_util::try_join!(
            self.subscribe_to_master_campaigns(user_id),
            self.subscribe_to_player_campaigns(user_id),
        )?;
        Ok(())
    }

    /// Loads one campaign and makes it the current one.
    pub async fn get_campaign(&self, id: &str) -> AppResult<Campaign> {
        self.status
            .run("get_campaign", async {
                let doc = self
                    .db
                    .get(&CollectionPath::campaigns().doc(id))
                    .await?
                    .ok_or_else(|| AppError::NoSuchCampaign(id.to_owned()))?;
                let campaign: Campaign = doc.decode_record()?;
                self.current.set(Some(campaign.clone()));
                Ok(campaign)
            })
            .await
    }

    pub async fn delete_campaign(&self, id: &str) -> AppResult<()> {
        self.status
            .run("delete_campaign", async {
                self.db.delete(&CollectionPath::campaigns().doc(id)).await?;
                info!(id, "campaign deleted");
                Ok(())
            })
            .await
    }

    pub fn clear_campaigns(&self) {
        self.master_sub.close();
        self.player_sub.close();
        self.campaigns.reset();
        self.player_campaigns.reset();
        self.current.reset();
        self.status.clear_error();
    }

    async fn free_join_code<R: Rng>(&self, rng: &mut R) -> AppResult<String> {
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = join_code::generate(rng);
            if self.db.query(&active_with_code(&code)).await?.is_empty() {
                return Ok(code);
            }
            debug!(%code, "join code in use, drawing again");
        }
        Err(AppError::JoinCodeExhausted)
    }
}

impl Teardown for CampaignDirectory {
    fn teardown(&self) {
        self.clear_campaigns();
    }
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::SqliteBackend,
        db::Role,
        testing::{self, actor},
    };

    async fn directory() -> (Arc<SqliteBackend>, CampaignDirectory) {
        let db = testing::backend().await;
        (db.clone(), CampaignDirectory::new(db))
    }

    async fn players_of(db: &SqliteBackend, id: &str) -> Vec<UserId> {
        let doc = db.get(&CollectionPath::campaigns().doc(id)).await.unwrap().unwrap();
        doc.decode::<Campaign>().unwrap().players
    }

    #[tokio::test]
    async fn only_game_masters_create() {
        let (db, dir) = directory().await;

        let err = dir
            .create_campaign(&actor("p", Role::Player), "Ruins")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotGameMaster));
        assert!(err.is_precondition());

        let err = dir.create_campaign(&actor("gm", Role::Gm), "   ").await.unwrap_err();
        assert!(matches!(err, AppError::EmptyName));

        let all = db.query(&Query::new(CollectionPath::campaigns())).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn created_campaign_is_active_and_coded() {
        let (_db, dir) = directory().await;
        let gm = actor("gm", Role::Gm);

        let campaign = dir.create_campaign(&gm, "  Ruins of X ").await.unwrap();
        assert_eq!(campaign.name, "Ruins of X");
        assert_eq!(campaign.master_id, gm.user_id);
        assert_eq!(campaign.master_email.as_deref(), Some("gm@test.io"));
        assert!(campaign.players.is_empty());
        assert!(campaign.is_active());
        assert!(campaign.created_at.is_some());
        assert!(join_code::is_valid(&campaign.join_code));
    }

    #[tokio::test]
    async fn join_refusals_leave_players_untouched() {
        let (db, dir) = directory().await;
        let gm = actor("gm", Role::Gm);
        let player = actor("pl", Role::Player);
        let campaign = dir.create_campaign(&gm, "Ruins").await.unwrap();

        let err = dir.join_campaign(&player, "ZZZZZ").await.unwrap_err();
        assert!(matches!(err, AppError::CampaignNotFound));

        let err = dir.join_campaign(&gm, &campaign.join_code).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyMaster));
        assert!(players_of(&db, &campaign.id).await.is_empty());

        let code = campaign.join_code.to_lowercase();
        let joined = dir.join_campaign(&player, &format!(" {code} ")).await.unwrap();
        assert_eq!(joined.players, vec![player.user_id.clone()]);

        let err = dir.join_campaign(&player, &campaign.join_code).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyJoined));
        assert_eq!(players_of(&db, &campaign.id).await, vec![player.user_id.clone()]);

        assert!(matches!(dir.join_campaign(&player, "  ").await, Err(AppError::EmptyJoinCode)));
    }

    #[tokio::test]
    async fn concurrent_joins_add_the_player_once() {
        let (db, dir) = directory().await;
        let campaign = dir.create_campaign(&actor("gm", Role::Gm), "Ruins").await.unwrap();
        let player = actor("pl", Role::Player);

        let (a, b) = tokio::join!(
            dir.join_campaign(&player, &campaign.join_code),
            dir.join_campaign(&player, &campaign.join_code),
        );
        assert!(a.is_ok() || b.is_ok());
        assert_eq!(players_of(&db, &campaign.id).await, vec![player.user_id]);
    }

    #[tokio::test]
    async fn archived_campaigns_cannot_be_joined() {
        let (db, dir) = directory().await;
        let campaign = dir.create_campaign(&actor("gm", Role::Gm), "Ruins").await.unwrap();
        db.update(
            &CollectionPath::campaigns().doc(&campaign.id),
            DocWrite::new().set("status", "archived"),
        )
        .await
        .unwrap();

        let err = dir
            .join_campaign(&actor("pl", Role::Player), &campaign.join_code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CampaignNotFound));
    }

    #[tokio::test]
    async fn taken_codes_are_redrawn() {
        let (db, dir) = directory().await;
        let taken = join_code::generate(&mut StdRng::seed_from_u64(7));
        db.add(
            &CollectionPath::campaigns(),
            DocWrite::new().set("joinCode", taken.as_str()).set("status", "active"),
        )
        .await
        .unwrap();

        let code = dir.free_join_code(&mut StdRng::seed_from_u64(7)).await.unwrap();
        assert_ne!(code, taken);
        assert!(join_code::is_valid(&code));
    }

    #[tokio::test]
    async fn live_lists_split_by_role() {
        let (_db, dir) = directory().await;
        let gm = actor("gm", Role::Gm);
        let player = actor("pl", Role::Player);
        let first = dir.create_campaign(&gm, "First").await.unwrap();
        let second = dir.create_campaign(&gm, "Second").await.unwrap();

        let other_gm = actor("gm2", Role::Gm);
        let theirs = dir.create_campaign(&other_gm, "Theirs").await.unwrap();
        dir.join_campaign(&gm, &theirs.join_code).await.unwrap();

        dir.subscribe_to_all_campaigns(&gm.user_id).await.unwrap();
        testing::settle(dir.live_master(), |c| c.len() == 2).await;
        testing::settle(dir.live_player(), |c| c.len() == 1).await;

        let ids: Vec<_> = dir.my_campaigns().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        let all: Vec<_> = dir.all_my_campaigns().into_iter().map(|c| c.id).collect();
        assert_eq!(all, vec![second.id, first.id, theirs.id.clone()]);

        let other = CampaignDirectory::new(dir.db.clone());
        other.subscribe_to_player_campaigns(&player.user_id).await.unwrap();
        other.join_campaign(&player, &theirs.join_code).await.unwrap();
        let joined = testing::settle(other.live_player(), |c| c.len() == 1).await;
        assert_eq!(joined[0].id, theirs.id);
    }

    #[tokio::test]
    async fn get_and_clear() {
        let (_db, dir) = directory().await;
        let gm = actor("gm", Role::Gm);
        let campaign = dir.create_campaign(&gm, "Ruins").await.unwrap();

        assert_eq!(dir.get_campaign(&campaign.id).await.unwrap().id, campaign.id);
        assert_eq!(dir.current_campaign().map(|c| c.id), Some(campaign.id.clone()));

        dir.subscribe_to_master_campaigns(&gm.user_id).await.unwrap();
        testing::settle(dir.live_master(), |c| c.len() == 1).await;

        dir.delete_campaign(&campaign.id).await.unwrap();
        testing::settle(dir.live_master(), Vec::is_empty).await;
        assert!(matches!(
            dir.get_campaign(&campaign.id).await,
            Err(AppError::NoSuchCampaign(id)) if id == campaign.id
        ));

        dir.clear_campaigns();
        dir.clear_campaigns();
        assert!(dir.current_campaign().is_none());
        assert!(dir.all_my_campaigns().is_empty());
        assert_eq!(dir.status().last_error(), None);
    }
}
