//! The signed-in user's profile document, provisioned lazily and kept live.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    AppResult,
    auth::Teardown,
    backend::{AuthUser, CollectionPath, DocPath, DocWrite, DocumentStore, clock::format_timestamp},
    db::{Profile, Role, Settings, UserId},
    sync::{self, LiveState, StoreStatus, Subscription},
};

const FALLBACK_NAME: &str = "Adventurer";

/// The name shown for a user without one: the local part of their email.
pub fn default_display_name(email: Option<&str>) -> String {
    email
        .and_then(|email| email.split('@').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_owned()
}

fn profile_path(user_id: &UserId) -> DocPath {
    CollectionPath::users().doc(user_id.as_str())
}

/// Overrides for a freshly created profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileSeed {
    pub display_name: Option<String>,
    pub role: Option<Role>,
}

/// A partial profile update; unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

impl ProfilePatch {
    fn merge_into(&self, profile: &mut Profile, now: OffsetDateTime) {
        if let Some(display_name) = &self.display_name {
            profile.display_name = display_name.clone();
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(settings) = &self.settings {
            profile.settings = settings.clone();
        }
        profile.updated_at = Some(now);
    }
}

pub struct ProfileStore {
    db: Arc<dyn DocumentStore>,
    profile: LiveState<Option<Profile>>,
    subscription: Subscription,
    status: StoreStatus,
}

impl ProfileStore {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            profile: LiveState::new(),
            subscription: Subscription::new("profile"),
            status: StoreStatus::new("profile"),
        }
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile.get()
    }

    pub fn live(&self) -> &LiveState<Option<Profile>> {
        &self.profile
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.get().map(|profile| profile.role)
    }

    pub fn is_gm(&self) -> bool {
        self.role() == Some(Role::Gm)
    }

    pub fn is_player(&self) -> bool {
        self.role() == Some(Role::Player)
    }

    pub fn display_name(&self) -> String {
        match self.profile.get() {
            Some(profile) if !profile.display_name.is_empty() => profile.display_name,
            Some(profile) => default_display_name(profile.email.as_deref()),
            None => FALLBACK_NAME.to_owned(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    /// Writes a brand-new profile for `user`, replacing any existing one.
    pub async fn create_profile(&self, user: &AuthUser, seed: ProfileSeed) -> AppResult<Profile> {
        self.status.run("create_profile", self.create(user, seed)).await
    }

    /// Loads the profile, creating a default one on first sign-in.
    pub async fn fetch_profile(&self, user: &AuthUser) -> AppResult<Profile> {
        self.status
            .run("fetch_profile", async {
                match self.db.get(&profile_path(&user.uid)).await? {
                    Some(doc) => {
                        let profile: Profile = doc.decode()?;
                        self.profile.set(Some(profile.clone()));
                        Ok(profile)
                    }
                    None => self.create(user, ProfileSeed::default()).await,
                }
            })
            .await
    }

    /// Keeps the local profile in sync with its document. Replaces any
    /// previous profile subscription.
    pub async fn subscribe_to_profile(&self, user_id: &UserId) -> AppResult<()> {
        sync::subscribe_doc(
            &*self.db,
            &self.subscription,
            &profile_path(user_id),
            &self.profile,
            &self.status,
            "profile",
        )
        .await
    }

    /// Writes `patch` and merges it locally as soon as the backend acknowledges.
    pub async fn update_profile(&self, user_id: &UserId, patch: ProfilePatch) -> AppResult<Option<Profile>> {
        self.status.run("update_profile", self.update(user_id, patch)).await
    }

    /// Changes the user's role. Anything but `gm` or `player` is refused
    /// without touching the backend.
    pub async fn set_role(&self, user_id: &UserId, role: &str) -> AppResult<Option<Profile>> {
        self.status
            .run("set_role", async {
                let role: Role = role.parse()?;
                self.update(
                    user_id,
                    ProfilePatch {
                        role: Some(role),
                        ..Default::default()
                    },
                )
                .await
            })
            .await
    }

    pub fn clear_profile(&self) {
        self.subscription.close();
        self.profile.reset();
        self.status.clear_error();
    }

    async fn create(&self, user: &AuthUser, seed: ProfileSeed) -> AppResult<Profile> {
        let now = OffsetDateTime::now_utc();
        let profile = Profile {
            email: user.email.clone(),
            display_name: seed
                .display_name
                .or_else(|| user.display_name.clone())
                .unwrap_or_else(|| default_display_name(user.email.as_deref())),
            role: seed.role.unwrap_or(Role::Player),
            created_at: Some(now),
            updated_at: Some(now),
            settings: Settings::default(),
        };

        self.db
            .set(&profile_path(&user.uid), DocWrite::from_serialize(&profile)?)
            .await?;
        info!(uid = %user.uid, role = %profile.role, "created profile");

        self.profile.set(Some(profile.clone()));
        Ok(profile)
    }

    async fn update(&self, user_id: &UserId, patch: ProfilePatch) -> AppResult<Option<Profile>> {
        let now = OffsetDateTime::now_utc();
        let write = DocWrite::from_serialize(&patch)?.set("updatedAt", format_timestamp(now)?);
        self.db.update(&profile_path(user_id), write).await?;

        self.profile.patch(|profile| {
            if let Some(profile) = profile {
                patch.merge_into(profile, now);
            }
        });
        Ok(self.profile.get())
    }
}

impl Teardown for ProfileStore {
    fn teardown(&self) {
        self.clear_profile();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppError, testing};

    fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: UserId::from(uid),
            email: Some(format!("{uid}@test.io")),
            display_name: None,
        }
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(default_display_name(Some("gm@test.io")), "gm");
        assert_eq!(default_display_name(Some("@test.io")), "Adventurer");
        assert_eq!(default_display_name(None), "Adventurer");
    }

    #[tokio::test]
    async fn fetch_provisions_missing_profile_once() {
        let db = testing::backend().await;
        let store = ProfileStore::new(db.clone());
        let alice = user("alice");

        let created = store.fetch_profile(&alice).await.unwrap();
        assert_eq!(created.role, Role::Player);
        assert_eq!(created.display_name, "alice");
        assert_eq!(created.settings, Settings::default());

        store
            .update_profile(&alice.uid, ProfilePatch { display_name: Some("Alice".into()), ..Default::default() })
            .await
            .unwrap();

        let fresh = ProfileStore::new(db);
        let fetched = fresh.fetch_profile(&alice).await.unwrap();
        assert_eq!(fetched.display_name, "Alice");
    }

    #[tokio::test]
    async fn update_merges_locally_without_waiting() {
        let db = testing::backend().await;
        let store = ProfileStore::new(db);
        let alice = user("alice");
        store.create_profile(&alice, ProfileSeed::default()).await.unwrap();

        let updated = store.set_role(&alice.uid, "gm").await.unwrap().unwrap();
        assert_eq!(updated.role, Role::Gm);
        assert!(store.is_gm());
        assert!(!store.is_player());
    }

    #[tokio::test]
    async fn invalid_role_is_refused_locally() {
        let db = testing::backend().await;
        let store = ProfileStore::new(db.clone());

        // no profile document exists, so reaching the backend would fail with NotFound
        let err = store.set_role(&UserId::from("ghost"), "admin").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRole(_)));
        assert_eq!(store.status().last_error().as_deref(), Some("invalid role: admin"));
        assert!(!store.status().is_loading());
    }

    #[tokio::test]
    async fn subscription_tracks_remote_changes() {
        let db = testing::backend().await;
        let store = ProfileStore::new(db.clone());
        let alice = user("alice");
        store.fetch_profile(&alice).await.unwrap();
        store.subscribe_to_profile(&alice.uid).await.unwrap();

        // another client promotes alice
        let other = ProfileStore::new(db);
        other.set_role(&alice.uid, "gm").await.unwrap();

        testing::settle(store.live(), |p| p.as_ref().is_some_and(|p| p.role == Role::Gm)).await;

        store.clear_profile();
        assert!(store.profile().is_none());
        assert!(!store.is_subscribed());
    }

    #[tokio::test]
    async fn resubscribing_keeps_a_single_listener() {
        let db = testing::backend().await;
        let store = ProfileStore::new(db.clone());
        let alice = user("alice");
        store.fetch_profile(&alice).await.unwrap();

        store.subscribe_to_profile(&alice.uid).await.unwrap();
        store.subscribe_to_profile(&alice.uid).await.unwrap();
        store.set_role(&alice.uid, "gm").await.unwrap();
        testing::settle(store.live(), |p| p.as_ref().is_some_and(|p| p.role == Role::Gm)).await;
        tokio::task::yield_now().await;

        assert_eq!(db.active_listeners(), 1);
    }
}
