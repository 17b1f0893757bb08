//! One signed-in client: every store, wired over the same backend.

use std::sync::Arc;

use crate::{
    AppError, AppResult,
    auth::{AuthGate, Teardown},
    backend::{AuthProvider, DocumentStore},
    board::{DrawingLayer, TokenLayer},
    campaigns::CampaignDirectory,
    characters::CharacterRoster,
    chat::ChatLog,
    db::{Role, UserId},
    profiles::{ProfileStore, default_display_name},
};

/// Who is acting, as of the moment a store call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: String,
    pub role: Option<Role>,
}

impl Actor {
    pub fn is_gm(&self) -> bool {
        self.role == Some(Role::Gm)
    }
}

pub struct Session {
    pub auth: Arc<AuthGate>,
    pub profiles: Arc<ProfileStore>,
    pub campaigns: Arc<CampaignDirectory>,
    pub characters: Arc<CharacterRoster>,
    pub chat: Arc<ChatLog>,
    pub drawings: Arc<DrawingLayer>,
    pub tokens: Arc<TokenLayer>,
}

impl Session {
    pub fn new(db: Arc<dyn DocumentStore>, provider: Arc<dyn AuthProvider>) -> Self {
        let profiles = Arc::new(ProfileStore::new(db.clone()));
        let campaigns = Arc::new(CampaignDirectory::new(db.clone()));
        let characters = Arc::new(CharacterRoster::new(db.clone()));
        let chat = Arc::new(ChatLog::new(db.clone()));
        let drawings = Arc::new(DrawingLayer::new(db.clone()));
        let tokens = Arc::new(TokenLayer::new(db));

        let dependents = vec![
            campaigns.clone() as Arc<dyn Teardown>,
            characters.clone() as Arc<dyn Teardown>,
            chat.clone() as Arc<dyn Teardown>,
            drawings.clone() as Arc<dyn Teardown>,
            tokens.clone() as Arc<dyn Teardown>,
        ];
        let auth = Arc::new(AuthGate::new(provider, profiles.clone(), dependents));

        Self {
            auth,
            profiles,
            campaigns,
            characters,
            chat,
            drawings,
            tokens,
        }
    }

    /// The signed-in user with their current role and display name.
    pub fn actor(&self) -> AppResult<Actor> {
        let user = self.auth.current_user().ok_or(AppError::NotAuthenticated)?;
        let display_name = match self.profiles.profile() {
            Some(_) => self.profiles.display_name(),
            None => user
                .display_name
                .clone()
                .unwrap_or_else(|| default_display_name(user.email.as_deref())),
        };
        Ok(Actor {
            user_id: user.uid,
            email: user.email,
            display_name,
            role: self.profiles.role(),
        })
    }

    pub async fn logout(&self) -> AppResult<()> {
        self.auth.logout().await
    }
}
