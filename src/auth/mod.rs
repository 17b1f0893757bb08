//! Sign-in, sign-up and sign-out, and the identity every other store is
//! scoped to.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    AppResult,
    backend::{AuthProvider, AuthUser, GoogleCredential},
    db::UserId,
    profiles::{ProfileSeed, ProfileStore},
    sync::{LiveState, StoreStatus, Subscription},
};

mod clients;
mod firebase;
pub mod guard;
mod local;

pub use clients::{GoogleOAuth, PendingSignIn};
pub use firebase::FirebaseAuth;
pub use local::LocalAuth;

/// A store whose caches and listeners must not outlive the session.
pub trait Teardown: Send + Sync {
    fn teardown(&self);
}

pub struct AuthGate {
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<ProfileStore>,
    dependents: Vec<Arc<dyn Teardown>>,
    user: LiveState<Option<AuthUser>>,
    resolved: watch::Sender<bool>,
    listener: Subscription,
    status: StoreStatus,
}

impl AuthGate {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        profiles: Arc<ProfileStore>,
        dependents: Vec<Arc<dyn Teardown>>,
    ) -> Self {
        Self {
            provider,
            profiles,
            dependents,
            user: LiveState::new(),
            resolved: watch::channel(false).0,
            listener: Subscription::new("auth-state"),
            status: StoreStatus::new("auth"),
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.get().is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.get().map(|user| user.uid)
    }

    pub fn user_email(&self) -> Option<String> {
        self.user.get().and_then(|user| user.email)
    }

    pub fn watch_user(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user.watch()
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthUser> {
        self.status
            .run("login", async {
                let user = self.provider.sign_in(email, password).await?;
                self.establish(user, None).await
            })
            .await
    }

    /// Signs up and writes a fresh profile with the default `player` role.
    pub async fn register(&self, email: &str, password: &str) -> AppResult<AuthUser> {
        self.status
            .run("register", async {
                let user = self.provider.sign_up(email, password).await?;
                self.establish(user, Some(ProfileSeed::default())).await
            })
            .await
    }

    pub async fn login_with_google(&self, credential: &GoogleCredential) -> AppResult<AuthUser> {
        self.status
            .run("login_with_google", async {
                let user = self.provider.sign_in_with_google(credential).await?;
                self.establish(user, None).await
            })
            .await
    }

    /// Drops every dependent cache and listener, then ends the session.
    pub async fn logout(&self) -> AppResult<()> {
        self.status
            .run("logout", async {
                self.teardown_dependents();
                self.provider.sign_out().await?;
                self.user.set(None);
                info!("signed out");
                Ok(())
            })
            .await
    }

    /// Follows the provider's session state for the lifetime of the gate,
    /// including sign-ins and sign-outs this client did not start.
    pub fn init_auth_listener(self: &Arc<Self>) {
        let ticket = self.listener.begin();
        let mut rx = self.provider.auth_state();
        let gate = Arc::downgrade(self);
        let pump_ticket = ticket.clone();

        let task = tokio::spawn(async move {
            loop {
                let observed = rx.borrow_and_update().clone();
                let Some(gate) = gate.upgrade() else {
                    break;
                };
                if !pump_ticket.is_current() {
                    break;
                }
                gate.sync_identity(observed).await;
                drop(gate);

                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        self.listener.attach(&ticket, task);
    }

    /// Resolves once the initial session state is known.
    pub async fn wait_resolved(&self) {
        let mut rx = self.resolved.subscribe();
        let _ = rx.wait_for(|resolved| *resolved).await;
    }

    async fn establish(&self, user: AuthUser, seed: Option<ProfileSeed>) -> AppResult<AuthUser> {
        self.user.set(Some(user.clone()));
        match seed {
            Some(seed) => self.profiles.create_profile(&user, seed).await?,
            None => self.profiles.fetch_profile(&user).await?,
        };
        self.start_profile_subscription(&user.uid).await;
        self.resolved.send_replace(true);

        info!(uid = %user.uid, "signed in");
        Ok(user)
    }

    async fn start_profile_subscription(&self, uid: &UserId) {
        if let Err(err) = self.profiles.subscribe_to_profile(uid).await {
            warn!(%uid, "profile subscription did not start: {err}");
        }
    }

    async fn sync_identity(&self, observed: Option<AuthUser>) {
        let previous = self.user.get();
        match observed {
            Some(user) => {
                let same_user = previous.as_ref().is_some_and(|prev| prev.uid == user.uid);
                self.user.set(Some(user.clone()));
                if !same_user || self.profiles.profile().is_none() {
                    match self.profiles.fetch_profile(&user).await {
                        Ok(_) => self.start_profile_subscription(&user.uid).await,
                        Err(err) => warn!(uid = %user.uid, "could not load profile: {err}"),
                    }
                }
            }
            None => {
                if previous.is_some() {
                    info!("session ended elsewhere");
                    self.teardown_dependents();
                }
                self.user.set(None);
            }
        }
        debug!(authenticated = self.is_authenticated(), "auth state resolved");
        self.resolved.send_replace(true);
    }

    fn teardown_dependents(&self) {
        self.profiles.clear_profile();
        for dependent in &self.dependents {
            dependent.teardown();
        }
    }
}
