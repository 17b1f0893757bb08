use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    backend::{AuthProvider, AuthUser, BackendError, BackendResult, GoogleCredential},
    db::UserId,
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    password: Option<String>,
}

/// In-process accounts for local play and tests. Rejections carry the same
/// messages the hosted provider uses.
#[derive(Debug)]
pub struct LocalAuth {
    accounts: Mutex<HashMap<String, Account>>,
    google_tokens: Mutex<HashMap<String, String>>,
    state: watch::Sender<Option<AuthUser>>,
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuth {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            google_tokens: Mutex::new(HashMap::new()),
            state: watch::channel(None).0,
        }
    }

    /// Accepts `access_token` as proof of a Google sign-in for `email`.
    pub fn with_google_account(&self, access_token: &str, email: &str) -> &Self {
        self.google_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(access_token.to_owned(), email.to_owned());
        self
    }

    /// Ends the current session without the client asking, as a revoked
    /// token would.
    pub fn expire_session(&self) {
        self.state.send_replace(None);
    }

    fn establish(&self, email: &str, account: &Account) -> AuthUser {
        let user = AuthUser {
            uid: account.uid.clone(),
            email: Some(email.to_owned()),
            display_name: None,
        };
        self.state.send_replace(Some(user.clone()));
        user
    }
}

fn rejected(message: &str) -> BackendError {
    BackendError::Rejected(message.to_owned())
}

fn new_account(password: Option<String>) -> Account {
    Account {
        uid: UserId::from(Uuid::now_v7().simple().to_string()),
        password,
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let account = self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
            .filter(|account| account.password.as_deref() == Some(password))
            .cloned()
            .ok_or_else(|| rejected("INVALID_LOGIN_CREDENTIALS"))?;
        Ok(self.establish(email, &account))
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let (local, domain) = email.split_once('@').unwrap_or_default();
        if local.is_empty() || domain.is_empty() {
            return Err(rejected("INVALID_EMAIL"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(rejected("WEAK_PASSWORD : Password should be at least 6 characters"));
        }

        let account = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(email) {
                return Err(rejected("EMAIL_EXISTS"));
            }
            let account = new_account(Some(password.to_owned()));
            accounts.insert(email.to_owned(), account.clone());
            account
        };
        Ok(self.establish(email, &account))
    }

    async fn sign_in_with_google(&self, credential: &GoogleCredential) -> BackendResult<AuthUser> {
        let email = self
            .google_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&credential.access_token)
            .cloned()
            .ok_or_else(|| rejected("INVALID_IDP_RESPONSE"))?;

        let account = self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(email.clone())
            .or_insert_with(|| new_account(None))
            .clone();
        Ok(self.establish(&email, &account))
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.state.send_replace(None);
        Ok(())
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: BackendError) -> String {
        err.to_string()
    }

    #[tokio::test]
    async fn accounts_are_unique_per_email() {
        let auth = LocalAuth::new();
        let first = auth.sign_up("gm@test.io", "hunter22").await.unwrap();

        let err = auth.sign_up("gm@test.io", "hunter22").await.unwrap_err();
        assert_eq!(message(err), "EMAIL_EXISTS");

        let again = auth.sign_in("gm@test.io", "hunter22").await.unwrap();
        assert_eq!(first.uid, again.uid);
        assert_eq!(*auth.auth_state().borrow(), Some(again));
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let auth = LocalAuth::new();
        assert_eq!(message(auth.sign_up("nope", "hunter22").await.unwrap_err()), "INVALID_EMAIL");
        assert!(message(auth.sign_up("a@b.io", "123").await.unwrap_err()).starts_with("WEAK_PASSWORD"));

        auth.sign_up("a@b.io", "hunter22").await.unwrap();
        assert_eq!(
            message(auth.sign_in("a@b.io", "hunter23").await.unwrap_err()),
            "INVALID_LOGIN_CREDENTIALS"
        );
    }

    #[tokio::test]
    async fn google_accounts_cannot_use_passwords() {
        let auth = LocalAuth::new();
        auth.with_google_account("tok", "elf@test.io");
        let credential = GoogleCredential {
            access_token: "tok".to_owned(),
        };

        let user = auth.sign_in_with_google(&credential).await.unwrap();
        assert_eq!(auth.sign_in_with_google(&credential).await.unwrap().uid, user.uid);
        assert!(auth.sign_in("elf@test.io", "").await.is_err());

        auth.sign_out().await.unwrap();
        assert!(auth.auth_state().borrow().is_none());
    }
}
