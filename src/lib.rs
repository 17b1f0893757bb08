pub mod auth;
pub mod backend;
pub mod board;
pub mod campaigns;
pub mod characters;
pub mod chat;
pub mod config;
pub mod db;
pub mod profiles;
pub mod res;
pub mod session;
pub mod sync;

use serde_json::Value;

use backend::{BackendError, BackendResult};

pub use session::{Actor, Session};

/// Reads required fields out of loosely typed JSON replies.
pub trait GetField {
    fn get_str_field(&self, field: &str) -> BackendResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> BackendResult<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| BackendError::MissingField(format!("expected {field} in {self}")))?
            .as_str()
            .ok_or_else(|| BackendError::MissingField(format!("expected {field} in {self} to be string")))?
            .to_owned()
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Everything a store operation can fail with.
///
/// All variants except [`AppError::Backend`] are raised locally before any
/// backend call is made.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("only a game master can create campaigns")]
    NotGameMaster,
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("campaign name must not be empty")]
    EmptyName,
    #[error("join code must not be empty")]
    EmptyJoinCode,
    #[error("no campaign uses this join code")]
    CampaignNotFound,
    #[error("campaign {0} does not exist")]
    NoSuchCampaign(String),
    #[error("you are already the game master of this campaign")]
    AlreadyMaster,
    #[error("you have already joined this campaign")]
    AlreadyJoined,
    #[error("could not find an unused join code")]
    JoinCodeExhausted,
    #[error("you cannot modify this character")]
    NotOwner,
    #[error("invalid dice notation: {0}")]
    InvalidDiceNotation(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AppError {
    /// True for failures detected locally, before the backend was involved.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, AppError::Backend(_))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{sync::Arc, time::Duration};

    use crate::{
        backend::SqliteBackend,
        db::{Role, UserId},
        session::Actor,
        sync::LiveState,
    };

    pub(crate) async fn backend() -> Arc<SqliteBackend> {
        Arc::new(SqliteBackend::in_memory().await.unwrap())
    }

    pub(crate) fn actor(uid: &str, role: Role) -> Actor {
        Actor {
            user_id: UserId::from(uid),
            email: Some(format!("{uid}@test.io")),
            display_name: uid.to_owned(),
            role: Some(role),
        }
    }

    /// Waits until the live state satisfies `pred`, failing the test after a few seconds.
    pub(crate) async fn settle<S, F>(state: &LiveState<S>, pred: F) -> S
    where
        S: Clone + Default,
        F: FnMut(&S) -> bool,
    {
        let mut rx = state.watch();
        let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("timed out waiting for live state")
            .expect("live state dropped");
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn string_fields_are_required() {
        let reply = json!({ "localId": "u1", "expiresIn": 3600 });
        assert_eq!(reply.get_str_field("localId").unwrap(), "u1");
        assert!(matches!(reply.get_str_field("idToken"), Err(BackendError::MissingField(_))));
        assert!(matches!(reply.get_str_field("expiresIn"), Err(BackendError::MissingField(_))));
    }
}
