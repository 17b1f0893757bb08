use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    GetField,
    backend::{AuthProvider, AuthUser, BackendError, BackendResult, GoogleCredential},
};

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1/accounts";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// Email/password and Google sign-in against the Firebase Identity Toolkit.
pub struct FirebaseAuth {
    api_key: String,
    http_client: reqwest::Client,
    state: watch::Sender<Option<AuthUser>>,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> BackendResult<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            http_client,
            state: watch::channel(None).0,
        })
    }

    async fn call(&self, method: &str, body: &impl Serialize) -> BackendResult<Value> {
        let body: Value = self
            .http_client
            .post(format!("{IDENTITY_TOOLKIT}:{method}?key={}", self.api_key))
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(message) = body
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            debug!(method, message, "identity toolkit refused");
            return Err(BackendError::Rejected(message.to_owned()));
        }
        Ok(body)
    }

    fn establish(&self, body: &Value) -> BackendResult<AuthUser> {
        let optional = |field: &str| {
            body.get(field)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };
        let user = AuthUser {
            uid: body.get_str_field("localId")?.into(),
            email: optional("email"),
            display_name: optional("displayName"),
        };
        self.state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn with_password(&self, method: &str, email: &str, password: &str) -> BackendResult<AuthUser> {
        let body = self
            .call(
                method,
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        self.establish(&body)
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        self.with_password("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        self.with_password("signUp", email, password).await
    }

    async fn sign_in_with_google(&self, credential: &GoogleCredential) -> BackendResult<AuthUser> {
        let body = self
            .call(
                "signInWithIdp",
                &IdpRequest {
                    post_body: format!(
                        "access_token={}&providerId=google.com",
                        credential.access_token
                    ),
                    request_uri: "http://localhost/".to_owned(),
                    return_idp_credential: true,
                    return_secure_token: true,
                },
            )
            .await?;
        self.establish(&body)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.state.send_replace(None);
        Ok(())
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}
