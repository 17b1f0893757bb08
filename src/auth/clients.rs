use std::fmt;

use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient, url::Url,
};
use tracing::debug;

use crate::backend::{BackendError, BackendResult, GoogleCredential};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

fn oauth_error(err: impl fmt::Display) -> BackendError {
    BackendError::OAuth(err.to_string())
}

/// A Google sign-in waiting for the user to come back with a code.
pub struct PendingSignIn {
    pub authorize_url: Url,
    csrf_state: CsrfToken,
    pkce_verifier: PkceCodeVerifier,
}

impl fmt::Debug for PendingSignIn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingSignIn")
            .field("authorize_url", &self.authorize_url.as_str())
            .finish_non_exhaustive()
    }
}

/// The authorization-code flow (with PKCE) that yields a [`GoogleCredential`].
#[derive(Clone)]
pub struct GoogleOAuth {
    client: HappyClient,
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(client_id: &str, client_secret: &str, redirect_url: &str) -> BackendResult<Self> {
        let client = BasicClient::new(ClientId::new(client_id.to_owned()))
            .set_client_secret(ClientSecret::new(client_secret.to_owned()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_owned()).map_err(oauth_error)?)
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_owned()).map_err(oauth_error)?)
            .set_redirect_uri(RedirectUrl::new(redirect_url.to_owned()).map_err(oauth_error)?);

        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, http_client })
    }

    pub fn begin(&self) -> PendingSignIn {
        let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (authorize_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_code_challenge)
            .url();

        PendingSignIn {
            authorize_url,
            csrf_state,
            pkce_verifier,
        }
    }

    /// Exchanges the code the user came back with for an access token.
    pub async fn finish(&self, pending: PendingSignIn, state: &str, code: &str) -> BackendResult<GoogleCredential> {
        if state != pending.csrf_state.secret().as_str() {
            return Err(oauth_error("csrf tokens don't match"));
        }

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .set_pkce_verifier(pending.pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(oauth_error)?;
        debug!("google code exchanged");

        Ok(GoogleCredential {
            access_token: token_result.access_token().secret().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let google = GoogleOAuth::new("id", "secret", "http://localhost:8080/auth/google/callback").unwrap();
        let pending = google.begin();

        let query: Vec<(String, String)> = pending.authorize_url.query_pairs().into_owned().collect();
        let get = |key: &str| query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("client_id"), Some("id"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("state"), Some(pending.csrf_state.secret().as_str()));
        assert_eq!(get("scope"), Some("openid email profile"));
    }

    #[tokio::test]
    async fn mismatched_state_is_refused_before_exchange() {
        let google = GoogleOAuth::new("id", "secret", "http://localhost:8080/auth/google/callback").unwrap();
        let pending = google.begin();

        let err = google.finish(pending, "forged", "code").await.unwrap_err();
        assert_eq!(err.to_string(), "oauth: csrf tokens don't match");
    }

    #[test]
    fn bad_redirect_is_a_config_error() {
        assert!(matches!(GoogleOAuth::new("id", "secret", "not a url"), Err(BackendError::OAuth(_))));
    }
}
