use std::sync::Arc;

use anyhow::{Context, anyhow};

use crate::{
    auth::{FirebaseAuth, GoogleOAuth, LocalAuth},
    backend::{AuthProvider, SqliteBackend},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    Local,
    Firebase { api_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
    pub google: Option<GoogleConfig>,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<AppConfig> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<AppConfig> {
        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite::memory:".to_owned());
        let auth = match var("AUTH_KIND").as_deref().unwrap_or("local") {
            "local" => AuthConfig::Local,
            "firebase" => AuthConfig::Firebase {
                api_key: var("FIREBASE_API_KEY").context("FIREBASE_API_KEY")?,
            },
            other => Err(anyhow!("invalid AUTH_KIND {other:?}"))?,
        };
        let google = match (
            var("GOOGLE_CLIENT_ID"),
            var("GOOGLE_CLIENT_SECRET"),
            var("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        Ok(AppConfig {
            database_url,
            auth,
            google,
        })
    }

    pub async fn open_store(&self) -> anyhow::Result<Arc<SqliteBackend>> {
        let store = SqliteBackend::connect(&self.database_url)
            .await
            .with_context(|| format!("opening {}", self.database_url))?;
        Ok(Arc::new(store))
    }

    pub fn auth_provider(&self) -> anyhow::Result<Arc<dyn AuthProvider>> {
        Ok(match &self.auth {
            AuthConfig::Local => Arc::new(LocalAuth::new()),
            AuthConfig::Firebase { api_key } => {
                Arc::new(FirebaseAuth::new(api_key.as_str()).context("building http client")?)
            }
        })
    }

    pub fn google_oauth(&self) -> anyhow::Result<Option<GoogleOAuth>> {
        self.google
            .as_ref()
            .map(|google| {
                GoogleOAuth::new(&google.client_id, &google.client_secret, &google.redirect_url)
                    .context("google oauth client")
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_in_memory() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.auth, AuthConfig::Local);
        assert_eq!(config.google, None);
    }

    #[test]
    fn firebase_needs_a_key() {
        assert!(config(&[("AUTH_KIND", "firebase")]).is_err());
        assert!(config(&[("AUTH_KIND", "ldap")]).is_err());

        let config = config(&[("AUTH_KIND", "firebase"), ("FIREBASE_API_KEY", "k")]).unwrap();
        assert_eq!(config.auth, AuthConfig::Firebase { api_key: "k".into() });
    }

    #[test]
    fn google_needs_all_three() {
        let partial = config(&[("GOOGLE_CLIENT_ID", "id"), ("GOOGLE_CLIENT_SECRET", "s")]).unwrap();
        assert_eq!(partial.google, None);

        let full = config(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "s"),
            ("GOOGLE_REDIRECT_URL", "http://localhost:8080/auth/google/callback"),
        ])
        .unwrap();
        assert!(full.google_oauth().unwrap().is_some());
    }

    #[tokio::test]
    async fn opens_the_configured_store() {
        let config = config(&[]).unwrap();
        let store = config.open_store().await.unwrap();
        assert_eq!(store.active_listeners(), 0);
    }
}
