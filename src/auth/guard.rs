use std::fmt;

use super::AuthGate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    Login,
    Register,
    Dashboard,
    Campaign(String),
}

impl Route {
    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Dashboard | Route::Campaign(_))
    }

    pub fn requires_guest(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Route::Root => f.write_str("/"),
            Route::Login => f.write_str("/login"),
            Route::Register => f.write_str("/register"),
            Route::Dashboard => f.write_str("/dashboard"),
            Route::Campaign(id) => write!(f, "/campaign/{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(Route),
}

/// Decides whether `to` may be entered, once the initial session state is known.
pub async fn guard(gate: &AuthGate, to: &Route) -> Navigation {
    gate.wait_resolved().await;
    let authenticated = gate.is_authenticated();

    if *to == Route::Root {
        Navigation::Redirect(Route::Dashboard)
    } else if to.requires_auth() && !authenticated {
        Navigation::Redirect(Route::Login)
    } else if to.requires_guest() && authenticated {
        Navigation::Redirect(Route::Dashboard)
    } else {
        Navigation::Proceed
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{auth::LocalAuth, profiles::ProfileStore, testing};

    async fn gate() -> Arc<AuthGate> {
        let db = testing::backend().await;
        Arc::new(AuthGate::new(
            Arc::new(LocalAuth::new()),
            Arc::new(ProfileStore::new(db)),
            Vec::new(),
        ))
    }

    #[tokio::test]
    async fn waits_for_the_initial_auth_state() {
        let gate = gate().await;
        let pending = tokio::time::timeout(Duration::from_millis(50), guard(&gate, &Route::Dashboard)).await;
        assert!(pending.is_err());

        gate.init_auth_listener();
        assert_eq!(guard(&gate, &Route::Dashboard).await, Navigation::Redirect(Route::Login));
    }

    #[tokio::test]
    async fn routes_by_session() {
        let gate = gate().await;
        gate.init_auth_listener();

        assert_eq!(guard(&gate, &Route::Root).await, Navigation::Redirect(Route::Dashboard));
        assert_eq!(guard(&gate, &Route::Login).await, Navigation::Proceed);
        assert_eq!(
            guard(&gate, &Route::Campaign("c1".into())).await,
            Navigation::Redirect(Route::Login)
        );

        gate.register("gm@test.io", "hunter22").await.unwrap();
        assert_eq!(guard(&gate, &Route::Register).await, Navigation::Redirect(Route::Dashboard));
        assert_eq!(guard(&gate, &Route::Campaign("c1".into())).await, Navigation::Proceed);
        assert_eq!(Route::Campaign("c1".into()).to_string(), "/campaign/c1");
    }
}
