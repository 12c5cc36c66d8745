//! Login transition: credentials in, session token and alias table out.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::alias::{AliasGenerator, MAX_DRAW_ATTEMPTS};
use crate::auth::Authenticator;
use crate::envelope::{Credentials, LoginGrant};
use crate::error::RouteError;
use crate::registry::{redact, ForwardTable, SessionRegistry};
use crate::routes::RouteTable;

/// Issues sessions for authenticated callers.
#[derive(Clone)]
pub struct Login {
    authenticator: Arc<dyn Authenticator>,
    sessions: Arc<dyn SessionRegistry>,
    routes: Arc<RouteTable>,
    ids: Arc<dyn AliasGenerator>,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("sessions", &self.sessions)
            .field("routes", &self.routes)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl Login {
    /// Wire the transition to its collaborators.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        sessions: Arc<dyn SessionRegistry>,
        routes: Arc<RouteTable>,
        ids: Arc<dyn AliasGenerator>,
    ) -> Self {
        Self { authenticator, sessions, routes, ids }
    }

    /// Authenticate `credentials` and, on success, store a fresh session.
    ///
    /// Rejected credentials never touch the registry. The returned grant is
    /// the inverse of the stored forward table.
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<LoginGrant, RouteError> {
        let credentials = credentials.ok_or(RouteError::MissingCredentials)?;
        let accepted =
            self.authenticator.verify(&credentials).await.map_err(RouteError::AuthBackend)?;
        if !accepted {
            info!(target: "veilroute::login", identity = %credentials.identity, "login rejected");
            return Err(RouteError::Rejected);
        }

        let token = self.fresh_token().await?;
        let (forward, reverse) = self.issue_aliases()?;
        self.sessions
            .set(token.clone(), forward)
            .await
            .map_err(RouteError::SessionPersist)?;
        info!(
            target: "veilroute::login",
            identity = %credentials.identity,
            session = %redact(&token),
            routes = reverse.len(),
            "session issued"
        );
        Ok(LoginGrant { token, session: reverse })
    }

    /// Run [`Login::login`] and render the HTTP response.
    pub async fn respond(&self, credentials: Option<Credentials>) -> Result<Response, RouteError> {
        let grant = self.login(credentials).await?;
        match serde_json::to_vec(&grant) {
            Ok(body) => {
                let mut response = (StatusCode::OK, body).into_response();
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(response)
            }
            Err(err) => {
                if let Err(cleanup) = self.sessions.delete(&grant.token).await {
                    debug!(target: "veilroute::login", error = %cleanup, "failed to withdraw unsent session");
                }
                Err(RouteError::ResponseEncode(err))
            }
        }
    }

    async fn fresh_token(&self) -> Result<String, RouteError> {
        for _ in 0..MAX_DRAW_ATTEMPTS {
            let token = self.ids.generate();
            let live = self.sessions.get(&token).await.map_err(RouteError::SessionLookup)?;
            if live.is_none() {
                return Ok(token);
            }
            debug!(target: "veilroute::login", "token collided with a live session; redrawing");
        }
        Err(RouteError::IdentifierExhausted { attempts: MAX_DRAW_ATTEMPTS })
    }

    fn issue_aliases(&self) -> Result<(ForwardTable, BTreeMap<String, String>), RouteError> {
        let names = self.routes.names();
        let mut seen = HashSet::with_capacity(names.len());
        let mut forward = ForwardTable::with_capacity(names.len());
        let mut reverse = BTreeMap::new();
        for name in names {
            let alias = self.draw_unique(&mut seen)?;
            forward.insert(alias.clone(), name.clone());
            reverse.insert(name, alias);
        }
        Ok((forward, reverse))
    }

    fn draw_unique(&self, seen: &mut HashSet<String>) -> Result<String, RouteError> {
        for _ in 0..MAX_DRAW_ATTEMPTS {
            let alias = self.ids.generate();
            if seen.insert(alias.clone()) {
                return Ok(alias);
            }
        }
        Err(RouteError::IdentifierExhausted { attempts: MAX_DRAW_ATTEMPTS })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::UuidPairGenerator;
    use crate::auth::{AuthError, StaticAuthenticator};
    use crate::error::ErrorCode;
    use crate::registry::InMemorySessionRegistry;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FailingAuth;

    #[async_trait]
    impl Authenticator for FailingAuth {
        async fn verify(&self, _credentials: &Credentials) -> Result<bool, AuthError> {
            Err(AuthError::Unavailable("ldap down".into()))
        }
    }

    /// Replays a fixed script of identifiers, then repeats the last one.
    #[derive(Debug)]
    struct ScriptedIds {
        script: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl ScriptedIds {
        fn new(script: Vec<&'static str>) -> Self {
            Self { script, next: AtomicUsize::new(0) }
        }
    }

    impl AliasGenerator for ScriptedIds {
        fn generate(&self) -> String {
            let i = self.next.fetch_add(1, Ordering::SeqCst).min(self.script.len() - 1);
            self.script[i].to_string()
        }
    }

    #[derive(Debug, Default)]
    struct RefusingRegistry {
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl SessionRegistry for RefusingRegistry {
        async fn get(
            &self,
            _token: &str,
        ) -> Result<Option<Arc<ForwardTable>>, crate::registry::RegistryError> {
            Ok(None)
        }
        async fn set(
            &self,
            _token: String,
            _table: ForwardTable,
        ) -> Result<(), crate::registry::RegistryError> {
            *self.writes.lock().unwrap() += 1;
            Err(crate::registry::RegistryError::Unavailable("disk full".into()))
        }
        async fn delete(&self, _token: &str) -> Result<(), crate::registry::RegistryError> {
            Ok(())
        }
    }

    fn routes(names: &[&str]) -> Arc<RouteTable> {
        let mut table = RouteTable::new();
        for name in names {
            table.register(*name, |payload: Bytes| async move { payload });
        }
        Arc::new(table)
    }

    fn login_with(
        auth: Arc<dyn Authenticator>,
        sessions: Arc<dyn SessionRegistry>,
        names: &[&str],
        ids: Arc<dyn AliasGenerator>,
    ) -> Login {
        Login::new(auth, sessions, routes(names), ids)
    }

    fn alice() -> Arc<dyn Authenticator> {
        Arc::new(StaticAuthenticator::new(vec![Credentials::new("alice", "pw")]))
    }

    #[tokio::test]
    async fn grant_is_inverse_of_stored_table() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login =
            login_with(alice(), sessions.clone(), &["echo", "time"], Arc::new(UuidPairGenerator));
        let grant = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap();

        let stored = sessions.get(&grant.token).await.unwrap().expect("session stored");
        assert_eq!(stored.len(), 2);
        for (name, alias) in &grant.session {
            assert_eq!(stored.get(alias), Some(name));
        }
        let names: Vec<&str> = grant.session.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["echo", "time"]);
    }

    #[tokio::test]
    async fn missing_credentials_is_bad_request() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions.clone(), &["echo"], Arc::new(UuidPairGenerator));
        let err = login.login(None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert!(sessions.is_empty().unwrap());
    }

    #[tokio::test]
    async fn rejected_credentials_leave_registry_untouched() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions.clone(), &["echo"], Arc::new(UuidPairGenerator));
        let err = login.login(Some(Credentials::new("alice", "wrong"))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(sessions.is_empty().unwrap());
    }

    #[tokio::test]
    async fn backend_failure_is_server_error() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login =
            login_with(Arc::new(FailingAuth), sessions.clone(), &["echo"], Arc::new(UuidPairGenerator));
        let err = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationBackendError);
        assert!(sessions.is_empty().unwrap());
    }

    #[tokio::test]
    async fn registry_write_failure_is_persist_error() {
        let sessions = Arc::new(RefusingRegistry::default());
        let login = login_with(alice(), sessions.clone(), &["echo"], Arc::new(UuidPairGenerator));
        let err = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionPersistError);
        assert_eq!(*sessions.writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn colliding_aliases_are_redrawn() {
        let ids = Arc::new(ScriptedIds::new(vec!["tok", "dup", "dup", "dup", "fresh"]));
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions.clone(), &["echo", "time"], ids);
        let grant = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap();
        assert_eq!(grant.token, "tok");
        assert_eq!(grant.alias("echo"), Some("dup"));
        assert_eq!(grant.alias("time"), Some("fresh"));
    }

    #[tokio::test]
    async fn endless_collisions_fail_without_storing() {
        let ids = Arc::new(ScriptedIds::new(vec!["tok", "same"]));
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions.clone(), &["echo", "time"], ids);
        let err = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap_err();
        assert!(matches!(err, RouteError::IdentifierExhausted { .. }));
        assert!(sessions.is_empty().unwrap());
    }

    #[tokio::test]
    async fn live_token_is_never_reissued() {
        let ids = Arc::new(ScriptedIds::new(vec!["tok", "a1", "tok", "tok2", "a2"]));
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions.clone(), &["echo"], ids);
        let first = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap();
        let second = login.login(Some(Credentials::new("alice", "pw"))).await.unwrap();
        assert_eq!(first.token, "tok");
        assert_eq!(second.token, "tok2");
        assert_eq!(sessions.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn respond_renders_json_grant() {
        let sessions = Arc::new(InMemorySessionRegistry::new());
        let login = login_with(alice(), sessions, &["echo"], Arc::new(UuidPairGenerator));
        let response = login.respond(Some(Credentials::new("alice", "pw"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let grant: LoginGrant = serde_json::from_slice(&body).unwrap();
        assert!(grant.alias("echo").is_some());
    }
}
