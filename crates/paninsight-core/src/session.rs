//! Signed-in state, persisted in one place and changed through one entry point.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const SESSION_FILE_NAME: &str = "session.json";
pub const WELCOME_NOTICE: &str = "Logged in successfully!";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<UserProfile>,
    /// Set on sign-in, consumed by the first welcome notice.
    #[serde(default)]
    pub just_logged_in: bool,
    /// Backend session cookies, replayed on the next run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
}

impl Session {
    pub fn sign_in(&mut self, user: UserProfile) {
        self.authenticated = true;
        self.user = Some(user);
        self.just_logged_in = true;
    }

    pub fn sign_out(&mut self) {
        *self = Session::default();
    }

    /// One-time notice shown after a fresh sign-in.
    pub fn take_welcome_notice(&mut self) -> Option<&'static str> {
        if std::mem::take(&mut self.just_logged_in) {
            Some(WELCOME_NOTICE)
        } else {
            None
        }
    }
}

/// Persistence for the session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Session>;
    fn save(&self, session: &Session) -> Result<()>;

    /// Load, mutate and save in one step.
    fn update<R, F>(&self, change: F) -> Result<R>
    where
        Self: Sized,
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = self.load()?;
        let outcome = change(&mut session);
        self.save(&session)?;
        Ok(outcome)
    }
}

pub struct FileSessionStore {
    base_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.base_path.join(SESSION_FILE_NAME)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session> {
        let path = self.path();
        if !path.exists() {
            return Ok(Session::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable session file");
                Ok(Session::default())
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        ensure_dir(&self.base_path)?;
        let path = self.path();
        let raw = serde_json::to_string_pretty(session).context("failed to serialize session")?;
        fs::write(&path, raw)
            .with_context(|| format!("failed to write session file {}", path.display()))
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

/// What a successful backend login hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginGrant {
    pub user: UserProfile,
    pub cookies: Vec<String>,
}

/// The backend side of authentication.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant>;
    async fn logout(&self) -> Result<()>;
    /// `Ok(false)` when the backend no longer recognises the session.
    async fn check_auth(&self) -> Result<bool>;
}

/// Decides whether gated features are available.
#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool>;
}

/// Trusts the persisted session flag.
pub struct LocalAuthGate<S> {
    store: S,
}

impl<S: SessionStore> LocalAuthGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: SessionStore> AuthGate for LocalAuthGate<S> {
    async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.store.load()?.authenticated)
    }
}

/// Checks the persisted flag, then re-validates it with the backend.
pub struct RemoteAuthGate<S, B> {
    store: S,
    backend: B,
}

impl<S: SessionStore, B: AuthBackend> RemoteAuthGate<S, B> {
    pub fn new(store: S, backend: B) -> Self {
        Self { store, backend }
    }
}

#[async_trait]
impl<S: SessionStore, B: AuthBackend> AuthGate for RemoteAuthGate<S, B> {
    async fn is_authenticated(&self) -> Result<bool> {
        if !self.store.load()?.authenticated {
            return Ok(false);
        }
        match self.backend.check_auth().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                info!("backend rejected the session, signing out");
                self.store.update(Session::sign_out)?;
                Ok(false)
            }
            Err(err) => {
                warn!(error = %err, "could not re-validate session, trusting local state");
                Ok(true)
            }
        }
    }
}

/// Sign in with the backend and record the session.
pub async fn login<S: SessionStore>(
    backend: &dyn AuthBackend,
    store: &S,
    email: &str,
    password: &str,
) -> Result<UserProfile> {
    let LoginGrant { user, cookies } = backend.login(email, password).await?;
    store.update(|session| {
        session.sign_in(user.clone());
        session.cookies = cookies;
    })?;
    debug!(email = %user.email, "session started");
    Ok(user)
}

/// Clear the local session, then tell the backend.
///
/// A backend failure is logged; the local session is cleared either way.
pub async fn logout<S: SessionStore>(backend: &dyn AuthBackend, store: &S) -> Result<()> {
    store.update(Session::sign_out)?;
    if let Err(err) = backend.logout().await {
        warn!(error = %err, "backend logout failed, local session cleared");
    }
    Ok(())
}
