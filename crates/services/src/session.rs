//! # Identity / Session Provider
//!
//! Resolves who is signed in and keeps their profile at hand.
//!
//! ```text
//!   Resolving ──Settled(None)──────────────► Anonymous
//!       │                                     │   ▲
//!       └──Settled(Some)──► Authenticated ◄───┘   │ SessionEnded
//!                             │  ▲  (SessionStarted)
//!          SessionStarted /   │  │  ProfileLoaded /
//!          ProfileRefreshing  ▼  │  ProfileRefreshFailed
//!                         Authenticated{refreshing}
//! ```
//!
//! `Resolving` is entered once, at construction. Later session changes move
//! directly between `Anonymous` and `Authenticated`; a profile re-fetch only
//! raises the `refreshing` flag and never demotes an authenticated consumer.
//! Lookup failures are published beside the state, not folded into it.

use crate::fetcher::SyncOptions;
use crate::io::{bounded, decode_row, encode};
use crate::uploads::{upload_avatar, ImageUpload};
use domains::{
    AuthEvent, AuthGateway, BackendClient, BoardError, Collection, Filter, Identity, ObjectStore, Profile,
    ProfilePatch, RecordStore, Result, SignUpMetadata,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An authenticated session and its (possibly not yet loaded) profile.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSession {
    pub identity: Identity,
    pub profile: Option<Profile>,
    /// A profile re-fetch is in progress; `profile` still shows the last copy.
    pub refreshing: bool,
}

/// Where session resolution stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Initial resolution has not finished: consumers cannot decide yet.
    #[default]
    Resolving,
    Anonymous,
    Authenticated(AuthenticatedSession),
}

/// Inputs of the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Initial resolution finished, with the profile when signed in.
    Settled {
        identity: Option<Identity>,
        profile: Option<Profile>,
    },
    /// A session began or was renewed for this identity.
    SessionStarted(Identity),
    /// The profile of the current identity is being re-read.
    ProfileRefreshing(Uuid),
    ProfileLoaded(Profile),
    ProfileRefreshFailed(Uuid),
    /// Sign-out or expiry.
    SessionEnded,
}

impl SessionState {
    /// The transition table. Events that do not apply to the current state
    /// leave it untouched.
    pub fn apply(&self, event: SessionEvent) -> SessionState {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Resolving, E::Settled { identity: None, .. }) => S::Anonymous,
            (S::Resolving, E::Settled { identity: Some(identity), profile }) => {
                S::Authenticated(AuthenticatedSession {
                    identity,
                    profile,
                    refreshing: false,
                })
            }
            (S::Resolving, E::SessionEnded) => S::Anonymous,
            (S::Resolving, _) => S::Resolving,

            (S::Anonymous, E::SessionStarted(identity)) => S::Authenticated(AuthenticatedSession {
                identity,
                profile: None,
                refreshing: true,
            }),

            (S::Authenticated(current), E::SessionStarted(identity)) => {
                if current.identity.id == identity.id {
                    S::Authenticated(AuthenticatedSession {
                        identity,
                        ..current.clone()
                    })
                } else {
                    S::Authenticated(AuthenticatedSession {
                        identity,
                        profile: None,
                        refreshing: true,
                    })
                }
            }
            (S::Authenticated(current), E::ProfileRefreshing(user_id)) if current.identity.id == user_id => {
                S::Authenticated(AuthenticatedSession {
                    refreshing: true,
                    ..current.clone()
                })
            }
            (S::Authenticated(current), E::ProfileLoaded(profile)) if current.identity.id == profile.id => {
                S::Authenticated(AuthenticatedSession {
                    identity: current.identity.clone(),
                    profile: Some(profile),
                    refreshing: false,
                })
            }
            (S::Authenticated(current), E::ProfileRefreshFailed(user_id)) if current.identity.id == user_id => {
                S::Authenticated(AuthenticatedSession {
                    refreshing: false,
                    ..current.clone()
                })
            }
            (S::Authenticated(_), E::SessionEnded) => S::Anonymous,

            (state, _) => state.clone(),
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self, SessionState::Resolving)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(session) => Some(&session.identity),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated(session) => session.profile.as_ref(),
            _ => None,
        }
    }

    /// Access decision for a screen that requires a signed-in user.
    pub fn gate(&self, return_to: &str) -> AccessGate {
        match self {
            SessionState::Resolving => AccessGate::Pending,
            SessionState::Authenticated(session) => AccessGate::Granted(session.identity.clone()),
            SessionState::Anonymous => AccessGate::Redirect {
                to: format!("/login?redirect={return_to}"),
            },
        }
    }
}

/// What a gated screen should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessGate {
    /// Still resolving: render a loading state, do not redirect.
    Pending,
    Granted(Identity),
    Redirect { to: String },
    /// The session could not be looked up; show the failure instead of
    /// sending a possibly signed-in user to the login page.
    Unavailable { reason: String },
}

/// Registration form as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub nickname: String,
    pub college: String,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(BoardError::validation("请输入邮箱"));
        }
        if self.password.is_empty() {
            return Err(BoardError::validation("请输入密码"));
        }
        if self.password != self.confirm_password {
            return Err(BoardError::validation("两次输入的密码不一致"));
        }
        Ok(())
    }
}

/// Profile edit form. A blank nickname means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub nickname: String,
    pub avatar: Option<ImageUpload>,
}

/// Owns the session state machine and keeps it in step with the auth service.
pub struct SessionProvider {
    auth: Arc<dyn AuthGateway>,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    state: watch::Sender<SessionState>,
    /// Last session or profile lookup failure, cleared by the next success.
    error: watch::Sender<Option<String>>,
    timeout: Duration,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionProvider {
    /// Creates the provider in `Resolving`, starts listening to auth events
    /// and settles the initial state before returning.
    pub async fn start(client: &BackendClient, options: &SyncOptions) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Resolving);
        let (error, _) = watch::channel(None);
        let provider = Arc::new(Self {
            auth: client.auth.clone(),
            records: client.records.clone(),
            objects: client.objects.clone(),
            state,
            error,
            timeout: options.fetch_timeout,
            listener: std::sync::Mutex::new(None),
        });

        let events = provider.auth.auth_events();
        let task = tokio::spawn(listen(Arc::downgrade(&provider), events));
        if let Ok(mut slot) = provider.listener.lock() {
            *slot = Some(task);
        }

        provider.resolve().await;
        provider
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// Message of the last failed session or profile lookup.
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    /// Like [`SessionState::gate`], except that an anonymous state reached
    /// through a failed lookup does not redirect.
    pub fn gate(&self, return_to: &str) -> AccessGate {
        let state = self.state.borrow();
        if *state == SessionState::Anonymous {
            if let Some(reason) = self.error() {
                return AccessGate::Unavailable { reason };
            }
        }
        state.gate(return_to)
    }

    /// Re-reads the session from the auth service, e.g. after a failed
    /// lookup or missed auth events.
    pub async fn reload(&self) {
        match bounded(self.timeout, self.auth.get_session()).await {
            Ok(Some(identity)) => {
                self.clear_error();
                self.begin_session(identity).await;
            }
            Ok(None) => {
                self.clear_error();
                self.transition(SessionEvent::SessionEnded);
            }
            Err(err) => {
                warn!(error = %err, "session re-read failed");
                self.record_error(&err);
            }
        }
    }

    /// Signs in and settles the session before returning.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = bounded(self.timeout, self.auth.sign_in(email.trim(), password)).await?;
        info!(user_id = %identity.id, "signed in");
        self.begin_session(identity.clone()).await;
        Ok(identity)
    }

    /// Registers an account and writes the chosen nickname to the profile the
    /// backend created for it. The session itself is left alone; the user
    /// signs in afterwards.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<Option<Identity>> {
        form.validate()?;
        let metadata = SignUpMetadata {
            nickname: form.nickname.trim().to_string(),
            college: form.college.clone(),
        };
        let identity = bounded(
            self.timeout,
            self.auth.sign_up(form.email.trim(), &form.password, metadata.clone()),
        )
        .await?;

        if let Some(identity) = &identity {
            info!(user_id = %identity.id, "account registered");
            if !metadata.nickname.is_empty() {
                let patch = ProfilePatch {
                    nickname: Some(metadata.nickname),
                    avatar_url: None,
                };
                self.write_profile(identity.id, &patch).await?;
            }
        }
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<()> {
        bounded(self.timeout, self.auth.sign_out()).await?;
        info!("signed out");
        self.clear_error();
        self.transition(SessionEvent::SessionEnded);
        Ok(())
    }

    /// Re-reads the current user's profile. Consumers keep seeing the
    /// authenticated view (with `refreshing` set) while it loads.
    pub async fn refresh_profile(&self) {
        let Some(identity) = self.identity() else {
            return;
        };
        self.transition(SessionEvent::ProfileRefreshing(identity.id));
        self.load_profile(identity.id).await;
    }

    /// Applies a nickname and/or avatar change to the signed-in user's profile.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let identity = self
            .identity()
            .ok_or_else(|| BoardError::Unauthenticated("用户未登录".into()))?;

        if update.avatar.as_ref().is_some_and(ImageUpload::is_oversized) {
            return Err(BoardError::validation("图片大小不能超过 5MB"));
        }
        let nickname = update.nickname.trim();
        if nickname.is_empty() && update.avatar.is_none() {
            return Err(BoardError::validation("没有需要更新的信息"));
        }

        let mut patch = ProfilePatch {
            nickname: (!nickname.is_empty()).then(|| nickname.to_string()),
            avatar_url: None,
        };
        if let Some(avatar) = &update.avatar {
            let url = upload_avatar(self.objects.as_ref(), identity.id, avatar, self.timeout).await?;
            patch.avatar_url = Some(url);
        }

        let existing = bounded(
            self.timeout,
            self.records
                .query_one(Collection::Profiles, vec![Filter::eq("id", identity.id.to_string())]),
        )
        .await?;
        if existing.is_none() {
            return Err(BoardError::not_found("profile", identity.id));
        }

        let profile = self.write_profile(identity.id, &patch).await?;
        info!(user_id = %identity.id, "profile updated");
        self.transition(SessionEvent::ProfileLoaded(profile.clone()));
        Ok(profile)
    }

    async fn write_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> Result<Profile> {
        let rows = bounded(
            self.timeout,
            self.records.update(
                Collection::Profiles,
                vec![Filter::eq("id", user_id.to_string())],
                encode(patch)?,
            ),
        )
        .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BoardError::not_found("profile", user_id))?;
        decode_row(row)
    }

    async fn resolve(&self) {
        let identity = match bounded(self.timeout, self.auth.get_session()).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(error = %err, "session lookup failed; settling as signed out");
                self.record_error(&err);
                self.transition(SessionEvent::Settled {
                    identity: None,
                    profile: None,
                });
                return;
            }
        };
        let profile = match &identity {
            Some(identity) => match self.fetch_profile(identity.id).await {
                Ok(profile) => {
                    self.clear_error();
                    profile
                }
                Err(err) => {
                    warn!(user_id = %identity.id, error = %err, "profile lookup failed");
                    self.record_error(&err);
                    None
                }
            },
            None => {
                self.clear_error();
                None
            }
        };
        debug!(signed_in = identity.is_some(), "session resolved");
        self.transition(SessionEvent::Settled { identity, profile });
    }

    /// Moves to (or renews) an authenticated session and loads its profile,
    /// unless that exact session is already settled with a profile.
    async fn begin_session(&self, identity: Identity) {
        let already_settled = matches!(
            &*self.state.borrow(),
            SessionState::Authenticated(s) if s.identity.id == identity.id && s.profile.is_some()
        );
        let user_id = identity.id;
        self.transition(SessionEvent::SessionStarted(identity));
        if !already_settled {
            self.transition(SessionEvent::ProfileRefreshing(user_id));
            self.load_profile(user_id).await;
        }
    }

    async fn load_profile(&self, user_id: Uuid) {
        match self.fetch_profile(user_id).await {
            Ok(Some(profile)) => {
                self.clear_error();
                self.transition(SessionEvent::ProfileLoaded(profile));
            }
            Ok(None) => {
                warn!(%user_id, "no profile row for signed-in user");
                self.record_error(&BoardError::not_found("profile", user_id));
                self.transition(SessionEvent::ProfileRefreshFailed(user_id));
            }
            Err(err) => {
                warn!(%user_id, error = %err, "profile refresh failed");
                self.record_error(&err);
                self.transition(SessionEvent::ProfileRefreshFailed(user_id));
            }
        }
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = bounded(
            self.timeout,
            self.records
                .query_one(Collection::Profiles, vec![Filter::eq("id", user_id.to_string())]),
        )
        .await?;
        row.map(decode_row).transpose()
    }

    fn record_error(&self, err: &BoardError) {
        let message = err.to_string();
        self.error.send_replace(Some(message));
    }

    fn clear_error(&self) {
        self.error.send_if_modified(|e| e.take().is_some());
    }

    fn transition(&self, event: SessionEvent) {
        self.state.send_if_modified(|state| {
            let next = state.apply(event);
            if next == *state {
                return false;
            }
            debug!(from = state_name(state), to = state_name(&next), "session transition");
            *state = next;
            true
        });
    }

    async fn on_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => {
                self.begin_session(identity).await;
            }
            AuthEvent::UserUpdated(identity) => {
                self.transition(SessionEvent::SessionStarted(identity));
                self.refresh_profile().await;
            }
            AuthEvent::SignedOut => {
                info!("session ended");
                self.clear_error();
                self.transition(SessionEvent::SessionEnded);
            }
        }
    }
}

impl Drop for SessionProvider {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Resolving => "resolving",
        SessionState::Anonymous => "anonymous",
        SessionState::Authenticated(s) if s.refreshing => "authenticated(refreshing)",
        SessionState::Authenticated(_) => "authenticated",
    }
}

async fn listen(provider: Weak<SessionProvider>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth events lagged; re-reading session");
                let Some(provider) = provider.upgrade() else { break };
                provider.reload().await;
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(provider) = provider.upgrade() else { break };
        provider.on_auth_event(event).await;
    }
    debug!("auth event listener stopped");
}
