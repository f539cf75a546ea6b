use super::{timestamp, MemoryBackend};
use async_trait::async_trait;
use domains::{AuthEvent, AuthGateway, BoardError, Collection, Identity, Result, SignUpMetadata};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::PoisonError;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// A registered email/password account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub metadata: SignUpMetadata,
    salt: String,
    password_hash: String,
}

impl Account {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: Some(self.email.clone()),
        }
    }

    fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryBackend {
    fn set_session(&self, identity: Option<Identity>) -> Option<Identity> {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *session, identity)
    }

    fn announce(&self, event: AuthEvent) {
        // No listeners is fine.
        let _ = self.auth_events.send(event);
    }

    pub fn account(&self, email: &str) -> Option<Account> {
        self.accounts.get(&normalize_email(email)).map(|a| a.value().clone())
    }

    /// Ends the current session without a sign-out call, as token expiry would.
    pub fn expire_session(&self) {
        if let Some(identity) = self.set_session(None) {
            info!(user_id = %identity.id, "session expired");
            self.announce(AuthEvent::SignedOut);
        }
    }

    /// Announces a token refresh for the current session.
    pub fn refresh_session(&self) {
        let current = self.session.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(identity) = current {
            self.announce(AuthEvent::TokenRefreshed(identity));
        }
    }

    /// Announces that the signed-in user's account data changed elsewhere.
    pub fn touch_user(&self) {
        let current = self.session.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(identity) = current {
            self.announce(AuthEvent::UserUpdated(identity));
        }
    }
}

#[async_trait]
impl AuthGateway for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Identity>> {
        Ok(self.session.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let account = self
            .account(email)
            .filter(|a| a.verify(password))
            .ok_or_else(|| BoardError::backend("Invalid login credentials"))?;
        let identity = account.identity();
        self.set_session(Some(identity.clone()));
        info!(user_id = %identity.id, "signed in");
        self.announce(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    /// Creates the account and its profile row. The caller is not signed in.
    async fn sign_up(&self, email: &str, password: &str, metadata: SignUpMetadata) -> Result<Option<Identity>> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(BoardError::backend("Unable to validate email address: invalid format"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BoardError::backend("Password should be at least 6 characters"));
        }
        if self.accounts.contains_key(&email) {
            return Err(BoardError::backend("User already registered"));
        }

        let salt = Uuid::new_v4().simple().to_string();
        let account = Account {
            id: Uuid::new_v4(),
            email: email.clone(),
            metadata: metadata.clone(),
            password_hash: hash_password(&salt, password),
            salt,
        };
        let identity = account.identity();
        self.accounts.insert(email, account);

        let nickname = (!metadata.nickname.trim().is_empty()).then(|| metadata.nickname.trim().to_string());
        self.insert_row(
            Collection::Profiles,
            json!({
                "id": identity.id,
                "nickname": nickname,
                "avatar_url": null,
                "created_at": timestamp(),
            }),
        )?;
        debug!(user_id = %identity.id, "account and profile created");
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(identity) = self.set_session(None) {
            info!(user_id = %identity.id, "signed out");
        }
        self.announce(AuthEvent::SignedOut);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}
