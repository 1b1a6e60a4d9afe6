//! Authenticated session state, mirrored to durable storage.
//!
//! The store is an explicitly constructed handle (cheap to clone, `Arc`
//! inside) injected into the API client and the realtime connection. A page
//! reload / process restart calls [`SessionStore::restore`] to repopulate
//! identity from storage without a server round trip.

use std::sync::{Arc, Mutex};

use linnet_shared::LoginResponse;

use crate::storage::KeyValueStore;

pub const KEY_USER_ID: &str = "userId";
pub const KEY_NICKNAME: &str = "nickname";
pub const KEY_AVATAR: &str = "avatar";
pub const KEY_EMAIL: &str = "email";
pub const KEY_TOKEN: &str = "token";

/// The authenticated user. Logged in iff `user_id` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub nickname: String,
    pub avatar: String,
    pub email: Option<String>,
    /// Token for query-parameter WebSocket auth; absent on cookie deployments.
    pub credential: Option<String>,
}

impl Identity {
    pub fn is_logged_in(&self) -> bool {
        !self.user_id.is_empty()
    }
}

/// Partial profile change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct SessionStore {
    identity: Arc<Mutex<Identity>>,
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            identity: Arc::new(Mutex::new(Identity::default())),
            storage,
        }
    }

    /// Record a successful login and persist every identity field.
    ///
    /// `nickname` defaults to the user id when the server sent none; the
    /// field contents are not validated here, that is the server's job.
    pub fn login(&self, response: &LoginResponse) {
        let nickname = if response.nickname.is_empty() {
            response.user_id.clone()
        } else {
            response.nickname.clone()
        };
        let identity = Identity {
            user_id: response.user_id.clone(),
            nickname,
            avatar: response.avatar.clone(),
            email: response.email.clone(),
            credential: response.token.clone(),
        };

        self.storage.set(KEY_USER_ID, &identity.user_id);
        self.storage.set(KEY_NICKNAME, &identity.nickname);
        self.storage.set(KEY_AVATAR, &identity.avatar);
        self.storage.set(KEY_EMAIL, identity.email.as_deref().unwrap_or(""));
        match &identity.credential {
            Some(token) => {
                self.storage.set(KEY_TOKEN, token);
            }
            // Don't let a token from a previous session linger.
            None => self.storage.remove(KEY_TOKEN),
        }

        *self.identity.lock().unwrap() = identity;
    }

    /// Clear the in-memory identity and every persisted key. Idempotent.
    pub fn logout(&self) {
        *self.identity.lock().unwrap() = Identity::default();
        for key in [KEY_USER_ID, KEY_NICKNAME, KEY_AVATAR, KEY_EMAIL, KEY_TOKEN] {
            self.storage.remove(key);
        }
    }

    /// Repopulate identity from storage. A non-empty `userId` key is the sole
    /// signal of a restorable session; on failure the in-memory state is left
    /// unchanged. Safe to call repeatedly and before any network activity.
    pub fn restore(&self) -> bool {
        let Some(user_id) = self.storage.get(KEY_USER_ID).filter(|v| !v.is_empty()) else {
            return false;
        };

        let nickname = self
            .storage
            .get(KEY_NICKNAME)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| user_id.clone());
        let restored = Identity {
            nickname,
            avatar: self.storage.get(KEY_AVATAR).unwrap_or_default(),
            email: self.storage.get(KEY_EMAIL).filter(|v| !v.is_empty()),
            credential: self.storage.get(KEY_TOKEN).filter(|v| !v.is_empty()),
            user_id,
        };

        *self.identity.lock().unwrap() = restored;
        true
    }

    /// Apply a partial profile change to memory and storage.
    pub fn update_profile(&self, update: &ProfileUpdate) {
        let mut identity = self.identity.lock().unwrap();
        if let Some(nickname) = &update.nickname {
            identity.nickname = nickname.clone();
            self.storage.set(KEY_NICKNAME, nickname);
        }
        if let Some(avatar) = &update.avatar {
            identity.avatar = avatar.clone();
            self.storage.set(KEY_AVATAR, avatar);
        }
        if let Some(email) = &update.email {
            identity.email = Some(email.clone());
            self.storage.set(KEY_EMAIL, email);
        }
    }

    /// Snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.identity.lock().unwrap().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.lock().unwrap().is_logged_in()
    }

    /// Current user id, `None` when logged out.
    pub fn user_id(&self) -> Option<String> {
        let identity = self.identity.lock().unwrap();
        identity.is_logged_in().then(|| identity.user_id.clone())
    }
}
